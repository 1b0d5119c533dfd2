//! Fixed-point scene graphs in first-child/next-sibling form, held in an arena.

use std::collections::HashMap;

use crate::error::{PreviewError, Result};
use crate::formats::Le;

pub type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    Point,
    Line,
    Triangle,
    Quad,
    Polygon,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Primitive {
    pub indices: Vec<u16>,
}

impl Primitive {
    pub fn new(indices: Vec<u16>) -> Self {
        Self { indices }
    }

    pub fn kind(&self) -> PrimitiveKind {
        match self.indices.len() {
            0 | 1 => PrimitiveKind::Point,
            2 => PrimitiveKind::Line,
            3 => PrimitiveKind::Triangle,
            4 => PrimitiveKind::Quad,
            _ => PrimitiveKind::Polygon,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneNode {
    pub name: String,
    /// Offset from the parent in 16.16 fixed point.
    pub offset: [i32; 3],
    /// Vertex positions relative to this node, 16.16 fixed point.
    pub vertices: Vec<[i32; 3]>,
    pub primitives: Vec<Primitive>,
    pub child: Option<NodeId>,
    pub sibling: Option<NodeId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub root: NodeId,
}

impl SceneGraph {
    pub fn root(&self) -> Option<&SceneNode> {
        self.nodes.get(self.root)
    }

    /// Depth-first order over reachable nodes: a node, its children, then its later siblings.
    /// Fails on dangling ids or a node reachable twice.
    pub fn preorder(&self) -> Result<Vec<NodeId>> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| PreviewError::decode(format!("scene: dangling node id {id}")))?;
            if std::mem::replace(&mut seen[id], true) {
                return Err(PreviewError::decode(format!("scene: node {id} reached twice")));
            }
            out.push(id);
            if let Some(s) = node.sibling {
                stack.push(s);
            }
            if let Some(c) = node.child {
                stack.push(c);
            }
        }
        Ok(out)
    }
}

pub trait SceneDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<SceneGraph>;
}

/// Total Annihilation `.3do` objects.
pub struct ThreeDoDecoder;

const OBJECT_HEADER: usize = 52;
const PRIMITIVE_LEN: usize = 32;
const MAX_COUNT: usize = 1 << 20;
/// Vertices plus indices any object file may decode to, whatever its size.
const ELEMENT_FLOOR: usize = 1 << 16;
/// Decoded vertices plus indices per payload byte. Lists shared between primitives or
/// objects count once per use.
const ELEMENTS_PER_BYTE: usize = 4;

impl SceneDecoder for ThreeDoDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<SceneGraph> {
        let le = Le::new(bytes, "3do");
        let mut nodes: Vec<SceneNode> = Vec::new();
        let mut by_offset: HashMap<usize, NodeId> = HashMap::new();
        // file offsets of objects whose bodies still need reading
        let mut pending = vec![0usize];
        let mut budget = bytes.len().saturating_mul(ELEMENTS_PER_BYTE).max(ELEMENT_FLOOR);
        by_offset.insert(0, 0);
        nodes.push(SceneNode::default());

        while let Some(at) = pending.pop() {
            let id = by_offset[&at];
            let (node, child_at, sibling_at) = read_object(&le, at, &mut budget)?;
            nodes[id] = node;
            let mut link = |target: usize| -> Result<NodeId> {
                if by_offset.contains_key(&target) {
                    return Err(PreviewError::decode(format!(
                        "3do: object at {target:#x} linked twice"
                    )));
                }
                let nid = nodes.len();
                nodes.push(SceneNode::default());
                by_offset.insert(target, nid);
                pending.push(target);
                Ok(nid)
            };
            let child = child_at.map(&mut link).transpose()?;
            let sibling = sibling_at.map(&mut link).transpose()?;
            nodes[id].child = child;
            nodes[id].sibling = sibling;
        }
        Ok(SceneGraph { nodes, root: 0 })
    }
}

fn read_object(
    le: &Le<'_>,
    at: usize,
    budget: &mut usize,
) -> Result<(SceneNode, Option<usize>, Option<usize>)> {
    le.bytes(at, OBJECT_HEADER)?;
    let version = le.u32(at)?;
    if version != 1 {
        return Err(PreviewError::decode(format!("3do: unknown object version {version}")));
    }
    let n_vert = count(le.u32(at + 4)?)?;
    let n_prim = count(le.u32(at + 8)?)?;
    let offset = [le.i32(at + 16)?, le.i32(at + 20)?, le.i32(at + 24)?];
    let name = le.cstr(le.ptr(at + 28)?, 64)?;
    let vert_at = le.ptr(at + 36)?;
    let prim_at = le.ptr(at + 40)?;
    let sibling = le.u32(at + 44)? as usize;
    let child = le.u32(at + 48)? as usize;

    spend(budget, n_vert)?;
    let mut vertices = Vec::with_capacity(n_vert.min(le.len() / 12));
    for i in 0..n_vert {
        let v = vert_at + 12 * i;
        vertices.push([le.i32(v)?, le.i32(v + 4)?, le.i32(v + 8)?]);
    }

    let mut primitives = Vec::with_capacity(n_prim.min(le.len() / PRIMITIVE_LEN));
    for i in 0..n_prim {
        let p = prim_at + PRIMITIVE_LEN * i;
        let n_idx = count(le.u32(p + 4)?)?;
        spend(budget, n_idx)?;
        let idx_at = le.ptr(p + 12)?;
        let raw = le.bytes(idx_at, 2 * n_idx)?;
        let indices = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        primitives.push(Primitive { indices });
    }

    let link = |off: usize| -> Result<Option<usize>> {
        match off {
            0 => Ok(None),
            o if o + OBJECT_HEADER <= le.len() => Ok(Some(o)),
            o => Err(PreviewError::decode(format!("3do: link {o:#x} beyond end"))),
        }
    };

    Ok((
        SceneNode {
            name,
            offset,
            vertices,
            primitives,
            child: None,
            sibling: None,
        },
        link(child)?,
        link(sibling)?,
    ))
}

fn spend(budget: &mut usize, n: usize) -> Result<()> {
    *budget = budget
        .checked_sub(n)
        .ok_or_else(|| PreviewError::decode("3do: vertex and index lists exceed payload budget"))?;
    Ok(())
}

fn count(raw: u32) -> Result<usize> {
    let n = raw as usize;
    if n > MAX_COUNT {
        return Err(PreviewError::decode(format!("3do: implausible count {n}")));
    }
    Ok(n)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct ObjSpec {
        pub name: &'static str,
        pub offset: [i32; 3],
        pub vertices: Vec<[i32; 3]>,
        pub prims: Vec<Vec<u16>>,
        pub child: Option<usize>,
        pub sibling: Option<usize>,
    }

    /// Lay out objects back to back; `child`/`sibling` refer to positions in `objs`.
    pub(crate) fn three_do_bytes(objs: &[ObjSpec]) -> Vec<u8> {
        fn body_len(o: &ObjSpec) -> usize {
            OBJECT_HEADER
                + o.name.len()
                + 1
                + 12 * o.vertices.len()
                + PRIMITIVE_LEN * o.prims.len()
                + o.prims.iter().map(|p| 2 * p.len()).sum::<usize>()
        }
        let mut starts = Vec::new();
        let mut total = 0;
        for o in objs {
            starts.push(total);
            total += body_len(o);
        }

        let mut out = Vec::with_capacity(total);
        for (i, o) in objs.iter().enumerate() {
            let base = starts[i];
            let name_at = base + OBJECT_HEADER;
            let vert_at = name_at + o.name.len() + 1;
            let prim_at = vert_at + 12 * o.vertices.len();
            let mut idx_at = prim_at + PRIMITIVE_LEN * o.prims.len();

            let w = |out: &mut Vec<u8>, v: u32| out.extend_from_slice(&v.to_le_bytes());
            w(&mut out, 1);
            w(&mut out, o.vertices.len() as u32);
            w(&mut out, o.prims.len() as u32);
            w(&mut out, u32::MAX);
            for c in o.offset {
                w(&mut out, c as u32);
            }
            w(&mut out, name_at as u32);
            w(&mut out, 0);
            w(&mut out, vert_at as u32);
            w(&mut out, prim_at as u32);
            w(&mut out, o.sibling.map_or(0, |s| starts[s] as u32));
            w(&mut out, o.child.map_or(0, |c| starts[c] as u32));
            out.extend_from_slice(o.name.as_bytes());
            out.push(0);
            for v in &o.vertices {
                for c in v {
                    w(&mut out, *c as u32);
                }
            }
            for p in &o.prims {
                w(&mut out, 0);
                w(&mut out, p.len() as u32);
                w(&mut out, 0);
                w(&mut out, idx_at as u32);
                w(&mut out, 0);
                w(&mut out, 0);
                w(&mut out, 0);
                w(&mut out, 0);
                idx_at += 2 * p.len();
            }
            for p in &o.prims {
                for ix in p {
                    out.extend_from_slice(&ix.to_le_bytes());
                }
            }
        }
        out
    }

    #[test]
    fn decodes_child_and_sibling_links() {
        let bytes = three_do_bytes(&[
            ObjSpec {
                name: "base",
                offset: [0, 65536, 0],
                vertices: vec![[0, 0, 0], [65536, 0, 0], [0, 0, 65536]],
                prims: vec![vec![0, 1, 2]],
                child: Some(1),
                sibling: None,
            },
            ObjSpec {
                name: "turret",
                offset: [0, 0, 0],
                vertices: vec![],
                prims: vec![],
                child: None,
                sibling: Some(2),
            },
            ObjSpec {
                name: "barrel",
                offset: [1, 2, 3],
                vertices: vec![],
                prims: vec![vec![0, 1]],
                child: None,
                sibling: None,
            },
        ]);
        let g = ThreeDoDecoder.decode(&bytes).unwrap();
        assert_eq!(g.nodes.len(), 3);
        let root = g.root().unwrap();
        assert_eq!(root.name, "base");
        assert_eq!(root.primitives[0].kind(), PrimitiveKind::Triangle);
        let turret = &g.nodes[root.child.unwrap()];
        assert_eq!(turret.name, "turret");
        let barrel = &g.nodes[turret.sibling.unwrap()];
        assert_eq!(barrel.offset, [1, 2, 3]);
        assert_eq!(barrel.primitives[0].kind(), PrimitiveKind::Line);
        assert_eq!(g.preorder().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn shared_index_lists_are_charged_per_use() {
        let mut prims = vec![vec![0u16; 10_000]];
        prims.extend((1..64).map(|_| vec![0u16]));
        let mut bytes = three_do_bytes(&[ObjSpec {
            name: "x",
            offset: [0; 3],
            vertices: vec![],
            prims,
            child: None,
            sibling: None,
        }]);
        assert_eq!(ThreeDoDecoder.decode(&bytes).unwrap().nodes[0].primitives.len(), 64);

        // point every primitive at the first one's 10k-index list
        let prim_at = OBJECT_HEADER + 2;
        let shared = bytes[prim_at + 12..prim_at + 16].to_vec();
        for i in 1..64 {
            let p = prim_at + PRIMITIVE_LEN * i;
            bytes[p + 4..p + 8].copy_from_slice(&10_000u32.to_le_bytes());
            bytes[p + 12..p + 16].copy_from_slice(&shared);
        }
        let err = ThreeDoDecoder.decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DecodeFailure);
    }

    #[test]
    fn rejects_self_link() {
        let bytes = three_do_bytes(&[ObjSpec {
            name: "loop",
            offset: [0; 3],
            vertices: vec![],
            prims: vec![],
            child: Some(0),
            sibling: None,
        }]);
        assert!(ThreeDoDecoder.decode(&bytes).is_err());
    }

    #[test]
    fn preorder_detects_cycles_in_handmade_graphs() {
        let g = SceneGraph {
            nodes: vec![
                SceneNode { child: Some(1), ..Default::default() },
                SceneNode { sibling: Some(0), ..Default::default() },
            ],
            root: 0,
        };
        assert!(g.preorder().is_err());
        let dangling = SceneGraph {
            nodes: vec![SceneNode { child: Some(9), ..Default::default() }],
            root: 0,
        };
        assert!(dangling.preorder().is_err());
    }
}
