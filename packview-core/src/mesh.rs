//! Flattening of a fixed-point scene graph into renderable triangle meshes.

use crate::error::{PreviewError, Result};
use crate::formats::scene::{NodeId, PrimitiveKind, SceneGraph, SceneNode};

/// Scale of the 16.16 fixed-point coordinates.
pub const FIXED_POINT_SCALE: f64 = 65536.0;

pub type Vec3 = [f64; 3];

/// Triangle mesh of one scene node, in absolute coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct SubMesh {
    pub name: String,
    /// Absolute position of the node the mesh came from.
    pub origin: Vec3,
    pub positions: Vec<Vec3>,
    /// Unit length, or zero for vertices no triangle touches.
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshGroup {
    pub meshes: Vec<SubMesh>,
}

impl MeshGroup {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles.len()).sum()
    }
}

/// Totals shown next to a model preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelStats {
    pub root_name: String,
    pub objects: usize,
    pub vertices: usize,
    pub primitives: usize,
}

impl ModelStats {
    pub fn of(graph: &SceneGraph) -> Result<Self> {
        let order = graph.preorder()?;
        let nodes = order.iter().map(|&id| &graph.nodes[id]);
        Ok(Self {
            root_name: graph.root().map(|n| n.name.clone()).unwrap_or_default(),
            objects: order.len(),
            vertices: nodes.clone().map(|n| n.vertices.len()).sum(),
            primitives: nodes.map(|n| n.primitives.len()).sum(),
        })
    }

    pub fn info(&self) -> String {
        format!(
            "3DO Model: {}\nObjects: {}\nTotal Vertices: {}\nTotal Primitives: {}",
            self.root_name, self.objects, self.vertices, self.primitives
        )
    }
}

pub struct MeshBuilder;

impl MeshBuilder {
    /// Walk the graph depth first. A child is placed relative to its parent node, a sibling
    /// relative to the parent they share. Nodes lacking vertices or primitives, or whose
    /// primitives yield no triangle, contribute nothing.
    pub fn build(graph: &SceneGraph) -> Result<MeshGroup> {
        let mut seen = vec![false; graph.nodes.len()];
        let mut out = MeshGroup::default();
        let mut stack: Vec<(NodeId, Vec3)> = vec![(graph.root, [0.0; 3])];

        while let Some((id, parent)) = stack.pop() {
            let node = graph
                .nodes
                .get(id)
                .ok_or_else(|| PreviewError::decode(format!("scene: dangling node id {id}")))?;
            if std::mem::replace(&mut seen[id], true) {
                return Err(PreviewError::decode(format!("scene: node {id} reached twice")));
            }

            let pos = add(parent, fixed(node.offset));
            if !node.vertices.is_empty() && !node.primitives.is_empty() {
                if let Some(mesh) = node_mesh(node, pos) {
                    out.meshes.push(mesh);
                }
            }

            if let Some(s) = node.sibling {
                stack.push((s, parent));
            }
            if let Some(c) = node.child {
                stack.push((c, pos));
            }
        }
        Ok(out)
    }
}

fn node_mesh(node: &SceneNode, origin: Vec3) -> Option<SubMesh> {
    let positions: Vec<Vec3> = node.vertices.iter().map(|v| add(origin, fixed(*v))).collect();
    let in_range = |ix: &[u16]| ix.iter().all(|&i| (i as usize) < positions.len());

    let mut triangles = Vec::new();
    for prim in &node.primitives {
        let ix = &prim.indices;
        if !in_range(ix) {
            continue;
        }
        let t = |a: usize, b: usize, c: usize| [ix[a] as u32, ix[b] as u32, ix[c] as u32];
        match prim.kind() {
            PrimitiveKind::Triangle => triangles.push(t(0, 1, 2)),
            PrimitiveKind::Quad => {
                triangles.push(t(0, 1, 2));
                triangles.push(t(0, 2, 3));
            }
            PrimitiveKind::Point | PrimitiveKind::Line | PrimitiveKind::Polygon => {}
        }
    }
    if triangles.is_empty() {
        return None;
    }

    let normals = vertex_normals(&positions, &triangles);
    Some(SubMesh {
        name: node.name.clone(),
        origin,
        positions,
        normals,
        triangles,
    })
}

/// Area-weighted vertex normals: each face's unnormalized cross product is summed into its
/// three corners, then every sum is normalized. Zero sums stay zero.
pub fn vertex_normals(positions: &[Vec3], triangles: &[[u32; 3]]) -> Vec<Vec3> {
    let mut acc = vec![[0.0f64; 3]; positions.len()];
    for tri in triangles {
        let [i0, i1, i2] = tri.map(|i| i as usize);
        let (p0, p1, p2) = (positions[i0], positions[i1], positions[i2]);
        let n = cross(sub(p1, p0), sub(p2, p0));
        for i in [i0, i1, i2] {
            acc[i] = add(acc[i], n);
        }
    }
    acc.into_iter().map(normalize).collect()
}

fn fixed(v: [i32; 3]) -> Vec3 {
    v.map(|c| c as f64 / FIXED_POINT_SCALE)
}

fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: Vec3) -> Vec3 {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len == 0.0 || !len.is_finite() {
        return [0.0; 3];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}
