//! Position within a decoded sprite sheet, with wrap-around stepping across groups.

use crate::formats::sprite::{SpriteFrame, SpriteSheet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// `(group, frame)` cursor. Stepping past the last frame of a group moves to the first frame
/// of the following group; stepping back from the first frame moves to the last frame of the
/// preceding group. Both wrap around the sheet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpriteNavigator {
    counts: Vec<usize>,
    group: usize,
    frame: usize,
}

impl SpriteNavigator {
    pub fn new(frame_counts: Vec<usize>) -> Self {
        Self {
            counts: frame_counts,
            group: 0,
            frame: 0,
        }
    }

    pub fn for_sheet(sheet: &SpriteSheet) -> Self {
        Self::new(sheet.frame_counts())
    }

    /// Current `(group, frame)`; `None` for a sheet without groups.
    pub fn position(&self) -> Option<(usize, usize)> {
        if self.counts.is_empty() {
            None
        } else {
            Some((self.group, self.frame))
        }
    }

    /// True when the current group has a frame to show.
    pub fn has_content(&self) -> bool {
        self.counts.get(self.group).is_some_and(|&m| m > 0)
    }

    /// More than one reachable state, so navigation controls are worth showing.
    pub fn has_navigation(&self) -> bool {
        self.counts.len() > 1 || self.counts.iter().any(|&m| m > 1)
    }

    fn is_inert(&self) -> bool {
        self.counts.iter().all(|&m| m == 0)
    }

    pub fn next(&mut self) {
        if self.is_inert() {
            return;
        }
        self.frame += 1;
        if self.frame >= self.counts[self.group] {
            self.group = (self.group + 1) % self.counts.len();
            self.frame = 0;
        }
    }

    pub fn previous(&mut self) {
        if self.is_inert() {
            return;
        }
        if self.frame == 0 {
            let n = self.counts.len();
            self.group = (self.group + n - 1) % n;
            self.frame = self.counts[self.group].saturating_sub(1);
        } else {
            self.frame -= 1;
        }
    }

    pub fn step(&mut self, dir: Direction) {
        match dir {
            Direction::Next => self.next(),
            Direction::Previous => self.previous(),
        }
    }

    pub fn current_frame<'a>(&self, sheet: &'a SpriteSheet) -> Option<&'a SpriteFrame> {
        sheet.groups.get(self.group)?.frames.get(self.frame)
    }

    /// Info bar text for the current position, `label` naming the sheet format.
    pub fn info(&self, sheet: &SpriteSheet, label: &str) -> String {
        let Some(group) = sheet.groups.get(self.group) else {
            return format!("{label}: No entries found");
        };
        let Some(frame) = group.frames.get(self.frame) else {
            return format!("{label}: {}\nNo frames found", group.name);
        };
        format!(
            "{label}: {}\nEntry {}/{}, Frame {}/{}\nSize: {}x{}, Offset: ({}, {}), Compressed: {}",
            group.name,
            self.group + 1,
            sheet.groups.len(),
            self.frame + 1,
            group.frames.len(),
            frame.image.width(),
            frame.image.height(),
            frame.x_offset,
            frame.y_offset,
            if frame.compressed { "True" } else { "False" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::sprite::SpriteGroup;
    use image::RgbaImage;

    #[test]
    fn next_walks_every_frame_then_wraps() {
        let mut nav = SpriteNavigator::new(vec![2, 1, 3]);
        let mut seen = vec![nav.position().unwrap()];
        for _ in 0..6 {
            nav.next();
            seen.push(nav.position().unwrap());
        }
        assert_eq!(
            seen,
            vec![(0, 0), (0, 1), (1, 0), (2, 0), (2, 1), (2, 2), (0, 0)]
        );
        nav.next();
        assert_eq!(nav.position(), Some((0, 1)));
    }

    #[test]
    fn previous_from_start_lands_on_last_frame_of_last_group() {
        let mut nav = SpriteNavigator::new(vec![2, 1, 3]);
        nav.previous();
        assert_eq!(nav.position(), Some((2, 2)));
        nav.previous();
        nav.previous();
        nav.previous();
        assert_eq!(nav.position(), Some((1, 0)));
    }

    #[test]
    fn next_and_previous_are_inverse() {
        let mut nav = SpriteNavigator::new(vec![3, 1, 4, 2]);
        for _ in 0..17 {
            let before = nav.position();
            nav.next();
            nav.previous();
            assert_eq!(nav.position(), before);
            nav.next();
        }
    }

    #[test]
    fn empty_sheets_are_inert() {
        let mut none = SpriteNavigator::new(vec![]);
        none.next();
        none.previous();
        assert_eq!(none.position(), None);
        assert!(!none.has_content());
        assert!(!none.has_navigation());

        let mut zeros = SpriteNavigator::new(vec![0, 0]);
        zeros.next();
        assert_eq!(zeros.position(), Some((0, 0)));
        assert!(!zeros.has_content());
    }

    #[test]
    fn empty_group_is_a_reachable_no_content_state() {
        let mut nav = SpriteNavigator::new(vec![1, 0, 1]);
        nav.next();
        assert_eq!(nav.position(), Some((1, 0)));
        assert!(!nav.has_content());
        nav.next();
        assert_eq!(nav.position(), Some((2, 0)));
        nav.previous();
        nav.previous();
        assert_eq!(nav.position(), Some((0, 0)));
    }

    #[test]
    fn navigation_shown_only_with_more_than_one_state() {
        assert!(!SpriteNavigator::new(vec![1]).has_navigation());
        assert!(SpriteNavigator::new(vec![2]).has_navigation());
        assert!(SpriteNavigator::new(vec![1, 1]).has_navigation());
    }

    #[test]
    fn info_line_counts_from_one() {
        let frame = SpriteFrame {
            image: RgbaImage::new(4, 3),
            x_offset: -1,
            y_offset: 2,
            compressed: true,
            pixel_format: None,
        };
        let sheet = SpriteSheet {
            groups: vec![
                SpriteGroup { name: "armflash".into(), frames: vec![frame.clone(), frame] },
                SpriteGroup { name: "empty".into(), frames: vec![] },
            ],
        };
        let mut nav = SpriteNavigator::for_sheet(&sheet);
        nav.next();
        assert_eq!(
            nav.info(&sheet, "GAF"),
            "GAF: armflash\nEntry 1/2, Frame 2/2\nSize: 4x3, Offset: (-1, 2), Compressed: True"
        );
        nav.next();
        assert_eq!(nav.info(&sheet, "GAF"), "GAF: empty\nNo frames found");
        assert!(nav.current_frame(&sheet).is_none());
    }
}
