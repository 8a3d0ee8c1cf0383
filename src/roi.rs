use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::geometry::BBoxPx;

/// Named regions of interest in image-local pixel coordinates, kept in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoiMap(IndexMap<String, BBoxPx>);

impl RoiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bbox: BBoxPx) {
        self.0.insert(name.into(), bbox);
    }

    pub fn get(&self, name: &str) -> Option<&BBoxPx> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BBoxPx)> {
        self.0.iter()
    }

    /// Re-expresses every entry relative to `origin`, the top-left corner of
    /// a crop.
    pub fn rebase(&self, origin: (i32, i32)) -> Self {
        self.offset(-origin.0, -origin.1)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self(
            self.0
                .iter()
                .map(|(name, bbox)| (name.clone(), bbox.offset(dx, dy)))
                .collect(),
        )
    }

    pub fn to_yolo(&self, image_width: u32, image_height: u32) -> IndexMap<String, [f64; 4]> {
        self.0
            .iter()
            .map(|(name, bbox)| (name.clone(), bbox.to_yolo(image_width, image_height)))
            .collect()
    }
}

impl FromIterator<(String, BBoxPx)> for RoiMap {
    fn from_iter<T: IntoIterator<Item = (String, BBoxPx)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebase_then_offset_round_trips() {
        let mut roi = RoiMap::new();
        roi.insert("a", BBoxPx::new(50, 50, 10, 10));

        let rebased = roi.rebase((50, 50));
        assert_eq!(rebased.get("a"), Some(&BBoxPx::new(0, 0, 10, 10)));
        assert_eq!(rebased.offset(50, 50), roi);
    }

    #[test]
    fn rebase_applies_to_every_entry() {
        let mut roi = RoiMap::new();
        roi.insert("note", BBoxPx::new(12, 8, 30, 14));
        roi.insert("layouts", BBoxPx::new(20, 30, 400, 500));
        let rebased = roi.rebase((10, 5));
        assert_eq!(rebased.get("note"), Some(&BBoxPx::new(2, 3, 30, 14)));
        assert_eq!(rebased.get("layouts"), Some(&BBoxPx::new(10, 25, 400, 500)));
    }

    #[test]
    fn serializes_in_insertion_order() {
        let mut roi = RoiMap::new();
        roi.insert("note", BBoxPx::new(0, 0, 5, 5));
        roi.insert("layouts", BBoxPx::new(1, 2, 3, 4));
        let json = serde_json::to_string(&roi).expect("serialize");
        assert_eq!(json, r#"{"note":[0,0,5,5],"layouts":[1,2,3,4]}"#);
        let parsed: RoiMap = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, roi);
    }

    #[test]
    fn yolo_entries_follow_the_map() {
        let mut roi = RoiMap::new();
        roi.insert("a", BBoxPx::new(0, 0, 50, 100));
        let yolo = roi.to_yolo(100, 200);
        assert_eq!(yolo.get("a"), Some(&[0.25, 0.25, 0.5, 0.5]));
    }
}
