//! # Hit Regions and Mark State
//!
//! Layout emits a registry of interactive rectangles (one per issue
//! checkbox and one per photo thumbnail) keyed by ids derived from the
//! caller's record ids. The registry is a pure byproduct of layout;
//! toggling mutates only the caller-owned [`MarkState`], never the
//! document, so marks round-trip through regeneration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::layout::PAGE_WIDTH;

/// Extra padding, in document points, applied around checkbox rects
/// during hit testing. Checkboxes are small; fingers are not.
pub const CHECKBOX_HIT_TOLERANCE: f64 = 4.0;

/// An axis-aligned rectangle in document points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// The rect grown by `pad` on every side.
    pub fn padded(&self, pad: f64) -> Self {
        Self {
            x: self.x - pad,
            y: self.y - pad,
            width: self.width + pad * 2.0,
            height: self.height + pad * 2.0,
        }
    }
}

/// What kind of interactive region this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionKind {
    Checkbox,
    Photo,
}

/// The symbol a toggle applies. Checkbox regions accept only `Check`,
/// photo regions only `Cross`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkSymbol {
    #[serde(rename = "check")]
    Check,
    #[serde(rename = "x")]
    Cross,
}

/// A registered interactive rectangle in document coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRegion {
    /// Derived from content identity (`issue-<id>`, `issue-<id>-photo-<n>`),
    /// never regenerated per render.
    pub id: String,
    pub page: usize,
    pub rect: Rect,
    pub kind: RegionKind,
    /// For checkbox regions: the exact rects of the description text lines
    /// this checkbox governs, used to strike them through when checked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_rects: Vec<Rect>,
}

impl HitRegion {
    /// The symbol this region toggles.
    pub fn symbol(&self) -> MarkSymbol {
        match self.kind {
            RegionKind::Checkbox => MarkSymbol::Check,
            RegionKind::Photo => MarkSymbol::Cross,
        }
    }
}

/// Derive the checkbox region id for an issue.
pub fn checkbox_region_id(issue_id: u64) -> String {
    format!("issue-{issue_id}")
}

/// Derive the photo region id for a photo within an issue.
pub fn photo_region_id(issue_id: u64, photo_index: usize) -> String {
    format!("issue-{issue_id}-photo-{photo_index}")
}

/// Persisted mapping from hit-region id to the set of applied symbols.
/// BTree containers keep JSON serialization deterministic.
pub type MarkState = BTreeMap<String, BTreeSet<MarkSymbol>>;

/// All hit regions produced by one layout pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitRegionRegistry {
    regions: Vec<HitRegion>,
}

impl HitRegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a region. Ids are unique per document by construction
    /// (they derive from record ids); a duplicate indicates a layout bug.
    pub fn insert(&mut self, region: HitRegion) {
        debug_assert!(
            !self.regions.iter().any(|r| r.id == region.id),
            "duplicate hit region id {}",
            region.id
        );
        self.regions.push(region);
    }

    pub fn get(&self, id: &str) -> Option<&HitRegion> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HitRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Regions on a given page.
    pub fn on_page(&self, page: usize) -> impl Iterator<Item = &HitRegion> {
        self.regions.iter().filter(move |r| r.page == page)
    }

    /// Convert a screen-space point on a rendered page into document units
    /// and return the first region it hits, or `None`.
    ///
    /// The conversion uses the uniform ratio page-width / container-width
    /// for both axes (the preview preserves aspect). Checkbox regions are
    /// tested first with tolerance padding, then photo regions; first
    /// match wins.
    pub fn hit_test(
        &self,
        page: usize,
        screen_x: f64,
        screen_y: f64,
        container_width: f64,
    ) -> Option<&HitRegion> {
        if container_width <= 0.0 {
            return None;
        }
        let scale = PAGE_WIDTH / container_width;
        let x = screen_x * scale;
        let y = screen_y * scale;

        self.on_page(page)
            .filter(|r| r.kind == RegionKind::Checkbox)
            .find(|r| r.rect.padded(CHECKBOX_HIT_TOLERANCE).contains(x, y))
            .or_else(|| {
                self.on_page(page)
                    .filter(|r| r.kind == RegionKind::Photo)
                    .find(|r| r.rect.contains(x, y))
            })
    }

    /// Drop mark entries whose region id no longer exists, keeping the
    /// caller's state consistent with the current registry.
    pub fn retain_known(&self, marks: &mut MarkState) {
        marks.retain(|id, _| self.get(id).is_some());
    }
}

/// Idempotently toggle a region's symbol in the caller-owned mark state.
/// Returns `true` if the symbol is applied after the call.
pub fn toggle_mark(region: &HitRegion, marks: &mut MarkState) -> bool {
    let symbol = region.symbol();
    let set = marks.entry(region.id.clone()).or_default();
    let applied = if set.contains(&symbol) {
        set.remove(&symbol);
        false
    } else {
        set.insert(symbol);
        true
    };
    if set.is_empty() {
        marks.remove(&region.id);
    }
    applied
}

/// Is the region's symbol currently applied?
pub fn is_marked(region: &HitRegion, marks: &MarkState) -> bool {
    marks
        .get(&region.id)
        .map(|set| set.contains(&region.symbol()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkbox(id: &str, x: f64, y: f64) -> HitRegion {
        HitRegion {
            id: id.to_string(),
            page: 0,
            rect: Rect::new(x, y, 12.0, 12.0),
            kind: RegionKind::Checkbox,
            line_rects: vec![],
        }
    }

    fn photo(id: &str, x: f64, y: f64) -> HitRegion {
        HitRegion {
            id: id.to_string(),
            page: 0,
            rect: Rect::new(x, y, 120.0, 120.0),
            kind: RegionKind::Photo,
            line_rects: vec![],
        }
    }

    #[test]
    fn toggle_is_idempotent() {
        let region = checkbox("issue-3", 10.0, 10.0);
        let mut marks = MarkState::new();
        assert!(toggle_mark(&region, &mut marks));
        assert!(is_marked(&region, &marks));
        assert!(!toggle_mark(&region, &mut marks));
        assert!(!is_marked(&region, &marks));
        assert!(marks.is_empty(), "cleared entries are removed entirely");
    }

    #[test]
    fn checkbox_wins_over_overlapping_photo() {
        let mut registry = HitRegionRegistry::new();
        registry.insert(photo("issue-1-photo-0", 0.0, 0.0));
        registry.insert(checkbox("issue-1", 50.0, 50.0));

        // Container width equals page width, so screen == document units.
        let hit = registry.hit_test(0, 55.0, 55.0, PAGE_WIDTH).unwrap();
        assert_eq!(hit.id, "issue-1");
    }

    #[test]
    fn checkbox_tolerance_padding_applies() {
        let mut registry = HitRegionRegistry::new();
        registry.insert(checkbox("issue-1", 100.0, 100.0));

        // Just outside the 12pt box but inside the tolerance band.
        let hit = registry.hit_test(0, 100.0 - CHECKBOX_HIT_TOLERANCE + 0.5, 101.0, PAGE_WIDTH);
        assert!(hit.is_some());
        let miss = registry.hit_test(0, 100.0 - CHECKBOX_HIT_TOLERANCE - 1.0, 101.0, PAGE_WIDTH);
        assert!(miss.is_none());
    }

    #[test]
    fn hit_test_scales_screen_coordinates() {
        let mut registry = HitRegionRegistry::new();
        registry.insert(photo("issue-2-photo-0", 200.0, 300.0));

        // Container rendered at half the page width: screen coords are
        // half of document coords.
        let container = PAGE_WIDTH / 2.0;
        let hit = registry.hit_test(0, 130.0, 180.0, container).unwrap();
        assert_eq!(hit.id, "issue-2-photo-0");
    }

    #[test]
    fn coordinate_round_trip_is_lossless() {
        let container = 800.0;
        let scale = PAGE_WIDTH / container;
        let (sx, sy) = (123.456, 654.321);
        let (dx, dy) = (sx * scale, sy * scale);
        let (bx, by) = (dx / scale, dy / scale);
        assert!((bx - sx).abs() < 1e-9);
        assert!((by - sy).abs() < 1e-9);
    }

    #[test]
    fn retain_known_drops_orphans() {
        let mut registry = HitRegionRegistry::new();
        registry.insert(checkbox("issue-1", 0.0, 0.0));
        let mut marks = MarkState::new();
        marks.insert("issue-1".to_string(), BTreeSet::from([MarkSymbol::Check]));
        marks.insert("issue-99".to_string(), BTreeSet::from([MarkSymbol::Check]));
        registry.retain_known(&mut marks);
        assert!(marks.contains_key("issue-1"));
        assert!(!marks.contains_key("issue-99"));
    }

    #[test]
    fn mark_symbols_serialize_compactly() {
        let json = serde_json::to_string(&MarkSymbol::Cross).unwrap();
        assert_eq!(json, "\"x\"");
        let json = serde_json::to_string(&MarkSymbol::Check).unwrap();
        assert_eq!(json, "\"check\"");
    }
}
