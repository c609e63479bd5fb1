#![forbid(unsafe_code)]

//! Map collaborator contracts and gesture → selection adapter.
//!
//! The renderer owns tiles and hit-testing; this module only consumes the
//! numeric `id` of each rendered feature.

use std::collections::BTreeSet;

use canopy_core::{Extent, StandId, StandSelectionStore};
use tracing::debug;

/// A position in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned screen rectangle with `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenBox {
    pub min: ScreenPoint,
    pub max: ScreenPoint,
}

impl ScreenBox {
    /// Normalised rectangle spanned by two arbitrary corners.
    #[must_use]
    pub fn from_corners(a: ScreenPoint, b: ScreenPoint) -> Self {
        Self {
            min: ScreenPoint::new(a.x.min(b.x), a.y.min(b.y)),
            max: ScreenPoint::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    #[must_use]
    pub fn contains(&self, p: ScreenPoint) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryTarget {
    Point(ScreenPoint),
    Box(ScreenBox),
}

/// A rendered vector feature. Features without a numeric id are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub id: Option<i64>,
    pub layer: String,
}

/// `queryRenderedFeatures(screenPoint | screenBbox, layerFilter)`.
pub trait FeatureQuery {
    fn query_rendered_features(&self, target: QueryTarget, layers: &[String])
    -> Vec<RenderedFeature>;
}

/// Viewport control used to recenter on a plan or project area.
pub trait MapViewport {
    fn fit_bounds(&mut self, extent: Extent);
}

/// Resolves clicks and drag rectangles into stand selection changes.
#[derive(Debug)]
pub struct MapSelectionAdapter<Q> {
    query: Q,
    layers: Vec<String>,
    selection: StandSelectionStore,
    drag_origin: Option<ScreenPoint>,
}

impl<Q: FeatureQuery> MapSelectionAdapter<Q> {
    #[must_use]
    pub fn new(query: Q, layers: Vec<String>, selection: StandSelectionStore) -> Self {
        Self {
            query,
            layers,
            selection,
            drag_origin: None,
        }
    }

    #[must_use]
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    #[must_use]
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Topmost stand under `point`, if any.
    #[must_use]
    pub fn stand_at(&self, point: ScreenPoint) -> Option<StandId> {
        self.query
            .query_rendered_features(QueryTarget::Point(point), &self.layers)
            .into_iter()
            .find_map(|f| f.id.map(StandId))
    }

    /// Every distinct stand rendered inside `bounds`, sorted.
    #[must_use]
    pub fn stands_in(&self, bounds: ScreenBox) -> Vec<StandId> {
        let ids: BTreeSet<StandId> = self
            .query
            .query_rendered_features(QueryTarget::Box(bounds), &self.layers)
            .into_iter()
            .filter_map(|f| f.id.map(StandId))
            .collect();
        ids.into_iter().collect()
    }

    /// Toggle the stand under `point`. Returns its new selected state, or
    /// `None` when the click hit no stand.
    pub fn click(&self, point: ScreenPoint) -> Option<bool> {
        let id = self.stand_at(point)?;
        Some(self.selection.toggle(id))
    }

    /// Start an additive rectangle selection anchored at `origin`.
    pub fn drag_start(&mut self, origin: ScreenPoint) {
        self.drag_origin = Some(origin);
        self.selection.begin_drag();
    }

    /// Re-evaluate the rectangle from the anchor to `current`.
    ///
    /// Returns the number of stands inside the rectangle.
    pub fn drag_move(&mut self, current: ScreenPoint) -> usize {
        let Some(origin) = self.drag_origin else {
            return 0;
        };
        let ids = self.stands_in(ScreenBox::from_corners(origin, current));
        let count = ids.len();
        self.selection.update_drag(ids);
        count
    }

    /// Finish the rectangle at `end`.
    pub fn drag_end(&mut self, end: ScreenPoint) -> usize {
        let count = self.drag_move(end);
        self.drag_origin = None;
        self.selection.end_drag();
        debug!(stands_in_box = count, "drag selection finished");
        count
    }

    pub fn drag_cancel(&mut self) {
        self.drag_origin = None;
        self.selection.cancel_drag();
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    /// The base layer is about to change: park the selection.
    pub fn base_layer_changing(&self) {
        self.selection.backup_and_clear();
    }

    /// The new base layer is in place: bring the selection back.
    pub fn base_layer_changed(&self) -> bool {
        self.selection.restore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticFeatures;
    use canopy_core::stand_ids;

    fn adapter() -> (MapSelectionAdapter<StaticFeatures>, StandSelectionStore) {
        let features = StaticFeatures::new("stands")
            .with_stand(1, ScreenPoint::new(10.0, 10.0))
            .with_stand(2, ScreenPoint::new(20.0, 10.0))
            .with_stand(3, ScreenPoint::new(50.0, 50.0))
            .with_unlabelled(ScreenPoint::new(15.0, 15.0));
        let selection = StandSelectionStore::default();
        let adapter = MapSelectionAdapter::new(features, vec!["stands".into()], selection.clone());
        (adapter, selection)
    }

    #[test]
    fn click_toggles_stand_under_cursor() {
        let (adapter, selection) = adapter();
        assert_eq!(adapter.click(ScreenPoint::new(10.0, 10.0)), Some(true));
        assert!(selection.is_selected(StandId(1)));
        assert_eq!(adapter.click(ScreenPoint::new(10.0, 10.0)), Some(false));
        assert!(selection.is_empty());
    }

    #[test]
    fn click_on_empty_map_is_ignored() {
        let (adapter, selection) = adapter();
        assert_eq!(adapter.click(ScreenPoint::new(99.0, 99.0)), None);
        assert_eq!(adapter.click(ScreenPoint::new(15.0, 15.0)), None);
        assert!(selection.is_empty());
    }

    #[test]
    fn drag_keeps_stands_outside_the_box() {
        let (mut adapter, selection) = adapter();
        selection.replace_selection(stand_ids(&[3]));

        adapter.drag_start(ScreenPoint::new(0.0, 0.0));
        assert_eq!(adapter.drag_move(ScreenPoint::new(25.0, 25.0)), 2);
        assert_eq!(selection.selected_ids(), stand_ids(&[1, 2, 3]));

        // Shrink the box so stand 2 leaves it; 3 was selected before the drag.
        assert_eq!(adapter.drag_end(ScreenPoint::new(12.0, 12.0)), 1);
        assert_eq!(selection.selected_ids(), stand_ids(&[1, 3]));
        assert!(!adapter.is_dragging());
    }

    #[test]
    fn reversed_corners_are_normalised() {
        let (adapter, _) = adapter();
        let ids = adapter.stands_in(ScreenBox::from_corners(
            ScreenPoint::new(25.0, 25.0),
            ScreenPoint::new(0.0, 0.0),
        ));
        assert_eq!(ids, stand_ids(&[1, 2]));
    }

    #[test]
    fn base_layer_switch_backs_up_and_restores() {
        let (adapter, selection) = adapter();
        selection.replace_selection(stand_ids(&[1, 2]));
        adapter.base_layer_changing();
        assert!(selection.is_empty());
        assert!(adapter.base_layer_changed());
        assert_eq!(selection.selected_ids(), stand_ids(&[1, 2]));
    }

    #[test]
    fn other_layers_are_filtered_out() {
        let features = StaticFeatures::new("roads").with_stand(1, ScreenPoint::new(1.0, 1.0));
        let adapter =
            MapSelectionAdapter::new(features, vec!["stands".into()], StandSelectionStore::default());
        assert_eq!(adapter.stand_at(ScreenPoint::new(1.0, 1.0)), None);
    }
}
