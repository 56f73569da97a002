#![forbid(unsafe_code)]

//! Classification target positions.
//!
//! The tag bar is laid out by the host UI and reports where each target
//! ended up through a [`TagLayoutProvider`]. Measurements can lag behind the
//! gesture: the bar scrolls to reveal the selected tag, so a position
//! measured before classify mode was entered may point at the wrong place.
//!
//! [`resolve_tag_destination`] applies the staleness guard: a measurement is
//! trusted only if it was taken at or after classify entry. Otherwise the
//! point is estimated from [`TagBarGeometry`], the static layout the bar is
//! built from. Resolution never fails.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{Point, Rect};

/// A measured target position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagPosition {
    pub bounds: Rect,
    pub measured_at: Instant,
}

/// Supplies tag positions keyed by target index (0 = "create new").
pub trait TagLayoutProvider {
    fn position(&self, index: usize) -> Option<TagPosition>;
}

/// In-memory [`TagLayoutProvider`] updated by the host's layout pass.
#[derive(Debug, Clone, Default)]
pub struct TagLayout {
    positions: HashMap<usize, TagPosition>,
}

impl TagLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement for `index`.
    pub fn update(&mut self, index: usize, bounds: Rect, measured_at: Instant) {
        self.positions.insert(
            index,
            TagPosition {
                bounds,
                measured_at,
            },
        );
    }

    /// Forget every measurement (e.g. the target list changed).
    pub fn clear(&mut self) {
        self.positions.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl TagLayoutProvider for TagLayout {
    fn position(&self, index: usize) -> Option<TagPosition> {
        self.positions.get(&index).copied()
    }
}

/// Static layout of the tag bar: a horizontal row of equally sized chips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagBarGeometry {
    /// Left edge of the first chip.
    pub origin_x: f32,
    /// Vertical centre of the bar.
    pub center_y: f32,
    pub chip_width: f32,
    pub spacing: f32,
    /// Visible width; estimates are clamped into `[origin_x, origin_x + visible_width]`.
    pub visible_width: f32,
}

impl Default for TagBarGeometry {
    fn default() -> Self {
        Self {
            origin_x: 16.0,
            center_y: 1800.0,
            chip_width: 160.0,
            spacing: 12.0,
            visible_width: 1048.0,
        }
    }
}

impl TagBarGeometry {
    /// Estimated centre of chip `index`.
    #[must_use]
    pub fn estimate(&self, index: usize) -> Point {
        let step = self.chip_width + self.spacing;
        let x = self.origin_x + index as f32 * step + self.chip_width * 0.5;
        let max_x = self.origin_x + self.visible_width.max(0.0);
        Point::new(x.clamp(self.origin_x, max_x), self.center_y)
    }
}

/// Where a classify animation should aim, and how that was decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagDestination {
    pub point: Point,
    /// `true` when taken from a measurement at or after classify entry.
    pub measured: bool,
}

/// Returns the provider's measurement if it is fresh, `None` otherwise.
#[must_use]
pub fn fresh_position(
    provider: &dyn TagLayoutProvider,
    index: usize,
    entered_at: Instant,
) -> Option<TagPosition> {
    provider
        .position(index)
        .filter(|p| p.measured_at >= entered_at && !p.bounds.is_empty())
}

/// Destination for target `index`, falling back to the static estimate.
#[must_use]
pub fn resolve_tag_destination(
    provider: &dyn TagLayoutProvider,
    geometry: &TagBarGeometry,
    index: usize,
    entered_at: Instant,
) -> TagDestination {
    match fresh_position(provider, index, entered_at) {
        Some(pos) => TagDestination {
            point: pos.bounds.center(),
            measured: true,
        },
        None => {
            debug!(index, "tag position stale or missing; using layout estimate");
            TagDestination {
                point: geometry.estimate(index),
                measured: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_measurement_is_trusted() {
        let entry = Instant::now();
        let mut layout = TagLayout::new();
        layout.update(2, Rect::new(100.0, 10.0, 40.0, 20.0), entry);
        let d = resolve_tag_destination(&layout, &TagBarGeometry::default(), 2, entry);
        assert!(d.measured);
        assert_eq!(d.point, Point::new(120.0, 20.0));
    }

    #[test]
    fn measurement_before_entry_is_stale() {
        let before = Instant::now();
        let entry = before + Duration::from_millis(5);
        let mut layout = TagLayout::new();
        layout.update(1, Rect::new(0.0, 0.0, 10.0, 10.0), before);
        let geometry = TagBarGeometry::default();
        let d = resolve_tag_destination(&layout, &geometry, 1, entry);
        assert!(!d.measured);
        assert_eq!(d.point, geometry.estimate(1));
    }

    #[test]
    fn missing_index_uses_estimate() {
        let layout = TagLayout::new();
        let d = resolve_tag_destination(&layout, &TagBarGeometry::default(), 7, Instant::now());
        assert!(!d.measured);
    }

    #[test]
    fn estimate_is_clamped_to_visible_bar() {
        let g = TagBarGeometry::default();
        assert_eq!(g.estimate(0).x, 16.0 + 80.0);
        assert!(g.estimate(1000).x <= g.origin_x + g.visible_width);
        assert_eq!(g.estimate(3).y, g.center_y);
    }
}
