#![forbid(unsafe_code)]

//! Genie mesh warp: a 2-D vertex grid that pulls a rectangle into a point.
//!
//! [`MeshWarpEngine::warp`] maps `(source, destination, progress, direction)`
//! to a `(rows + 1) × (cols + 1)` grid of vertices. It is a pure function:
//! identical inputs always give bit-identical output.
//!
//! # Phases
//!
//! Progress is split into two overlapping eased ramps plus a final squeeze:
//!
//! - **curvature** `c = ease(p / curve_ratio)`: rows bow toward the
//!   destination column, sink-side rows first, following a half-sine
//!   profile over the row index.
//! - **translation** `t = ease((p - curve_ratio·lag) / (1 - curve_ratio·lag))`:
//!   rows slide toward the destination row. Sink-side rows move slightly
//!   faster and are clamped at the destination, so they arrive first and
//!   then collapse sideways ("absorbed").
//! - **squeeze** (`p > final_phase`): every vertex is pulled toward the
//!   destination point; from `snap_threshold` on, every vertex *is* the
//!   destination.
//!
//! # Invariants
//!
//! 1. `progress == 0` reproduces `source` as an undistorted rectangle, with
//!    corners bit-exact.
//! 2. `progress >= snap_threshold` (and therefore `progress == 1`) puts every
//!    vertex exactly on `destination`.
//! 3. Each vertex coordinate moves toward the matching destination
//!    coordinate and never crosses it, so the distance from any vertex to
//!    `destination` is non-increasing in `progress`.
//! 4. Each row's narrowing keeps at least `1 - narrow_limit` of the source
//!    width until the row is absorbed or squeezed.
//!
//! # Failure Modes
//!
//! - `progress` outside `[0, 1]` is clamped; NaN is treated as 0.
//! - `rows == 0` or `cols == 0` is raised to 1.
//! - Non-finite source or destination coordinates collapse the grid onto the
//!   destination (or the origin when the destination itself is not finite).

use serde::{Deserialize, Serialize};

use crate::easing::{Easing, half_sine_ramp, lerp};
use crate::geometry::{Point, Rect};

/// Which edge of the source is sucked in first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuctionDirection {
    /// The top edge narrows first (delete: trash icon above the card).
    TowardTop,
    /// The bottom edge narrows first (classify: tag bar below the card).
    TowardBottom,
}

impl SuctionDirection {
    /// Sink proximity of a row given its top-to-bottom ratio: 0 at the edge
    /// farthest from the sink, 1 at the sink-adjacent edge.
    #[inline]
    fn sink_weight(self, row_ratio: f32) -> f32 {
        match self {
            Self::TowardBottom => row_ratio,
            Self::TowardTop => 1.0 - row_ratio,
        }
    }
}

/// Shape constants of the warp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpParams {
    /// Fraction of progress over which the curvature ramp completes.
    pub curve_ratio: f32,
    /// Translation starts at `curve_ratio * translate_lag`.
    pub translate_lag: f32,
    /// Progress after which the final squeeze begins.
    pub final_phase: f32,
    /// Progress at and above which every vertex equals the destination.
    pub snap_threshold: f32,
    /// Maximum fraction of the distance to the destination column a row
    /// edge may travel during curvature (0.96 keeps each side at least 2 %
    /// of the width away, i.e. the column offset is capped at ±48 %).
    ///
    /// The column is `destination.x` itself, not the card centre plus a
    /// clamped offset; this cap is the only bound on narrowing.
    pub narrow_limit: f32,
    /// Extra speed of the sink-adjacent row relative to the far row.
    pub row_speed_boost: f32,
    /// Distance (px) within which a row counts as arrived at the destination row.
    pub absorb_epsilon: f32,
    /// Curve applied to both ramps and the squeeze.
    pub easing: Easing,
}

impl Default for WarpParams {
    fn default() -> Self {
        Self {
            curve_ratio: 0.4,
            translate_lag: 0.5,
            final_phase: 0.8,
            snap_threshold: 0.995,
            narrow_limit: 0.96,
            row_speed_boost: 0.15,
            absorb_epsilon: 0.5,
            easing: Easing::Smootherstep,
        }
    }
}

impl WarpParams {
    /// Clamp every constant into the range where the phase arithmetic is
    /// well defined.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let snap_threshold = finite_or(self.snap_threshold, 0.995).clamp(0.5, 1.0);
        Self {
            curve_ratio: finite_or(self.curve_ratio, 0.4).clamp(0.01, 1.0),
            translate_lag: finite_or(self.translate_lag, 0.5).clamp(0.0, 0.99),
            final_phase: finite_or(self.final_phase, 0.8).clamp(0.0, snap_threshold - 0.001),
            snap_threshold,
            narrow_limit: finite_or(self.narrow_limit, 0.96).clamp(0.0, 1.0),
            row_speed_boost: finite_or(self.row_speed_boost, 0.15).max(0.0),
            absorb_epsilon: finite_or(self.absorb_epsilon, 0.5).max(0.0),
            easing: self.easing,
        }
    }
}

#[inline]
fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

/// The three eased ramps for one progress value.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramps {
    curve: f32,
    translate: f32,
    squeeze: f32,
}

impl Ramps {
    fn at(params: &WarpParams, progress: f32) -> Self {
        let ease = params.easing.as_fn();
        let lag = params.curve_ratio * params.translate_lag;
        let squeeze = if progress > params.final_phase {
            ease((progress - params.final_phase) / (params.snap_threshold - params.final_phase))
        } else {
            0.0
        };
        Self {
            curve: ease(progress / params.curve_ratio),
            translate: ease((progress - lag) / (1.0 - lag)),
            squeeze,
        }
    }
}

// ---------------------------------------------------------------------------
// MeshGrid
// ---------------------------------------------------------------------------

/// Row-major grid of `(rows + 1) × (cols + 1)` vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGrid {
    rows: usize,
    cols: usize,
    vertices: Vec<Point>,
}

impl MeshGrid {
    /// A grid of the given resolution with every vertex at the origin.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            vertices: vec![Point::ZERO; (rows + 1) * (cols + 1)],
        }
    }

    fn reshape(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.vertices.resize((rows + 1) * (cols + 1), Point::ZERO);
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Vertex at `(row, col)`, or `None` when out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Point> {
        if row > self.rows || col > self.cols {
            return None;
        }
        self.vertices.get(row * (self.cols + 1) + col).copied()
    }

    #[inline]
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Interleaved `[x0, y0, x1, y1, ...]` for mesh-drawing backends.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|p| [p.x, p.y]).collect()
    }

    /// Axis-aligned bounding box of all vertices.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        let mut min = Point::new(f32::INFINITY, f32::INFINITY);
        let mut max = Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }
        Rect::from_edges(min.x, min.y, max.x, max.y)
    }

    fn fill(&mut self, p: Point) {
        self.vertices.iter_mut().for_each(|v| *v = p);
    }
}

// ---------------------------------------------------------------------------
// MeshWarpEngine
// ---------------------------------------------------------------------------

/// Parameterized genie warp at a fixed grid resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshWarpEngine {
    params: WarpParams,
    rows: usize,
    cols: usize,
}

impl Default for MeshWarpEngine {
    fn default() -> Self {
        Self::new(12, 24)
    }
}

impl MeshWarpEngine {
    /// Engine with default constants. Zero resolutions are raised to 1.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            params: WarpParams::default(),
            rows: rows.max(1),
            cols: cols.max(1),
        }
    }

    /// Replace the shape constants (sanitized).
    #[must_use]
    pub fn with_params(mut self, params: WarpParams) -> Self {
        self.params = params.sanitized();
        self
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &WarpParams {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn resolution(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Compute the grid for one frame.
    #[must_use]
    pub fn warp(
        &self,
        source: Rect,
        destination: Point,
        progress: f32,
        direction: SuctionDirection,
    ) -> MeshGrid {
        let mut grid = MeshGrid::new(self.rows, self.cols);
        self.warp_into(&mut grid, source, destination, progress, direction);
        grid
    }

    /// Compute the grid for one frame into an existing buffer, reshaping it
    /// to this engine's resolution if needed.
    pub fn warp_into(
        &self,
        grid: &mut MeshGrid,
        source: Rect,
        destination: Point,
        progress: f32,
        direction: SuctionDirection,
    ) {
        grid.reshape(self.rows, self.cols);

        let finite = [
            source.x,
            source.y,
            source.width,
            source.height,
            destination.x,
            destination.y,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            let fallback = if destination.x.is_finite() && destination.y.is_finite() {
                destination
            } else {
                Point::ZERO
            };
            grid.fill(fallback);
            return;
        }

        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        if progress >= self.params.snap_threshold {
            grid.fill(destination);
            return;
        }

        let params = &self.params;
        let ramps = Ramps::at(params, progress);

        let (left, right) = (source.left(), source.right());
        let (top, bottom) = (source.top(), source.bottom());
        let (px, py) = (destination.x, destination.y);

        // Point of each source row nearest the destination column; absorbed
        // rows collapse onto it.
        let anchor = px.clamp(left.min(right), right.max(left));
        // Distance the farthest row has to travel.
        let max_travel = (py - top).abs().max((py - bottom).abs());

        let cols = self.cols;
        for r in 0..=self.rows {
            let row_ratio = r as f32 / self.rows as f32;
            let sink = direction.sink_weight(row_ratio);
            let y0 = lerp(top, bottom, row_ratio);

            // Curvature: pull the row edges toward the destination column.
            let narrow = ramps.curve * params.narrow_limit * half_sine_ramp(sink);
            let mut row_left = lerp(left, px, narrow);
            let mut row_right = lerp(right, px, narrow);
            let row_anchor = lerp(anchor, px, narrow);

            // Translation, clamped at the destination row.
            let remaining = (py - y0).abs();
            let reach = max_travel * (1.0 + params.row_speed_boost * sink);
            let travel = ramps.translate * reach;
            let arrived = travel > 0.0 && remaining - travel <= params.absorb_epsilon;
            let mut y = if arrived {
                py
            } else if remaining > 0.0 {
                lerp(y0, py, travel / remaining)
            } else {
                y0
            };

            // Absorbed rows collapse sideways in proportion to how far past
            // arrival their travel has gone.
            if arrived {
                let span = reach - remaining;
                if span > f32::EPSILON {
                    let absorb = ((travel - remaining) / span).clamp(0.0, 1.0);
                    row_left = lerp(row_left, row_anchor, absorb);
                    row_right = lerp(row_right, row_anchor, absorb);
                }
            }

            if ramps.squeeze > 0.0 {
                row_left = lerp(row_left, px, ramps.squeeze);
                row_right = lerp(row_right, px, ramps.squeeze);
                y = lerp(y, py, ramps.squeeze);
            }

            let base = r * (cols + 1);
            for c in 0..=cols {
                let col_ratio = c as f32 / cols as f32;
                grid.vertices[base + c] = Point::new(lerp(row_left, row_right, col_ratio), y);
            }
        }
    }
}

/// One-shot warp with default constants.
#[must_use]
pub fn warp(
    source: Rect,
    destination: Point,
    progress: f32,
    direction: SuctionDirection,
    rows: usize,
    cols: usize,
) -> MeshGrid {
    MeshWarpEngine::new(rows, cols).warp(source, destination, progress, direction)
}
