#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry utilities for the telegrid pipeline.
//!
//! Provides the typed grid/feature model ([`grid`]) plus the small set of
//! geometric operations the assignment engine needs: bounding-box
//! containment, multi-cell extent, centroid, and great-circle distance.
//!
//! Cell containment is deliberately a bounding-box test, not a true
//! point-in-polygon test: every cell is treated as its axis-aligned
//! bounding rectangle, boundaries inclusive. Callers relying on
//! [`point_in_cell`] must account for non-rectangular cells matching
//! points outside their true boundary.

pub mod grid;

use geo::{Coord, Rect};
use thiserror::Error;

pub use grid::{Geometry, GridCell, load_grid};

/// Errors that can occur during geometry operations and grid loading.
#[derive(Debug, Error)]
pub enum GeoError {
    /// A required input file does not exist.
    #[error("Input path does not exist: {path}")]
    MissingInput {
        /// The missing path.
        path: String,
    },

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GeoJSON parsing failed.
    #[error("GeoJSON error: {0}")]
    Geojson(#[from] geojson::Error),

    /// Longitude/latitude extraction was requested for a geometry type
    /// that does not carry a representative point.
    #[error("Unsupported geometry type: {geometry_type}")]
    UnsupportedGeometry {
        /// The offending GeoJSON geometry type.
        geometry_type: String,
    },

    /// The grid definition is malformed (missing properties, bad cell
    /// indices, non-polygon features).
    #[error("Invalid grid: {message}")]
    InvalidGrid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Earth radius in kilometers used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Tests whether a point falls inside a grid cell.
///
/// The cell's vertex ring defines an axis-aligned bounding box (min/max
/// longitude and latitude over all ring vertices); the point is inside
/// iff it falls within that box, boundaries inclusive.
#[must_use]
pub fn point_in_cell(cell: &GridCell, point: Coord) -> bool {
    let rect = cell.bounding_rect();
    point.x >= rect.min().x
        && point.x <= rect.max().x
        && point.y >= rect.min().y
        && point.y <= rect.max().y
}

/// Computes the overall extent of a set of grid cells.
///
/// Scans all ring vertices of all given cells and returns the min/max
/// longitude and latitude as a [`Rect`]. Returns `None` for an empty
/// input.
#[must_use]
pub fn bounding_box(cells: &[&GridCell]) -> Option<Rect> {
    let mut min = Coord {
        x: f64::INFINITY,
        y: f64::INFINITY,
    };
    let mut max = Coord {
        x: f64::NEG_INFINITY,
        y: f64::NEG_INFINITY,
    };
    let mut any = false;

    for cell in cells {
        for vertex in &cell.ring {
            min.x = min.x.min(vertex.x);
            min.y = min.y.min(vertex.y);
            max.x = max.x.max(vertex.x);
            max.y = max.y.max(vertex.y);
            any = true;
        }
    }

    any.then(|| Rect::new(min, max))
}

/// Selects a rectangular sub-block of a row-major square grid.
///
/// The grid is `side_len` cells wide; the block starts at `(row, col)`
/// (in units of `side_len` rows and single columns respectively, matching
/// the provider download's walk) and spans `span` rows and `span` columns.
///
/// # Errors
///
/// Returns [`GeoError::InvalidGrid`] if the block reaches past the end of
/// the cell list.
pub fn box_features<'a>(
    row: usize,
    col: usize,
    span: usize,
    side_len: usize,
    cells: &'a [GridCell],
) -> Result<Vec<&'a GridCell>, GeoError> {
    let mut block = Vec::with_capacity(span * span);
    for i in (row * side_len..(row + span) * side_len).step_by(side_len) {
        for j in col..col + span {
            let index = i + j;
            let cell = cells.get(index).ok_or_else(|| GeoError::InvalidGrid {
                message: format!(
                    "Cell index {index} out of bounds for grid of {} cells",
                    cells.len()
                ),
            })?;
            block.push(cell);
        }
    }
    Ok(block)
}

/// Computes the center of a grid cell as the arithmetic mean of all ring
/// vertices (not area-weighted; the closing vertex counts like any other).
#[must_use]
pub fn cell_center(cell: &GridCell) -> Coord {
    let n = cell.ring.len();
    if n == 0 {
        return Coord { x: 0.0, y: 0.0 };
    }
    let sum = cell
        .ring
        .iter()
        .fold(Coord { x: 0.0, y: 0.0 }, |acc, v| Coord {
            x: acc.x + v.x,
            y: acc.y + v.y,
        });
    #[allow(clippy::cast_precision_loss)]
    let count = n as f64;
    Coord {
        x: sum.x / count,
        y: sum.y / count,
    }
}

/// Great-circle distance in kilometers between two points given in
/// decimal degrees, coordinate order (longitude, latitude).
///
/// Standard haversine formula with Earth radius [`EARTH_RADIUS_KM`].
#[must_use]
pub fn haversine_km(a: Coord, b: Coord) -> f64 {
    let (lng1, lat1) = (a.x.to_radians(), a.y.to_radians());
    let (lng2, lat2) = (b.x.to_radians(), b.y.to_radians());

    let dlng = lng2 - lng1;
    let dlat = lat2 - lat1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    c * EARTH_RADIUS_KM
}
