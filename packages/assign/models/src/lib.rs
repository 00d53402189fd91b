#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row types produced by the cell assignment engine.
//!
//! Field names follow the CSV headers of the output tables, so these
//! types serialize/deserialize through the `csv` crate without any
//! column mapping layer.

use serde::{Deserialize, Serialize};

/// Sentinel radio type for a cell whose stations were folded together.
pub const AGGREGATED_TYPE: &str = "AGGREGATED";

/// One detailed row per (cell, base station) pair.
///
/// `distance` is the scan's chosen distance for the whole cell: 0 when
/// the stations were found inside the cell, otherwise the distance from
/// the cell center to the nearest-outside candidate, in kilometers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedRow {
    /// Provider identifier of the base station.
    pub bs_id: i64,
    /// Radio technology of the base station.
    #[serde(rename = "type")]
    pub radio: String,
    /// Signal range in meters.
    pub range: f64,
    /// Station creation timestamp, epoch seconds.
    pub created: i64,
    /// Station longitude.
    pub lng: f64,
    /// Station latitude.
    pub lat: f64,
    /// The owning grid cell.
    #[serde(rename = "cellId")]
    pub cell_id: i64,
    /// Chosen distance for the cell, kilometers.
    pub distance: f64,
}

/// Exactly one aggregated row per grid cell.
///
/// A cell with zero found stations keeps its row: `n_base_stations` is 0
/// and the position, distance, and identity fields are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    /// The single station's radio type when exactly one was found,
    /// otherwise [`AGGREGATED_TYPE`].
    #[serde(rename = "type")]
    pub radio: String,
    /// Mean longitude over all found stations.
    pub lng: Option<f64>,
    /// Mean latitude over all found stations.
    pub lat: Option<f64>,
    /// The owning grid cell.
    #[serde(rename = "cellId")]
    pub cell_id: i64,
    /// Chosen distance for the cell, kilometers.
    pub distance: Option<f64>,
    /// Number of stations folded into this row.
    pub n_base_stations: u32,
    /// Identity of the aggregated station at the mean position.
    pub aggregated_bs_id: Option<u32>,
}

/// One row per distinct aggregated station, in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSummaryRow {
    /// Identity of the aggregated station.
    pub aggregated_bs_id: u32,
    /// Radio type of the aggregated station.
    #[serde(rename = "type")]
    pub radio: String,
    /// Number of physical stations behind the identity.
    pub n_base_stations: u32,
    /// Mean longitude.
    pub lng: f64,
    /// Mean latitude.
    pub lat: f64,
}
