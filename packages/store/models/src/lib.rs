#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Base station record types shared between the spatial store and the
//! cell assignment engine.

use serde::{Deserialize, Serialize};

/// A cellular base station as stored in the spatial store.
///
/// Sourced from the provider's GeoJSON feed; never mutated after load.
/// The radio type is a small open set of strings (`"LTE"`, `"UMTS"`,
/// `"GSM"`, ...), kept as-is rather than enumerated so new provider
/// values pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseStationRecord {
    /// Provider identifier for the station.
    pub station_id: i64,
    /// Radio technology (e.g. `"LTE"`).
    pub radio: String,
    /// Signal range in meters, as reported by the provider.
    pub range_m: f64,
    /// Creation timestamp, epoch seconds.
    pub created: i64,
    /// Last-update timestamp, epoch seconds.
    pub updated: i64,
    /// Longitude (WGS84).
    pub lng: f64,
    /// Latitude (WGS84).
    pub lat: f64,
}

impl BaseStationRecord {
    /// The station's position as a (lng, lat) pair.
    #[must_use]
    pub const fn position(&self) -> (f64, f64) {
        (self.lng, self.lat)
    }
}
