#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial store for base station proximity queries.
//!
//! Loads base station point features from GeoJSON into named collections,
//! builds an R-tree index per collection, and answers
//! center-plus-radius queries in ascending distance order. The
//! nearest-first ordering is part of the [`SpatialStore`] contract; the
//! assignment engine's scan depends on it.

pub mod download;

use std::collections::BTreeMap;
use std::path::Path;

use geo::Coord;
use rstar::{AABB, RTree, RTreeObject};
use telegrid_geo::{GeoError, Geometry, haversine_km};
use telegrid_store_models::BaseStationRecord;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required input file does not exist.
    #[error("Input path does not exist: {path}")]
    MissingInput {
        /// The missing path.
        path: String,
    },

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GeoJSON parsing failed.
    #[error("GeoJSON error: {0}")]
    Geojson(#[from] geojson::Error),

    /// JSON handling failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Geometry conversion failed.
    #[error("Geometry error: {0}")]
    Geo(#[from] GeoError),

    /// HTTP request to the base station provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an application-level error.
    #[error("Provider error for {url}: {message}")]
    Provider {
        /// The request URL.
        url: String,
        /// The provider's error message or HTTP status.
        message: String,
    },

    /// A query named a collection that was never loaded.
    #[error("Unknown collection: {name}")]
    UnknownCollection {
        /// The collection name.
        name: String,
    },
}

/// Meters per degree of latitude, used to size query envelopes.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Proximity query contract consumed by the assignment engine.
///
/// Implementations must return candidates ordered by increasing distance
/// from `center` and must not include candidates farther than
/// `max_distance_m` meters.
pub trait SpatialStore {
    /// Returns all base stations of the allowed radio types within
    /// `max_distance_m` meters of `center`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the collection is unknown or the
    /// underlying query fails.
    fn query(
        &self,
        collection: &str,
        center: Coord,
        max_distance_m: f64,
        radio_types: &[String],
    ) -> Result<Vec<BaseStationRecord>, StoreError>;
}

/// A base station point stored in the R-tree.
struct StationEntry {
    position: [f64; 2],
    record: BaseStationRecord,
}

impl RTreeObject for StationEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Named collections of R-tree-indexed base stations.
///
/// Constructed once per run; collections are immutable after load.
pub struct GeoStore {
    collections: BTreeMap<String, RTree<StationEntry>>,
}

impl Default for GeoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: BTreeMap::new(),
        }
    }

    /// Loads a GeoJSON FeatureCollection of base station points into the
    /// named collection, replacing any previous contents.
    ///
    /// Features with unsupported geometry or missing properties are
    /// logged and skipped; the rest of the collection still loads.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingInput`] if the path does not exist,
    /// or a parse error if the file is not valid GeoJSON.
    pub fn load_collection(&mut self, name: &str, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            return Err(StoreError::MissingInput {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let geojson: geojson::GeoJson = content.parse()?;

        let geojson::GeoJson::FeatureCollection(collection) = geojson else {
            return Err(StoreError::Provider {
                url: path.display().to_string(),
                message: "Base station file is not a FeatureCollection".to_string(),
            });
        };

        let mut records = Vec::with_capacity(collection.features.len());
        for feature in &collection.features {
            match feature_record(feature) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping base station feature: {e}"),
            }
        }

        let count = records.len();
        self.insert_collection(name, records);
        log::info!(
            "Loaded {count} base stations into collection '{name}' from {}",
            path.display()
        );
        Ok(count)
    }

    /// Replaces the named collection with the given records.
    pub fn insert_collection(&mut self, name: &str, records: Vec<BaseStationRecord>) {
        let entries = records
            .into_iter()
            .map(|record| StationEntry {
                position: [record.lng, record.lat],
                record,
            })
            .collect();
        self.collections
            .insert(name.to_string(), RTree::bulk_load(entries));
    }

    /// Number of stations in the named collection, if loaded.
    #[must_use]
    pub fn collection_size(&self, name: &str) -> Option<usize> {
        self.collections.get(name).map(RTree::size)
    }
}

impl SpatialStore for GeoStore {
    fn query(
        &self,
        collection: &str,
        center: Coord,
        max_distance_m: f64,
        radio_types: &[String],
    ) -> Result<Vec<BaseStationRecord>, StoreError> {
        let tree = self
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection {
                name: collection.to_string(),
            })?;

        // Envelope prefilter in degrees, then exact haversine refinement.
        let lat_span = max_distance_m / METERS_PER_DEGREE;
        let lng_span = max_distance_m / (METERS_PER_DEGREE * center.y.to_radians().cos().max(1e-9));
        let envelope = AABB::from_corners(
            [center.x - lng_span, center.y - lat_span],
            [center.x + lng_span, center.y + lat_span],
        );

        let mut matches: Vec<(f64, &BaseStationRecord)> = tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| radio_types.iter().any(|t| *t == entry.record.radio))
            .filter_map(|entry| {
                let distance_m = haversine_km(
                    center,
                    Coord {
                        x: entry.position[0],
                        y: entry.position[1],
                    },
                ) * 1000.0;
                (distance_m <= max_distance_m).then_some((distance_m, &entry.record))
            })
            .collect();

        matches.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(matches.into_iter().map(|(_, r)| r.clone()).collect())
    }
}

/// Converts a GeoJSON base station feature into a [`BaseStationRecord`].
///
/// Expects a Point or MultiPoint geometry and `cell`, `radio`, `range`,
/// `created`, `updated` properties (provider schema).
fn feature_record(feature: &geojson::Feature) -> Result<BaseStationRecord, StoreError> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| GeoError::UnsupportedGeometry {
            geometry_type: "missing".to_string(),
        })?;
    let (lng, lat) = Geometry::try_from(geometry)?.lng_lat()?;

    let props = feature
        .properties
        .as_ref()
        .ok_or_else(|| missing_property("properties"))?;

    let station_id = props
        .get("cell")
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| missing_property("cell"))?;
    let radio = props
        .get("radio")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| missing_property("radio"))?
        .to_string();
    let range_m = props
        .get("range")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| missing_property("range"))?;
    let created = props
        .get("created")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    let updated = props
        .get("updated")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(created);

    Ok(BaseStationRecord {
        station_id,
        radio,
        range_m,
        created,
        updated,
        lng,
        lat,
    })
}

fn missing_property(name: &str) -> StoreError {
    StoreError::Provider {
        url: String::new(),
        message: format!("Base station feature without '{name}' property"),
    }
}
