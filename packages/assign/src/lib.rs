#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cell assignment engine.
//!
//! For every grid cell, queries the spatial store around the cell
//! center, scans the nearest-first candidate stream
//! ([`scan::scan_candidates`]), widens the search radius when nothing is
//! found, and folds the accepted stations into one aggregated virtual
//! station per cell with a stable identity ([`identity::IdentityMap`]).
//!
//! Store or transport failures are never retried here; only
//! semantically-empty results widen the radius. The engine is
//! sequential by design: identity values depend on cell visit order.

pub mod identity;
pub mod scan;

use geo::Coord;
use telegrid_assign_models::{AGGREGATED_TYPE, AggregatedRow, DetailedRow, StationSummaryRow};
use telegrid_geo::{GridCell, cell_center};
use telegrid_store::{SpatialStore, StoreError};
use thiserror::Error;

pub use identity::IdentityMap;
pub use scan::{POST_FIND_LIMIT, ScanOutcome, scan_candidates};

/// Errors that can occur during cell assignment.
#[derive(Debug, Error)]
pub enum AssignError {
    /// The spatial store query failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Default initial search radius in meters.
pub const DEFAULT_MAX_DISTANCE_M: f64 = 500.0;

/// Default number of widened retries after an empty scan.
pub const DEFAULT_MAX_RETRY: u32 = 4;

/// Parameters for one assignment run.
#[derive(Debug, Clone)]
pub struct AssignOptions<'a> {
    /// Store collection to query.
    pub collection: &'a str,
    /// Initial search radius in meters.
    pub max_distance_m: f64,
    /// Allowed radio types.
    pub radio_types: &'a [String],
    /// Maximum widened retries after an empty scan.
    pub max_retry: u32,
}

/// The two row shapes produced for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellAssignment {
    /// One row per accepted station.
    pub detailed: Vec<DetailedRow>,
    /// Exactly one row for the cell.
    pub aggregated: AggregatedRow,
}

/// The full output of an assignment run over a grid.
#[derive(Debug)]
pub struct GridAssignment {
    /// Detailed rows for all cells, in cell order.
    pub detailed: Vec<DetailedRow>,
    /// One aggregated row per cell, in cell order.
    pub aggregated: Vec<AggregatedRow>,
    /// The identity map the run accumulated.
    pub identities: IdentityMap,
}

/// Assigns base stations to a single cell.
///
/// Queries at `max_distance_m`, scans, and while the scan comes back
/// empty re-queries at `max_distance_m * 2 * trial` for trial = 1, 2,
/// ... up to `max_retry` widened attempts, stopping at the first
/// non-empty scan.
///
/// Every cell yields exactly one aggregated row. A cell with no
/// stations after all retries yields a zero-count row with empty
/// position, distance, and identity fields; no identity is assigned
/// since there is no mean position.
///
/// # Errors
///
/// Returns [`AssignError::Store`] if any store query fails; query
/// failures are not retried.
pub fn assign_cell(
    cell: &GridCell,
    store: &dyn SpatialStore,
    options: &AssignOptions<'_>,
    identities: &mut IdentityMap,
) -> Result<CellAssignment, AssignError> {
    let center = cell_center(cell);

    let mut outcome = query_and_scan(cell, center, store, options, options.max_distance_m)?;

    let mut trial: u32 = 1;
    while outcome.candidates.is_empty() && trial <= options.max_retry {
        let widened = options.max_distance_m * f64::from(2 * trial);
        log::debug!(
            "Cell {}: empty scan, widening search radius to {widened}m (trial {trial}/{})",
            cell.cell_id,
            options.max_retry
        );
        outcome = query_and_scan(cell, center, store, options, widened)?;
        trial += 1;
    }

    let n = outcome.candidates.len();

    let detailed: Vec<DetailedRow> = outcome
        .candidates
        .iter()
        .map(|bs| DetailedRow {
            bs_id: bs.station_id,
            radio: bs.radio.clone(),
            range: bs.range_m,
            created: bs.created,
            lng: bs.lng,
            lat: bs.lat,
            cell_id: cell.cell_id,
            distance: outcome.distance_km,
        })
        .collect();

    let aggregated = if n == 0 {
        AggregatedRow {
            radio: AGGREGATED_TYPE.to_string(),
            lng: None,
            lat: None,
            cell_id: cell.cell_id,
            distance: None,
            n_base_stations: 0,
            aggregated_bs_id: None,
        }
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = n as f64;
        let avg_lng = outcome.candidates.iter().map(|bs| bs.lng).sum::<f64>() / count;
        let avg_lat = outcome.candidates.iter().map(|bs| bs.lat).sum::<f64>() / count;

        let radio = if n == 1 {
            outcome.candidates[0].radio.clone()
        } else {
            AGGREGATED_TYPE.to_string()
        };

        #[allow(clippy::cast_possible_truncation)]
        let n_stations = n as u32;

        AggregatedRow {
            radio,
            lng: Some(avg_lng),
            lat: Some(avg_lat),
            cell_id: cell.cell_id,
            distance: Some(outcome.distance_km),
            n_base_stations: n_stations,
            aggregated_bs_id: Some(identities.id_for(avg_lng, avg_lat)),
        }
    };

    Ok(CellAssignment {
        detailed,
        aggregated,
    })
}

fn query_and_scan(
    cell: &GridCell,
    center: Coord,
    store: &dyn SpatialStore,
    options: &AssignOptions<'_>,
    max_distance_m: f64,
) -> Result<ScanOutcome, AssignError> {
    let candidates = store.query(
        options.collection,
        center,
        max_distance_m,
        options.radio_types,
    )?;
    Ok(scan_candidates(cell, center, candidates))
}

/// Runs the assignment over a whole grid, sequentially, in grid order.
///
/// `on_cell(done, total)` is invoked after each cell for progress
/// reporting.
///
/// # Errors
///
/// Returns the first store failure; cells processed before it are
/// discarded (no partial output).
pub fn assign_grid(
    cells: &[GridCell],
    store: &dyn SpatialStore,
    options: &AssignOptions<'_>,
    mut on_cell: impl FnMut(usize, usize),
) -> Result<GridAssignment, AssignError> {
    let mut identities = IdentityMap::new();
    let mut detailed = Vec::new();
    let mut aggregated = Vec::with_capacity(cells.len());

    for (i, cell) in cells.iter().enumerate() {
        let assignment = assign_cell(cell, store, options, &mut identities)?;
        detailed.extend(assignment.detailed);
        aggregated.push(assignment.aggregated);
        on_cell(i + 1, cells.len());
    }

    log::info!(
        "Assigned {} base station rows across {} cells ({} aggregated identities)",
        detailed.len(),
        cells.len(),
        identities.len()
    );

    Ok(GridAssignment {
        detailed,
        aggregated,
        identities,
    })
}

/// Collapses aggregated rows into one row per distinct aggregated
/// station, in first-seen order. Zero-count rows carry no identity and
/// are skipped.
#[must_use]
pub fn station_summary(aggregated: &[AggregatedRow]) -> Vec<StationSummaryRow> {
    let mut seen = std::collections::HashSet::new();
    let mut summary = Vec::new();

    for row in aggregated {
        let (Some(id), Some(lng), Some(lat)) = (row.aggregated_bs_id, row.lng, row.lat) else {
            continue;
        };
        if seen.insert(id) {
            summary.push(StationSummaryRow {
                aggregated_bs_id: id,
                radio: row.radio.clone(),
                n_base_stations: row.n_base_stations,
                lng,
                lat,
            });
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use telegrid_store_models::BaseStationRecord;

    use super::*;

    /// A scripted store that records every query radius.
    struct MockStore {
        /// Results returned for successive queries; the last entry
        /// repeats once exhausted.
        responses: Vec<Vec<BaseStationRecord>>,
        radii: RefCell<Vec<f64>>,
    }

    impl MockStore {
        fn new(responses: Vec<Vec<BaseStationRecord>>) -> Self {
            Self {
                responses,
                radii: RefCell::new(Vec::new()),
            }
        }

        fn query_count(&self) -> usize {
            self.radii.borrow().len()
        }
    }

    impl SpatialStore for MockStore {
        fn query(
            &self,
            _collection: &str,
            _center: Coord,
            max_distance_m: f64,
            _radio_types: &[String],
        ) -> Result<Vec<BaseStationRecord>, StoreError> {
            let mut radii = self.radii.borrow_mut();
            let index = radii.len().min(self.responses.len() - 1);
            radii.push(max_distance_m);
            Ok(self.responses[index].clone())
        }
    }

    fn cell(id: i64) -> GridCell {
        GridCell {
            cell_id: id,
            ring: vec![
                Coord { x: 9.0, y: 45.0 },
                Coord { x: 9.1, y: 45.0 },
                Coord { x: 9.1, y: 45.1 },
                Coord { x: 9.0, y: 45.1 },
                Coord { x: 9.0, y: 45.0 },
            ],
        }
    }

    fn station(id: i64, radio: &str, lng: f64, lat: f64) -> BaseStationRecord {
        BaseStationRecord {
            station_id: id,
            radio: radio.to_string(),
            range_m: 2500.0,
            created: 1_380_000_000,
            updated: 1_380_000_000,
            lng,
            lat,
        }
    }

    fn options(types: &[String]) -> AssignOptions<'_> {
        AssignOptions {
            collection: "milan",
            max_distance_m: DEFAULT_MAX_DISTANCE_M,
            radio_types: types,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }

    #[test]
    fn empty_store_retries_with_widened_radii_then_stops() {
        let store = MockStore::new(vec![vec![]]);
        let types = vec!["LTE".to_string()];
        let mut identities = IdentityMap::new();

        let assignment = assign_cell(&cell(1), &store, &options(&types), &mut identities).unwrap();

        // One initial query plus max_retry widened ones.
        assert_eq!(store.query_count(), 5);
        assert_eq!(
            *store.radii.borrow(),
            vec![500.0, 1000.0, 2000.0, 3000.0, 4000.0]
        );

        assert!(assignment.detailed.is_empty());
        let row = &assignment.aggregated;
        assert_eq!(row.n_base_stations, 0);
        assert_eq!(row.radio, AGGREGATED_TYPE);
        assert_eq!(row.lng, None);
        assert_eq!(row.lat, None);
        assert_eq!(row.distance, None);
        assert_eq!(row.aggregated_bs_id, None);
        assert!(identities.is_empty());
    }

    #[test]
    fn retry_stops_at_first_non_empty_scan() {
        let store = MockStore::new(vec![vec![], vec![], vec![station(1, "LTE", 9.05, 45.05)]]);
        let types = vec!["LTE".to_string()];
        let mut identities = IdentityMap::new();

        let assignment = assign_cell(&cell(1), &store, &options(&types), &mut identities).unwrap();

        assert_eq!(store.query_count(), 3);
        assert_eq!(assignment.aggregated.n_base_stations, 1);
    }

    #[test]
    fn single_station_keeps_its_radio_type() {
        let store = MockStore::new(vec![vec![station(7, "UMTS", 9.05, 45.05)]]);
        let types = vec!["UMTS".to_string()];
        let mut identities = IdentityMap::new();

        let assignment = assign_cell(&cell(1), &store, &options(&types), &mut identities).unwrap();

        let row = &assignment.aggregated;
        assert_eq!(row.radio, "UMTS");
        assert_eq!(row.n_base_stations, 1);
        assert_eq!(row.distance, Some(0.0));
        assert_eq!(row.lng, Some(9.05));
        assert_eq!(row.lat, Some(45.05));
        assert_eq!(row.aggregated_bs_id, Some(1));
    }

    #[test]
    fn multiple_stations_aggregate_to_mean_position() {
        let store = MockStore::new(vec![vec![
            station(1, "LTE", 9.04, 45.04),
            station(2, "LTE", 9.06, 45.06),
        ]]);
        let types = vec!["LTE".to_string()];
        let mut identities = IdentityMap::new();

        let assignment = assign_cell(&cell(1), &store, &options(&types), &mut identities).unwrap();

        let row = &assignment.aggregated;
        assert_eq!(row.radio, AGGREGATED_TYPE);
        assert_eq!(row.n_base_stations, 2);
        assert!((row.lng.unwrap() - 9.05).abs() < 1e-12);
        assert!((row.lat.unwrap() - 45.05).abs() < 1e-12);
        assert_eq!(assignment.detailed.len(), 2);
    }

    #[test]
    fn detailed_rows_carry_station_fields_and_cell_distance() {
        let store = MockStore::new(vec![vec![station(42, "LTE", 9.05, 45.05)]]);
        let types = vec!["LTE".to_string()];
        let mut identities = IdentityMap::new();

        let assignment = assign_cell(&cell(9), &store, &options(&types), &mut identities).unwrap();

        let row = &assignment.detailed[0];
        assert_eq!(row.bs_id, 42);
        assert_eq!(row.radio, "LTE");
        assert!((row.range - 2500.0).abs() < f64::EPSILON);
        assert_eq!(row.created, 1_380_000_000);
        assert_eq!(row.cell_id, 9);
        assert!(row.distance.abs() < f64::EPSILON);
    }

    #[test]
    fn identical_means_share_an_identity_across_cells() {
        // The same station serves both cells, so both means are the
        // station's own position.
        let shared = station(1, "LTE", 9.05, 45.05);
        let store = MockStore::new(vec![vec![shared]]);
        let types = vec!["LTE".to_string()];
        let opts = options(&types);
        let mut identities = IdentityMap::new();

        let first = assign_cell(&cell(1), &store, &opts, &mut identities).unwrap();
        let second = assign_cell(&cell(2), &store, &opts, &mut identities).unwrap();

        assert_eq!(first.aggregated.aggregated_bs_id, Some(1));
        assert_eq!(second.aggregated.aggregated_bs_id, Some(1));
        assert_eq!(identities.len(), 1);
    }

    #[test]
    fn assign_grid_numbers_identities_in_cell_order() {
        let store = MockStore::new(vec![
            vec![station(1, "LTE", 9.05, 45.05)],
            vec![station(2, "LTE", 9.06, 45.06)],
            vec![station(1, "LTE", 9.05, 45.05)],
        ]);
        let types = vec!["LTE".to_string()];
        let cells = vec![cell(1), cell(2), cell(3)];
        let mut progress_calls = Vec::new();

        let result = assign_grid(&cells, &store, &options(&types), |done, total| {
            progress_calls.push((done, total));
        })
        .unwrap();

        let ids: Vec<Option<u32>> = result
            .aggregated
            .iter()
            .map(|r| r.aggregated_bs_id)
            .collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(1)]);
        assert_eq!(progress_calls, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(result.identities.len(), 2);
    }

    #[test]
    fn summary_lists_distinct_stations_in_first_seen_order() {
        let store = MockStore::new(vec![
            vec![station(1, "LTE", 9.05, 45.05)],
            vec![station(2, "UMTS", 9.06, 45.06)],
            vec![station(1, "LTE", 9.05, 45.05)],
            vec![],
        ]);
        let types = vec!["LTE".to_string(), "UMTS".to_string()];
        let cells = vec![cell(1), cell(2), cell(3), cell(4)];

        let result = assign_grid(&cells, &store, &options(&types), |_, _| {}).unwrap();
        let summary = station_summary(&result.aggregated);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].aggregated_bs_id, 1);
        assert_eq!(summary[0].radio, "LTE");
        assert_eq!(summary[1].aggregated_bs_id, 2);
        assert_eq!(summary[1].radio, "UMTS");
    }
}
