//! Progressive-consensus candidate scan.
//!
//! Walks a nearest-first candidate stream and decides which stations
//! belong to a cell. The scan is an explicit state machine so the
//! halting condition stays auditable away from any I/O:
//!
//! - `Searching`: nothing found yet.
//! - `FoundInside`: at least one candidate fell inside the cell's
//!   bounding box; all further inside hits are unioned in, outside
//!   candidates are ignored.
//! - `FoundNearest`: no inside hit yet, but an outside candidate holds
//!   the current minimum center distance; a strictly closer outside
//!   candidate replaces it.
//!
//! Once any find exists, every outside candidate bumps a post-find
//! counter (inside hits reset it); the scan halts as soon as the counter
//! exceeds [`POST_FIND_LIMIT`], bounding work on dense streams.

use geo::Coord;
use telegrid_geo::{GridCell, haversine_km, point_in_cell};
use telegrid_store_models::BaseStationRecord;

/// Consecutive non-improving candidates tolerated after the last find.
pub const POST_FIND_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Searching,
    FoundInside,
    FoundNearest,
}

/// Result of scanning one candidate stream for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// The accepted candidates, in stream order.
    pub candidates: Vec<BaseStationRecord>,
    /// 0 when candidates were found inside the cell; the center distance
    /// of the nearest outside candidate otherwise; infinite when the
    /// stream produced no candidates at all. Kilometers.
    pub distance_km: f64,
}

/// Scans a nearest-first candidate stream for a cell.
#[must_use]
pub fn scan_candidates(
    cell: &GridCell,
    center: Coord,
    stations: impl IntoIterator<Item = BaseStationRecord>,
) -> ScanOutcome {
    let mut state = ScanState::Searching;
    let mut candidates: Vec<BaseStationRecord> = Vec::new();
    let mut min_distance = f64::INFINITY;
    let mut post_find: u32 = 0;

    for station in stations {
        let point = Coord {
            x: station.lng,
            y: station.lat,
        };

        if point_in_cell(cell, point) {
            if state == ScanState::FoundInside {
                candidates.push(station);
            } else {
                state = ScanState::FoundInside;
                candidates = vec![station];
                min_distance = 0.0;
            }
            post_find = 0;
        } else {
            if state != ScanState::FoundInside {
                let distance = haversine_km(center, point);
                if distance < min_distance {
                    min_distance = distance;
                    candidates = vec![station];
                    post_find = 0;
                    state = ScanState::FoundNearest;
                }
            }
            if state != ScanState::Searching {
                post_find += 1;
            }
        }

        if state != ScanState::Searching && post_find > POST_FIND_LIMIT {
            return ScanOutcome {
                candidates,
                distance_km: min_distance,
            };
        }
    }

    ScanOutcome {
        candidates,
        distance_km: min_distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> GridCell {
        GridCell {
            cell_id: 1,
            ring: vec![
                Coord { x: 9.0, y: 45.0 },
                Coord { x: 9.1, y: 45.0 },
                Coord { x: 9.1, y: 45.1 },
                Coord { x: 9.0, y: 45.1 },
                Coord { x: 9.0, y: 45.0 },
            ],
        }
    }

    fn station(id: i64, lng: f64, lat: f64) -> BaseStationRecord {
        BaseStationRecord {
            station_id: id,
            radio: "LTE".to_string(),
            range_m: 1000.0,
            created: 0,
            updated: 0,
            lng,
            lat,
        }
    }

    fn center() -> Coord {
        Coord { x: 9.05, y: 45.05 }
    }

    #[test]
    fn empty_stream_finds_nothing() {
        let outcome = scan_candidates(&cell(), center(), vec![]);
        assert!(outcome.candidates.is_empty());
        assert!(outcome.distance_km.is_infinite());
    }

    #[test]
    fn inside_candidate_wins_with_zero_distance() {
        let stations = vec![station(1, 9.05, 45.05)];
        let outcome = scan_candidates(&cell(), center(), stations);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].station_id, 1);
        assert!(outcome.distance_km.abs() < f64::EPSILON);
    }

    #[test]
    fn inside_hits_are_unioned() {
        let stations = vec![
            station(1, 9.05, 45.05),
            station(2, 9.3, 45.3),
            station(3, 9.06, 45.04),
        ];
        let outcome = scan_candidates(&cell(), center(), stations);
        let ids: Vec<i64> = outcome.candidates.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(outcome.distance_km.abs() < f64::EPSILON);
    }

    #[test]
    fn inside_hit_replaces_nearest_outside() {
        let stations = vec![station(1, 9.2, 45.05), station(2, 9.05, 45.05)];
        let outcome = scan_candidates(&cell(), center(), stations);
        let ids: Vec<i64> = outcome.candidates.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![2]);
        assert!(outcome.distance_km.abs() < f64::EPSILON);
    }

    #[test]
    fn nearest_outside_fallback_keeps_minimum() {
        // Nearest-first stream: the first outside candidate is the
        // minimum; later, farther candidates must not displace it.
        let stations = vec![
            station(1, 9.12, 45.05),
            station(2, 9.15, 45.05),
            station(3, 9.2, 45.05),
        ];
        let outcome = scan_candidates(&cell(), center(), stations);
        let ids: Vec<i64> = outcome.candidates.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![1]);
        let expected = haversine_km(center(), Coord { x: 9.12, y: 45.05 });
        assert!((outcome.distance_km - expected).abs() < 1e-9);
    }

    #[test]
    fn equal_distance_keeps_first_candidate() {
        // Symmetric east/west of the center, identical distance.
        let stations = vec![station(1, 9.2, 45.05), station(2, 8.9, 45.05)];
        let outcome = scan_candidates(&cell(), center(), stations);
        let ids: Vec<i64> = outcome.candidates.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn halts_after_eleventh_candidate_following_find() {
        // Candidate 0 is inside; candidates 1-11 are outside. The
        // post-find counter reaches 11 on the eleventh outside candidate
        // and the scan halts: the later inside candidate is never seen.
        let mut stations = vec![station(0, 9.05, 45.05)];
        for i in 1..=11 {
            #[allow(clippy::cast_precision_loss)]
            let offset = 0.1 + 0.01 * i as f64;
            stations.push(station(i, 9.1 + offset, 45.05));
        }
        stations.push(station(99, 9.04, 45.04));

        let outcome = scan_candidates(&cell(), center(), stations);
        let ids: Vec<i64> = outcome.candidates.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![0]);
        assert!(outcome.distance_km.abs() < f64::EPSILON);
    }

    #[test]
    fn does_not_halt_on_tenth_candidate_after_find() {
        // Ten outside candidates after the find leave the counter at 10,
        // which does not exceed the limit; a following inside candidate
        // is still unioned in.
        let mut stations = vec![station(0, 9.05, 45.05)];
        for i in 1..=10 {
            #[allow(clippy::cast_precision_loss)]
            let offset = 0.1 + 0.01 * i as f64;
            stations.push(station(i, 9.1 + offset, 45.05));
        }
        stations.push(station(99, 9.04, 45.04));

        let outcome = scan_candidates(&cell(), center(), stations);
        let ids: Vec<i64> = outcome.candidates.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![0, 99]);
    }

    #[test]
    fn inside_hits_reset_the_counter() {
        // Alternating outside runs never reach the limit because each
        // inside hit resets the counter; every inside hit is kept.
        let mut stations = vec![station(0, 9.05, 45.05)];
        for i in 1..=8 {
            #[allow(clippy::cast_precision_loss)]
            let offset = 0.1 + 0.01 * i as f64;
            stations.push(station(i, 9.1 + offset, 45.05));
        }
        stations.push(station(50, 9.06, 45.06));
        for i in 9..=16 {
            #[allow(clippy::cast_precision_loss)]
            let offset = 0.1 + 0.01 * i as f64;
            stations.push(station(i, 9.1 + offset, 45.05));
        }
        stations.push(station(51, 9.07, 45.07));

        let outcome = scan_candidates(&cell(), center(), stations);
        let ids: Vec<i64> = outcome.candidates.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![0, 50, 51]);
    }
}
