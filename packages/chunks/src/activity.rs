//! Raw activity chunk parsing and (hour, weekday, cell) grouping.
//!
//! Chunks arrive as headerless tab-separated files with the fixed field
//! list `[cellId, datetime(ms epoch), countryCode, smsIn, smsOut,
//! callIn, callOut, internet]`. Numeric metrics may be empty; an empty
//! field contributes zero to its group sum.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::ChunkError;

/// One raw line of a chunk file.
#[derive(Debug, Deserialize)]
struct RawActivityRecord {
    cell_id: i64,
    /// Epoch milliseconds; the dataset sometimes carries a fractional
    /// part, so this parses as a float.
    datetime_ms: f64,
    country_code: Option<f64>,
    sms_in: Option<f64>,
    sms_out: Option<f64>,
    call_in: Option<f64>,
    call_out: Option<f64>,
    internet: Option<f64>,
}

/// One processed row: activity metrics summed over a
/// (hour, weekday, cell) group.
///
/// `weekday` is Monday = 0. `idx` flattens (hour, weekday) into a single
/// 0..168 slot index.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRow {
    /// Hour of day, 0-23 (UTC).
    pub hour: u32,
    /// Day of week, Monday = 0.
    pub weekday: u32,
    /// Grid cell identifier.
    pub cell_id: i64,
    /// Summed country code field (kept only in full-columns output).
    pub country_code: f64,
    /// Summed incoming SMS activity.
    pub sms_in: f64,
    /// Summed outgoing SMS activity.
    pub sms_out: f64,
    /// Summed incoming call activity.
    pub call_in: f64,
    /// Summed outgoing call activity.
    pub call_out: f64,
    /// Summed internet activity.
    pub internet: f64,
    /// `hour + weekday * 24`.
    pub idx: u32,
}

/// The written form of a processed chunk: internet activity only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Day of week, Monday = 0.
    pub weekday: u32,
    /// Grid cell identifier.
    #[serde(rename = "cellId")]
    pub cell_id: i64,
    /// Summed internet activity.
    pub internet: f64,
    /// `hour + weekday * 24`.
    pub idx: u32,
}

impl From<&ProcessedRow> for ChunkRow {
    fn from(row: &ProcessedRow) -> Self {
        Self {
            hour: row.hour,
            weekday: row.weekday,
            cell_id: row.cell_id,
            internet: row.internet,
            idx: row.idx,
        }
    }
}

impl From<ChunkRow> for ProcessedRow {
    fn from(row: ChunkRow) -> Self {
        Self {
            hour: row.hour,
            weekday: row.weekday,
            cell_id: row.cell_id,
            country_code: 0.0,
            sms_in: 0.0,
            sms_out: 0.0,
            call_in: 0.0,
            call_out: 0.0,
            internet: row.internet,
            idx: row.idx,
        }
    }
}

/// The written form of a processed chunk with all metric columns kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullChunkRow {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Day of week, Monday = 0.
    pub weekday: u32,
    /// Grid cell identifier.
    #[serde(rename = "cellId")]
    pub cell_id: i64,
    /// Summed country code field.
    pub countrycode: f64,
    /// Summed incoming SMS activity.
    pub smsin: f64,
    /// Summed outgoing SMS activity.
    pub smsout: f64,
    /// Summed incoming call activity.
    pub callin: f64,
    /// Summed outgoing call activity.
    pub callout: f64,
    /// Summed internet activity.
    pub internet: f64,
    /// `hour + weekday * 24`.
    pub idx: u32,
}

impl From<&ProcessedRow> for FullChunkRow {
    fn from(row: &ProcessedRow) -> Self {
        Self {
            hour: row.hour,
            weekday: row.weekday,
            cell_id: row.cell_id,
            countrycode: row.country_code,
            smsin: row.sms_in,
            smsout: row.sms_out,
            callin: row.call_in,
            callout: row.call_out,
            internet: row.internet,
            idx: row.idx,
        }
    }
}

/// Parses a raw chunk file and groups it by (hour, weekday, cell).
///
/// Rows come back sorted by the group key, one per group, metrics
/// summed.
///
/// # Errors
///
/// Returns [`ChunkError::MissingInput`] if the path does not exist, and
/// parse errors for malformed rows or out-of-range timestamps.
pub fn process_chunk(path: &Path) -> Result<Vec<ProcessedRow>, ChunkError> {
    if !path.exists() {
        return Err(ChunkError::MissingInput {
            path: path.display().to_string(),
        });
    }

    let bytes = std::fs::read(path)?;
    process_chunk_bytes(&bytes)
}

/// Parses and groups raw chunk bytes; see [`process_chunk`].
///
/// # Errors
///
/// Returns parse errors for malformed rows or out-of-range timestamps.
pub fn process_chunk_bytes(bytes: &[u8]) -> Result<Vec<ProcessedRow>, ChunkError> {
    // The dataset ships with a UTF-8 BOM on some chunks.
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut groups: BTreeMap<(u32, u32, i64), ProcessedRow> = BTreeMap::new();

    for result in reader.deserialize::<RawActivityRecord>() {
        let record = result?;

        #[allow(clippy::cast_possible_truncation)]
        let timestamp_ms = record.datetime_ms as i64;
        let datetime = chrono::DateTime::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            ChunkError::Parse {
                message: format!("Timestamp out of range: {timestamp_ms}"),
            }
        })?;

        let hour = datetime.hour();
        let weekday = datetime.weekday().num_days_from_monday();

        let entry = groups
            .entry((hour, weekday, record.cell_id))
            .or_insert_with(|| ProcessedRow {
                hour,
                weekday,
                cell_id: record.cell_id,
                country_code: 0.0,
                sms_in: 0.0,
                sms_out: 0.0,
                call_in: 0.0,
                call_out: 0.0,
                internet: 0.0,
                idx: hour + weekday * 24,
            });

        entry.country_code += record.country_code.unwrap_or_default();
        entry.sms_in += record.sms_in.unwrap_or_default();
        entry.sms_out += record.sms_out.unwrap_or_default();
        entry.call_in += record.call_in.unwrap_or_default();
        entry.call_out += record.call_out.unwrap_or_default();
        entry.internet += record.internet.unwrap_or_default();
    }

    Ok(groups.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2013-11-04 (a Monday) 10:00:00 UTC, in epoch milliseconds.
    const MONDAY_10H_MS: i64 = 1_383_559_200_000;

    #[test]
    fn groups_and_sums_by_hour_weekday_cell() {
        let raw = format!(
            "1\t{t}\t39\t\t\t\t\t10.5\n\
             1\t{t}\t39\t\t\t\t\t4.5\n\
             2\t{t}\t39\t\t\t\t\t1.0\n",
            t = MONDAY_10H_MS
        );
        let rows = process_chunk_bytes(raw.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cell_id, 1);
        assert!((rows[0].internet - 15.0).abs() < 1e-12);
        assert_eq!(rows[1].cell_id, 2);
        assert!((rows[1].internet - 1.0).abs() < 1e-12);
    }

    #[test]
    fn derives_hour_weekday_and_idx() {
        let raw = format!("7\t{MONDAY_10H_MS}\t39\t1\t2\t3\t4\t5\n");
        let rows = process_chunk_bytes(raw.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.hour, 10);
        assert_eq!(row.weekday, 0);
        assert_eq!(row.idx, 10);
        assert!((row.sms_in - 1.0).abs() < 1e-12);
        assert!((row.call_out - 4.0).abs() < 1e-12);
    }

    #[test]
    fn sunday_evening_maps_to_high_idx() {
        // 2013-11-03 23:00:00 UTC is a Sunday (weekday 6).
        let sunday_23h_ms: i64 = 1_383_519_600_000;
        let raw = format!("7\t{sunday_23h_ms}\t39\t\t\t\t\t1.0\n");
        let rows = process_chunk_bytes(raw.as_bytes()).unwrap();

        assert_eq!(rows[0].weekday, 6);
        assert_eq!(rows[0].hour, 23);
        assert_eq!(rows[0].idx, 23 + 6 * 24);
    }

    #[test]
    fn empty_metric_fields_count_as_zero() {
        let raw = format!("1\t{MONDAY_10H_MS}\t39\t\t\t\t\t\n");
        let rows = process_chunk_bytes(raw.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].internet.abs() < f64::EPSILON);
    }

    #[test]
    fn bom_prefix_is_tolerated() {
        let raw = format!("\u{feff}1\t{MONDAY_10H_MS}\t39\t\t\t\t\t2.0\n");
        let rows = process_chunk_bytes(raw.as_bytes()).unwrap();
        assert_eq!(rows[0].cell_id, 1);
    }

    #[test]
    fn missing_chunk_file_is_reported() {
        assert!(matches!(
            process_chunk(Path::new("/nonexistent/chunk.txt")),
            Err(ChunkError::MissingInput { .. })
        ));
    }

    #[test]
    fn output_is_sorted_by_group_key() {
        let tuesday_ms = MONDAY_10H_MS + 24 * 3600 * 1000;
        let raw = format!(
            "5\t{tuesday_ms}\t39\t\t\t\t\t1.0\n\
             5\t{MONDAY_10H_MS}\t39\t\t\t\t\t1.0\n\
             1\t{MONDAY_10H_MS}\t39\t\t\t\t\t1.0\n"
        );
        let rows = process_chunk_bytes(raw.as_bytes()).unwrap();
        let keys: Vec<(u32, u32, i64)> = rows.iter().map(|r| (r.hour, r.weekday, r.cell_id)).collect();
        assert_eq!(keys, vec![(10, 0, 1), (10, 0, 5), (10, 1, 5)]);
    }
}
