//! Tabular CSV sink and output filename derivation.
//!
//! Two write disciplines cover the pipeline's needs: `append` keeps one
//! logical table across chunks (header written once, rows appended on
//! every later call), `split` writes one file per chunk with a date
//! token suffix taken from the source chunk filename.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ChunkError;

/// Writes rows to a fresh CSV file with a header, replacing any
/// existing file.
///
/// # Errors
///
/// Returns [`ChunkError`] on I/O or serialization failure.
pub fn write_table<S: Serialize>(path: &Path, rows: &[S]) -> Result<(), ChunkError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Appends rows to a logical CSV table, writing the header only when
/// the file does not exist yet (or is empty).
///
/// # Errors
///
/// Returns [`ChunkError`] on I/O or serialization failure.
pub fn append_table<S: Serialize>(path: &Path, rows: &[S]) -> Result<(), ChunkError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let fresh = std::fs::metadata(path).map_or(true, |m| m.len() == 0);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(fresh)
        .from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a CSV table with a header into typed rows.
///
/// # Errors
///
/// Returns [`ChunkError::MissingInput`] if the path does not exist, and
/// parse errors otherwise.
pub fn read_table<D: DeserializeOwned>(path: &Path) -> Result<Vec<D>, ChunkError> {
    if !path.exists() {
        return Err(ChunkError::MissingInput {
            path: path.display().to_string(),
        });
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

/// Extracts the date token from a chunk filename: the last three
/// hyphen-separated segments of the stem (`sms-call-internet-mi-2013-11-01.txt`
/// -> `2013-11-01`).
#[must_use]
pub fn date_token(file_name: &str) -> String {
    let stem = file_name
        .rsplit('/')
        .next()
        .unwrap_or(file_name)
        .trim_end_matches(".csv")
        .trim_end_matches(".txt");
    let segments: Vec<&str> = stem.split('-').collect();
    let start = segments.len().saturating_sub(3);
    segments[start..].join("-")
}

/// Derives the processed CSV name from a raw chunk filename:
/// `.txt` becomes `.csv` and the `sms-call-internet-mi` prefix becomes
/// `internet-mi`.
#[must_use]
pub fn processed_csv_name(raw_file_name: &str) -> String {
    raw_file_name
        .replace(".txt", ".csv")
        .replace("sms-call-internet-mi", "internet-mi")
}

/// Derives the aggregated CSV name from a processed CSV name.
#[must_use]
pub fn aggregated_csv_name(processed_file_name: &str) -> String {
    processed_file_name.replace("internet-mi", "aggregated-internet-mi")
}

/// Derives the per-chunk output path for split-mode writes: the logical
/// table path with the chunk's date token spliced in before `.csv`.
#[must_use]
pub fn split_path(table_path: &Path, source_file_name: &str) -> PathBuf {
    let token = date_token(source_file_name);
    let name = table_path
        .to_string_lossy()
        .replace(".csv", &format!("-{token}.csv"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use telegrid_assign_models::AggregatedRow;

    use super::*;

    #[test]
    fn date_token_takes_last_three_segments() {
        assert_eq!(
            date_token("sms-call-internet-mi-2013-11-01.txt"),
            "2013-11-01"
        );
        assert_eq!(date_token("internet-mi-2013-12-25.csv"), "2013-12-25");
    }

    #[test]
    fn processed_name_rewrites_prefix_and_extension() {
        assert_eq!(
            processed_csv_name("sms-call-internet-mi-2013-11-01.txt"),
            "internet-mi-2013-11-01.csv"
        );
    }

    #[test]
    fn aggregated_name_adds_prefix() {
        assert_eq!(
            aggregated_csv_name("internet-mi-2013-11-01.csv"),
            "aggregated-internet-mi-2013-11-01.csv"
        );
    }

    #[test]
    fn split_path_suffixes_date_token() {
        let path = split_path(
            Path::new("/out/merged.csv"),
            "internet-mi-2013-11-01.csv",
        );
        assert_eq!(path, PathBuf::from("/out/merged-2013-11-01.csv"));
    }

    #[test]
    fn aggregated_table_round_trips_through_csv() {
        let dir = std::env::temp_dir().join("telegrid_sink_roundtrip_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("aggregated.csv");

        let rows = vec![
            AggregatedRow {
                radio: "LTE".to_string(),
                lng: Some(9.051_234),
                lat: Some(45.064_2),
                cell_id: 1,
                distance: Some(0.0),
                n_base_stations: 2,
                aggregated_bs_id: Some(1),
            },
            AggregatedRow {
                radio: "AGGREGATED".to_string(),
                lng: None,
                lat: None,
                cell_id: 2,
                distance: None,
                n_base_stations: 0,
                aggregated_bs_id: None,
            },
        ];

        write_table(&path, &rows).unwrap();
        let read: Vec<AggregatedRow> = read_table(&path).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[0].aggregated_bs_id, Some(1));
        assert_eq!(read[0].radio, "LTE");
        assert!((read[0].lng.unwrap() - 9.051_234).abs() < 1e-9);
        assert_eq!(read[0].n_base_stations, 2);
        assert_eq!(read[1].aggregated_bs_id, None);
        assert_eq!(read[1].lng, None);
        assert_eq!(read[1].n_base_stations, 0);
    }

    #[test]
    fn append_writes_header_only_once() {
        let dir = std::env::temp_dir().join("telegrid_sink_append_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("merged.csv");

        let row = crate::merge::MergedRow {
            hour: 10,
            weekday: 0,
            idx: 10,
            internet: 1.5,
            aggregated_bs_id: 1,
        };

        append_table(&path, &[row.clone()]).unwrap();
        append_table(&path, &[row]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header_count = content
            .lines()
            .filter(|line| line.starts_with("hour"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);
    }
}
