//! Aggregation merge step.
//!
//! Re-keys a processed activity chunk from grid cells onto aggregated
//! base stations: inner join on the cell id against the aggregated
//! assignment table, then group and re-sum the internet metric by
//! (hour, weekday, idx, aggregated station). Cells without an
//! aggregated identity (zero-station cells) drop out of the join.
//!
//! [`merge_folder`] runs the step over a whole folder of processed
//! chunks, either appending into one logical table or writing one file
//! per chunk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use telegrid_assign_models::AggregatedRow;

use crate::ChunkError;
use crate::activity::{ChunkRow, ProcessedRow};
use crate::sink::{append_table, read_table, split_path, write_table};

/// One merged row keyed by aggregated station identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Day of week, Monday = 0.
    pub weekday: u32,
    /// `hour + weekday * 24`.
    pub idx: u32,
    /// Summed internet activity.
    pub internet: f64,
    /// Identity of the aggregated station.
    pub aggregated_bs_id: u32,
}

/// One merged row carrying the full aggregated station descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullMergedRow {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Day of week, Monday = 0.
    pub weekday: u32,
    /// `hour + weekday * 24`.
    pub idx: u32,
    /// Summed internet activity.
    pub internet: f64,
    /// Identity of the aggregated station.
    pub aggregated_bs_id: u32,
    /// Radio type of the aggregated station.
    #[serde(rename = "type")]
    pub radio: String,
    /// Mean longitude of the aggregated station.
    pub lng: f64,
    /// Mean latitude of the aggregated station.
    pub lat: f64,
    /// Number of physical stations behind the identity.
    pub n_base_stations: u32,
}

/// Joins a processed chunk against the aggregated assignment table and
/// re-sums internet activity per (hour, weekday, aggregated station).
#[must_use]
pub fn merge_chunk(rows: &[ProcessedRow], aggregated: &[AggregatedRow]) -> Vec<MergedRow> {
    let mapping = identity_mapping(aggregated);
    let mut groups: BTreeMap<(u32, u32, u32, u32), f64> = BTreeMap::new();

    for row in rows {
        let Some(agg) = mapping.get(&row.cell_id) else {
            continue;
        };
        let Some(id) = agg.aggregated_bs_id else {
            continue;
        };
        *groups
            .entry((row.hour, row.weekday, row.idx, id))
            .or_default() += row.internet;
    }

    groups
        .into_iter()
        .map(|((hour, weekday, idx, aggregated_bs_id), internet)| MergedRow {
            hour,
            weekday,
            idx,
            internet,
            aggregated_bs_id,
        })
        .collect()
}

/// [`merge_chunk`] variant grouping by the full station descriptor as
/// well, for "full aggregation" output.
#[must_use]
pub fn merge_chunk_full(rows: &[ProcessedRow], aggregated: &[AggregatedRow]) -> Vec<FullMergedRow> {
    type FullKey = (u32, u32, u32, u32, String, u64, u64, u32);

    let mapping = identity_mapping(aggregated);
    let mut groups: BTreeMap<FullKey, f64> = BTreeMap::new();

    for row in rows {
        let Some(agg) = mapping.get(&row.cell_id) else {
            continue;
        };
        let (Some(id), Some(lng), Some(lat)) = (agg.aggregated_bs_id, agg.lng, agg.lat) else {
            continue;
        };
        let key = (
            row.hour,
            row.weekday,
            row.idx,
            id,
            agg.radio.clone(),
            lng.to_bits(),
            lat.to_bits(),
            agg.n_base_stations,
        );
        *groups.entry(key).or_default() += row.internet;
    }

    groups
        .into_iter()
        .map(
            |((hour, weekday, idx, aggregated_bs_id, radio, lng, lat, n), internet)| {
                FullMergedRow {
                    hour,
                    weekday,
                    idx,
                    internet,
                    aggregated_bs_id,
                    radio,
                    lng: f64::from_bits(lng),
                    lat: f64::from_bits(lat),
                    n_base_stations: n,
                }
            },
        )
        .collect()
}

/// How [`merge_folder`] writes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One logical table: header once, rows appended chunk after chunk.
    Append,
    /// One file per chunk, suffixed with the chunk's date token.
    Split,
}

/// Merges every processed chunk CSV in `chunks_dir` against the
/// aggregated assignment table.
///
/// In [`WriteMode::Append`] all merged rows accumulate into
/// `table_path` (any previous file is replaced); in
/// [`WriteMode::Split`] each chunk produces its own file next to
/// `table_path`, named with the chunk's date token. Returns the number
/// of chunks merged. `on_chunk(done, total)` reports progress.
///
/// # Errors
///
/// Returns [`ChunkError::MissingInput`] if `chunks_dir` does not exist,
/// and I/O or parse errors from the chunk files.
pub fn merge_folder(
    chunks_dir: &Path,
    aggregated: &[AggregatedRow],
    table_path: &Path,
    mode: WriteMode,
    full: bool,
    mut on_chunk: impl FnMut(usize, usize),
) -> Result<u64, ChunkError> {
    if !chunks_dir.exists() {
        return Err(ChunkError::MissingInput {
            path: chunks_dir.display().to_string(),
        });
    }

    let mut chunk_files: Vec<PathBuf> = std::fs::read_dir(chunks_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    chunk_files.sort();

    if mode == WriteMode::Append && table_path.exists() {
        std::fs::remove_file(table_path)?;
    }

    let total = chunk_files.len();
    for (i, chunk_path) in chunk_files.iter().enumerate() {
        let chunk_rows: Vec<ChunkRow> = read_table(chunk_path)?;
        let rows: Vec<ProcessedRow> = chunk_rows.into_iter().map(ProcessedRow::from).collect();

        let file_name = chunk_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        match mode {
            WriteMode::Append => {
                if full {
                    append_table(table_path, &merge_chunk_full(&rows, aggregated))?;
                } else {
                    append_table(table_path, &merge_chunk(&rows, aggregated))?;
                }
            }
            WriteMode::Split => {
                let out_path = split_path(table_path, &file_name);
                if full {
                    write_table(&out_path, &merge_chunk_full(&rows, aggregated))?;
                } else {
                    write_table(&out_path, &merge_chunk(&rows, aggregated))?;
                }
            }
        }

        on_chunk(i + 1, total);
    }

    Ok(total as u64)
}

/// Builds the cell id -> aggregated row lookup for the join. The first
/// aggregated row wins for a duplicated cell id.
fn identity_mapping(aggregated: &[AggregatedRow]) -> BTreeMap<i64, &AggregatedRow> {
    let mut mapping = BTreeMap::new();
    for row in aggregated {
        mapping.entry(row.cell_id).or_insert(row);
    }
    mapping
}
