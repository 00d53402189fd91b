//! The `chunks` and `merge` subcommands: per-chunk download and
//! preprocessing, and the folder-level aggregation merge.

use std::path::PathBuf;
use std::time::Instant;

use telegrid_assign_models::AggregatedRow;
use telegrid_chunks::activity::{ChunkRow, FullChunkRow, ProcessedRow, process_chunk};
use telegrid_chunks::download::{ChunkSource, HttpChunkSource, load_metadata};
use telegrid_chunks::merge::{WriteMode, merge_chunk, merge_chunk_full, merge_folder};
use telegrid_chunks::sink::{aggregated_csv_name, processed_csv_name, read_table, write_table};
use telegrid_cli_utils::{IndicatifProgress, MultiProgress};

/// Arguments of the `chunks` subcommand.
pub struct ChunksArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub n_chunks: i64,
    pub skip: usize,
    pub server_url: String,
    pub protocol: String,
    pub bs_aggregation_step: bool,
    pub aggregated_bs_file: Option<PathBuf>,
    pub full_aggregation: bool,
    pub skip_download: bool,
    pub keep_all_columns: bool,
}

/// Runs the chunk preprocessing pipeline.
///
/// Each chunk is downloaded, grouped, and written independently; a
/// failing chunk is logged and skipped so the run continues. Missing
/// top-level inputs abort the whole run.
///
/// # Errors
///
/// Returns an error if the metadata or aggregated base station inputs
/// are missing or malformed.
pub async fn run(
    args: &ChunksArgs,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let chunks = load_metadata(&args.input)?;
    let n = if args.n_chunks < 0 {
        chunks.len()
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let requested = args.n_chunks as usize;
        requested.min(chunks.len())
    };

    log::info!(
        "Found {} dataset chunks, going to load {} (skipping {})",
        chunks.len(),
        n.saturating_sub(args.skip),
        args.skip
    );

    let aggregated_table: Option<Vec<AggregatedRow>> = if args.bs_aggregation_step {
        let path = args
            .aggregated_bs_file
            .as_ref()
            .ok_or("--aggregated-bs-file is required with --bs-aggregation-step")?;
        let table = read_table(path)?;
        Some(table)
    } else {
        None
    };

    let download_dir = args.output.join("full-chunks");
    let processed_dir = args.output.join("processed-chunks");
    let aggregated_dir = args.output.join("aggregated-chunks");

    let client = reqwest::Client::builder()
        .user_agent("telegrid/0.1")
        .build()?;
    let source = HttpChunkSource::new(client, &args.server_url, &args.protocol, &download_dir);

    let steps = IndicatifProgress::steps_bar(
        multi,
        "Processing chunks",
        n.saturating_sub(args.skip) as u64,
    );

    let mut processed_count: u64 = 0;
    let mut skipped_count: u64 = 0;

    for chunk in chunks.iter().take(n).skip(args.skip) {
        let processed_name = processed_csv_name(&chunk.filename);
        let processed_path = processed_dir.join(&processed_name);

        if !args.skip_download {
            let bytes = IndicatifProgress::bytes_bar(multi, &format!("Downloading {}", chunk.filename));
            let raw_path = match source.fetch(chunk, &bytes).await {
                Ok(path) => path,
                Err(e) => {
                    bytes.finish_and_clear();
                    log::error!("Skipping chunk {}: {e}", chunk.filename);
                    skipped_count += 1;
                    steps.inc(1);
                    continue;
                }
            };
            bytes.finish_and_clear();

            let rows = match process_chunk(&raw_path) {
                Ok(rows) => rows,
                Err(e) => {
                    log::error!("Skipping chunk {}: {e}", chunk.filename);
                    skipped_count += 1;
                    steps.inc(1);
                    continue;
                }
            };

            if args.keep_all_columns {
                let table: Vec<FullChunkRow> = rows.iter().map(FullChunkRow::from).collect();
                write_table(&processed_path, &table)?;
            } else {
                let table: Vec<ChunkRow> = rows.iter().map(ChunkRow::from).collect();
                write_table(&processed_path, &table)?;
            }

            // The raw chunk is only needed once.
            std::fs::remove_file(&raw_path)?;
        }

        if let Some(aggregated) = &aggregated_table {
            let chunk_rows: Vec<ChunkRow> = read_table(&processed_path)?;
            let rows: Vec<ProcessedRow> = chunk_rows.into_iter().map(ProcessedRow::from).collect();

            let merged_path = aggregated_dir.join(aggregated_csv_name(&processed_name));
            if args.full_aggregation {
                write_table(&merged_path, &merge_chunk_full(&rows, aggregated))?;
            } else {
                write_table(&merged_path, &merge_chunk(&rows, aggregated))?;
            }
        }

        processed_count += 1;
        steps.inc(1);
    }

    steps.finish(format!("Processed {processed_count} chunks"));

    // The download directory is transient; drop it when nothing is left.
    let _ = std::fs::remove_dir(&download_dir);

    log::info!(
        "Chunk run complete in {:.1}s: {processed_count} processed, {skipped_count} skipped, output in {}",
        start.elapsed().as_secs_f64(),
        processed_dir.display()
    );

    Ok(())
}

/// Arguments of the `merge` subcommand.
pub struct MergeArgs {
    pub chunks_folder: PathBuf,
    pub aggregated_bs_file: PathBuf,
    pub save_path: PathBuf,
    pub split: bool,
    pub full_aggregation: bool,
}

/// Merges a folder of already-processed chunks against the aggregated
/// base station table.
///
/// # Errors
///
/// Returns an error if an input is missing or a chunk fails to parse.
pub fn run_merge(args: &MergeArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let aggregated: Vec<AggregatedRow> = read_table(&args.aggregated_bs_file)?;
    log::info!(
        "Merging chunks in {} against {} aggregated rows",
        args.chunks_folder.display(),
        aggregated.len()
    );

    let mode = if args.split {
        WriteMode::Split
    } else {
        WriteMode::Append
    };

    let steps = IndicatifProgress::steps_bar(multi, "Merging chunks", 0);
    let count = merge_folder(
        &args.chunks_folder,
        &aggregated,
        &args.save_path,
        mode,
        args.full_aggregation,
        |done, total| {
            steps.set_total(total as u64);
            steps.set_position(done as u64);
        },
    )?;
    steps.finish(format!("Merged {count} chunks"));

    log::info!(
        "Merge complete in {:.1}s: {count} chunks into {}",
        start.elapsed().as_secs_f64(),
        args.save_path.display()
    );

    Ok(())
}
