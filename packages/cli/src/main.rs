#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the telegrid preprocessing toolchain.

mod bs;
mod chunks;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "telegrid", about = "Telecom activity grid preprocessing toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map grid cells to base stations and write the assignment tables
    Bs {
        /// Path to the grid GeoJSON file
        input: PathBuf,
        /// Output folder for the assignment CSV tables
        output_folder: PathBuf,
        /// Name of the store collection holding the base stations
        #[arg(long)]
        collection: String,
        /// Comma-separated list of radio types to process
        #[arg(long, default_value = "LTE")]
        bs_types: String,
        /// Initial search radius in meters
        #[arg(long, default_value = "500")]
        max_distance: f64,
        /// Maximum widened retries when a cell finds no stations
        #[arg(long, default_value = "4")]
        max_retry: u32,
        /// Base station provider endpoint
        #[arg(long, default_value = "https://opencellid.org/ajax/getCells.php")]
        api_path: String,
        /// Raw provider query prefix, token included (e.g. "key=abc&")
        #[arg(long, default_value = "")]
        api_token: String,
        /// Side length (in cells) of one provider download block
        #[arg(long, default_value = "10")]
        box_side: usize,
        /// Pause between provider requests, in seconds
        #[arg(long, default_value = "0")]
        sleep_interval: f64,
        /// Reuse an already-downloaded base station file
        #[arg(long)]
        skip_bs_download: bool,
    },
    /// Download and preprocess dataset chunks
    Chunks {
        /// Path to the dataset metadata file
        input: PathBuf,
        /// Output folder for the processed chunks
        output: PathBuf,
        /// Number of chunks to load (-1 for all of them)
        #[arg(short = 'n', long, default_value = "-1")]
        n_chunks: i64,
        /// How many chunks to skip from the start of the list
        #[arg(long, default_value = "0")]
        skip: usize,
        /// Data server url (without protocol)
        #[arg(long, default_value = "dataverse.harvard.edu")]
        server_url: String,
        /// Protocol used for the http requests
        #[arg(long, default_value = "https")]
        protocol: String,
        /// Re-key each processed chunk onto aggregated base stations
        #[arg(long)]
        bs_aggregation_step: bool,
        /// Path to the aggregated base station CSV (result of `bs`)
        #[arg(long)]
        aggregated_bs_file: Option<PathBuf>,
        /// Group the merged output by all descriptive columns
        #[arg(long)]
        full_aggregation: bool,
        /// Assume the chunks are already downloaded and processed
        #[arg(long)]
        skip_download: bool,
        /// Keep every metric column in the processed chunks
        #[arg(long)]
        keep_all_columns: bool,
    },
    /// Merge a folder of processed chunks onto aggregated base stations
    Merge {
        /// Folder containing the processed chunk CSV files
        chunks_folder: PathBuf,
        /// Path to the aggregated base station CSV (result of `bs`)
        aggregated_bs_file: PathBuf,
        /// Path of the merged output table
        save_path: PathBuf,
        /// Write one file per chunk instead of one appended table
        #[arg(long)]
        split: bool,
        /// Group the merged output by all descriptive columns
        #[arg(long)]
        full_aggregation: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = telegrid_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Bs {
            input,
            output_folder,
            collection,
            bs_types,
            max_distance,
            max_retry,
            api_path,
            api_token,
            box_side,
            sleep_interval,
            skip_bs_download,
        } => {
            bs::run(
                &bs::BsArgs {
                    input,
                    output_folder,
                    collection,
                    bs_types,
                    max_distance,
                    max_retry,
                    api_path,
                    api_token,
                    box_side,
                    sleep_interval,
                    skip_bs_download,
                },
                &multi,
            )
            .await
        }
        Commands::Chunks {
            input,
            output,
            n_chunks,
            skip,
            server_url,
            protocol,
            bs_aggregation_step,
            aggregated_bs_file,
            full_aggregation,
            skip_download,
            keep_all_columns,
        } => {
            chunks::run(
                &chunks::ChunksArgs {
                    input,
                    output,
                    n_chunks,
                    skip,
                    server_url,
                    protocol,
                    bs_aggregation_step,
                    aggregated_bs_file,
                    full_aggregation,
                    skip_download,
                    keep_all_columns,
                },
                &multi,
            )
            .await
        }
        Commands::Merge {
            chunks_folder,
            aggregated_bs_file,
            save_path,
            split,
            full_aggregation,
        } => chunks::run_merge(
            &chunks::MergeArgs {
                chunks_folder,
                aggregated_bs_file,
                save_path,
                split,
                full_aggregation,
            },
            &multi,
        ),
    }
}
