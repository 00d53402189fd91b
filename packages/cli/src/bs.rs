//! The `bs` subcommand: base station download, store load, and the
//! full-grid assignment run.

use std::path::PathBuf;
use std::time::Instant;

use telegrid_assign::{AssignOptions, assign_grid, station_summary};
use telegrid_chunks::sink::write_table;
use telegrid_cli_utils::{IndicatifProgress, MultiProgress};
use telegrid_geo::load_grid;
use telegrid_store::GeoStore;
use telegrid_store::download::{ProviderConfig, download_base_stations};

/// Arguments of the `bs` subcommand.
pub struct BsArgs {
    pub input: PathBuf,
    pub output_folder: PathBuf,
    pub collection: String,
    pub bs_types: String,
    pub max_distance: f64,
    pub max_retry: u32,
    pub api_path: String,
    pub api_token: String,
    pub box_side: usize,
    pub sleep_interval: f64,
    pub skip_bs_download: bool,
}

/// Runs the base station assignment pipeline.
///
/// # Errors
///
/// Returns an error if the grid or base station inputs are missing or
/// malformed, or if a store query fails mid-run.
pub async fn run(args: &BsArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    log::info!(
        "Grid: {} | output: {} | collection: {} | types: {} | max distance: {}m | max retry: {}",
        args.input.display(),
        args.output_folder.display(),
        args.collection,
        args.bs_types,
        args.max_distance,
        args.max_retry
    );

    let cells = load_grid(&args.input)?;

    let bs_path = args.output_folder.join("base_stations.geojson");
    if args.skip_bs_download {
        log::info!("Skipping base station download, reusing {}", bs_path.display());
    } else {
        let client = reqwest::Client::builder()
            .user_agent("telegrid/0.1")
            .build()?;
        let config = ProviderConfig {
            api_path: &args.api_path,
            api_token: &args.api_token,
            box_side: args.box_side,
            sleep_interval: args.sleep_interval,
        };
        download_base_stations(&client, &cells, &config, &bs_path).await?;
    }

    let mut store = GeoStore::new();
    store.load_collection(&args.collection, &bs_path)?;

    let radio_types: Vec<String> = args
        .bs_types
        .split(',')
        .map(|t| t.trim().to_string())
        .collect();

    let options = AssignOptions {
        collection: &args.collection,
        max_distance_m: args.max_distance,
        radio_types: &radio_types,
        max_retry: args.max_retry,
    };

    let progress = IndicatifProgress::steps_bar(
        multi,
        "Mapping grid cells to base stations",
        cells.len() as u64,
    );
    let result = assign_grid(&cells, &store, &options, |done, _| {
        progress.set_position(done as u64);
    })?;
    progress.finish(format!("Mapped {} grid cells", cells.len()));

    let types_tag = radio_types.join("-");
    let mapped_path = args
        .output_folder
        .join(format!("cell_base_stations_mapped-{types_tag}.csv"));
    let aggregated_path = args
        .output_folder
        .join(format!("cell_base_stations_aggregated-{types_tag}.csv"));
    let summary_path = args
        .output_folder
        .join(format!("aggregated_bs_data-{types_tag}.csv"));

    write_table(&mapped_path, &result.detailed)?;
    write_table(&aggregated_path, &result.aggregated)?;
    write_table(&summary_path, &station_summary(&result.aggregated))?;

    let empty_cells = result
        .aggregated
        .iter()
        .filter(|row| row.n_base_stations == 0)
        .count();

    log::info!(
        "Assignment complete in {:.1}s: {} cells, {} detailed rows, {} aggregated identities, {} cells without stations",
        start.elapsed().as_secs_f64(),
        cells.len(),
        result.detailed.len(),
        result.identities.len(),
        empty_cells
    );
    log::info!(
        "Wrote {}, {}, {}",
        mapped_path.display(),
        aggregated_path.display(),
        summary_path.display()
    );

    Ok(())
}
