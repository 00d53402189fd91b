//! Base station download from the provider API.
//!
//! Walks the grid in square sub-blocks, requests each block's bounding
//! box from the provider, deduplicates stations that appear in more than
//! one block, and writes a single merged GeoJSON FeatureCollection.
//!
//! Provider failures (HTTP errors or application-level error payloads)
//! are logged with the request URL and the block is skipped; the walk
//! continues so one bad block does not lose the whole download.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use telegrid_geo::{GridCell, bounding_box, box_features};

use crate::StoreError;

/// Configuration for the provider download walk.
pub struct ProviderConfig<'a> {
    /// Provider endpoint (e.g. an OpenCellID-style `getCells` URL).
    pub api_path: &'a str,
    /// Raw query prefix inserted before the `bbox` parameter, token
    /// included (e.g. `"key=abc&"`). Empty for anonymous access.
    pub api_token: &'a str,
    /// Side length of one download block, in grid cells.
    pub box_side: usize,
    /// Pause between provider requests, in seconds.
    pub sleep_interval: f64,
}

/// Downloads all base stations covering the grid and writes them to
/// `dest` as a GeoJSON FeatureCollection.
///
/// Returns the number of distinct stations written.
///
/// # Errors
///
/// Returns [`StoreError`] if the grid is not a square row-major grid the
/// block walk can cover, or if the merged output cannot be written.
/// Per-block provider failures are logged and skipped instead.
pub async fn download_base_stations(
    client: &reqwest::Client,
    cells: &[GridCell],
    config: &ProviderConfig<'_>,
    dest: &Path,
) -> Result<usize, StoreError> {
    if config.box_side == 0 {
        return Err(StoreError::Provider {
            url: config.api_path.to_string(),
            message: "box_side must be at least 1".to_string(),
        });
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let side_len = (cells.len() as f64).sqrt() as usize;
    let blocks_per_side = side_len.div_ceil(config.box_side);
    let total_blocks = blocks_per_side * blocks_per_side;

    log::info!(
        "Downloading base stations for a {side_len}x{side_len} grid in {total_blocks} blocks of {}x{} cells",
        config.box_side,
        config.box_side
    );

    let mut features: Vec<serde_json::Value> = Vec::new();
    let mut seen_ids: BTreeSet<i64> = BTreeSet::new();
    let mut block_num = 0usize;

    for row in (0..side_len).step_by(config.box_side) {
        for col in (0..side_len).step_by(config.box_side) {
            block_num += 1;

            let block = box_features(row, col, config.box_side, side_len, cells)?;
            let Some(extent) = bounding_box(&block) else {
                continue;
            };

            let url = block_url(config, &extent);

            match fetch_block(client, &url).await {
                Ok(block_features) => {
                    for feature in block_features {
                        let Some(station_id) =
                            feature.pointer("/properties/cell").and_then(serde_json::Value::as_i64)
                        else {
                            continue;
                        };
                        if seen_ids.insert(station_id) {
                            features.push(feature);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Base station block {block_num}/{total_blocks} failed: {e}");
                }
            }

            log::info!(
                "Base station block {block_num}/{total_blocks}: {} stations so far",
                features.len()
            );

            if config.sleep_interval > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(config.sleep_interval)).await;
            }
        }
    }

    let count = features.len();
    let collection = serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    });

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, serde_json::to_string(&collection)?)?;

    log::info!("Wrote {count} base stations to {}", dest.display());
    Ok(count)
}

/// Builds the provider request URL for one block's bounding box.
fn block_url(config: &ProviderConfig<'_>, extent: &geo::Rect) -> String {
    format!(
        "{}?{}bbox={},{},{},{}",
        config.api_path,
        config.api_token,
        extent.min().x,
        extent.min().y,
        extent.max().x,
        extent.max().y
    )
}

/// Fetches one block's feature list from the provider.
async fn fetch_block(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<serde_json::Value>, StoreError> {
    let response = client.get(url).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Provider {
            url: url.to_string(),
            message: format!("status {status}: {body}"),
        });
    }

    let payload: serde_json::Value = response.json().await?;

    // The provider reports application errors in-band with a 200.
    if payload.get("status").and_then(serde_json::Value::as_str) == Some("error") {
        let message = payload
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown provider error")
            .to_string();
        return Err(StoreError::Provider {
            url: url.to_string(),
            message,
        });
    }

    let features = payload
        .get("features")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .ok_or_else(|| StoreError::Provider {
            url: url.to_string(),
            message: "No features array in provider response".to_string(),
        })?;

    Ok(features)
}

#[cfg(test)]
mod tests {
    use geo::Coord;

    use super::*;

    #[test]
    fn block_url_includes_token_prefix_and_bbox() {
        let config = ProviderConfig {
            api_path: "https://provider.example/getCells.php",
            api_token: "key=abc&",
            box_side: 10,
            sleep_interval: 0.0,
        };
        let extent = geo::Rect::new(Coord { x: 9.0, y: 45.0 }, Coord { x: 9.5, y: 45.4 });
        assert_eq!(
            block_url(&config, &extent),
            "https://provider.example/getCells.php?key=abc&bbox=9,45,9.5,45.4"
        );
    }

    #[test]
    fn block_url_without_token() {
        let config = ProviderConfig {
            api_path: "https://provider.example/getCells.php",
            api_token: "",
            box_side: 10,
            sleep_interval: 0.0,
        };
        let extent = geo::Rect::new(Coord { x: 9.0, y: 45.0 }, Coord { x: 9.5, y: 45.4 });
        assert_eq!(
            block_url(&config, &extent),
            "https://provider.example/getCells.php?bbox=9,45,9.5,45.4"
        );
    }
}
