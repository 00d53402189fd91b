//! Chunk metadata parsing and HTTP chunk fetching.
//!
//! The dataset is published as a dataverse dataset: a metadata document
//! lists one file entry per time-bucketed chunk, each addressed by a
//! persistent identifier. Chunks are fetched one at a time and streamed
//! to disk; the pipeline deletes them after processing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt as _;
use serde::Deserialize;
use tokio::io::AsyncWriteExt as _;

use crate::ChunkError;
use crate::progress::ProgressCallback;

/// One downloadable chunk, as listed in the dataset metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Persistent identifier used in the download URL.
    pub persistent_id: String,
    /// Original chunk filename (drives output naming).
    pub filename: String,
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(rename = "datasetVersion")]
    dataset_version: DatasetVersion,
}

#[derive(Deserialize)]
struct DatasetVersion {
    files: Vec<FileEntry>,
}

#[derive(Deserialize)]
struct FileEntry {
    #[serde(rename = "dataFile")]
    data_file: DataFile,
}

#[derive(Deserialize)]
struct DataFile {
    #[serde(rename = "persistentId")]
    persistent_id: String,
    filename: String,
}

/// Reads the dataset metadata document and returns the chunk list in
/// file order.
///
/// # Errors
///
/// Returns [`ChunkError::MissingInput`] if the path does not exist, and
/// parse errors otherwise.
pub fn load_metadata(path: &Path) -> Result<Vec<ChunkDescriptor>, ChunkError> {
    if !path.exists() {
        return Err(ChunkError::MissingInput {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let metadata: Metadata = serde_json::from_str(&content)?;

    Ok(metadata
        .dataset_version
        .files
        .into_iter()
        .map(|entry| ChunkDescriptor {
            persistent_id: entry.data_file.persistent_id,
            filename: entry.data_file.filename,
        })
        .collect())
}

/// A source of raw activity chunks.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Fetches one chunk and returns the path of the raw file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError`] if the fetch fails.
    async fn fetch(
        &self,
        chunk: &ChunkDescriptor,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<PathBuf, ChunkError>;
}

/// Downloads chunks from a dataverse server over HTTP.
pub struct HttpChunkSource {
    client: reqwest::Client,
    server_url: String,
    protocol: String,
    download_dir: PathBuf,
}

impl HttpChunkSource {
    /// Creates a source downloading into `download_dir`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        server_url: &str,
        protocol: &str,
        download_dir: &Path,
    ) -> Self {
        Self {
            client,
            server_url: server_url.to_string(),
            protocol: protocol.to_string(),
            download_dir: download_dir.to_path_buf(),
        }
    }

    fn chunk_url(&self, chunk: &ChunkDescriptor) -> String {
        format!(
            "{}://{}/api/access/datafile/:persistentId?persistentId={}",
            self.protocol, self.server_url, chunk.persistent_id
        )
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn fetch(
        &self,
        chunk: &ChunkDescriptor,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<PathBuf, ChunkError> {
        let url = self.chunk_url(chunk);
        log::info!("Downloading chunk {} from {url}", chunk.filename);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!(
                "Chunk download failed for {}: status {status}, body: {body}",
                chunk.persistent_id
            );
            return Err(ChunkError::HttpStatus {
                url,
                status: status.as_u16(),
                body,
            });
        }

        if let Some(total) = response.content_length() {
            progress.set_total(total);
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let dest = self.download_dir.join(&chunk.filename);
        let mut file = tokio::fs::File::create(&dest).await?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        while let Some(part) = stream.next().await {
            let part = part?;
            file.write_all(&part).await?;
            downloaded += part.len() as u64;
            progress.set_position(downloaded);
        }
        file.flush().await?;

        log::debug!(
            "Downloaded {downloaded} bytes to {}",
            dest.display()
        );
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dataverse_metadata() {
        let dir = std::env::temp_dir().join("telegrid_metadata_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("metadata.json");
        std::fs::write(
            &path,
            r#"{"datasetVersion":{"files":[
                {"dataFile":{"persistentId":"doi:10.7910/DVN/ABC/1","filename":"sms-call-internet-mi-2013-11-01.txt"}},
                {"dataFile":{"persistentId":"doi:10.7910/DVN/ABC/2","filename":"sms-call-internet-mi-2013-11-02.txt"}}
            ]}}"#,
        )
        .unwrap();

        let chunks = load_metadata(&path).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].persistent_id, "doi:10.7910/DVN/ABC/1");
        assert_eq!(chunks[1].filename, "sms-call-internet-mi-2013-11-02.txt");
    }

    #[test]
    fn missing_metadata_is_reported() {
        assert!(matches!(
            load_metadata(Path::new("/nonexistent/metadata.json")),
            Err(ChunkError::MissingInput { .. })
        ));
    }

    #[test]
    fn chunk_url_addresses_the_persistent_id() {
        let source = HttpChunkSource::new(
            reqwest::Client::new(),
            "dataverse.harvard.edu",
            "https",
            Path::new("/tmp/chunks"),
        );
        let chunk = ChunkDescriptor {
            persistent_id: "doi:10.7910/DVN/ABC/1".to_string(),
            filename: "sms-call-internet-mi-2013-11-01.txt".to_string(),
        };
        assert_eq!(
            source.chunk_url(&chunk),
            "https://dataverse.harvard.edu/api/access/datafile/:persistentId?persistentId=doi:10.7910/DVN/ABC/1"
        );
    }
}
