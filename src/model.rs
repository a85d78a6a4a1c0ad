//! Retrieval of the project archive a print was started from.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use url::Url;

use crate::{ArchiveFile, ModelProvider, TemporaryFile};

/// Why a project archive is unavailable.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model reference is neither a URL nor an absolute path.
    #[error("invalid model url {url}: {source}")]
    InvalidUrl {
        /// The reference as received.
        url: String,
        /// Underlying error.
        #[source]
        source: url::ParseError,
    },

    /// The reference uses a scheme which cannot be fetched from here, e.g.
    /// the printer's own storage.
    #[error("unsupported model url scheme {0}")]
    UnsupportedScheme(String),

    /// A local archive does not exist.
    #[error("model archive {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// Downloading the archive failed.
    #[error("failed to download {url}: {source}")]
    Download {
        /// The url requested.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The download could not be stored.
    #[error("failed to store downloaded model: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches project archives over http(s), or uses them in place when they
/// are already on the local filesystem.
#[derive(Debug, Clone)]
pub struct ModelFetcher {
    client: reqwest::Client,
}

impl ModelFetcher {
    /// Create a new fetcher; downloads taking longer than `timeout` fail.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn download(&self, url: Url) -> Result<ArchiveFile, ModelError> {
        tracing::debug!(url = url.as_str(), "downloading model");

        let download_error = |source| ModelError::Download {
            url: url.to_string(),
            source,
        };
        let bytes = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(download_error)?
            .bytes()
            .await
            .map_err(download_error)?;

        let file = tempfile::Builder::new()
            .prefix("spool-tracker-")
            .suffix(".3mf")
            .tempfile()?;
        let (_, path) = file.keep().map_err(|err| err.error)?;
        let file = TemporaryFile::new(&path);
        tokio::fs::write(file.path(), &bytes).await?;

        tracing::debug!(path = format!("{:?}", file.path()), bytes = bytes.len(), "model downloaded");
        Ok(ArchiveFile::Temporary(file))
    }
}

fn existing(path: PathBuf) -> Result<ArchiveFile, ModelError> {
    if path.is_file() {
        Ok(ArchiveFile::Existing(path))
    } else {
        Err(ModelError::NotFound(path))
    }
}

impl ModelProvider for ModelFetcher {
    type Error = ModelError;

    async fn fetch(&self, url: &str) -> Result<ArchiveFile, ModelError> {
        if Path::new(url).is_absolute() {
            return existing(PathBuf::from(url));
        }

        let parsed = Url::parse(url).map_err(|source| ModelError::InvalidUrl {
            url: url.to_owned(),
            source,
        })?;

        match parsed.scheme() {
            "http" | "https" => self.download(parsed).await,
            "file" => match parsed.to_file_path() {
                Ok(path) => existing(path),
                Err(()) => Err(ModelError::UnsupportedScheme("file".to_owned())),
            },
            scheme => Err(ModelError::UnsupportedScheme(scheme.to_owned())),
        }
    }
}
