//! Opening locations for reading.
//!
//! Local paths are read straight from the filesystem. Remote locations go
//! through a [`RemoteFetcher`]. Datasets install an [`HttpFetcher`] for
//! `http` and `https`; embedders can supply their own for other schemes.
//! Without a fetcher remote locations fail with `OperationFailed`.

use crate::config::AtomioConfig;
use crate::models::Location;
use crate::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default number of bytes sampled for format detection.
pub const DEFAULT_PREFIX_BYTES: usize = 4096;

/// Opens remote locations.
pub trait RemoteFetcher: Send + Sync {
    /// Opens a stream over the remote resource's bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be fetched.
    fn open(&self, location: &Location) -> Result<Box<dyn Read + Send>>;
}

/// Fetches `http` and `https` locations with a blocking `reqwest` client.
///
/// The client is built on first use.
#[derive(Debug, Default)]
pub struct HttpFetcher {
    client: OnceLock<reqwest::blocking::Client>,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    /// Creates a fetcher without a request timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher whose requests time out after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: OnceLock::new(),
            timeout: Some(timeout),
        }
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(|| {
            let mut builder = reqwest::blocking::Client::builder()
                .user_agent(format!("atomio/{}", env!("CARGO_PKG_VERSION")));
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
            builder
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new())
        })
    }
}

impl RemoteFetcher for HttpFetcher {
    #[tracing::instrument(skip_all, fields(location = %location.display_string()))]
    fn open(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        let url = match location {
            Location::Remote { scheme, url } if scheme == "http" || scheme == "https" => url,
            other => {
                return Err(Error::operation(
                    "open_location",
                    format!("unsupported URL scheme '{}'", other.scheme()),
                ));
            },
        };
        let response = self
            .client()
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| {
                Error::operation(
                    "fetch_location",
                    format!("{}: {}", location.display_string(), e.without_url()),
                )
            })?;
        tracing::debug!(status = response.status().as_u16(), "Remote location opened");
        Ok(Box::new(response))
    }
}

/// Opens local and remote locations.
#[derive(Clone)]
pub struct ResourceReader {
    remote: Option<Arc<dyn RemoteFetcher>>,
    prefix_bytes: usize,
}

impl ResourceReader {
    /// Creates a reader for local files only.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remote: None,
            prefix_bytes: DEFAULT_PREFIX_BYTES,
        }
    }

    /// Creates a reader sized and connected as `config` says, with an
    /// [`HttpFetcher`] for remote locations.
    #[must_use]
    pub fn from_config(config: &AtomioConfig) -> Self {
        let fetcher = match config.remote_timeout_secs {
            0 => HttpFetcher::new(),
            secs => HttpFetcher::with_timeout(Duration::from_secs(secs)),
        };
        Self::new()
            .with_prefix_bytes(config.detection_prefix_bytes)
            .with_remote(Arc::new(fetcher))
    }

    /// Sets the fetcher used for remote locations.
    #[must_use]
    pub fn with_remote(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.remote = Some(fetcher);
        self
    }

    /// Sets how many bytes [`sample`](Self::sample) reads.
    #[must_use]
    pub const fn with_prefix_bytes(mut self, prefix_bytes: usize) -> Self {
        self.prefix_bytes = prefix_bytes;
        self
    }

    /// Number of bytes sampled for detection.
    #[must_use]
    pub const fn prefix_bytes(&self) -> usize {
        self.prefix_bytes
    }

    /// Reads at most the configured prefix of a location.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be opened or read.
    pub fn sample(&self, location: &Location) -> Result<Vec<u8>> {
        let limit = u64::try_from(self.prefix_bytes).unwrap_or(u64::MAX);
        let mut prefix = Vec::with_capacity(self.prefix_bytes.min(64 * 1024));
        self.open_raw(location)?
            .take(limit)
            .read_to_end(&mut prefix)
            .map_err(|e| read_error(location, &e))?;
        Ok(prefix)
    }

    /// Opens a buffered stream over the whole location.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be opened.
    pub fn open(&self, location: &Location) -> Result<Box<dyn BufRead + Send>> {
        self.open_at(location, 0)
    }

    /// Opens a buffered stream positioned at `offset`.
    ///
    /// Local files seek; remote streams skip forward.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be opened or positioned.
    pub fn open_at(&self, location: &Location, offset: u64) -> Result<Box<dyn BufRead + Send>> {
        if let Some(path) = location.as_local_path() {
            let mut file = File::open(path).map_err(|e| read_error(location, &e))?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset))
                    .map_err(|e| read_error(location, &e))?;
            }
            return Ok(Box::new(BufReader::new(file)));
        }
        let mut stream = self.open_raw(location)?;
        if offset > 0 {
            let skipped = io::copy(&mut (&mut stream).take(offset), &mut io::sink())
                .map_err(|e| read_error(location, &e))?;
            if skipped < offset {
                return Err(Error::operation(
                    "open_location",
                    format!("{} ended before byte {offset}", location.display_string()),
                ));
            }
        }
        Ok(Box::new(BufReader::new(stream)))
    }

    fn open_raw(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        if let Some(path) = location.as_local_path() {
            let file = File::open(path).map_err(|e| read_error(location, &e))?;
            return Ok(Box::new(file));
        }
        match &self.remote {
            Some(fetcher) => fetcher.open(location),
            None => Err(Error::operation(
                "open_location",
                format!(
                    "no fetcher configured for remote location {}",
                    location.display_string()
                ),
            )),
        }
    }
}

impl Default for ResourceReader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceReader")
            .field("remote", &self.remote.is_some())
            .field("prefix_bytes", &self.prefix_bytes)
            .finish()
    }
}

fn read_error(location: &Location, error: &io::Error) -> Error {
    Error::operation(
        "read_location",
        format!("{}: {error}", location.display_string()),
    )
}
