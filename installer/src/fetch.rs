//! Artifact download over HTTPS.
//!
//! Provides a trait-based abstraction for fetching artifact bytes, enabling
//! dependency injection for testing. The fetcher performs exactly one
//! request per call and never retries; retry policy belongs to the caller
//! (see [`crate::pipeline::RetryPolicy`]).

use log::debug;
use std::io::Read;
use std::time::Duration;

/// Default network timeout for a whole artifact download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_mins(1);

/// Trait for downloading artifact bytes.
///
/// # Examples
///
/// ```
/// use lm_tap_installer::fetch::{ArtefactFetcher, HttpFetcher, DEFAULT_FETCH_TIMEOUT};
///
/// let fetcher = HttpFetcher::new(DEFAULT_FETCH_TIMEOUT);
/// // fetcher.fetch("https://github.com/...") in production
/// # let _ = &fetcher as &dyn ArtefactFetcher;
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactFetcher {
    /// Download `url` completely into memory.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on connection failure, timeout, or any
    /// non-2xx status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Errors arising from artifact download operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The server answered 404.
    #[error("artifact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The server answered with another non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The response status code.
        status: u16,
    },

    /// The request did not complete in time.
    #[error("download of {url} timed out")]
    Timeout {
        /// The URL that was requested.
        url: String,
    },

    /// Any other transport failure: DNS, TLS, connection reset, body read.
    #[error("download failed for {url}: {reason}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },
}

/// HTTPS downloader built on `ureq`.
#[derive(Debug)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    ///
    /// Plain-http urls are refused by the agent, so a formula can never
    /// downgrade the transport.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .https_only(true)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl ArtefactFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("GET {url}");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;

        let mut bytes = Vec::new();
        response
            .into_body()
            .as_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| FetchError::Transport {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        debug!("received {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(404) => FetchError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::StatusCode(status) => FetchError::Status {
            url: url.to_owned(),
            status: *status,
        },
        ureq::Error::Timeout(_) => FetchError::Timeout {
            url: url.to_owned(),
        },
        other => FetchError::Transport {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
