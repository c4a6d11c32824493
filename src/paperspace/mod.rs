//! Read-only Paperspace control-plane client.
//!
//! Only the calls needed to pick an existing machine are implemented:
//! confirming the API key with [`ControlPlane::auth_session`] and listing
//! machines with [`ControlPlane::list_machines`].

mod types;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, PaperspaceConfig};

pub use types::{AuthSession, Machine, SessionTeam, SessionUser};
use types::MachinePage;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_LIMIT: &str = "100";
const MAX_PAGES: usize = 50;

/// Errors raised by the Paperspace client.
#[derive(Debug, Error)]
pub enum PaperspaceError {
    /// Raised when the client configuration is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a request cannot be sent.
    #[error("paperspace request to {path} failed: {message}")]
    Http {
        /// API path requested.
        path: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the API answers with a non-success status.
    #[error("paperspace API returned {status} for {path}: {body}")]
    Status {
        /// API path requested.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode paperspace response from {path}: {message}")]
    Decode {
        /// API path requested.
        path: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when the machine listing does not end within the page limit.
    #[error("paperspace listed more than {pages} pages of machines")]
    TooManyPages {
        /// Pages fetched before giving up.
        pages: usize,
    },
}

/// Future returned by control-plane operations.
pub type ControlPlaneFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, PaperspaceError>> + Send + 'a>>;

/// Read path of a provider control plane.
pub trait ControlPlane {
    /// Confirms the credentials and describes who they belong to.
    fn auth_session(&self) -> ControlPlaneFuture<'_, AuthSession>;

    /// Lists every machine visible to the credentials.
    fn list_machines(&self) -> ControlPlaneFuture<'_, Vec<Machine>>;
}

/// HTTP client for the Paperspace public API.
#[derive(Clone, Debug)]
pub struct PaperspaceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PaperspaceClient {
    /// Builds a client for `base_url` authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`PaperspaceError::Http`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, PaperspaceError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| PaperspaceError::Http {
                path: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }

    /// Builds a client from layered configuration, preferring `explicit_key`.
    ///
    /// # Errors
    ///
    /// Returns [`PaperspaceError::Config`] when no API key is available.
    pub fn from_config(
        config: &PaperspaceConfig,
        explicit_key: Option<&str>,
    ) -> Result<Self, PaperspaceError> {
        config.validate()?;
        let api_key = config.resolve_api_key(explicit_key)?;
        Self::new(config.api_base_url.as_str(), api_key)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PaperspaceError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%path, "paperspace request");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|err| PaperspaceError::Http {
                path: path.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaperspaceError::Status {
                path: path.to_owned(),
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| PaperspaceError::Decode {
                path: path.to_owned(),
                message: err.to_string(),
            })
    }

    async fn fetch_machines(&self) -> Result<Vec<Machine>, PaperspaceError> {
        let mut machines = Vec::new();
        let mut cursor: Option<String> = None;
        for fetched in 1..=MAX_PAGES {
            let mut query = vec![("limit", PAGE_LIMIT)];
            if let Some(after) = cursor.as_deref() {
                query.push(("after", after));
            }
            let page: MachinePage = self.get("/machines", &query).await?;
            let next = following_cursor(&page, fetched)?;
            machines.extend(page.items);
            match next {
                Some(after) => cursor = Some(after),
                None => break,
            }
        }
        Ok(machines)
    }
}

/// Cursor for the page after `page`, which was the `fetched`-th page.
///
/// A listing that still has more pages at the limit is an error: a partial
/// list would make a present machine look missing.
fn following_cursor(page: &MachinePage, fetched: usize) -> Result<Option<String>, PaperspaceError> {
    let next = page.next_cursor().map(str::to_owned);
    if next.is_some() && fetched >= MAX_PAGES {
        warn!(pages = fetched, "machine listing exceeds the page limit");
        return Err(PaperspaceError::TooManyPages { pages: fetched });
    }
    Ok(next)
}

impl ControlPlane for PaperspaceClient {
    fn auth_session(&self) -> ControlPlaneFuture<'_, AuthSession> {
        Box::pin(self.get("/auth/session", &[]))
    }

    fn list_machines(&self) -> ControlPlaneFuture<'_, Vec<Machine>> {
        Box::pin(self.fetch_machines())
    }
}
