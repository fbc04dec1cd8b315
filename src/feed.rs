//! Station feed sources.
//!
//! A feed source produces one [`FeedPayload`] per fetch. The collector only
//! depends on the [`FeedSource`] trait; [`HttpFeed`] is the production source
//! reading a bikeStations XML document over HTTP.

pub mod xml;

use crate::constants::{FETCH_TIMEOUT_SECS, USER_AGENT};
use crate::error::{CollectorError, Result};
use crate::models::FeedPayload;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub use xml::parse_station_xml;

/// Anything that can report current station availability
pub trait FeedSource {
    /// Fetch and parse the current state of every station
    ///
    /// # Errors
    /// * `Fetch` for transport failures
    /// * `Parse` for payloads that cannot be read
    fn fetch(&self) -> impl Future<Output = Result<FeedPayload>> + Send;

    /// Human-readable origin, used in logs
    fn describe(&self) -> String;
}

/// Fetch twice and only accept the payload when both reads agree
///
/// Guards against feeds that occasionally serve a half-refreshed document.
pub async fn fetch_verified<F: FeedSource>(feed: &F) -> Result<FeedPayload> {
    let first = feed.fetch().await?;
    let second = feed.fetch().await?;
    if first != second {
        debug!("Redundant fetch from {} did not match", feed.describe());
        return Err(CollectorError::InconsistentFeed);
    }
    Ok(first)
}

/// bikeStations XML feed served over HTTP
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| CollectorError::Fetch {
                url: url.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_text(&self) -> Result<String> {
        let fetch_error = |e: reqwest::Error| CollectorError::Fetch {
            url: self.url.clone(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(fetch_error)?
            .error_for_status()
            .map_err(fetch_error)?;
        response.text().await.map_err(fetch_error)
    }
}

impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<FeedPayload> {
        let body = self.fetch_text().await?;
        debug!("Fetched {} bytes from {}", body.len(), self.url);
        parse_station_xml(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
