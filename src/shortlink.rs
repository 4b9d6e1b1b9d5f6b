//! Short-link API client.
//!
//! Looks up a gfycat short name and returns its direct mp4 and gif URLs.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter as GovRateLimiter};
use serde::Deserialize;

use crate::config::ScanSettings;
use crate::error::{AntiCrashError, Result};

/// Rate limiter type alias.
type RateLimiter = GovRateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API response envelope.
#[derive(Debug, Default, Deserialize)]
struct ShortLinkResponse {
    #[serde(rename = "gfyItem", default)]
    item: ShortLinkItem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortLinkItem {
    #[serde(default)]
    mp4_url: Option<String>,
    #[serde(default)]
    gif_url: Option<String>,
}

/// Client for the short-link hosting API.
pub struct ShortLinkClient {
    client: reqwest::Client,
    api_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl ShortLinkClient {
    /// Create a new ShortLinkClient using the shared HTTP client.
    pub fn new(client: reqwest::Client, settings: &ScanSettings) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(settings.shortlink_requests_per_minute).unwrap_or(NonZeroU32::MIN),
        );

        Self {
            client,
            api_url: settings.shortlink_api_url.clone(),
            rate_limiter: Arc::new(GovRateLimiter::direct(quota)),
        }
    }

    /// `[mp4, gif]` for a short name, or an empty list on any failure.
    ///
    /// Either entry may be an empty string when the API omits it.
    pub async fn resolve(&self, name: &str) -> Vec<String> {
        match self.try_resolve(name).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::debug!(name = %name, error = %e, "Short link lookup failed");
                Vec::new()
            }
        }
    }

    /// Fallible lookup used by [`ShortLinkClient::resolve`].
    pub async fn try_resolve(&self, name: &str) -> Result<Vec<String>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.api_url, name);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(AntiCrashError::HttpStatus(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: ShortLinkResponse = serde_json::from_slice(&body)?;

        Ok(vec![
            parsed.item.mp4_url.unwrap_or_default(),
            parsed.item.gif_url.unwrap_or_default(),
        ])
    }
}
