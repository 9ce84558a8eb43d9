//! Stock image provider client (Pexels-style API)
//!
//! Text query → ranked list of image URLs. The provider does not report a
//! relevance score, so rank is converted into one (first hit = 1.0).

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::images::{ImageHit, ImageProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::num::NonZeroU32;
use tracing::debug;

pub const SOURCE_NAME: &str = "pexels";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    src: PhotoSources,
}

#[derive(Debug, Deserialize)]
struct PhotoSources {
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    original: Option<String>,
}

pub struct StockImageClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl StockImageClient {
    pub fn new(providers: &ProviderConfig) -> Result<Self, ProviderError> {
        let rps = NonZeroU32::new(providers.stock_requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_second(rps));

        let client = reqwest::Client::builder()
            .user_agent(concat!("mediq/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::from_reqwest(SOURCE_NAME, e))?;

        Ok(Self {
            client,
            base_url: providers.stock_base_url.trim_end_matches('/').to_string(),
            api_key: providers.resolve_stock_key(),
            rate_limiter,
        })
    }
}

/// Rank → relevance in (0, 1], first hit = 1.0
fn rank_relevance(rank: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    1.0 - rank as f64 / total as f64
}

fn hits_from_response(response: SearchResponse, limit: usize) -> Vec<ImageHit> {
    let urls: Vec<String> = response
        .photos
        .into_iter()
        .filter_map(|p| p.src.large.or(p.src.original))
        .take(limit)
        .collect();
    let total = urls.len();

    urls.into_iter()
        .enumerate()
        .map(|(rank, url)| ImageHit {
            url,
            relevance: rank_relevance(rank, total),
            provider: SOURCE_NAME.to_string(),
        })
        .collect()
}

#[async_trait]
impl ImageProvider for StockImageClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ImageHit>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ProviderError::NotConfigured {
            provider: SOURCE_NAME.to_string(),
        })?;

        debug!(query, limit, "Searching stock images");

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .header(reqwest::header::AUTHORIZATION, api_key)
            .query(&[("query", query.to_string()), ("per_page", limit.to_string())])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(SOURCE_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: SOURCE_NAME.to_string(),
                status: status.as_u16(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| ProviderError::Parse {
            provider: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        Ok(hits_from_response(body, limit))
    }
}
