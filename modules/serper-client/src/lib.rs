pub mod error;
pub mod types;

pub use error::{Result, SerperError};
pub use types::{OrganicResult, SearchRequest, SearchResponse};

use std::time::Duration;

const BASE_URL: &str = "https://google.serper.dev";

/// HTTP-level timeout. Callers usually wrap requests in a tighter deadline
/// of their own; this is the last-resort bound.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SerperClient {
    client: reqwest::Client,
    api_key: String,
}

impl SerperClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.into(),
        }
    }

    /// Run one search query and return its organic results.
    pub async fn search(&self, query: &str, num: u32) -> Result<Vec<OrganicResult>> {
        tracing::debug!(query, num, "Serper search request");

        let resp = self
            .client
            .post(format!("{BASE_URL}/search"))
            .header("X-API-KEY", &self.api_key)
            .json(&SearchRequest { q: query, num })
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(SerperError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SerperError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: SearchResponse = resp.json().await?;
        tracing::debug!(query, count = data.organic.len(), "Serper search complete");
        Ok(data.organic)
    }
}
