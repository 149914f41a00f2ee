use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{config::ensure_secure_url, errors::SwapError};

/// One asset's relative weight within a basket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    /// Relative weight, not an absolute token quantity.
    pub quantity: f64,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Id of the owning basket.
    #[serde(default, rename = "crateId")]
    pub basket_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Basket {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(rename = "tokens")]
    pub holdings: Vec<Holding>,
}

/// Client for the basket data backend (`GET {base}/crates/{id}`).
#[derive(Debug, Clone)]
pub struct BasketClient {
    base_url: String,
    http: Client,
}

impl BasketClient {
    pub fn new(base_url: &str, timeout: Duration) -> eyre::Result<Self> {
        ensure_secure_url("backend_base_url", base_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| eyre::eyre!("build http client: {e}"))?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            http,
        })
    }

    /// Single attempt; the caller re-triggers on failure.
    pub async fn fetch(&self, id: &str) -> Result<Basket, SwapError> {
        let id = id.trim();
        if id.is_empty() || id.contains('/') {
            return Err(SwapError::InvalidRequest(format!("invalid basket id {id:?}")));
        }
        let url = format!("{}/crates/{id}", self.base_url);
        tracing::debug!(%url, "fetching basket");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SwapError::BasketFetchFailed(format!("request: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SwapError::BasketFetchFailed(format!("status {status}")));
        }
        let basket: Basket = resp
            .json()
            .await
            .map_err(|e| SwapError::BasketFetchFailed(format!("decode: {e}")))?;
        tracing::info!(
            basket = %basket.id,
            name = %basket.name,
            holdings = basket.holdings.len(),
            "basket loaded"
        );
        Ok(basket)
    }
}
