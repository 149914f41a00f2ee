use eyre::Context as _;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

use crate::config::ensure_secure_url;

#[derive(Debug, Clone, Copy)]
pub struct QuoteRequest<'a> {
    pub input_mint: &'a str,
    pub output_mint: &'a str,
    pub amount: u64,
    pub slippage_bps: u16,
}

/// External swap aggregator: prices a route, then builds a ready-to-sign transaction for it.
pub trait SwapAggregator {
    /// Raw quote object. It is echoed back verbatim when building the transaction.
    async fn quote(&self, req: QuoteRequest<'_>) -> eyre::Result<Value>;

    /// Base64 prepared transaction for `quote`, paid for and signed by `trader`.
    async fn swap_transaction(&self, quote: &Value, trader: &Pubkey) -> eyre::Result<String>;
}

/// Pricing terms pulled out of a raw Jupiter quote for display and logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteTerms {
    pub in_amount: u64,
    pub out_amount: u64,
    pub other_amount_threshold: u64,
    pub slippage_bps: u16,
    pub price_impact_pct: Option<String>,
    pub route: Vec<String>,
}

fn u64_field(v: &Value, key: &str) -> eyre::Result<u64> {
    match v.get(key) {
        Some(Value::String(s)) => s.trim().parse().with_context(|| format!("parse {key}")),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| eyre::eyre!("{key} out of range")),
        _ => eyre::bail!("quote missing {key}"),
    }
}

impl QuoteTerms {
    pub fn from_quote(v: &Value) -> eyre::Result<Self> {
        let route: Vec<String> = v
            .get("routePlan")
            .and_then(Value::as_array)
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|s| s.pointer("/swapInfo/label").and_then(Value::as_str))
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if v.get("routePlan").and_then(Value::as_array).is_some_and(Vec::is_empty) {
            eyre::bail!("quote has an empty route plan");
        }
        let price_impact_pct = match v.get("priceImpactPct") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Ok(Self {
            in_amount: u64_field(v, "inAmount")?,
            out_amount: u64_field(v, "outAmount")?,
            other_amount_threshold: u64_field(v, "otherAmountThreshold").unwrap_or(0),
            slippage_bps: v
                .get("slippageBps")
                .and_then(Value::as_u64)
                .and_then(|n| u16::try_from(n).ok())
                .unwrap_or(0),
            price_impact_pct,
            route,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JupiterClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl JupiterClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> eyre::Result<Self> {
        ensure_secure_url("jupiter_base_url", base_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            api_key: api_key
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            http,
        })
    }

    fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(k) => req.header("x-api-key", k),
            None => req,
        }
    }

    async fn json_or_error(resp: reqwest::Response, label: &str) -> eyre::Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or(body);
            eyre::bail!("{label} status {status}: {detail}");
        }
        resp.json().await.with_context(|| format!("{label} json"))
    }
}

impl SwapAggregator for JupiterClient {
    async fn quote(&self, req: QuoteRequest<'_>) -> eyre::Result<Value> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode=ExactIn",
            self.base_url, req.input_mint, req.output_mint, req.amount, req.slippage_bps
        );
        tracing::debug!(%url, "jupiter quote request");
        let resp = self
            .with_key(self.http.get(url))
            .send()
            .await
            .context("jupiter quote request")?;
        Self::json_or_error(resp, "jupiter quote").await
    }

    async fn swap_transaction(&self, quote: &Value, trader: &Pubkey) -> eyre::Result<String> {
        let url = format!("{}/swap", self.base_url);
        let body = serde_json::json!({
          "quoteResponse": quote,
          "userPublicKey": trader.to_string(),
          "wrapAndUnwrapSol": true,
          "dynamicComputeUnitLimit": true
        });
        let resp = self
            .with_key(self.http.post(url))
            .json(&body)
            .send()
            .await
            .context("jupiter swap request")?;
        let v = Self::json_or_error(resp, "jupiter swap").await?;
        v.get("swapTransaction")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| eyre::eyre!("missing swapTransaction"))
    }
}
