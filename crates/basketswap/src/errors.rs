use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A structured error suitable for JSON output on stdout.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("invalid trader identity: {0}")]
    InvalidIdentity(String),

    #[error("unknown asset symbol: {symbol}")]
    UnknownAsset { symbol: String },

    #[error("basket fetch failed: {0}")]
    BasketFetchFailed(String),

    #[error("quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("simulation failed for {symbol}: {reason}")]
    SimulationFailed {
        symbol: String,
        reason: String,
        logs: Vec<String>,
    },

    #[error("no viable swaps ({attempted} assets attempted)")]
    NoViableSwaps { attempted: usize },

    #[error("submission failed: {0}")]
    SubmissionFailed(String),
}

impl SwapError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidAllocation(_) => "invalid_allocation",
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::UnknownAsset { .. } => "unknown_asset",
            Self::BasketFetchFailed(_) => "basket_fetch_failed",
            Self::QuoteUnavailable { .. } => "quote_unavailable",
            Self::SimulationFailed { .. } => "simulation_failed",
            Self::NoViableSwaps { .. } => "no_viable_swaps",
            Self::SubmissionFailed(_) => "submission_failed",
        }
    }

    /// Per-asset failures are dropped by the orchestrator; everything else
    /// aborts the call that produced it.
    pub const fn is_per_asset(&self) -> bool {
        matches!(
            self,
            Self::QuoteUnavailable { .. } | Self::SimulationFailed { .. }
        )
    }

    pub fn quote_unavailable(symbol: &str, e: &eyre::Report) -> Self {
        Self::QuoteUnavailable {
            symbol: symbol.to_owned(),
            reason: format!("{e:#}"),
        }
    }
}

impl From<SwapError> for ErrorReport {
    fn from(e: SwapError) -> Self {
        let message = e.to_string();
        let data = match &e {
            SwapError::SimulationFailed { logs, .. } => serde_json::json!({ "logs": logs }),
            SwapError::NoViableSwaps { attempted } => {
                serde_json::json!({ "attempted": attempted })
            }
            SwapError::InvalidRequest(_)
            | SwapError::InvalidAllocation(_)
            | SwapError::InvalidIdentity(_)
            | SwapError::UnknownAsset { .. }
            | SwapError::BasketFetchFailed(_)
            | SwapError::QuoteUnavailable { .. }
            | SwapError::SubmissionFailed(_) => Value::Null,
        };
        Self {
            code: e.code(),
            message,
            data,
        }
    }
}
