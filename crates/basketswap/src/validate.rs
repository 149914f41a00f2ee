use serde::Serialize;
use solana_sdk::hash::Hash;
use std::time::Instant;

use crate::{errors::SwapError, ledger::Ledger, quote::SwapQuote};

/// A swap whose transaction passed a dry run against current chain state.
///
/// Only values of this type are accepted for submission. They are never persisted and
/// go stale: see [`ValidatedSwap::age_secs`].
#[derive(Debug, Clone)]
pub struct ValidatedSwap {
    pub quote: SwapQuote,
    pub blockhash: Hash,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
    pub validated_at: Instant,
}

impl ValidatedSwap {
    pub fn age_secs(&self) -> u64 {
        self.validated_at.elapsed().as_secs()
    }

    pub fn summary(&self) -> ValidatedSwapSummary {
        ValidatedSwapSummary {
            symbol: self.quote.plan.symbol.clone(),
            output_mint: self.quote.plan.output.mint.clone(),
            substituted: self.quote.plan.output.substituted,
            in_amount: self.quote.terms.in_amount,
            out_amount: self.quote.terms.out_amount,
            min_out_amount: self.quote.terms.other_amount_threshold,
            price_impact_pct: self.quote.terms.price_impact_pct.clone(),
            route: self.quote.terms.route.clone(),
            blockhash: self.blockhash.to_string(),
            units_consumed: self.units_consumed,
            logs: self.logs.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidatedSwapSummary {
    pub symbol: String,
    pub output_mint: String,
    pub substituted: bool,
    pub in_amount: u64,
    pub out_amount: u64,
    pub min_out_amount: u64,
    pub price_impact_pct: Option<String>,
    pub route: Vec<String>,
    pub blockhash: String,
    pub units_consumed: Option<u64>,
    pub logs: Vec<String>,
}

#[derive(Debug)]
pub struct TransactionValidator<'a, L> {
    ledger: &'a L,
}

impl<'a, L: Ledger> TransactionValidator<'a, L> {
    pub const fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Pin a fresh blockhash, then dry-run. Nothing is broadcast here.
    pub async fn validate(&self, quote: SwapQuote) -> Result<ValidatedSwap, SwapError> {
        let symbol = quote.plan.symbol.clone();
        let failed = |reason: String, logs: Vec<String>| SwapError::SimulationFailed {
            symbol: symbol.clone(),
            reason,
            logs,
        };

        let blockhash = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(|e| failed(format!("{e:#}"), vec![]))?;
        let mut quote = quote;
        quote.transaction.message.set_recent_blockhash(blockhash);

        let sim = self
            .ledger
            .simulate(&quote.transaction)
            .await
            .map_err(|e| failed(format!("{e:#}"), vec![]))?;
        for line in &sim.logs {
            tracing::debug!(symbol = %symbol, "sim: {line}");
        }
        if let Some(err) = sim.err {
            return Err(failed(err, sim.logs));
        }

        tracing::info!(
            symbol = %symbol,
            units_consumed = sim.units_consumed,
            "simulation passed"
        );
        Ok(ValidatedSwap {
            quote,
            blockhash,
            logs: sim.logs,
            units_consumed: sim.units_consumed,
            validated_at: Instant::now(),
        })
    }
}
