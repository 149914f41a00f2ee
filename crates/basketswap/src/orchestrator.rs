use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

use crate::{
    allocation::{allocate, weight_from_f64},
    assets::AssetRegistry,
    basket::Basket,
    config::{SwapConfig, UnknownSymbolPolicy},
    errors::SwapError,
    jupiter::{QuoteTerms, SwapAggregator},
    ledger::Ledger,
    quote::{QuoteAcquirer, SwapPlan},
    retry::BackoffConfig,
    validate::{TransactionValidator, ValidatedSwap, ValidatedSwapSummary},
};

/// An asset whose pipeline failed. The run carries on without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedAsset {
    pub symbol: String,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl DroppedAsset {
    fn from_error(symbol: &str, e: SwapError) -> Self {
        let code = e.code();
        let message = e.to_string();
        let logs = match e {
            SwapError::SimulationFailed { logs, .. } => logs,
            SwapError::InvalidRequest(_)
            | SwapError::InvalidAllocation(_)
            | SwapError::InvalidIdentity(_)
            | SwapError::UnknownAsset { .. }
            | SwapError::BasketFetchFailed(_)
            | SwapError::QuoteUnavailable { .. }
            | SwapError::NoViableSwaps { .. }
            | SwapError::SubmissionFailed(_) => vec![],
        };
        Self {
            symbol: symbol.to_owned(),
            code,
            message,
            logs,
        }
    }
}

/// Successes in basket order, plus what was dropped on the way.
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    pub swaps: Vec<ValidatedSwap>,
    pub attempted: usize,
    pub dropped: Vec<DroppedAsset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationSummary {
    pub ready: usize,
    pub attempted: usize,
    pub swaps: Vec<ValidatedSwapSummary>,
    pub dropped: Vec<DroppedAsset>,
}

impl OrchestrationResult {
    pub fn summary(&self) -> OrchestrationSummary {
        OrchestrationSummary {
            ready: self.swaps.len(),
            attempted: self.attempted,
            swaps: self.swaps.iter().map(ValidatedSwap::summary).collect(),
            dropped: self.dropped.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PricedAsset {
    pub plan: SwapPlan,
    pub terms: QuoteTerms,
}

/// Read-only counterpart of [`OrchestrationResult`]: prices, no transactions.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub ready: usize,
    pub attempted: usize,
    pub quotes: Vec<PricedAsset>,
    pub dropped: Vec<DroppedAsset>,
}

pub struct Orchestrator<A, L> {
    aggregator: A,
    ledger: L,
    registry: AssetRegistry,
    swap: SwapConfig,
    backoff: BackoffConfig,
    require_jupiter_program: bool,
}

impl<A: SwapAggregator, L: Ledger> Orchestrator<A, L> {
    pub const fn new(
        aggregator: A,
        ledger: L,
        registry: AssetRegistry,
        swap: SwapConfig,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            aggregator,
            ledger,
            registry,
            swap,
            backoff,
            require_jupiter_program: true,
        }
    }

    /// Skip the Jupiter program allowlist (local or mock aggregators).
    #[must_use]
    pub const fn without_provider_check(mut self) -> Self {
        self.require_jupiter_program = false;
        self
    }

    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    pub const fn swap_config(&self) -> &SwapConfig {
        &self.swap
    }

    fn acquirer(&self) -> QuoteAcquirer<'_, A> {
        QuoteAcquirer::new(
            &self.aggregator,
            self.swap.slippage_bps,
            self.backoff.clone(),
            self.require_jupiter_program,
        )
    }

    /// Allocation and symbol resolution for every holding. Makes no external calls.
    pub fn plan(&self, basket: &Basket, total_input: u64) -> Result<Vec<SwapPlan>, SwapError> {
        if basket.holdings.is_empty() {
            return Err(SwapError::InvalidRequest(format!(
                "basket {} has no holdings",
                basket.id
            )));
        }
        if total_input == 0 {
            return Err(SwapError::InvalidRequest(
                "total input amount must be positive".into(),
            ));
        }

        let weights = basket
            .holdings
            .iter()
            .map(|h| weight_from_f64(&h.symbol, h.quantity))
            .collect::<Result<Vec<_>, _>>()?;
        let total_weight = weights
            .iter()
            .try_fold(Decimal::ZERO, |acc, w| acc.checked_add(*w))
            .ok_or_else(|| SwapError::InvalidAllocation("weight sum overflow".into()))?;

        if self.swap.unknown_symbol_policy == UnknownSymbolPolicy::Reject {
            if let Some(h) = basket
                .holdings
                .iter()
                .find(|h| !self.registry.contains(&h.symbol))
            {
                return Err(SwapError::UnknownAsset {
                    symbol: h.symbol.clone(),
                });
            }
        }

        let total = Decimal::from(total_input);
        let decimals = self.swap.input_decimals;
        basket
            .holdings
            .iter()
            .zip(weights)
            .map(|(h, w)| {
                // The amount is paid in the input asset, so both precisions are the input's.
                let amount = allocate(total, w, total_weight, decimals, decimals)?;
                Ok(SwapPlan {
                    symbol: h.symbol.clone(),
                    input_mint: self.swap.input_mint.clone(),
                    amount,
                    output: self.registry.resolve(&h.symbol),
                })
            })
            .collect()
    }

    /// Quote, build and simulate every holding concurrently; keep what passes.
    ///
    /// Dropping the returned future cancels every outstanding call of the run.
    pub async fn orchestrate(
        &self,
        basket: &Basket,
        total_input: u64,
        trader: &Pubkey,
    ) -> Result<OrchestrationResult, SwapError> {
        let plans = self.plan(basket, total_input)?;
        let attempted = plans.len();
        let acquirer = self.acquirer();
        let validator = TransactionValidator::new(&self.ledger);

        let outcomes = join_all(plans.iter().map(|plan| async {
            let quote = acquirer.acquire(plan, trader).await?;
            validator.validate(quote).await
        }))
        .await;

        let mut swaps = Vec::with_capacity(attempted);
        let mut dropped = Vec::new();
        for (plan, outcome) in plans.iter().zip(outcomes) {
            match outcome {
                Ok(v) => swaps.push(v),
                Err(e) if e.is_per_asset() => dropped.push(drop_asset(&plan.symbol, e)),
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            basket = %basket.id,
            ready = swaps.len(),
            attempted,
            "{} of {attempted} assets ready",
            swaps.len()
        );
        if swaps.is_empty() {
            return Err(SwapError::NoViableSwaps { attempted });
        }
        Ok(OrchestrationResult {
            swaps,
            attempted,
            dropped,
        })
    }

    /// Quote-only run for callers without a trader identity.
    pub async fn preview(
        &self,
        basket: &Basket,
        total_input: u64,
    ) -> Result<PreviewResult, SwapError> {
        let plans = self.plan(basket, total_input)?;
        let attempted = plans.len();
        let acquirer = self.acquirer();

        let outcomes = join_all(plans.iter().map(|plan| acquirer.price(plan))).await;

        let mut quotes = Vec::with_capacity(attempted);
        let mut dropped = Vec::new();
        for (plan, outcome) in plans.into_iter().zip(outcomes) {
            match outcome {
                Ok((_raw, terms)) => quotes.push(PricedAsset { plan, terms }),
                Err(e) if e.is_per_asset() => dropped.push(drop_asset(&plan.symbol, e)),
                Err(e) => return Err(e),
            }
        }
        if quotes.is_empty() {
            return Err(SwapError::NoViableSwaps { attempted });
        }
        Ok(PreviewResult {
            ready: quotes.len(),
            attempted,
            quotes,
            dropped,
        })
    }
}

fn drop_asset(symbol: &str, e: SwapError) -> DroppedAsset {
    tracing::warn!(symbol, code = e.code(), error = %e, "asset dropped");
    DroppedAsset::from_error(symbol, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        jupiter::QuoteRequest,
        ledger::SimulationOutcome,
        quote::tests::{fast_backoff, jupiter_program, prepared_tx, quote_json},
    };
    use base64::Engine as _;
    use serde_json::Value;
    use solana_sdk::{
        hash::Hash, message::VersionedMessage, signature::Signature,
        transaction::VersionedTransaction,
    };
    use std::{cell::Cell, collections::BTreeMap, rc::Rc, time::Duration};

    const TOKENS: &str = r#"[
      {"symbol": "AAA", "name": "A", "address": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1", "decimals": 6},
      {"symbol": "BBB", "name": "B", "address": "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB1", "decimals": 6},
      {"symbol": "CCC", "name": "C", "address": "CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC1", "decimals": 9}
    ]"#;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Behaviour {
        Ok,
        NoRoute,
        Hang,
        SimFail,
    }

    #[derive(Default)]
    struct Calls {
        quotes: Cell<usize>,
        builds: Cell<usize>,
        sims: Cell<usize>,
    }

    /// Behaviour keyed by output mint; the build tags the tx with the mint's first byte.
    struct FakeAggregator {
        by_mint: BTreeMap<String, Behaviour>,
        calls: Rc<Calls>,
    }

    impl FakeAggregator {
        fn behaviour(&self, mint: &str) -> Behaviour {
            self.by_mint.get(mint).copied().unwrap_or(Behaviour::Ok)
        }
    }

    fn tag_for(mint: &str) -> u8 {
        mint.bytes().next().unwrap_or(0)
    }

    impl SwapAggregator for FakeAggregator {
        async fn quote(&self, req: QuoteRequest<'_>) -> eyre::Result<Value> {
            self.calls.quotes.set(self.calls.quotes.get() + 1);
            match self.behaviour(req.output_mint) {
                Behaviour::NoRoute => eyre::bail!("Could not find any route"),
                Behaviour::Hang => std::future::pending().await,
                Behaviour::Ok | Behaviour::SimFail => {
                    let mut q = quote_json(req.amount);
                    if let Some(obj) = q.as_object_mut() {
                        obj.insert("outputMint".into(), Value::String(req.output_mint.into()));
                    }
                    Ok(q)
                }
            }
        }

        async fn swap_transaction(&self, quote: &Value, trader: &Pubkey) -> eyre::Result<String> {
            self.calls.builds.set(self.calls.builds.get() + 1);
            let mint = quote
                .get("outputMint")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let mut tx = prepared_tx(trader, &jupiter_program()?)?;
            if let VersionedMessage::V0(m) = &mut tx.message {
                for ix in &mut m.instructions {
                    ix.data.push(tag_for(mint));
                }
            }
            Ok(base64::engine::general_purpose::STANDARD.encode(bincode::serialize(&tx)?))
        }
    }

    struct FakeLedger {
        fail_tags: Vec<u8>,
        calls: Rc<Calls>,
    }

    impl Ledger for FakeLedger {
        async fn latest_blockhash(&self) -> eyre::Result<Hash> {
            Ok(Hash::new_from_array([3; 32]))
        }

        async fn simulate(&self, tx: &VersionedTransaction) -> eyre::Result<SimulationOutcome> {
            self.calls.sims.set(self.calls.sims.get() + 1);
            let tag = tx
                .message
                .instructions()
                .first()
                .and_then(|ix| ix.data.last().copied())
                .unwrap_or(0);
            if self.fail_tags.contains(&tag) {
                return Ok(SimulationOutcome {
                    err: Some("InstructionError(2, Custom(6001))".into()),
                    logs: vec!["Program log: slippage tolerance exceeded".into()],
                    units_consumed: Some(50_000),
                });
            }
            Ok(SimulationOutcome {
                err: None,
                logs: vec![format!("ok tag {tag}")],
                units_consumed: Some(120_000),
            })
        }

        async fn send(&self, _tx: &VersionedTransaction) -> eyre::Result<Signature> {
            eyre::bail!("orchestration must never send")
        }
    }

    fn basket(holdings: &[(&str, f64)]) -> eyre::Result<Basket> {
        let tokens: Vec<Value> = holdings
            .iter()
            .enumerate()
            .map(|(i, (sym, q))| {
                serde_json::json!({"id": format!("t{i}"), "symbol": sym, "quantity": q, "crateId": "c1"})
            })
            .collect();
        Ok(serde_json::from_value(
            serde_json::json!({"id": "c1", "name": "Test", "tokens": tokens}),
        )?)
    }

    fn mint_of(sym: &str) -> String {
        format!("{}1", sym.repeat(15).get(..43).unwrap_or_default())
    }

    fn orchestrator(
        behaviours: &[(&str, Behaviour)],
        policy: UnknownSymbolPolicy,
    ) -> eyre::Result<(Orchestrator<FakeAggregator, FakeLedger>, Rc<Calls>)> {
        let calls = Rc::new(Calls::default());
        let by_mint = behaviours
            .iter()
            .filter(|(_, b)| *b != Behaviour::SimFail)
            .map(|(s, b)| (mint_of(s), *b))
            .collect();
        let fail_tags = behaviours
            .iter()
            .filter(|(_, b)| *b == Behaviour::SimFail)
            .map(|(s, _)| tag_for(&mint_of(s)))
            .collect();
        let swap = SwapConfig {
            unknown_symbol_policy: policy,
            ..SwapConfig::default()
        };
        let backoff = BackoffConfig {
            attempt_timeout: Duration::from_millis(100),
            ..fast_backoff()
        };
        let orch = Orchestrator::new(
            FakeAggregator {
                by_mint,
                calls: Rc::clone(&calls),
            },
            FakeLedger {
                fail_tags,
                calls: Rc::clone(&calls),
            },
            AssetRegistry::from_json(TOKENS)?,
            swap,
            backoff,
        );
        Ok((orch, calls))
    }

    #[test]
    fn test_mints_match_token_table() {
        assert_eq!(mint_of("AAA"), "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1");
    }

    #[tokio::test]
    async fn one_failed_quote_leaves_the_rest() -> eyre::Result<()> {
        let (orch, _) = orchestrator(&[("BBB", Behaviour::NoRoute)], UnknownSymbolPolicy::Substitute)?;
        let b = basket(&[("AAA", 50.0), ("BBB", 30.0), ("CCC", 20.0)])?;
        let r = orch.orchestrate(&b, 1_000_000, &Pubkey::new_unique()).await?;
        let got: Vec<&str> = r.swaps.iter().map(|s| s.quote.plan.symbol.as_str()).collect();
        assert_eq!(got, vec!["AAA", "CCC"]);
        assert_eq!(r.attempted, 3);
        assert_eq!(r.dropped.len(), 1);
        let d = r.dropped.first().ok_or_else(|| eyre::eyre!("no dropped asset"))?;
        assert_eq!((d.symbol.as_str(), d.code), ("BBB", "quote_unavailable"));
        Ok(())
    }

    #[tokio::test]
    async fn every_quote_failing_is_no_viable_swaps() -> eyre::Result<()> {
        let (orch, calls) = orchestrator(
            &[("AAA", Behaviour::NoRoute), ("BBB", Behaviour::NoRoute)],
            UnknownSymbolPolicy::Substitute,
        )?;
        let b = basket(&[("AAA", 1.0), ("BBB", 1.0)])?;
        let r = orch.orchestrate(&b, 10_000, &Pubkey::new_unique()).await;
        assert_eq!(r.err(), Some(SwapError::NoViableSwaps { attempted: 2 }));
        assert_eq!(calls.sims.get(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unresponsive_asset_times_out_alone() -> eyre::Result<()> {
        let (orch, _) = orchestrator(&[("BBB", Behaviour::Hang)], UnknownSymbolPolicy::Substitute)?;
        let b = basket(&[("AAA", 1.0), ("BBB", 1.0), ("CCC", 1.0)])?;
        let r = orch.orchestrate(&b, 3_000, &Pubkey::new_unique()).await?;
        assert_eq!(r.swaps.len(), 2);
        let d = r.dropped.first().ok_or_else(|| eyre::eyre!("no dropped asset"))?;
        assert!(d.message.contains("timed out"), "{}", d.message);
        Ok(())
    }

    #[tokio::test]
    async fn simulation_failure_keeps_logs_and_success_keeps_its_own() -> eyre::Result<()> {
        let (orch, _) = orchestrator(&[("CCC", Behaviour::SimFail)], UnknownSymbolPolicy::Substitute)?;
        let b = basket(&[("AAA", 1.0), ("CCC", 1.0)])?;
        let r = orch.orchestrate(&b, 2_000, &Pubkey::new_unique()).await?;
        let ok = r.swaps.first().ok_or_else(|| eyre::eyre!("no swaps"))?;
        assert_eq!(ok.logs, vec![format!("ok tag {}", b'A')]);
        let d = r.dropped.first().ok_or_else(|| eyre::eyre!("no dropped asset"))?;
        assert_eq!(d.code, "simulation_failed");
        assert_eq!(d.logs, vec!["Program log: slippage tolerance exceeded".to_owned()]);
        Ok(())
    }

    #[tokio::test]
    async fn zero_total_weight_fails_before_any_call() -> eyre::Result<()> {
        let (orch, calls) = orchestrator(&[], UnknownSymbolPolicy::Substitute)?;
        let b = basket(&[("AAA", 0.0), ("BBB", 0.0)])?;
        let r = orch.orchestrate(&b, 1_000, &Pubkey::new_unique()).await;
        assert!(matches!(r, Err(SwapError::InvalidAllocation(_))), "{r:?}");
        assert_eq!(calls.quotes.get(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn bad_requests_fail_fast() -> eyre::Result<()> {
        let (orch, calls) = orchestrator(&[], UnknownSymbolPolicy::Substitute)?;
        let empty = basket(&[])?;
        let r = orch.orchestrate(&empty, 1_000, &Pubkey::new_unique()).await;
        assert!(matches!(r, Err(SwapError::InvalidRequest(_))));
        let b = basket(&[("AAA", 1.0)])?;
        let r = orch.orchestrate(&b, 0, &Pubkey::new_unique()).await;
        assert!(matches!(r, Err(SwapError::InvalidRequest(_))));
        let neg = basket(&[("AAA", 1.0), ("BBB", -1.0)])?;
        assert!(matches!(orch.plan(&neg, 10), Err(SwapError::InvalidAllocation(_))));
        assert_eq!(calls.quotes.get(), 0);
        Ok(())
    }

    #[test]
    fn unknown_symbol_policy() -> eyre::Result<()> {
        let b = basket(&[("AAA", 1.0), ("NOPE", 1.0)])?;
        let (substitute, _) = orchestrator(&[], UnknownSymbolPolicy::Substitute)?;
        let plans = substitute.plan(&b, 100)?;
        let nope = plans.get(1).ok_or_else(|| eyre::eyre!("missing plan"))?;
        assert!(nope.output.substituted);
        assert_eq!(nope.output.mint, crate::assets::FALLBACK_MINT);

        let (reject, _) = orchestrator(&[], UnknownSymbolPolicy::Reject)?;
        assert_eq!(
            reject.plan(&b, 100),
            Err(SwapError::UnknownAsset { symbol: "NOPE".into() })
        );
        Ok(())
    }

    #[test]
    fn plan_splits_by_weight_in_input_units() -> eyre::Result<()> {
        let (orch, _) = orchestrator(&[], UnknownSymbolPolicy::Substitute)?;
        let b = basket(&[("AAA", 60.0), ("CCC", 40.0)])?;
        let amounts: Vec<u64> = orch.plan(&b, 1_000)?.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![600, 400]);
        Ok(())
    }

    #[tokio::test]
    async fn tiny_allocation_is_dropped_without_quoting() -> eyre::Result<()> {
        let (orch, calls) = orchestrator(&[], UnknownSymbolPolicy::Substitute)?;
        let b = basket(&[("AAA", 1000.0), ("BBB", 1.0)])?;
        let r = orch.orchestrate(&b, 100, &Pubkey::new_unique()).await?;
        assert_eq!(r.swaps.len(), 1);
        assert_eq!(calls.quotes.get(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn preview_prices_without_building() -> eyre::Result<()> {
        let (orch, calls) = orchestrator(&[("CCC", Behaviour::NoRoute)], UnknownSymbolPolicy::Substitute)?;
        let b = basket(&[("AAA", 1.0), ("BBB", 1.0), ("CCC", 1.0)])?;
        let p = orch.preview(&b, 3_000).await?;
        assert_eq!((p.ready, p.attempted), (2, 3));
        assert_eq!(calls.builds.get(), 0);
        assert_eq!(calls.sims.get(), 0);
        Ok(())
    }

    struct BarrierAggregator {
        barrier: tokio::sync::Barrier,
    }

    impl SwapAggregator for BarrierAggregator {
        async fn quote(&self, req: QuoteRequest<'_>) -> eyre::Result<Value> {
            self.barrier.wait().await;
            Ok(quote_json(req.amount))
        }

        async fn swap_transaction(&self, _quote: &Value, trader: &Pubkey) -> eyre::Result<String> {
            let tx = prepared_tx(trader, &jupiter_program()?)?;
            Ok(base64::engine::general_purpose::STANDARD.encode(bincode::serialize(&tx)?))
        }
    }

    #[tokio::test]
    async fn pipelines_run_concurrently() -> eyre::Result<()> {
        // Each quote only returns once all three are in flight.
        let calls = Rc::new(Calls::default());
        let orch = Orchestrator::new(
            BarrierAggregator {
                barrier: tokio::sync::Barrier::new(3),
            },
            FakeLedger {
                fail_tags: vec![],
                calls: Rc::clone(&calls),
            },
            AssetRegistry::from_json(TOKENS)?,
            SwapConfig::default(),
            BackoffConfig {
                rounds: 1,
                attempt_timeout: Duration::from_secs(2),
                ..fast_backoff()
            },
        );
        let b = basket(&[("AAA", 1.0), ("BBB", 1.0), ("CCC", 1.0)])?;
        let r = orch.orchestrate(&b, 3_000, &Pubkey::new_unique()).await?;
        assert_eq!(r.swaps.len(), 3);
        assert!(r.dropped.is_empty());
        Ok(())
    }
}
