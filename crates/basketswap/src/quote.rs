use base64::Engine as _;
use bincode::Options as _;
use eyre::Context as _;
use serde::Serialize;
use serde_json::Value;
use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, transaction::VersionedTransaction};
use std::str::FromStr as _;

use crate::{
    assets::AssetRef,
    errors::SwapError,
    jupiter::{QuoteRequest, QuoteTerms, SwapAggregator},
    retry::{retry_with_backoff, BackoffConfig},
};

const MAX_REMOTE_TX_BYTES: u64 = 2 * 1024 * 1024;

// Known Jupiter program IDs for provider allowlisting.
const JUPITER_PROGRAMS: [&str; 3] = [
    "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
    "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB",
    "JUP2jxvQffg8W4Jw8dYpQ8eQJ8v1s5p8yL6kD3m1j7d",
];

/// One asset's unit of work for a single orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapPlan {
    pub symbol: String,
    pub input_mint: String,
    /// Input amount in base units of `input_mint`.
    pub amount: u64,
    pub output: AssetRef,
}

/// Pricing terms plus the prepared, still unsigned, transaction built from them.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub plan: SwapPlan,
    pub terms: QuoteTerms,
    pub transaction: VersionedTransaction,
}

pub fn decode_prepared_transaction(b64: &str) -> eyre::Result<VersionedTransaction> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .context("decode swapTransaction base64")?;
    bincode::DefaultOptions::new()
        .with_limit(MAX_REMOTE_TX_BYTES)
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .deserialize(&bytes)
        .context("deserialize versioned tx")
}

fn program_ids(msg: &VersionedMessage) -> eyre::Result<Vec<Pubkey>> {
    let keys = msg.static_account_keys();
    msg.instructions()
        .iter()
        .map(|ix| {
            keys.get(usize::from(ix.program_id_index))
                .copied()
                .ok_or_else(|| eyre::eyre!("invalid instruction: program_id_index out of bounds"))
        })
        .collect()
}

/// Remote-built transactions are untrusted: the trader must be the fee payer and the
/// only required signer, and (for real Jupiter hosts) a Jupiter program must be invoked.
pub fn check_prepared_transaction(
    trader: &Pubkey,
    msg: &VersionedMessage,
    require_jupiter_program: bool,
) -> eyre::Result<()> {
    let fee_payer = msg
        .static_account_keys()
        .first()
        .ok_or_else(|| eyre::eyre!("invalid transaction: missing fee payer"))?;
    if fee_payer != trader {
        eyre::bail!("refusing transaction: fee payer is not the trader");
    }
    if msg.header().num_required_signatures != 1 {
        eyre::bail!("refusing transaction: unexpected number of required signatures");
    }
    if !require_jupiter_program {
        return Ok(());
    }
    let jupiter: Vec<Pubkey> = JUPITER_PROGRAMS
        .iter()
        .map(|s| Pubkey::from_str(s))
        .collect::<Result<_, _>>()
        .context("parse hardcoded jupiter program ids")?;
    if !program_ids(msg)?.iter().any(|pid| jupiter.contains(pid)) {
        eyre::bail!("refusing transaction: does not invoke a known Jupiter program id");
    }
    Ok(())
}

/// Quote + prepared transaction for one asset. No caching: prices and blockhashes go stale.
#[derive(Debug)]
pub struct QuoteAcquirer<'a, A> {
    aggregator: &'a A,
    slippage_bps: u16,
    backoff: BackoffConfig,
    require_jupiter_program: bool,
}

impl<'a, A: SwapAggregator> QuoteAcquirer<'a, A> {
    pub const fn new(
        aggregator: &'a A,
        slippage_bps: u16,
        backoff: BackoffConfig,
        require_jupiter_program: bool,
    ) -> Self {
        Self {
            aggregator,
            slippage_bps,
            backoff,
            require_jupiter_program,
        }
    }

    /// Price only. Used by read-only previews where no trader identity exists.
    pub async fn price(&self, plan: &SwapPlan) -> Result<(Value, QuoteTerms), SwapError> {
        self.price_inner(plan)
            .await
            .map_err(|e| SwapError::quote_unavailable(&plan.symbol, &e))
    }

    async fn price_inner(&self, plan: &SwapPlan) -> eyre::Result<(Value, QuoteTerms)> {
        if plan.amount == 0 {
            eyre::bail!("allocated amount rounds to zero");
        }
        let req = QuoteRequest {
            input_mint: &plan.input_mint,
            output_mint: &plan.output.mint,
            amount: plan.amount,
            slippage_bps: self.slippage_bps,
        };
        let quote = retry_with_backoff(
            &self.backoff,
            |()| self.aggregator.quote(req),
            "jupiter quote",
        )
        .await?;
        let terms = QuoteTerms::from_quote(&quote).context("no viable route")?;
        Ok((quote, terms))
    }

    pub async fn acquire(&self, plan: &SwapPlan, trader: &Pubkey) -> Result<SwapQuote, SwapError> {
        self.acquire_inner(plan, trader)
            .await
            .map_err(|e| SwapError::quote_unavailable(&plan.symbol, &e))
    }

    async fn acquire_inner(&self, plan: &SwapPlan, trader: &Pubkey) -> eyre::Result<SwapQuote> {
        let (quote, terms) = self.price_inner(plan).await?;
        let b64 = retry_with_backoff(
            &self.backoff,
            |()| self.aggregator.swap_transaction(&quote, trader),
            "jupiter swap",
        )
        .await?;
        let transaction = decode_prepared_transaction(&b64)?;
        check_prepared_transaction(trader, &transaction.message, self.require_jupiter_program)?;
        tracing::debug!(
            symbol = %plan.symbol,
            in_amount = terms.in_amount,
            out_amount = terms.out_amount,
            route = ?terms.route,
            "quote acquired"
        );
        Ok(SwapQuote {
            plan: plan.clone(),
            terms,
            transaction,
        })
    }
}
