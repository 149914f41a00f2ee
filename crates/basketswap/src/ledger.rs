use eyre::Context as _;
use solana_client::{
    nonblocking::rpc_client::RpcClient, rpc_config::RpcSimulateTransactionConfig,
    rpc_response::RpcSimulateTransactionResult,
};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{hash::Hash, signature::Signature, transaction::VersionedTransaction};

use crate::retry::{try_all_with_backoff, BackoffConfig};

/// Outcome of a dry run. `err` is set when the transaction would fail on chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl From<RpcSimulateTransactionResult> for SimulationOutcome {
    fn from(sim: RpcSimulateTransactionResult) -> Self {
        Self {
            err: sim.err.map(|e| format!("{e:?}")),
            logs: sim.logs.unwrap_or_default(),
            units_consumed: sim.units_consumed,
        }
    }
}

/// Chain access needed to gate and submit prepared transactions.
pub trait Ledger {
    async fn latest_blockhash(&self) -> eyre::Result<Hash>;

    /// Dry run only: no state change, no fee, no broadcast.
    async fn simulate(&self, tx: &VersionedTransaction) -> eyre::Result<SimulationOutcome>;

    /// Broadcast once. Implementations must not retry.
    async fn send(&self, tx: &VersionedTransaction) -> eyre::Result<Signature>;
}

#[derive(Debug, Clone)]
pub struct SolanaLedger {
    urls: Vec<String>,
    backoff: BackoffConfig,
}

impl SolanaLedger {
    pub fn new(urls: Vec<String>, backoff: BackoffConfig) -> eyre::Result<Self> {
        if urls.is_empty() {
            eyre::bail!("no solana rpc urls configured");
        }
        for u in &urls {
            crate::config::ensure_secure_url("solana_rpc_url", u)?;
        }
        Ok(Self { urls, backoff })
    }

    fn rpc_for_url(&self, url: &str) -> RpcClient {
        RpcClient::new_with_timeout_and_commitment(
            url.to_owned(),
            self.backoff.attempt_timeout,
            CommitmentConfig::confirmed(),
        )
    }
}

impl Ledger for SolanaLedger {
    async fn latest_blockhash(&self) -> eyre::Result<Hash> {
        try_all_with_backoff(
            &self.urls,
            &self.backoff,
            |u| {
                let rpc = self.rpc_for_url(u);
                async move {
                    rpc.get_latest_blockhash()
                        .await
                        .context("get latest blockhash")
                }
            },
            "latest blockhash",
        )
        .await
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> eyre::Result<SimulationOutcome> {
        try_all_with_backoff(
            &self.urls,
            &self.backoff,
            |u| {
                let rpc = self.rpc_for_url(u);
                let tx = tx.clone();
                async move {
                    let cfg = RpcSimulateTransactionConfig {
                        // Prepared transactions are unsigned at this point.
                        sig_verify: false,
                        // The caller already pinned a fresh blockhash.
                        replace_recent_blockhash: false,
                        commitment: Some(CommitmentConfig::confirmed()),
                        ..Default::default()
                    };
                    let sim = rpc
                        .simulate_transaction_with_config(&tx, cfg)
                        .await
                        .context("simulate transaction")?
                        .value;
                    Ok(SimulationOutcome::from(sim))
                }
            },
            "simulate transaction",
        )
        .await
    }

    async fn send(&self, tx: &VersionedTransaction) -> eyre::Result<Signature> {
        let primary = self
            .urls
            .first()
            .ok_or_else(|| eyre::eyre!("no solana rpc urls configured"))?;
        let rpc = self.rpc_for_url(primary);
        crate::retry::with_timeout(self.backoff.attempt_timeout, "send transaction", async {
            rpc.send_transaction(tx).await.context("send transaction")
        })
        .await
    }
}
