use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use solana_signer::Signer;

use crate::{errors::SwapError, ledger::Ledger, validate::ValidatedSwap};

/// Ledger-assigned identifier of an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionHandle(pub Signature);

impl std::fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
pub struct ExecutionSubmitter<'a, L> {
    ledger: &'a L,
    max_age_secs: u64,
}

impl<'a, L: Ledger> ExecutionSubmitter<'a, L> {
    pub const fn new(ledger: &'a L, max_age_secs: u64) -> Self {
        Self {
            ledger,
            max_age_secs,
        }
    }

    /// Sign and broadcast exactly once. Never retried: a resend after the blockhash
    /// expires is rejected by the ledger, so failures go back to the caller.
    pub async fn submit<S: Signer>(
        &self,
        swap: &ValidatedSwap,
        signer: &S,
    ) -> Result<SubmissionHandle, SwapError> {
        let symbol = &swap.quote.plan.symbol;
        let age = swap.age_secs();
        if age > self.max_age_secs {
            return Err(SwapError::SubmissionFailed(format!(
                "{symbol}: validated {age}s ago, re-validate before submitting"
            )));
        }
        let msg = &swap.quote.transaction.message;
        if msg.static_account_keys().first() != Some(&signer.pubkey()) {
            return Err(SwapError::SubmissionFailed(format!(
                "{symbol}: signer is not the transaction fee payer"
            )));
        }
        let signed = VersionedTransaction::try_new(msg.clone(), &[signer])
            .map_err(|e| SwapError::SubmissionFailed(format!("{symbol}: sign tx: {e}")))?;

        let sig = self
            .ledger
            .send(&signed)
            .await
            .map_err(|e| SwapError::SubmissionFailed(format!("{symbol}: {e:#}")))?;
        tracing::info!(symbol = %symbol, signature = %sig, "swap submitted");
        Ok(SubmissionHandle(sig))
    }
}
