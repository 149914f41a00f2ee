use std::{future::Future, time::Duration};

use crate::config::NetworkConfig;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Number of full rounds. Each round tries every endpoint once.
    pub rounds: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Random jitter (`0..=jitter_max_ms`) added to each backoff sleep.
    pub jitter_max_ms: u64,
    /// Upper bound on a single attempt. An attempt that exceeds it counts as failed.
    pub attempt_timeout: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(4),
            jitter_max_ms: 250,
            attempt_timeout: Duration::from_secs(8),
        }
    }
}

impl BackoffConfig {
    pub fn from_network(cfg: &NetworkConfig) -> Self {
        Self {
            rounds: cfg.retry_rounds.max(1),
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
            jitter_max_ms: cfg.retry_jitter_max_ms,
            attempt_timeout: Duration::from_millis(cfg.request_timeout_ms.max(1)),
        }
    }
}

fn compute_backoff_delay(cfg: &BackoffConfig, round: usize) -> Duration {
    let shift = u32::try_from(round.min(16)).unwrap_or(16_u32);
    let pow2 = 1_u64.checked_shl(shift).unwrap_or(u64::MAX);
    let base_ms = u64::try_from(cfg.base_delay.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(cfg.max_delay.as_millis()).unwrap_or(u64::MAX);
    let ms = base_ms.saturating_mul(pow2).min(max_ms);
    let jitter = if cfg!(test) || cfg.jitter_max_ms == 0 {
        0
    } else {
        // Avoid holding a non-Send RNG across await points.
        rand::random::<u64>() % cfg.jitter_max_ms.saturating_add(1).max(1)
    };
    Duration::from_millis(ms.saturating_add(jitter))
}

/// Run one attempt under the configured timeout.
pub async fn with_timeout<T, Fut>(
    timeout: Duration,
    context_label: &'static str,
    fut: Fut,
) -> eyre::Result<T>
where
    Fut: Future<Output = eyre::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(eyre::eyre!(
            "{context_label}: timed out after {}ms",
            timeout.as_millis()
        )),
    }
}

/// Try `op(item)` across all items, in order, for `rounds` rounds. Between rounds, sleep with
/// exponential backoff + jitter, but only after every item has failed.
pub async fn try_all_with_backoff<I, T, Fut>(
    items: &[I],
    cfg: &BackoffConfig,
    mut op: impl FnMut(&I) -> Fut,
    context_label: &'static str,
) -> eyre::Result<T>
where
    Fut: Future<Output = eyre::Result<T>>,
{
    if items.is_empty() {
        eyre::bail!("no endpoints configured");
    }
    if cfg.rounds == 0 {
        eyre::bail!("invalid backoff config: rounds=0");
    }

    let mut last_err: Option<eyre::Report> = None;

    for round in 0..cfg.rounds {
        for item in items {
            match with_timeout(cfg.attempt_timeout, context_label, op(item)).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::debug!(op = context_label, round, error = %format!("{e:#}"), "attempt failed");
                    last_err = Some(e);
                }
            }
        }

        if round + 1 < cfg.rounds {
            tokio::time::sleep(compute_backoff_delay(cfg, round)).await;
        }
    }

    Err(last_err
        .unwrap_or_else(|| eyre::eyre!("unknown error"))
        .wrap_err(context_label))
}

/// Retry a single-endpoint operation with bounded exponential backoff.
pub async fn retry_with_backoff<T, Fut>(
    cfg: &BackoffConfig,
    op: impl FnMut(&()) -> Fut,
    context_label: &'static str,
) -> eyre::Result<T>
where
    Fut: Future<Output = eyre::Result<T>>,
{
    try_all_with_backoff(&[()], cfg, op, context_label).await
}
