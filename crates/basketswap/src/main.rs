#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use solana_sdk::pubkey::Pubkey;
use solana_signer::Signer as _;
use std::{path::PathBuf, str::FromStr as _, time::Duration};
use tracing_subscriber::prelude::*;

mod allocation;
mod amount;
mod assets;
mod basket;
mod cli_output;
mod config;
mod errors;
mod fsutil;
mod jupiter;
mod keyfile;
mod ledger;
mod orchestrator;
mod paths;
mod quote;
mod retry;
mod store;
mod submit;
#[cfg(test)]
mod testutil;
mod validate;

use crate::{
    assets::AssetRegistry,
    basket::{Basket, BasketClient},
    config::BasketSwapConfig,
    errors::{ErrorReport, SwapError},
    jupiter::JupiterClient,
    ledger::SolanaLedger,
    orchestrator::Orchestrator,
    retry::BackoffConfig,
    submit::ExecutionSubmitter,
};

#[derive(Parser, Debug)]
#[command(name = "basketswap", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct BasketArgs {
    /// Basket id on the basket backend.
    #[arg(long)]
    basket: String,

    /// Total to spend, in UI units of the input asset (e.g. `25.5` USDC).
    #[arg(long)]
    amount: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print resolved paths (useful for debugging).
    Paths,

    /// Print the effective configuration (API keys redacted).
    Config,

    /// Split the amount across the basket and resolve every asset. No quotes, no RPC.
    Plan {
        #[command(flatten)]
        args: BasketArgs,
    },

    /// Quote every asset.
    ///
    /// With `--trader`, also builds and simulates each swap transaction for that wallet.
    /// Without it, prices only (read-only preview).
    Quote {
        #[command(flatten)]
        args: BasketArgs,

        /// Base58 wallet address that would pay for and sign the swaps.
        #[arg(long)]
        trader: Option<String>,
    },

    /// Quote, simulate, then sign and submit every swap that passed simulation.
    Swap {
        #[command(flatten)]
        args: BasketArgs,

        /// Solana CLI keypair file (JSON array of 64 bytes).
        #[arg(long)]
        keypair: PathBuf,

        /// Submit only these symbols (repeatable). Defaults to every ready swap.
        #[arg(long = "only", value_name = "SYMBOL")]
        only: Vec<String>,

        /// Skip the confirmation prompt (required for non-interactive shells).
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

fn init_logging(paths: &paths::BasketSwapPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("basketswap.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn request_timeout(cfg: &BasketSwapConfig) -> Duration {
    Duration::from_millis(cfg.network.request_timeout_ms.max(1))
}

fn build_orchestrator(
    cfg: &BasketSwapConfig,
) -> eyre::Result<Orchestrator<JupiterClient, SolanaLedger>> {
    let backoff = BackoffConfig::from_network(&cfg.network);
    let jupiter = JupiterClient::new(
        &cfg.http.jupiter_base_url,
        cfg.http.jupiter_api_key.as_deref(),
        request_timeout(cfg),
    )?;
    let ledger = SolanaLedger::new(cfg.solana_rpc_urls(), backoff.clone())?;
    let registry = AssetRegistry::embedded()?;
    let orch = Orchestrator::new(jupiter, ledger, registry, cfg.swap.clone(), backoff);
    Ok(if requires_provider_check(&cfg.http.jupiter_base_url) {
        orch
    } else {
        orch.without_provider_check()
    })
}

/// Local mock aggregators build transactions against arbitrary programs, so only
/// non-loopback Jupiter hosts are held to the Jupiter program allowlist.
fn requires_provider_check(jupiter_base_url: &str) -> bool {
    !config::is_loopback_http(jupiter_base_url)
}

async fn load_basket(cfg: &BasketSwapConfig, args: &BasketArgs) -> eyre::Result<(Basket, u64)> {
    let total = amount::parse_ui_amount(&args.amount, cfg.swap.input_decimals)
        .map_err(|e| SwapError::InvalidRequest(format!("--amount: {e:#}")))?;
    if total == 0 {
        return Err(SwapError::InvalidRequest("--amount must be positive".into()).into());
    }
    let client = BasketClient::new(&cfg.http.backend_base_url, request_timeout(cfg))?;
    let basket = client.fetch(&args.basket).await?;
    Ok((basket, total))
}

fn redacted(cfg: &BasketSwapConfig) -> BasketSwapConfig {
    let mut out = cfg.clone();
    if out.http.jupiter_api_key.is_some() {
        out.http.jupiter_api_key = Some("<redacted>".into());
    }
    out
}

async fn cmd_plan(cfg: &BasketSwapConfig, args: &BasketArgs) -> eyre::Result<()> {
    let (basket, total) = load_basket(cfg, args).await?;
    let orch = build_orchestrator(cfg)?;
    let plans = orch.plan(&basket, total)?;
    let decimals = cfg.swap.input_decimals;
    let rows: Vec<serde_json::Value> = plans
        .iter()
        .map(|p| {
            serde_json::json!({
              "symbol": p.symbol,
              "output_mint": p.output.mint,
              "substituted": p.output.substituted,
              "amount": p.amount,
              "amount_ui": amount::format_base_amount(p.amount, decimals),
            })
        })
        .collect();
    cli_output::print_json(&serde_json::json!({
      "basket": { "id": basket.id, "name": basket.name },
      "input_mint": cfg.swap.input_mint,
      "total_input": total,
      "plans": rows,
    }))
}

async fn cmd_quote(
    cfg: &BasketSwapConfig,
    args: &BasketArgs,
    trader: Option<&str>,
) -> eyre::Result<()> {
    let trader = trader
        .map(|t| {
            Pubkey::from_str(t.trim())
                .map_err(|e| SwapError::InvalidIdentity(format!("{t}: {e}")))
        })
        .transpose()?;
    let (basket, total) = load_basket(cfg, args).await?;
    let orch = build_orchestrator(cfg)?;
    match trader {
        Some(trader) => {
            let res = orch.orchestrate(&basket, total, &trader).await?;
            cli_output::print_ready_line(res.swaps.len(), res.attempted);
            cli_output::print_json(&res.summary())
        }
        None => {
            tracing::info!("no trader given; quote-only preview");
            let preview = orch.preview(&basket, total).await?;
            cli_output::print_ready_line(preview.ready, preview.attempted);
            cli_output::print_json(&preview)
        }
    }
}

async fn cmd_swap(
    cfg: &BasketSwapConfig,
    args: &BasketArgs,
    keypair: &std::path::Path,
    only: &[String],
    yes: bool,
) -> eyre::Result<()> {
    let signer = keyfile::load_keypair(keypair)
        .map_err(|e| SwapError::InvalidIdentity(format!("{e:#}")))?;
    let (basket, total) = load_basket(cfg, args).await?;
    let orch = build_orchestrator(cfg)?;
    let res = orch.orchestrate(&basket, total, &signer.pubkey()).await?;
    cli_output::print_ready_line(res.swaps.len(), res.attempted);

    let selected: Vec<&validate::ValidatedSwap> = res
        .swaps
        .iter()
        .filter(|s| {
            only.is_empty()
                || only
                    .iter()
                    .any(|o| o.trim().eq_ignore_ascii_case(&s.quote.plan.symbol))
        })
        .collect();
    for o in only {
        if !selected
            .iter()
            .any(|s| o.trim().eq_ignore_ascii_case(&s.quote.plan.symbol))
        {
            tracing::warn!(symbol = %o, "--only symbol has no ready swap; skipping");
        }
    }
    if selected.is_empty() {
        return Err(SwapError::InvalidRequest("no ready swap matches --only".into()).into());
    }
    let symbols: Vec<String> = selected.iter().map(|s| s.quote.plan.symbol.clone()).collect();
    cli_output::confirm_submit_or_bail(yes, &symbols)?;

    // One at a time; each outcome stands alone.
    let submitter = ExecutionSubmitter::new(orch.ledger(), orch.swap_config().max_validation_age_secs);
    let mut submissions = Vec::with_capacity(selected.len());
    let mut accepted = 0_usize;
    for swap in selected {
        let symbol = &swap.quote.plan.symbol;
        let entry = match submitter.submit(swap, &signer).await {
            Ok(handle) => {
                accepted += 1;
                serde_json::json!({ "symbol": symbol, "signature": handle.to_string() })
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, code = e.code(), error = %e, "submission failed");
                serde_json::json!({ "symbol": symbol, "error": ErrorReport::from(e) })
            }
        };
        submissions.push(entry);
    }

    let summary = res.summary();
    cli_output::print_json(&serde_json::json!({
      "ready": summary.ready,
      "attempted": summary.attempted,
      "dropped": summary.dropped,
      "submissions": submissions,
    }))?;
    // The per-swap report above is the stdout answer; only the exit status changes here.
    if accepted == 0 {
        eyre::bail!("no swap was accepted ({} submission(s) failed)", submissions.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::BasketSwapPaths::discover()?;
    paths.ensure_private_dirs().context("create basketswap dirs")?;
    let _log_guard = init_logging(&paths);

    if matches!(cli.cmd, Command::Paths) {
        return cli_output::print_json(&serde_json::json!({
          "config_dir": paths.config_dir,
          "data_dir": paths.data_dir,
          "log_file": paths.log_file,
        }));
    }

    let cfg = store::ConfigStore::new(&paths).load_or_init_default()?;
    let res = match &cli.cmd {
        Command::Paths => Ok(()),
        Command::Config => cli_output::print_json(&redacted(&cfg)),
        Command::Plan { args } => cmd_plan(&cfg, args).await,
        Command::Quote { args, trader } => cmd_quote(&cfg, args, trader.as_deref()).await,
        Command::Swap {
            args,
            keypair,
            only,
            yes,
        } => cmd_swap(&cfg, args, keypair, only, *yes).await,
    };

    // Domain failures also answer on stdout so scripts can branch on `code`.
    if let Err(e) = &res {
        if let Some(swap_err) = e.downcast_ref::<SwapError>() {
            cli_output::print_error(&ErrorReport::from(swap_err.clone()))?;
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_check_is_skipped_only_for_loopback_jupiter() {
        assert!(requires_provider_check("https://api.jup.ag/swap/v1"));
        assert!(requires_provider_check("https://lite-api.jup.ag/swap/v1"));
        assert!(!requires_provider_check("http://127.0.0.1:8080"));
        assert!(!requires_provider_check("http://localhost:3000/swap/v1"));
    }
}
