use crate::{config::BasketSwapConfig, paths::BasketSwapPaths};
use eyre::Context as _;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Apply environment variable overrides to the config (endpoints, slippage).
fn apply_env_overrides(cfg: &mut BasketSwapConfig) {
    /// Helper: if an env var is set and non-empty, apply `setter` with the trimmed value.
    fn apply_env(var: &str, setter: impl FnOnce(&str)) {
        if let Ok(u) = std::env::var(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    apply_env("BASKETSWAP_BACKEND_URL", |v| {
        v.clone_into(&mut cfg.http.backend_base_url);
    });
    apply_env("BASKETSWAP_JUPITER_BASE_URL", |v| {
        v.clone_into(&mut cfg.http.jupiter_base_url);
    });
    apply_env("BASKETSWAP_JUPITER_API_KEY", |v| {
        cfg.http.jupiter_api_key = Some(v.to_owned());
    });
    apply_env("BASKETSWAP_SOLANA_RPC_URL", |v| {
        v.clone_into(&mut cfg.rpc.solana_rpc_url);
    });
    if let Ok(v) = std::env::var("BASKETSWAP_SLIPPAGE_BPS") {
        match v.trim().parse::<u16>() {
            Ok(n) if n <= 10_000 => cfg.swap.slippage_bps = n,
            _ => tracing::warn!(value = %v, "ignoring invalid BASKETSWAP_SLIPPAGE_BPS"),
        }
    }
}

impl ConfigStore {
    pub fn new(paths: &BasketSwapPaths) -> Self {
        Self {
            path: paths.config_dir.join("config.toml"),
        }
    }

    pub fn load_or_init_default(&self) -> eyre::Result<BasketSwapConfig> {
        if !self.path.exists() {
            let cfg = BasketSwapConfig::default();
            self.save(&cfg)?;
            let mut cfg = cfg;
            apply_env_overrides(&mut cfg);
            return Ok(cfg);
        }

        let s = fs::read_to_string(&self.path).context("read config.toml")?;
        let mut cfg: BasketSwapConfig = toml::from_str(&s).context("parse config.toml")?;
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &BasketSwapConfig) -> eyre::Result<()> {
        if let Some(parent) = self.path.parent() {
            crate::fsutil::ensure_private_dir(parent)?;
        }
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_string_atomic_restrictive(
            &self.path,
            &s,
            crate::fsutil::MODE_FILE_PRIVATE,
        )
        .context("write config.toml")?;
        Ok(())
    }
}
