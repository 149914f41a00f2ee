use serde::{Deserialize, Serialize};

pub const SOLANA_MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const USDC_MINT_MAINNET: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Basket data backend. Baskets are served from `{backend_base_url}/crates/{id}`.
    pub backend_base_url: String,
    /// Jupiter Swap API base URL. Used for quotes and prepared swap transactions.
    pub jupiter_base_url: String,
    /// Optional Jupiter API key (x-api-key). Keyless usage works with reduced rate limits.
    pub jupiter_api_key: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://127.0.0.1:3000".into(),
            // Jupiter consolidated quote+swap under /swap/v1. This base URL should end in /swap/v1.
            jupiter_base_url: "https://api.jup.ag/swap/v1".into(),
            jupiter_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub solana_rpc_url: String,
    /// Tried in order after the primary fails.
    pub solana_fallback_rpc_urls: Vec<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            solana_rpc_url: SOLANA_MAINNET_RPC_URL.into(),
            solana_fallback_rpc_urls: vec![
                "https://solana-rpc.publicnode.com".into(),
                "https://solana.drpc.org".into(),
            ],
        }
    }
}

/// What to do with a basket symbol missing from the asset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownSymbolPolicy {
    /// Route the holding into the fallback asset (wrapped SOL) and log a warning.
    #[default]
    Substitute,
    /// Refuse the whole basket before any external call.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Mint every basket purchase is paid from.
    pub input_mint: String,
    pub input_decimals: u8,
    pub slippage_bps: u16,
    pub unknown_symbol_policy: UnknownSymbolPolicy,
    /// A validated swap older than this must be re-validated before submission.
    pub max_validation_age_secs: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            input_mint: USDC_MINT_MAINNET.into(),
            input_decimals: 6,
            slippage_bps: 50,
            unknown_symbol_policy: UnknownSymbolPolicy::Substitute,
            max_validation_age_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bound on every single external call (quote, build, blockhash, simulate, send).
    pub request_timeout_ms: u64,
    pub retry_rounds: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_max_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 8_000,
            retry_rounds: 3,
            retry_base_delay_ms: 400,
            retry_max_delay_ms: 4_000,
            retry_jitter_max_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BasketSwapConfig {
    pub http: HttpConfig,
    pub rpc: RpcConfig,
    pub swap: SwapConfig,
    pub network: NetworkConfig,
}

impl BasketSwapConfig {
    pub fn solana_rpc_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.rpc.solana_fallback_rpc_urls.len());
        let primary = self.rpc.solana_rpc_url.trim();
        if !primary.is_empty() {
            urls.push(primary.to_owned());
        }
        for u in &self.rpc.solana_fallback_rpc_urls {
            let t = u.trim();
            if t.is_empty() || urls.iter().any(|x| x == t) {
                continue;
            }
            urls.push(t.to_owned());
        }
        urls
    }
}

pub fn allow_insecure_http() -> bool {
    std::env::var("BASKETSWAP_ALLOW_INSECURE_HTTP")
        .ok()
        .is_some_and(|v| {
            matches!(
                v.as_str(),
                "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON"
            )
        })
}

pub fn is_loopback_http(url: &str) -> bool {
    fn host_prefix_ok(s: &str, prefix: &str) -> bool {
        if !s.starts_with(prefix) {
            return false;
        }
        matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
    }
    let u = url.trim();
    host_prefix_ok(u, "http://127.0.0.1")
        || host_prefix_ok(u, "http://localhost")
        || host_prefix_ok(u, "http://[::1]")
}

/// Refuse plaintext endpoints other than loopback unless explicitly allowed.
pub fn ensure_secure_url(label: &str, url: &str) -> eyre::Result<()> {
    let u = url.trim();
    if u.starts_with("https://") || is_loopback_http(u) || allow_insecure_http() {
        return Ok(());
    }
    eyre::bail!(
        "{label} must use https (or loopback); set BASKETSWAP_ALLOW_INSECURE_HTTP=1 to override"
    )
}
