use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wrapped SOL. Unknown symbols resolve here.
pub const FALLBACK_MINT: &str = "So11111111111111111111111111111111111111112";

const EMBEDDED_TOKENS: &str = include_str!("../assets/tokens.json");

#[derive(Debug, Clone, Deserialize)]
struct TokenEntry {
    symbol: String,
    name: String,
    address: String,
    decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub symbol: String,
    pub mint: String,
    pub decimals: Option<u8>,
    /// True when the symbol was not in the table and `mint` is the fallback.
    pub substituted: bool,
}

/// Symbol to mint lookup, keyed by upper-cased symbol.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    by_symbol: BTreeMap<String, (String, u8)>,
}

impl AssetRegistry {
    pub fn embedded() -> eyre::Result<Self> {
        Self::from_json(EMBEDDED_TOKENS).context("parse embedded token list")
    }

    pub fn from_json(s: &str) -> eyre::Result<Self> {
        let entries: Vec<TokenEntry> = serde_json::from_str(s).context("token list json")?;
        let mut by_symbol = BTreeMap::new();
        for e in entries {
            if e.address.trim().is_empty() {
                eyre::bail!("token {} ({}) has an empty address", e.symbol, e.name);
            }
            by_symbol
                .entry(e.symbol.trim().to_uppercase())
                .or_insert((e.address, e.decimals));
        }
        Ok(Self { by_symbol })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(&symbol.trim().to_uppercase())
    }

    /// Total: every symbol maps to a mint. Misses fall back to wrapped SOL with a warning.
    pub fn resolve(&self, symbol: &str) -> AssetRef {
        match self.by_symbol.get(&symbol.trim().to_uppercase()) {
            Some((mint, decimals)) => AssetRef {
                symbol: symbol.to_owned(),
                mint: mint.clone(),
                decimals: Some(*decimals),
                substituted: false,
            },
            None => {
                tracing::warn!(
                    symbol,
                    fallback = FALLBACK_MINT,
                    "token symbol not found; using wrapped SOL"
                );
                AssetRef {
                    symbol: symbol.to_owned(),
                    mint: FALLBACK_MINT.to_owned(),
                    decimals: Some(9),
                    substituted: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_table_resolves_case_insensitively() -> eyre::Result<()> {
        let reg = AssetRegistry::embedded()?;
        let jup = reg.resolve("jup");
        assert_eq!(jup.mint, "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN");
        assert!(!jup.substituted);
        assert_eq!(reg.resolve(" Bonk ").decimals, Some(5));
        Ok(())
    }

    #[test]
    fn resolution_never_fails() -> eyre::Result<()> {
        let reg = AssetRegistry::embedded()?;
        for s in ["", "   ", "NOT_A_TOKEN", "🦀", "usdc"] {
            let a = reg.resolve(s);
            assert!(!a.mint.is_empty(), "empty mint for {s:?}");
        }
        let miss = reg.resolve("NOT_A_TOKEN");
        assert!(miss.substituted);
        assert_eq!(miss.mint, FALLBACK_MINT);
        Ok(())
    }

    #[test]
    fn rejects_entries_without_address() {
        let r = AssetRegistry::from_json(
            r#"[{"symbol":"X","name":"X","address":"  ","decimals":6}]"#,
        );
        assert!(r.is_err());
    }
}
