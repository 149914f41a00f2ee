use eyre::Context as _;
use solana_keypair::Keypair;
use std::path::Path;
use zeroize::Zeroizing;

/// Load a Solana CLI keypair file (JSON array of 64 secret-key bytes).
pub fn load_keypair(path: &Path) -> eyre::Result<Keypair> {
    warn_if_shared(path);
    let text = Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("read keypair file {}", path.display()))?,
    );
    let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
        serde_json::from_str(text.trim()).context("keypair file must be a JSON byte array")?,
    );
    Keypair::try_from(bytes.as_slice()).context("parse solana keypair bytes")
}

#[cfg(unix)]
fn warn_if_shared(path: &Path) {
    use std::os::unix::fs::PermissionsExt as _;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(path = %path.display(), mode = %format!("{mode:o}"), "keypair file is readable by other users");
        }
    }
}

#[cfg(not(unix))]
const fn warn_if_shared(_path: &Path) {}
