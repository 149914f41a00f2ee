//! Centralised helpers for CLI output.
//!
//! Machine-readable JSON goes to stdout; anything meant for a human operator goes to stderr.

use eyre::Context as _;
use serde::Serialize;
use std::io::{BufRead as _, IsTerminal as _, Write as _};

use crate::errors::ErrorReport;

fn stderr_write(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    let _flush = stderr.flush();
}

fn stderr_writeln(s: &str) {
    stderr_write(&format!("{s}\n"));
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(value).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")?;
    Ok(())
}

/// A failed command still answers on stdout, as `{"error": {...}}`.
pub fn print_error(report: &ErrorReport) -> eyre::Result<()> {
    print_json(&serde_json::json!({ "error": report }))
}

pub fn print_ready_line(ready: usize, attempted: usize) {
    if std::io::stderr().is_terminal() {
        stderr_writeln(&format!("{ready} of {attempted} assets ready"));
    }
}

/// Ask before broadcasting, or bail if non-interactive and `--yes` was not passed.
pub fn confirm_submit_or_bail(yes: bool, symbols: &[String]) -> eyre::Result<()> {
    if yes {
        return Ok(());
    }
    let interactive = std::io::stdin().is_terminal() && std::io::stderr().is_terminal();
    if !interactive {
        eyre::bail!("refusing to submit swaps non-interactively; pass --yes");
    }

    stderr_writeln(&format!(
        "About to sign and submit {} swap(s): {}",
        symbols.len(),
        symbols.join(", ")
    ));
    stderr_write("Continue? [y/N] ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| eyre::eyre!("read confirmation: {e}"))?;
    let ans = line.trim().to_ascii_lowercase();
    if ans != "y" && ans != "yes" {
        eyre::bail!("swap submission cancelled");
    }
    Ok(())
}
