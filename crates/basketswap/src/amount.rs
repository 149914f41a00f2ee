use eyre::Context as _;

/// Parse a human decimal amount ("25", "12.5") into base units of a token with `decimals`.
pub fn parse_ui_amount(s: &str, decimals: u8) -> eyre::Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        eyre::bail!("empty amount");
    }
    if s.starts_with('-') {
        eyre::bail!("amount must be non-negative");
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(whole) || !is_digits(frac) || (whole.is_empty() && frac.is_empty()) {
        eyre::bail!("amount must be a plain decimal number, got {s:?}");
    }
    let places = usize::from(decimals);
    if frac.len() > places {
        eyre::bail!("too many decimal places for input asset (decimals={decimals})");
    }

    let whole_v: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().context("parse whole part")?
    };
    let frac_v: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<places$}")
            .parse()
            .context("parse fractional part")?
    };

    let scale = 10_u64
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| eyre::eyre!("decimals too large"))?;
    whole_v
        .checked_mul(scale)
        .and_then(|x| x.checked_add(frac_v))
        .ok_or_else(|| eyre::eyre!("amount overflow"))
}

/// Render base units as a human decimal string without going through floats.
pub fn format_base_amount(base: u64, decimals: u8) -> String {
    if decimals == 0 {
        return base.to_string();
    }
    let Some(scale) = 10_u64.checked_pow(u32::from(decimals)) else {
        return base.to_string();
    };
    let whole = base / scale;
    let frac = base % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_s = format!("{frac:0width$}", width = usize::from(decimals));
    format!("{whole}.{}", frac_s.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usdc_amounts() -> eyre::Result<()> {
        assert_eq!(parse_ui_amount("1", 6)?, 1_000_000);
        assert_eq!(parse_ui_amount("12.5", 6)?, 12_500_000);
        assert_eq!(parse_ui_amount(".000001", 6)?, 1);
        assert_eq!(parse_ui_amount(" 1000 ", 6)?, 1_000_000_000);
        Ok(())
    }

    #[test]
    fn rejects_bad_amounts() {
        assert!(parse_ui_amount("", 6).is_err());
        assert!(parse_ui_amount("-3", 6).is_err());
        assert!(parse_ui_amount("abc", 6).is_err());
        let r = parse_ui_amount("1.0000001", 6);
        let msg = r.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(msg.contains("too many decimal places"), "unexpected: {msg}");
        assert!(parse_ui_amount("99999999999999999999", 6).is_err());
    }

    #[test]
    fn rejects_signs_and_stray_separators() {
        for bad in ["1.+5", "+2", "1.2.3", ".", "1e3", "1_000", "0x10"] {
            assert!(parse_ui_amount(bad, 6).is_err(), "accepted {bad:?}");
        }
        assert!(matches!(parse_ui_amount("2.", 6), Ok(2_000_000)));
    }

    #[test]
    fn formats_base_units() {
        assert_eq!(format_base_amount(1_500_000, 6), "1.5");
        assert_eq!(format_base_amount(1, 6), "0.000001");
        assert_eq!(format_base_amount(10_000_000, 6), "10");
        assert_eq!(format_base_amount(42, 0), "42");
    }
}
