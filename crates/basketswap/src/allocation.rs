//! Basket weights to per-asset input amounts.
//!
//! All math runs on `Decimal`, so results are exact up to 28 significant digits and
//! identical on every platform. Rounding is half-up (`MidpointAwayFromZero`; inputs are
//! never negative) to the nearest whole base unit.

use rust_decimal::{
    prelude::{FromPrimitive as _, ToPrimitive as _},
    Decimal, RoundingStrategy,
};

use crate::errors::SwapError;

/// Convert a JSON weight into a `Decimal`, refusing negatives and anything `Decimal` can't hold.
pub fn weight_from_f64(symbol: &str, w: f64) -> Result<Decimal, SwapError> {
    let d = Decimal::from_f64(w).ok_or_else(|| {
        SwapError::InvalidAllocation(format!(
            "weight for {symbol} is not finite or out of range"
        ))
    })?;
    if d.is_sign_negative() && !d.is_zero() {
        return Err(SwapError::InvalidAllocation(format!(
            "weight for {symbol} is negative"
        )));
    }
    Ok(d)
}

fn pow10(exp: u32) -> Result<Decimal, SwapError> {
    let mut out = Decimal::ONE;
    for _ in 0..exp {
        out = out
            .checked_mul(Decimal::TEN)
            .ok_or_else(|| SwapError::InvalidAllocation("decimal rescale overflow".into()))?;
    }
    Ok(out)
}

/// Share of `total` owed to one holding, rescaled from `input_decimals` to
/// `output_decimals` precision and rounded half-up to an integer.
///
/// `total_weight` is the sum of every holding's weight and must be positive.
pub fn allocate(
    total: Decimal,
    weight: Decimal,
    total_weight: Decimal,
    input_decimals: u8,
    output_decimals: u8,
) -> Result<u64, SwapError> {
    if total_weight <= Decimal::ZERO {
        return Err(SwapError::InvalidAllocation(
            "total basket weight must be positive".into(),
        ));
    }
    if weight.is_sign_negative() && !weight.is_zero() {
        return Err(SwapError::InvalidAllocation("negative weight".into()));
    }
    if total.is_sign_negative() && !total.is_zero() {
        return Err(SwapError::InvalidAllocation("negative total".into()));
    }

    let overflow = || SwapError::InvalidAllocation("allocation overflow".into());

    // percentage = weight / total_weight; multiplying first keeps exact midpoints exact.
    let raw = total
        .checked_mul(weight)
        .and_then(|x| x.checked_div(total_weight))
        .ok_or_else(overflow)?;

    let shift = i32::from(output_decimals) - i32::from(input_decimals);
    let factor = pow10(shift.unsigned_abs())?;
    let scaled = if shift >= 0 {
        raw.checked_mul(factor)
    } else {
        raw.checked_div(factor)
    }
    .ok_or_else(overflow)?;

    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(overflow)
}
