//! Realized LP fee arithmetic
//!
//! Kinked utilization rate model and the integral-average fee computation
//! used to resolve a deposit's realized LP fee percentage. All percentages
//! and utilizations are 1e18 fixed point ("wad").

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// 1e18, the fixed-point unit for percentages and utilizations.
pub fn wad() -> U256 {
    U256::from(1_000_000_000_000_000_000u64)
}

/// Kinked utilization curve.
///
/// The instantaneous annualized rate at utilization `u` is
/// `r0 + min(u, ubar)/ubar * r1 + max(0, u - ubar)/(1 - ubar) * r2`,
/// i.e. a line of slope `r1/ubar` below the kink and `r2/(1 - ubar)` above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateModel {
    /// Utilization kink point, wad
    #[serde(rename = "UBar")]
    pub ubar: U256,
    /// Base rate, wad
    #[serde(rename = "R0")]
    pub r0: U256,
    /// Rate increase over [0, ubar], wad
    #[serde(rename = "R1")]
    pub r1: U256,
    /// Rate increase over [ubar, 1], wad
    #[serde(rename = "R2")]
    pub r2: U256,
}

/// Instantaneous rate at utilization `u` (wad in, wad out).
///
/// Utilizations above 100% are clamped to 100%.
pub fn instantaneous_rate(model: &RateModel, u: U256) -> U256 {
    let one = wad();
    let u = if u > one { one } else { u };

    let below_kink = if u < model.ubar { u } else { model.ubar };
    let mut rate = model.r0;
    if !model.ubar.is_zero() {
        rate += below_kink * model.r1 / model.ubar;
    }
    if u > model.ubar {
        let above_kink = u - model.ubar;
        let span = one - model.ubar;
        if !span.is_zero() {
            rate += above_kink * model.r2 / span;
        }
    }
    rate
}

/// Definite integral of the rate curve over `[lower, upper]`, scaled by wad.
///
/// The curve is piecewise linear, so the integral over each piece is the
/// trapezoid between its endpoint rates.
fn rate_integral(model: &RateModel, lower: U256, upper: U256) -> U256 {
    debug_assert!(lower <= upper);
    let two = U256::from(2);

    // Split at the kink so each segment is linear.
    let mut total = U256::ZERO;
    let mut segments: Vec<(U256, U256)> = Vec::with_capacity(2);
    if lower < model.ubar && upper > model.ubar {
        segments.push((lower, model.ubar));
        segments.push((model.ubar, upper));
    } else {
        segments.push((lower, upper));
    }

    for (a, b) in segments {
        let width = b - a;
        let avg = (instantaneous_rate(model, a) + instantaneous_rate(model, b)) / two;
        total += avg * width / wad();
    }
    total
}

/// Average rate between two utilization points (wad).
///
/// With `before == after` this degenerates to the instantaneous rate at
/// that point.
pub fn average_rate(model: &RateModel, util_before: U256, util_after: U256) -> U256 {
    if util_before == util_after {
        return instantaneous_rate(model, util_before);
    }
    let (lower, upper) = if util_before < util_after {
        (util_before, util_after)
    } else {
        (util_after, util_before)
    };
    rate_integral(model, lower, upper) * wad() / (upper - lower)
}

/// Realized LP fee percentage for a deposit that moves pool utilization
/// from `util_before` to `util_after`, wad.
pub fn realized_lp_fee_pct(model: &RateModel, util_before: U256, util_after: U256) -> U256 {
    average_rate(model, util_before, util_after)
}
