//! Boundary types for the indicator subsystem.
//!
//! Indicator mathematics happens outside this crate; the decision engine
//! consumes one strongly-typed [`PeriodSnapshot`] per candle period plus the
//! two pricing formulas below, which are pure functions of their arguments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Fill, OrderSide};

/// Named indicator values for one candle period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSnapshot {
    /// Period name, e.g. "BTC30" or "BTC-USD-5m"
    pub period: String,
    /// Close of the latest candle
    pub close: Decimal,
    /// Slope of the moving average; positive means rising
    pub sma_trend: Decimal,
    /// Lower volatility band (1 standard deviation)
    pub bband_lower_1: Decimal,
    /// Upper volatility band (1 standard deviation)
    pub bband_upper_1: Decimal,
}

/// Break-even sell price for a hypothetical buy of `fiat_funds` at `price`,
/// paying `fee_rate` on both legs.
///
/// Returns `None` when the inputs cannot describe a trade (zero/negative
/// price or no funds).
pub fn break_even_price(
    fiat_funds: Decimal,
    price: Decimal,
    fee_rate: Decimal,
) -> Option<Decimal> {
    if price <= Decimal::ZERO || fiat_funds <= Decimal::ZERO {
        return None;
    }
    let size = fiat_funds / price;
    let cost = fiat_funds * (Decimal::ONE + fee_rate);
    let net_factor = Decimal::ONE - fee_rate;
    if net_factor <= Decimal::ZERO {
        return None;
    }
    // Price at which selling `size` recovers the fee-inclusive cost.
    Some(cost / (size * net_factor))
}

/// Target sell price: the fee-weighted cost basis of the most recent run of
/// consecutive buy-side fills, newest first.
///
/// Returns `None` when the latest fill is not a buy (the position was not
/// built by our most recent purchases) or the list is empty.
pub fn sell_point(recent_fills: &[Fill]) -> Option<Decimal> {
    let mut total_cost = Decimal::ZERO;
    let mut total_size = Decimal::ZERO;
    for fill in recent_fills {
        if fill.side != OrderSide::Buy {
            break;
        }
        total_cost += fill.price * fill.size + fill.fee;
        total_size += fill.size;
    }
    if total_size <= Decimal::ZERO {
        return None;
    }
    Some(total_cost / total_size)
}
