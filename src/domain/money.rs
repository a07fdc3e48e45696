use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits the exchange will accept for coin sizes.
pub const COIN_DP: u32 = 8;
/// Fractional digits for fiat amounts.
pub const FIAT_DP: u32 = 2;

/// Round a coin amount down to the hundred-millionth place.
///
/// The exchange records balances to more digits than it will accept in an
/// order, so everything is floored before use. Never rounds up.
pub fn round_coin(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(COIN_DP, RoundingStrategy::ToNegativeInfinity)
}

/// Round a fiat amount down to the cent. Never rounds up.
pub fn round_fiat(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(FIAT_DP, RoundingStrategy::ToNegativeInfinity)
}
