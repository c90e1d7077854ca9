/*
[INPUT]:  Net position, pending exposure per side, and the candidate order
[OUTPUT]: Admit/reject decision under the max-position rule
[POS]:    Risk layer - pre-placement admission guard
[UPDATE]: When the admission rule or its inputs change
*/

use perpgrid_adapter::Side;
use rust_decimal::Decimal;

/// Worst-case max-position admission: every same-side pending order is
/// assumed to fill before this one.
///
/// BUY:  `net + pending_buy + qty <= max_position`
/// SELL: `net - pending_sell - qty >= -max_position`
pub fn admits(
    side: Side,
    net_position: Decimal,
    pending_buy: Decimal,
    pending_sell: Decimal,
    order_qty: Decimal,
    max_position: Decimal,
) -> bool {
    match side {
        Side::Buy => net_position + pending_buy + order_qty <= max_position,
        Side::Sell => net_position - pending_sell - order_qty >= -max_position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal")
    }

    #[test]
    fn risk_buy_caps_worst_case_long_exposure() {
        let max = dec("2");
        let qty = dec("1");
        assert!(admits(Side::Buy, dec("0"), dec("0"), dec("0"), qty, max));
        assert!(admits(Side::Buy, dec("0"), dec("1"), dec("0"), qty, max));
        assert!(!admits(Side::Buy, dec("0"), dec("2"), dec("0"), qty, max));
        // Pending sells never relax the buy-side bound.
        assert!(!admits(Side::Buy, dec("0"), dec("2"), dec("5"), qty, max));
    }

    #[test]
    fn risk_sell_caps_worst_case_short_exposure() {
        let max = dec("2");
        let qty = dec("1");
        assert!(admits(Side::Sell, dec("0"), dec("0"), dec("0"), qty, max));
        assert!(admits(Side::Sell, dec("0"), dec("0"), dec("1"), qty, max));
        assert!(!admits(Side::Sell, dec("0"), dec("0"), dec("2"), qty, max));
    }

    #[test]
    fn risk_existing_position_shifts_both_bounds() {
        let max = dec("3");
        let qty = dec("1");
        // Long 2: one more buy allowed, then capped.
        assert!(admits(Side::Buy, dec("2"), dec("0"), dec("0"), qty, max));
        assert!(!admits(Side::Buy, dec("2"), dec("1"), dec("0"), qty, max));
        // Long 2 leaves room for five sells.
        assert!(admits(Side::Sell, dec("2"), dec("0"), dec("4"), qty, max));
        assert!(!admits(Side::Sell, dec("2"), dec("0"), dec("5"), qty, max));
    }

    #[test]
    fn risk_zero_max_position_admits_nothing() {
        let qty = dec("1");
        assert!(!admits(Side::Buy, dec("0"), dec("0"), dec("0"), qty, dec("0")));
        assert!(!admits(Side::Sell, dec("0"), dec("0"), dec("0"), qty, dec("0")));
    }
}
