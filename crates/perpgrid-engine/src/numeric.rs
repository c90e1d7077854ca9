/*
[INPUT]:  Decimal values and positive step sizes
[OUTPUT]: Step-aligned decimals and integer powers
[POS]:    Utility layer - arithmetic shared by geometry and sizing
[UPDATE]: When rounding or power semantics change
*/

use rust_decimal::Decimal;

use crate::errors::GridError;

/// Round `value` down to the nearest multiple of `step`.
///
/// `step` must be strictly positive.
pub fn round_down_to_step(value: Decimal, step: Decimal) -> Result<Decimal, GridError> {
    if step <= Decimal::ZERO {
        return Err(GridError::NonPositiveStep {
            step: step.to_string(),
        });
    }
    Ok((value / step).floor() * step)
}

/// `base` raised to a non-negative integer exponent.
pub fn pow_int(base: Decimal, exp: u32) -> Decimal {
    let mut result = Decimal::ONE;
    for _ in 0..exp {
        result *= base;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal")
    }

    #[test]
    fn round_down_aligns_to_step() {
        assert_eq!(round_down_to_step(dec("104"), dec("10")).unwrap(), dec("100"));
        assert_eq!(round_down_to_step(dec("0.37"), dec("0.05")).unwrap(), dec("0.35"));
        assert_eq!(round_down_to_step(dec("-4"), dec("10")).unwrap(), dec("-10"));
    }

    #[test]
    fn round_down_is_idempotent_and_never_exceeds_input() {
        let cases = [("123.456", "0.01"), ("99.9", "0.25"), ("7", "3")];
        for (value, step) in cases {
            let value = dec(value);
            let step = dec(step);
            let once = round_down_to_step(value, step).unwrap();
            let twice = round_down_to_step(once, step).unwrap();
            assert_eq!(once, twice);
            assert!(once <= value);
        }
    }

    #[test]
    fn round_down_rejects_non_positive_step() {
        assert!(round_down_to_step(dec("1"), Decimal::ZERO).is_err());
        assert!(round_down_to_step(dec("1"), dec("-0.1")).is_err());
    }

    #[test]
    fn pow_int_matches_repeated_multiplication() {
        assert_eq!(pow_int(dec("1.01"), 0), Decimal::ONE);
        assert_eq!(pow_int(dec("1.01"), 1), dec("1.01"));
        assert_eq!(pow_int(dec("2"), 10), dec("1024"));
    }
}
