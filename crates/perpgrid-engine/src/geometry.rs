/*
[INPUT]:  Center price, mark price, and the configured spacing
[OUTPUT]: Level prices and signed cross-step counts
[POS]:    Geometry layer - pure pricing math, no state
[UPDATE]: When spacing modes or step-counting rules change
*/

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::errors::GridError;
use crate::numeric::pow_int;

/// Level spacing mode tag, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpacingMode {
    Abs,
    Percent,
}

/// Validated spacing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpacingConfig {
    /// `price(i) = center + i * step`
    Abs { step: Decimal },
    /// `price(i) = center * (1 + ratio)^i` (division below the center)
    Percent { ratio: Decimal },
}

impl SpacingConfig {
    pub fn validate(&self) -> Result<(), GridError> {
        match self {
            SpacingConfig::Abs { step } if *step <= Decimal::ZERO => {
                Err(GridError::NonPositiveStep {
                    step: step.to_string(),
                })
            }
            SpacingConfig::Percent { ratio } if *ratio <= Decimal::ZERO => {
                Err(GridError::NonPositiveStep {
                    step: ratio.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Price of the level at signed offset `index` from `center`.
    pub fn level_price(&self, center: Decimal, index: i32) -> Decimal {
        match self {
            SpacingConfig::Abs { step } => center + Decimal::from(index) * *step,
            SpacingConfig::Percent { ratio } => {
                let factor = pow_int(Decimal::ONE + *ratio, index.unsigned_abs());
                if index >= 0 {
                    center * factor
                } else {
                    center / factor
                }
            }
        }
    }

    /// Signed number of whole grid spacings between `center` and `mark`.
    ///
    /// Both prices must be positive. The percent mode goes through a float
    /// log ratio; the floor back to an integer bounds the error to at most
    /// one step near a boundary, which the confirmation window absorbs.
    pub fn cross_steps(&self, center: Decimal, mark: Decimal) -> Result<i32, GridError> {
        if center <= Decimal::ZERO {
            return Err(GridError::NonPositivePrice {
                field: "center",
                value: center.to_string(),
            });
        }
        if mark <= Decimal::ZERO {
            return Err(GridError::NonPositivePrice {
                field: "mark",
                value: mark.to_string(),
            });
        }

        match self {
            SpacingConfig::Abs { step } => {
                if *step <= Decimal::ZERO {
                    return Err(GridError::NonPositiveStep {
                        step: step.to_string(),
                    });
                }
                let diff = mark - center;
                let whole = (diff.abs() / *step).floor();
                let magnitude = clamp_to_i32(whole);
                Ok(if diff < Decimal::ZERO {
                    -magnitude
                } else {
                    magnitude
                })
            }
            SpacingConfig::Percent { ratio } => {
                if *ratio <= Decimal::ZERO {
                    return Err(GridError::NonPositiveStep {
                        step: ratio.to_string(),
                    });
                }
                if mark == center {
                    return Ok(0);
                }
                let r = (mark / center).to_f64().unwrap_or(1.0);
                let denom = (1.0 + ratio.to_f64().unwrap_or(0.0)).ln();
                if !(r > 0.0) || !(denom > 0.0) {
                    return Ok(0);
                }
                let magnitude = if r > 1.0 {
                    (r.ln() / denom).floor()
                } else {
                    ((1.0 / r).ln() / denom).floor()
                };
                let magnitude = magnitude.clamp(0.0, i32::MAX as f64) as i32;
                Ok(if r < 1.0 { -magnitude } else { magnitude })
            }
        }
    }
}

fn clamp_to_i32(value: Decimal) -> i32 {
    value
        .to_i64()
        .unwrap_or(i64::from(i32::MAX))
        .clamp(0, i64::from(i32::MAX)) as i32
}
