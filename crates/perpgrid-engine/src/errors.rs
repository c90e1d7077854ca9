/*
[INPUT]:  Precondition failures on the trading path
[OUTPUT]: A per-operation error type that never takes the engine down
[POS]:    Error handling layer - trading-path failures
[UPDATE]: When grid or geometry operations gain new failure modes
*/

use std::fmt;

/// Failure of a single grid or geometry operation. These are logged and the
/// offending pass is skipped; they are never fatal to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    NonPositiveStep { step: String },
    NonPositivePrice { field: &'static str, value: String },
    CenterNotSet,
    LevelCountOutOfRange { levels: u32 },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::NonPositiveStep { step } => {
                write!(f, "rounding step must be positive, got {step}")
            }
            GridError::NonPositivePrice { field, value } => {
                write!(f, "{field} must be positive, got {value}")
            }
            GridError::CenterNotSet => write!(f, "grid center has not been established"),
            GridError::LevelCountOutOfRange { levels } => {
                write!(f, "levels per side out of range: {levels}")
            }
        }
    }
}

impl std::error::Error for GridError {}
