use crate::common::Int;
use crate::parse::FormatError;
use thiserror::Error;

/// Failure inside a [`Roller`](super::Roller). Surfaced to the caller
/// unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RollerError {
    #[error("pre-rolled queue exhausted")]
    Exhausted,
    #[error("value {value} outside [{low}, {high}]")]
    OutOfRange { value: Int, low: Int, high: Int },
}

/// Anything that can abort an evaluation. The expression tree stays reusable
/// after an error; only the in-flight roll is abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RollError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Roller(#[from] RollerError),
}
