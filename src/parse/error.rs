use thiserror::Error;

/// Malformed notation, reported with the first offending position.
///
/// Raised by the parser for unknown tokens and unclosed constructs, and by
/// the evaluator for notation that only turns out to be invalid once dice are
/// in hand (missing mandatory targets, out-of-range dice counts, and so on).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at position {position} in {expression:?})")]
pub struct FormatError {
    pub message: String,
    pub expression: String,
    pub position: usize,
}

impl FormatError {
    pub fn new(
        message: impl Into<String>,
        expression: impl Into<String>,
        position: usize,
    ) -> Self {
        Self {
            message: message.into(),
            expression: expression.into(),
            position,
        }
    }
}
