mod ctx;
mod die;
mod error;
mod roller;
mod stringify;
mod summary;
mod tree;

use crate::parse::ast::Expr;

pub(crate) type RResult<T> = Result<T, RollError>;

pub use ctx::RollContext;
pub use die::RolledDie;
pub use error::{RollError, RollerError};
pub use roller::{
    BoxRollFuture, CallbackRoller, DiceRoller, PreRolledRoller, RngRoller, Roller,
};
pub use stringify::{SimpleStringifier, TreeStringifier};
pub use summary::RollSummary;
pub use tree::RollResult;

/// Roll a parsed expression once against the given roller.
pub async fn eval<R: Roller>(expr: &Expr, roller: R) -> Result<RollSummary, RollError> {
    RollContext::new(roller).evaluate(expr).await
}
