//! A tabletop dice-notation engine: parse expressions like `4d20 kh2 #cs #cf`
//! or `(2d6+2d10)!` into a reusable tree, roll them through a pluggable
//! (possibly asynchronous) dice source, and get back a structured result
//! graph with full provenance for every die.

pub mod common;
pub mod parse;
pub mod roll;
pub mod stats;

pub use common::{CompareOp, DieKind, Int, OpType};
pub use parse::{parse, FormatError};
pub use roll::{
    eval, CallbackRoller, DiceRoller, PreRolledRoller, RngRoller, RollContext, RollError,
    RollResult, RollSummary, RolledDie, Roller, RollerError,
};

pub mod prelude {
    pub use crate::common::{CompareOp, DieKind, Int, OpType};
    pub use crate::parse::{parse, ast::Expr, FormatError};
    pub use crate::roll::{
        eval, PreRolledRoller, RngRoller, RollContext, RollError, RollResult, RollSummary,
        RolledDie, Roller, RollerError,
    };
    pub use crate::stats::{gather, gather_default, Stats};
}
