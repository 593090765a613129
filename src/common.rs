use serde::{Serialize, Serializer};
use std::fmt::{self, Write};

/// Scalar type for die faces, modifier targets, and totals.
pub type Int = i64;

/// Hard ceiling on the number of dice in one roll request.
pub const MAX_NDICE: Int = 1000;
/// Smallest admissible die.
pub const MIN_NSIDES: Int = 2;
/// Largest admissible die.
pub const MAX_NSIDES: Int = 100_000;
/// Bound on reroll/explode/compound/penetrate chains per die.
pub const ITERATION_LIMIT: usize = 1000;
/// Face set of a fudge die.
pub const FUDGE_FACES: [Int; 6] = [-1, -1, 0, 0, 1, 1];

/// What kind of die produced an outcome.
///
/// `D66` is the composed two-d6 die (`tens * 10 + ones`), distinct from a
/// 66-sided polyhedral. `NVals` draws from an explicit value list, and
/// `SingleVal` is a degenerate die holding exactly one value (integer
/// literals, collapsed totals, counters).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum DieKind {
    Polyhedral,
    Fudge,
    D66,
    NVals,
    SingleVal,
}

impl DieKind {
    pub const fn requires_nsides(self) -> bool {
        matches!(self, Self::Polyhedral)
    }

    pub const fn requires_potential_values(self) -> bool {
        matches!(self, Self::Fudge | Self::NVals | Self::SingleVal)
    }

    /// Whether explode/compound may grow this die. A composed d66 or a
    /// degenerate single-value die never explodes.
    pub const fn explodable(self) -> bool {
        matches!(self, Self::Polyhedral | Self::NVals)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Polyhedral => "polyhedral",
            Self::Fudge => "fudge",
            Self::D66 => "d66",
            Self::NVals => "nvals",
            Self::SingleVal => "singleVal",
        }
    }
}

impl fmt::Display for DieKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DieKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Comparator suffix of a modifier (`>`, `<`, `>=`, `<=`, `=`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompareOp {
    Equal,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equal => "=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
        };
        f.write_str(s)
    }
}

/// Shared modifier predicate. A missing comparator means equality.
pub(crate) fn compare(op: Option<CompareOp>, value: Int, target: Int) -> bool {
    match op.unwrap_or(CompareOp::Equal) {
        CompareOp::Equal => value == target,
        CompareOp::Greater => value > target,
        CompareOp::Less => value < target,
        CompareOp::GreaterEqual => value >= target,
        CompareOp::LessEqual => value <= target,
    }
}

/// Operation that produced a [`RollResult`](crate::roll::RollResult) node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpType {
    Value,
    Add,
    Subtract,
    Multiply,
    Count,
    Drop,
    Clamp,
    RollDice,
    RollFudge,
    RollPercent,
    RollD66,
    RollVals,
    RollPenetration,
    Reroll,
    Compound,
    Explode,
    Sort,
    Comma,
    Total,
}

impl OpType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Count => "count",
            Self::Drop => "drop",
            Self::Clamp => "clamp",
            Self::RollDice => "rollDice",
            Self::RollFudge => "rollFudge",
            Self::RollPercent => "rollPercent",
            Self::RollD66 => "rollD66",
            Self::RollVals => "rollVals",
            Self::RollPenetration => "rollPenetration",
            Self::Reroll => "reroll",
            Self::Compound => "compound",
            Self::Explode => "explode",
            Self::Sort => "sort",
            Self::Comma => "comma",
            Self::Total => "total",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OpType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

pub(crate) fn is_zero(n: &Int) -> bool {
    *n == 0
}

pub(crate) fn join_ints(vals: &[Int]) -> String {
    let mut out = String::new();
    for (i, v) in vals.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", v);
    }
    out
}
