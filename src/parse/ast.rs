use crate::common::{join_ints, CompareOp, Int};
use enum_dispatch::enum_dispatch;
use std::fmt;
use vec1::Vec1;

/// Source access shared by every node of the expression tree.
#[enum_dispatch]
pub trait AstNode {
    /// Byte offset of the token that introduced this node. Carried into
    /// evaluation-time [`FormatError`](super::FormatError)s.
    fn position(&self) -> usize;
}

/// One node of the parsed expression tree.
///
/// The tree is immutable and reusable: evaluating it never mutates it, so a
/// parsed expression may be rolled any number of times.
#[derive(Debug, Clone, PartialEq)]
#[enum_dispatch(AstNode)]
pub enum Expr {
    Value(Value),
    Binary(Binary),
    Aggregate(Aggregate),
    Dice(Dice),
    Pool(Pool),
    Reroll(Reroll),
    Explode(Explode),
    Count(Count),
}

impl Expr {
    /// Binding strength for canonical re-printing; higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            Self::Value(_) | Self::Aggregate(_) => 7,
            Self::Dice(_) => 6,
            Self::Explode(_) => 5,
            Self::Reroll(_) => 4,
            Self::Pool(_) => 3,
            Self::Count(_) => 2,
            Self::Binary(b) => match b.op {
                BinaryOp::Mul => 1,
                _ => 0,
            },
        }
    }

    /// Whether this is the empty operand (`ε` in the grammar).
    pub fn is_empty_value(&self) -> bool {
        matches!(self, Self::Value(v) if v.value.is_none())
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr, min_prec: u8) -> fmt::Result {
    if operand.precedence() < min_prec {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(x) => fmt::Display::fmt(x, f),
            Self::Binary(x) => fmt::Display::fmt(x, f),
            Self::Aggregate(x) => fmt::Display::fmt(x, f),
            Self::Dice(x) => fmt::Display::fmt(x, f),
            Self::Pool(x) => fmt::Display::fmt(x, f),
            Self::Reroll(x) => fmt::Display::fmt(x, f),
            Self::Explode(x) => fmt::Display::fmt(x, f),
            Self::Count(x) => fmt::Display::fmt(x, f),
        }
    }
}

/// An integer literal, or the empty operand when `value` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub value: Option<Int>,
    pub position: usize,
}

impl Value {
    pub fn new(value: Int, position: usize) -> Self {
        Self {
            value: Some(value),
            position,
        }
    }

    pub fn empty(position: usize) -> Self {
        Self {
            value: None,
            position,
        }
    }
}

impl AstNode for Value {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{}", v),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Comma,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Comma => ",",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub position: usize,
}

impl Binary {
    pub fn new(op: BinaryOp, left: Expr, right: Expr, position: usize) -> Self {
        Self {
            op,
            left: Box::new(left),
            right: Box::new(right),
            position,
        }
    }
}

impl AstNode for Binary {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = match self.op {
            BinaryOp::Mul => 1,
            _ => 0,
        };
        if self.left.is_empty_value() {
            // `-6` re-prints without its implicit empty left operand
            write!(f, "{}", self.op)?;
            return write_operand(f, &self.right, prec + 1);
        }
        write_operand(f, &self.left, prec)?;
        match self.op {
            BinaryOp::Comma => write!(f, ", ")?,
            op => write!(f, " {} ", op)?,
        }
        write_operand(f, &self.right, prec + 1)
    }
}

/// `{expr}`: collapses the inner pool into a single totaled value.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub inner: Box<Expr>,
    pub position: usize,
}

impl Aggregate {
    pub fn new(inner: Expr, position: usize) -> Self {
        Self {
            inner: Box::new(inner),
            position,
        }
    }
}

impl AstNode for Aggregate {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.inner)
    }
}

/// Right-hand side of the `d` operator.
#[derive(Debug, Clone, PartialEq)]
pub enum DiceKind {
    /// `NdS` where the sides are themselves an expression.
    Std(Box<Expr>),
    /// `Nd%`, a d100.
    Percent,
    /// `ND66`, the composed two-d6 die.
    D66,
    /// `NdF`, drawing from the fudge face set.
    Fudge,
    /// `Nd[v1,v2,...]`, drawing uniformly from an explicit list.
    Csv(Vec1<Int>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dice {
    /// Number-of-dice operand; the empty value defaults to 1 at evaluation.
    pub count: Box<Expr>,
    pub kind: DiceKind,
    pub position: usize,
}

impl Dice {
    pub fn new(count: Expr, kind: DiceKind, position: usize) -> Self {
        Self {
            count: Box::new(count),
            kind,
            position,
        }
    }
}

impl AstNode for Dice {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Dice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.count.is_empty_value() {
            write_operand(f, &self.count, 7)?;
        }
        match &self.kind {
            DiceKind::Std(sides) => {
                f.write_str("d")?;
                if sides.is_empty_value() {
                    Ok(())
                } else {
                    write_operand(f, sides, 7)
                }
            }
            DiceKind::Percent => f.write_str("d%"),
            DiceKind::D66 => f.write_str("D66"),
            DiceKind::Fudge => f.write_str("dF"),
            DiceKind::Csv(vals) => write!(f, "d[{}]", join_ints(vals.as_slice())),
        }
    }
}

/// Drop/keep/clamp/sort family applied to the pool on its left.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PoolOp {
    DropCmp(CompareOp),
    DropHigh,
    DropLow,
    KeepHigh,
    KeepLow,
    ClampMax,
    ClampMin,
    SortAsc,
    SortDesc,
}

impl fmt::Display for PoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropCmp(op) => write!(f, "-{}", op),
            Self::DropHigh => f.write_str("-h"),
            Self::DropLow => f.write_str("-l"),
            Self::KeepHigh => f.write_str("kh"),
            Self::KeepLow => f.write_str("kl"),
            Self::ClampMax => f.write_str("C>"),
            Self::ClampMin => f.write_str("C<"),
            Self::SortAsc => f.write_str("s"),
            Self::SortDesc => f.write_str("sd"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub lhs: Box<Expr>,
    pub op: PoolOp,
    pub target: Option<Int>,
    pub position: usize,
}

impl Pool {
    pub fn new(lhs: Expr, op: PoolOp, target: Option<Int>, position: usize) -> Self {
        Self {
            lhs: Box::new(lhs),
            op,
            target,
            position,
        }
    }
}

impl AstNode for Pool {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_operand(f, &self.lhs, 3)?;
        write!(f, "{}", self.op)?;
        if let Some(t) = self.target {
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

/// `r` / `ro`: replace matching dice with fresh rolls.
#[derive(Debug, Clone, PartialEq)]
pub struct Reroll {
    pub lhs: Box<Expr>,
    pub once: bool,
    pub cmp: Option<CompareOp>,
    pub target: Option<Int>,
    pub position: usize,
}

impl Reroll {
    pub fn new(
        lhs: Expr,
        once: bool,
        cmp: Option<CompareOp>,
        target: Option<Int>,
        position: usize,
    ) -> Self {
        Self {
            lhs: Box::new(lhs),
            once,
            cmp,
            target,
            position,
        }
    }
}

impl AstNode for Reroll {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Reroll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_operand(f, &self.lhs, 4)?;
        f.write_str(if self.once { "ro" } else { "r" })?;
        if let Some(cmp) = self.cmp {
            write!(f, "{}", cmp)?;
        }
        if let Some(t) = self.target {
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExplodeKind {
    /// `!` / `!o`: append fresh dice while the last one matches.
    Explode,
    /// `!!` / `!!o`: like explode but summed into the original die.
    Compound,
    /// `p` / `pM`: exploding with a −1 adjustment per follow-on roll;
    /// `target` holds the penetration-die size, not a match target.
    Penetrate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Explode {
    pub lhs: Box<Expr>,
    pub kind: ExplodeKind,
    pub once: bool,
    pub cmp: Option<CompareOp>,
    pub target: Option<Int>,
    pub position: usize,
}

impl Explode {
    pub fn new(
        lhs: Expr,
        kind: ExplodeKind,
        once: bool,
        cmp: Option<CompareOp>,
        target: Option<Int>,
        position: usize,
    ) -> Self {
        Self {
            lhs: Box::new(lhs),
            kind,
            once,
            cmp,
            target,
            position,
        }
    }
}

impl AstNode for Explode {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Explode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_operand(f, &self.lhs, 5)?;
        let op = match (self.kind, self.once) {
            (ExplodeKind::Explode, false) => "!",
            (ExplodeKind::Explode, true) => "!o",
            (ExplodeKind::Compound, false) => "!!",
            (ExplodeKind::Compound, true) => "!!o",
            (ExplodeKind::Penetrate, _) => "p",
        };
        f.write_str(op)?;
        if let Some(cmp) = self.cmp {
            write!(f, "{}", cmp)?;
        }
        if let Some(t) = self.target {
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CountKind {
    /// `#`: collapse the pool into a match counter.
    All,
    /// `#s`: flag matching dice as successes.
    Success,
    /// `#f`: flag matching dice as failures.
    Failure,
    /// `#cs`: flag matching dice as critical successes.
    CritSuccess,
    /// `#cf`: flag matching dice as critical failures.
    CritFailure,
}

impl fmt::Display for CountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "#",
            Self::Success => "#s",
            Self::Failure => "#f",
            Self::CritSuccess => "#cs",
            Self::CritFailure => "#cf",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    pub lhs: Box<Expr>,
    pub kind: CountKind,
    pub cmp: Option<CompareOp>,
    pub target: Option<Int>,
    pub position: usize,
}

impl Count {
    pub fn new(
        lhs: Expr,
        kind: CountKind,
        cmp: Option<CompareOp>,
        target: Option<Int>,
        position: usize,
    ) -> Self {
        Self {
            lhs: Box::new(lhs),
            kind,
            cmp,
            target,
            position,
        }
    }
}

impl AstNode for Count {
    fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_operand(f, &self.lhs, 2)?;
        write!(f, "{}", self.kind)?;
        if let Some(cmp) = self.cmp {
            write!(f, "{}", cmp)?;
        }
        if let Some(t) = self.target {
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}
