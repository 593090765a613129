use super::die::RolledDie;
use crate::common::{Int, OpType};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::sync::Arc;

/// One node of the evaluated tree.
///
/// `results` holds the kept dice (the pool), `discarded` everything that no
/// longer contributes to the total but retains provenance. `left`/`right`
/// point at the child results this node was combined from; a child may be
/// shared by several ancestors, so children are reference-counted.
#[derive(Debug, Clone, PartialEq)]
pub struct RollResult {
    pub expression: String,
    pub op: OpType,
    pub results: Vec<RolledDie>,
    pub discarded: Vec<RolledDie>,
    pub left: Option<Arc<RollResult>>,
    pub right: Option<Arc<RollResult>>,
}

/// Children are only attached for meaningful subexpressions, never for bare
/// integer literals.
pub(crate) fn child_of(result: &RollResult) -> Option<Arc<RollResult>> {
    (result.op != OpType::Value).then(|| Arc::new(result.clone()))
}

pub(crate) fn arcs_of(dice: &[RolledDie]) -> Vec<Arc<RolledDie>> {
    dice.iter().cloned().map(Arc::new).collect()
}

fn into_discarded(dice: Vec<RolledDie>) -> impl Iterator<Item = RolledDie> {
    dice.into_iter().map(|mut die| {
        die.discarded = true;
        die
    })
}

impl RollResult {
    pub fn new(expression: String, op: OpType) -> Self {
        Self {
            expression,
            op,
            results: Vec::new(),
            discarded: Vec::new(),
            left: None,
            right: None,
        }
    }

    /// A literal node: one single-value die, or nothing for the empty value.
    pub fn value(expression: String, die: Option<RolledDie>) -> Self {
        let mut ret = Self::new(expression, OpType::Value);
        ret.results.extend(die);
        ret
    }

    /// The empty operand (`ε`), as produced by e.g. the left side of `-6`.
    pub(crate) fn is_empty_value(&self) -> bool {
        self.op == OpType::Value && self.results.is_empty()
    }

    pub fn total(&self) -> Int {
        self.results.iter().map(|die| die.result).sum()
    }

    /// Kept dice flagged as successes; a critical success counts too.
    pub fn success_count(&self) -> usize {
        self.results
            .iter()
            .filter(|d| d.success || d.crit_success)
            .count()
    }

    /// Kept dice flagged as failures; a critical failure counts too.
    pub fn failure_count(&self) -> usize {
        self.results
            .iter()
            .filter(|d| d.failure || d.crit_failure)
            .count()
    }

    pub fn crit_success_count(&self) -> usize {
        self.results.iter().filter(|d| d.crit_success).count()
    }

    pub fn crit_failure_count(&self) -> usize {
        self.results.iter().filter(|d| d.crit_failure).count()
    }

    /// Addition concatenates both pools.
    pub fn add(self, rhs: Self, expression: String) -> Self {
        let left = child_of(&self);
        let right = child_of(&rhs);
        let mut results = self.results;
        results.extend(rhs.results);
        let mut discarded = self.discarded;
        discarded.extend(rhs.discarded);
        Self {
            expression,
            op: OpType::Add,
            results,
            discarded,
            left,
            right,
        }
    }

    /// Subtraction keeps the left pool and appends one negated total for the
    /// right side, whose dice all move to `discarded`.
    pub fn subtract(self, rhs: Self, expression: String) -> Self {
        let left = child_of(&self);
        let right = child_of(&rhs);
        let mut negated = RolledDie::single(-rhs.total());
        negated.totaled = true;
        negated.from = arcs_of(&rhs.results);
        let mut results = self.results;
        results.push(negated);
        let mut discarded = self.discarded;
        discarded.extend(rhs.discarded);
        discarded.extend(into_discarded(rhs.results));
        Self {
            expression,
            op: OpType::Subtract,
            results,
            discarded,
            left,
            right,
        }
    }

    /// Multiplication collapses both pools into a single product die.
    pub fn multiply(self, rhs: Self, expression: String) -> Self {
        let left = child_of(&self);
        let right = child_of(&rhs);
        let mut product = RolledDie::single(self.total() * rhs.total());
        product.totaled = true;
        let mut from = arcs_of(&self.results);
        from.extend(arcs_of(&rhs.results));
        product.from = from;
        let mut discarded = self.discarded;
        discarded.extend(rhs.discarded);
        discarded.extend(into_discarded(self.results));
        discarded.extend(into_discarded(rhs.results));
        Self {
            expression,
            op: OpType::Multiply,
            results: vec![product],
            discarded,
            left,
            right,
        }
    }

    /// Ordered aggregation: comma nodes splice in directly, any other side is
    /// collapsed to one totaled die.
    pub fn comma(self, rhs: Self, expression: String) -> Self {
        let left = child_of(&self);
        let right = child_of(&rhs);
        let mut discarded = Vec::new();
        let mut results = Self::comma_side(self, &mut discarded);
        results.extend(Self::comma_side(rhs, &mut discarded));
        Self {
            expression,
            op: OpType::Comma,
            results,
            discarded,
            left,
            right,
        }
    }

    fn comma_side(side: Self, discarded: &mut Vec<RolledDie>) -> Vec<RolledDie> {
        discarded.extend(side.discarded);
        if side.op == OpType::Comma {
            return side.results;
        }
        let mut totaled = RolledDie::single(side.results.iter().map(|d| d.result).sum());
        totaled.totaled = true;
        totaled.from = arcs_of(&side.results);
        discarded.extend(into_discarded(side.results));
        vec![totaled]
    }

    /// `{expr}`: reduce the pool to one totaled die, discarding the parts.
    pub fn aggregate(self, expression: String) -> Self {
        let left = child_of(&self);
        let mut totaled = RolledDie::single(self.total());
        totaled.totaled = true;
        totaled.from = arcs_of(&self.results);
        let mut discarded = self.discarded;
        discarded.extend(into_discarded(self.results));
        Self {
            expression,
            op: OpType::Total,
            results: vec![totaled],
            discarded,
            left,
            right: None,
        }
    }

    /// JSON projection with the sparsity rule (zero/false/empty/null
    /// omitted).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("roll projection is infallible")
    }
}

impl Serialize for RollResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RollResult", 11)?;
        if self.expression.is_empty() {
            s.skip_field("expression")?;
        } else {
            s.serialize_field("expression", &self.expression)?;
        }
        s.serialize_field("opType", &self.op)?;
        if self.results.is_empty() {
            s.skip_field("results")?;
        } else {
            s.serialize_field("results", &self.results)?;
        }
        if self.discarded.is_empty() {
            s.skip_field("discarded")?;
        } else {
            s.serialize_field("discarded", &self.discarded)?;
        }
        match &self.left {
            Some(left) => s.serialize_field("left", left.as_ref())?,
            None => s.skip_field("left")?,
        }
        match &self.right {
            Some(right) => s.serialize_field("right", right.as_ref())?,
            None => s.skip_field("right")?,
        }
        let total = self.total();
        if total == 0 {
            s.skip_field("total")?;
        } else {
            s.serialize_field("total", &total)?;
        }
        let counts = [
            ("successCount", self.success_count()),
            ("failureCount", self.failure_count()),
            ("critSuccessCount", self.crit_success_count()),
            ("critFailureCount", self.crit_failure_count()),
        ];
        for (name, count) in counts {
            if count == 0 {
                s.skip_field(name)?;
            } else {
                s.serialize_field(name, &count)?;
            }
        }
        s.end()
    }
}
