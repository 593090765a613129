use super::die::RolledDie;
use super::error::RollError;
use super::roller::{DiceRoller, Roller};
use super::summary::RollSummary;
use super::tree::{child_of, RollResult};
use super::RResult;
use crate::common::{
    compare, DieKind, Int, OpType, ITERATION_LIMIT, MAX_NDICE, MAX_NSIDES, MIN_NSIDES,
};
use crate::parse::ast::{self, AstNode, Expr};
use crate::parse::FormatError;
use async_trait::async_trait;
use log::{debug, trace};
use std::sync::Arc;

type RollListener = Box<dyn FnMut(&RollResult) + Send>;
type SummaryListener = Box<dyn FnMut(&RollSummary) + Send>;

/// Drives the asynchronous post-order walk over an expression tree.
///
/// Rolls happen strictly left-to-right, depth-first; with a deterministic
/// roller the mapping from queue position to die is observable. A context is
/// single-consumer, but the expression tree it walks is stateless and may be
/// shared and re-rolled freely.
pub struct RollContext<R: Roller> {
    roller: DiceRoller<R>,
    iteration_limit: usize,
    on_roll: Option<RollListener>,
    on_summary: Option<SummaryListener>,
    source: String,
}

impl<R: Roller> RollContext<R> {
    pub fn new(roller: R) -> Self {
        Self {
            roller: DiceRoller::new(roller),
            iteration_limit: ITERATION_LIMIT,
            on_roll: None,
            on_summary: None,
            source: String::new(),
        }
    }

    /// Override the per-die iteration bound (mostly for tests).
    pub fn iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = limit;
        self
    }

    /// Observe every non-root node as it is emitted.
    pub fn on_roll(mut self, f: impl FnMut(&RollResult) + Send + 'static) -> Self {
        self.on_roll = Some(Box::new(f));
        self
    }

    /// Observe the root summary of every evaluation.
    pub fn on_summary(mut self, f: impl FnMut(&RollSummary) + Send + 'static) -> Self {
        self.on_summary = Some(Box::new(f));
        self
    }

    /// Roll the expression once, producing an independent result tree.
    pub async fn evaluate(&mut self, expr: &Expr) -> Result<RollSummary, RollError> {
        self.source = expr.to_string();
        debug!("evaluating {:?}", self.source);
        let root = expr.eval(self).await?;
        let summary = RollSummary::new(root);
        if let Some(f) = &mut self.on_summary {
            f(&summary);
        }
        Ok(summary)
    }

    async fn eval_child(&mut self, expr: &Expr) -> RResult<RollResult> {
        let result = expr.eval(self).await?;
        trace!(
            "node at {}: {:?} => {}",
            expr.position(),
            result.expression,
            result.total()
        );
        if let Some(f) = &mut self.on_roll {
            f(&result);
        }
        Ok(result)
    }

    fn format_err(&self, message: impl Into<String>, position: usize) -> RollError {
        RollError::Format(FormatError::new(message, self.source.clone(), position))
    }

    fn chain_limit(&self, once: bool) -> usize {
        if once {
            1
        } else {
            self.iteration_limit
        }
    }

    async fn eval_dice(&mut self, node: &ast::Dice) -> RResult<RollResult> {
        let count_result = self.eval_child(&node.count).await?;
        let ndice = total_or(&count_result, 1);
        if !(0..=MAX_NDICE).contains(&ndice) {
            return Err(self.format_err(
                format!("Invalid dice count {}. Expected 0 to {}", ndice, MAX_NDICE),
                node.position,
            ));
        }
        let expression = node.to_string();
        let left = child_if_present(&count_result);

        let (op, results, discarded, right) = match &node.kind {
            ast::DiceKind::Std(sides) => {
                let sides_result = self.eval_child(sides).await?;
                if sides_result.is_empty_value() {
                    return Err(self.format_err(
                        "Invalid dice operation. Missing number of sides",
                        node.position,
                    ));
                }
                let nsides = sides_result.total();
                if !(MIN_NSIDES..=MAX_NSIDES).contains(&nsides) {
                    return Err(self.format_err(
                        format!(
                            "Invalid dice size {}. Expected {} to {}",
                            nsides, MIN_NSIDES, MAX_NSIDES
                        ),
                        node.position,
                    ));
                }
                let dice = self.roller.roll(ndice, nsides).await?;
                let right = child_if_present(&sides_result);
                (OpType::RollDice, dice, Vec::new(), right)
            }
            ast::DiceKind::Percent => {
                let dice = self.roller.roll(ndice, 100).await?;
                (OpType::RollPercent, dice, Vec::new(), None)
            }
            ast::DiceKind::D66 => {
                let dice = self.roller.roll_d66(ndice).await?;
                let discarded = dice
                    .iter()
                    .flat_map(|die| die.from.iter())
                    .map(|source| {
                        let mut d = (**source).clone();
                        d.discarded = true;
                        d
                    })
                    .collect();
                (OpType::RollD66, dice, discarded, None)
            }
            ast::DiceKind::Fudge => {
                let dice = self.roller.roll_fudge(ndice).await?;
                (OpType::RollFudge, dice, Vec::new(), None)
            }
            ast::DiceKind::Csv(vals) => {
                let dice = self.roller.roll_vals(ndice, vals.as_slice()).await?;
                (OpType::RollVals, dice, Vec::new(), None)
            }
        };

        Ok(RollResult {
            expression,
            op,
            results,
            discarded,
            left,
            right,
        })
    }

    fn apply_pool(&self, node: &ast::Pool, lhs: RollResult) -> RResult<RollResult> {
        let expression = node.to_string();
        let left = child_of(&lhs);
        let RollResult {
            results,
            mut discarded,
            ..
        } = lhs;

        let (op, kept) = match node.op {
            ast::PoolOp::DropCmp(cmp) => {
                let target = node.target.ok_or_else(|| {
                    self.format_err(
                        "Invalid drop operation. Missing drop target",
                        node.position,
                    )
                })?;
                let mut kept = Vec::with_capacity(results.len());
                for die in results {
                    if compare(Some(cmp), die.result, target) {
                        let mut dropped = die;
                        dropped.discarded = true;
                        discarded.push(dropped);
                    } else {
                        kept.push(die);
                    }
                }
                (OpType::Drop, kept)
            }
            ast::PoolOp::DropHigh
            | ast::PoolOp::DropLow
            | ast::PoolOp::KeepHigh
            | ast::PoolOp::KeepLow => {
                let k = node.target.unwrap_or(1).max(0) as usize;
                let mut sorted = results;
                sorted.sort();
                let len = sorted.len();
                let (kept, dropped) = if k >= len {
                    // requesting at least the whole pool empties it
                    (Vec::new(), sorted)
                } else {
                    match node.op {
                        // kept stays below the cut, the top k drop
                        ast::PoolOp::DropHigh => {
                            let dropped = sorted.split_off(len - k);
                            (sorted, dropped)
                        }
                        // bottom k drop
                        ast::PoolOp::DropLow => {
                            let kept = sorted.split_off(k);
                            (kept, sorted)
                        }
                        ast::PoolOp::KeepHigh => {
                            let kept = sorted.split_off(len - k);
                            (kept, sorted)
                        }
                        ast::PoolOp::KeepLow => {
                            let dropped = sorted.split_off(k);
                            (sorted, dropped)
                        }
                        _ => unreachable!(),
                    }
                };
                discarded.extend(dropped.into_iter().map(|mut die| {
                    die.discarded = true;
                    die
                }));
                (OpType::Drop, kept)
            }
            ast::PoolOp::ClampMax | ast::PoolOp::ClampMin => {
                let target = node.target.ok_or_else(|| {
                    self.format_err(
                        "Invalid clamp operation. Missing clamp target",
                        node.position,
                    )
                })?;
                let ceiling = node.op == ast::PoolOp::ClampMax;
                let mut kept = Vec::with_capacity(results.len());
                for die in results {
                    let out_of_bounds = if ceiling {
                        die.result > target
                    } else {
                        die.result < target
                    };
                    if out_of_bounds {
                        let mut clamped = die.clone();
                        clamped.result = target;
                        if ceiling {
                            clamped.clamp_ceiling = true;
                        } else {
                            clamped.clamp_floor = true;
                        }
                        clamped.from = vec![Arc::new(die.clone())];
                        kept.push(clamped);
                        let mut original = die;
                        original.discarded = true;
                        discarded.push(original);
                    } else {
                        kept.push(die);
                    }
                }
                (OpType::Clamp, kept)
            }
            ast::PoolOp::SortAsc | ast::PoolOp::SortDesc => {
                let mut kept = results;
                kept.sort();
                discarded.sort();
                if node.op == ast::PoolOp::SortDesc {
                    kept.reverse();
                    discarded.reverse();
                }
                (OpType::Sort, kept)
            }
        };

        Ok(RollResult {
            expression,
            op,
            results: kept,
            discarded,
            left,
            right: None,
        })
    }

    async fn apply_reroll(&mut self, node: &ast::Reroll, lhs: RollResult) -> RResult<RollResult> {
        let target = node.target.ok_or_else(|| {
            self.format_err(
                "Invalid reroll operation. Missing reroll target",
                node.position,
            )
        })?;
        let expression = node.to_string();
        let left = child_of(&lhs);
        let limit = self.chain_limit(node.once);
        let RollResult {
            results,
            mut discarded,
            ..
        } = lhs;

        let mut kept = Vec::with_capacity(results.len());
        for die in results {
            if !compare(node.cmp, die.result, target) {
                kept.push(die);
                continue;
            }
            let mut replacement = self.roller.roll_like(&die).await?;
            let mut rolls = 1;
            while compare(node.cmp, replacement.result, target) && rolls < limit {
                replacement = self.roller.roll_like(&die).await?;
                rolls += 1;
            }
            debug!(
                "rerolled {} -> {} after {} roll(s)",
                die.result, replacement.result, rolls
            );
            let mut fresh = die.clone();
            fresh.result = replacement.result;
            fresh.reroll = true;
            fresh.from = vec![Arc::new(die.clone())];
            kept.push(fresh);
            let mut spent = die;
            spent.discarded = true;
            spent.rerolled = true;
            discarded.push(spent);
        }

        Ok(RollResult {
            expression,
            op: OpType::Reroll,
            results: kept,
            discarded,
            left,
            right: None,
        })
    }

    async fn apply_explode(&mut self, node: &ast::Explode, lhs: RollResult) -> RResult<RollResult> {
        match node.kind {
            ast::ExplodeKind::Explode => self.explode(node, lhs).await,
            ast::ExplodeKind::Compound => self.compound(node, lhs).await,
            ast::ExplodeKind::Penetrate => self.penetrate(node, lhs).await,
        }
    }

    async fn explode(&mut self, node: &ast::Explode, lhs: RollResult) -> RResult<RollResult> {
        let expression = node.to_string();
        let left = child_of(&lhs);
        let limit = self.chain_limit(node.once);
        let RollResult {
            results, discarded, ..
        } = lhs;

        let mut exploded = Vec::new();
        let mut passed = Vec::new();
        for die in results {
            let target = node.target.unwrap_or_else(|| die.max_potential());
            if !die.kind.explodable() || !compare(node.cmp, die.result, target) {
                passed.push(die);
                continue;
            }
            let mut matched = die.clone();
            matched.exploded = true;
            exploded.push(matched);
            let mut last = die.result;
            let mut rolls = 0;
            while compare(node.cmp, last, target) && rolls < limit {
                let mut extra = self.roller.roll_like(&die).await?;
                extra.explosion = true;
                last = extra.result;
                exploded.push(extra);
                rolls += 1;
            }
        }
        // non-matching dice follow all explosion chains
        exploded.extend(passed);

        Ok(RollResult {
            expression,
            op: OpType::Explode,
            results: exploded,
            discarded,
            left,
            right: None,
        })
    }

    async fn compound(&mut self, node: &ast::Explode, lhs: RollResult) -> RResult<RollResult> {
        let expression = node.to_string();
        let left = child_of(&lhs);
        let limit = self.chain_limit(node.once);
        let RollResult {
            results,
            mut discarded,
            ..
        } = lhs;

        let mut kept = Vec::with_capacity(results.len());
        for die in results {
            let target = node.target.unwrap_or_else(|| die.max_potential());
            if !die.kind.explodable() || !compare(node.cmp, die.result, target) {
                kept.push(die);
                continue;
            }
            let mut from = vec![Arc::new(die.clone())];
            let mut consumed = die.clone();
            consumed.discarded = true;
            consumed.compounded = true;
            discarded.push(consumed);

            let mut sum = die.result;
            let mut last = die.result;
            let mut rolls = 0;
            while compare(node.cmp, last, target) && rolls < limit {
                let extra = self.roller.roll_like(&die).await?;
                sum += extra.result;
                last = extra.result;
                from.push(Arc::new(extra.clone()));
                let mut spent = extra;
                spent.discarded = true;
                spent.compounded = true;
                discarded.push(spent);
                rolls += 1;
            }

            let mut merged = die;
            merged.result = sum;
            merged.compounded_final = true;
            merged.from = from;
            kept.push(merged);
        }

        Ok(RollResult {
            expression,
            op: OpType::Compound,
            results: kept,
            discarded,
            left,
            right: None,
        })
    }

    async fn penetrate(&mut self, node: &ast::Explode, lhs: RollResult) -> RResult<RollResult> {
        let expression = node.to_string();
        let left = child_of(&lhs);
        let limit = self.iteration_limit;
        let RollResult {
            results,
            mut discarded,
            ..
        } = lhs;

        let mut kept = Vec::with_capacity(results.len());
        for die in results {
            if die.kind != DieKind::Polyhedral || die.result != die.max_potential() {
                kept.push(die);
                continue;
            }
            let pen_sides = node.target.unwrap_or(die.nsides);
            let mut from = vec![Arc::new(die.clone())];
            let mut sum = die.result;
            let mut penetrations: usize = 0;
            let mut at_max = true;
            while at_max && penetrations < limit {
                let extra = self.roller.roll_one(pen_sides).await?;
                sum += extra.result;
                penetrations += 1;
                at_max = extra.result == extra.max_potential();
                from.push(Arc::new(extra.clone()));
                let mut spent = extra;
                spent.discarded = true;
                spent.penetrator = true;
                discarded.push(spent);
            }

            let mut original = die.clone();
            original.discarded = true;
            discarded.push(original);
            // each follow-on die nets its face value minus one
            let mut adjustment = RolledDie::single(-(penetrations as Int));
            adjustment.discarded = true;
            adjustment.penetrator = true;
            discarded.push(adjustment);

            let mut pierced = die;
            pierced.result = sum - penetrations as Int;
            pierced.penetrated = true;
            pierced.from = from;
            kept.push(pierced);
        }

        Ok(RollResult {
            expression,
            op: OpType::RollPenetration,
            results: kept,
            discarded,
            left,
            right: None,
        })
    }

    fn apply_count(&self, node: &ast::Count, lhs: RollResult) -> RResult<RollResult> {
        if node.cmp.is_some() && node.target.is_none() {
            return Err(self.format_err(
                "Invalid count operation. Missing count target",
                node.position,
            ));
        }
        let expression = node.to_string();
        let left = child_of(&lhs);
        let RollResult {
            results,
            mut discarded,
            ..
        } = lhs;

        if node.kind == ast::CountKind::All {
            let matches = results
                .iter()
                .filter(|die| match node.target {
                    Some(target) => compare(node.cmp, die.result, target),
                    // a defaulted target never matches a die that could only
                    // ever roll one value
                    None => die.min_potential() != die.max_potential(),
                })
                .count();
            discarded.extend(results.into_iter().map(|mut die| {
                die.discarded = true;
                die
            }));
            return Ok(RollResult {
                expression,
                op: OpType::Count,
                results: vec![RolledDie::single(matches as Int)],
                discarded,
                left,
                right: None,
            });
        }

        let kept = results
            .into_iter()
            .map(|die| {
                let (target, defaulted) = match node.target {
                    Some(t) => (t, false),
                    None => match node.kind {
                        ast::CountKind::Success | ast::CountKind::CritSuccess => {
                            (die.max_potential(), true)
                        }
                        _ => (die.min_potential(), true),
                    },
                };
                let trivial = die.min_potential() == die.max_potential();
                if compare(node.cmp, die.result, target) && !(defaulted && trivial) {
                    let mut flagged = die;
                    match node.kind {
                        ast::CountKind::Success => flagged.success = true,
                        ast::CountKind::Failure => flagged.failure = true,
                        ast::CountKind::CritSuccess => flagged.crit_success = true,
                        ast::CountKind::CritFailure => flagged.crit_failure = true,
                        ast::CountKind::All => unreachable!(),
                    }
                    flagged
                } else {
                    die
                }
            })
            .collect();

        Ok(RollResult {
            expression,
            op: OpType::Count,
            results: kept,
            discarded,
            left,
            right: None,
        })
    }
}

fn total_or(result: &RollResult, default: Int) -> Int {
    if result.is_empty_value() {
        default
    } else {
        result.total()
    }
}

/// Dice operands are attached as children whenever present, even literals.
fn child_if_present(result: &RollResult) -> Option<Arc<RollResult>> {
    (!result.is_empty_value()).then(|| Arc::new(result.clone()))
}

#[async_trait]
pub(crate) trait Eval {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult>;
}

#[async_trait]
impl Eval for Expr {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        match self {
            Expr::Value(x) => x.eval(ctx).await,
            Expr::Binary(x) => x.eval(ctx).await,
            Expr::Aggregate(x) => x.eval(ctx).await,
            Expr::Dice(x) => x.eval(ctx).await,
            Expr::Pool(x) => x.eval(ctx).await,
            Expr::Reroll(x) => x.eval(ctx).await,
            Expr::Explode(x) => x.eval(ctx).await,
            Expr::Count(x) => x.eval(ctx).await,
        }
    }
}

#[async_trait]
impl Eval for ast::Value {
    async fn eval<R: Roller>(&self, _ctx: &mut RollContext<R>) -> RResult<RollResult> {
        Ok(RollResult::value(
            self.to_string(),
            self.value.map(RolledDie::single),
        ))
    }
}

#[async_trait]
impl Eval for ast::Binary {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        let left = ctx.eval_child(&self.left).await?;
        let right = ctx.eval_child(&self.right).await?;
        let expression = self.to_string();
        Ok(match self.op {
            ast::BinaryOp::Add => left.add(right, expression),
            ast::BinaryOp::Sub => left.subtract(right, expression),
            ast::BinaryOp::Mul => left.multiply(right, expression),
            ast::BinaryOp::Comma => left.comma(right, expression),
        })
    }
}

#[async_trait]
impl Eval for ast::Aggregate {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        let inner = ctx.eval_child(&self.inner).await?;
        Ok(inner.aggregate(self.to_string()))
    }
}

#[async_trait]
impl Eval for ast::Dice {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        ctx.eval_dice(self).await
    }
}

#[async_trait]
impl Eval for ast::Pool {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        let lhs = ctx.eval_child(&self.lhs).await?;
        ctx.apply_pool(self, lhs)
    }
}

#[async_trait]
impl Eval for ast::Reroll {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        let lhs = ctx.eval_child(&self.lhs).await?;
        ctx.apply_reroll(self, lhs).await
    }
}

#[async_trait]
impl Eval for ast::Explode {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        let lhs = ctx.eval_child(&self.lhs).await?;
        ctx.apply_explode(self, lhs).await
    }
}

#[async_trait]
impl Eval for ast::Count {
    async fn eval<R: Roller>(&self, ctx: &mut RollContext<R>) -> RResult<RollResult> {
        let lhs = ctx.eval_child(&self.lhs).await?;
        ctx.apply_count(self, lhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::{PreRolledRoller, RollerError};
    use crate::test_utils::{roll_err, roll_with, D6_SEQUENCE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn results_of(summary: &RollSummary) -> Vec<Int> {
        summary.results.iter().map(|d| d.result).collect()
    }

    fn discarded_of(summary: &RollSummary) -> Vec<Int> {
        summary.discarded.iter().map(|d| d.result).collect()
    }

    #[tokio::test]
    async fn test_plain_pool() {
        // scenario 1
        let summary = roll_with("4d6", D6_SEQUENCE).await;
        assert_eq!(summary.total, 14);
        assert_eq!(results_of(&summary), vec![6, 2, 1, 5]);
        assert_eq!(summary.detailed_results.op, OpType::RollDice);
    }

    #[tokio::test]
    async fn test_keep_highest() {
        // scenario 2
        let summary = roll_with("4d6 kh2", D6_SEQUENCE).await;
        assert_eq!(summary.total, 11);
        assert_eq!(results_of(&summary), vec![5, 6]);
        assert_eq!(discarded_of(&summary), vec![1, 2]);
        assert!(summary.discarded.iter().all(|d| d.discarded));
    }

    #[tokio::test]
    async fn test_count_over_threshold() {
        // scenario 3
        let summary = roll_with("4d6#>3", D6_SEQUENCE).await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.detailed_results.op, OpType::Count);
        assert_eq!(summary.results[0].kind, DieKind::SingleVal);
    }

    #[tokio::test]
    async fn test_success_failure_flags() {
        // scenario 4
        let summary = roll_with("(4d6+1)#s#f", D6_SEQUENCE).await;
        assert_eq!(summary.total, 15);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        let six = summary.results.iter().find(|d| d.result == 6).unwrap();
        assert!(six.success);
        let one = summary
            .results
            .iter()
            .find(|d| d.result == 1 && d.kind == DieKind::Polyhedral)
            .unwrap();
        assert!(one.failure);
        // the +1 literal could only ever roll one value, so it never counts
        let literal = summary
            .results
            .iter()
            .find(|d| d.kind == DieKind::SingleVal)
            .unwrap();
        assert!(!literal.success && !literal.failure);
    }

    #[tokio::test]
    async fn test_explode() {
        // scenario 5: both sixes explode, the second chain twice
        let summary = roll_with("9d6!", D6_SEQUENCE).await;
        assert_eq!(summary.total, 48);
        assert_eq!(summary.results.len(), 12);
        assert_eq!(summary.results.iter().filter(|d| d.exploded).count(), 2);
        assert_eq!(summary.results.iter().filter(|d| d.explosion).count(), 3);
    }

    #[tokio::test]
    async fn test_penetrate() {
        // scenario 6
        let summary = roll_with("9d6p", D6_SEQUENCE).await;
        assert_eq!(summary.total, 45);
        let pierced: Vec<Int> = summary
            .results
            .iter()
            .filter(|d| d.penetrated)
            .map(|d| d.result)
            .collect();
        assert_eq!(pierced, vec![10, 14]);
        // discarded holds the maxed originals plus the -n bookkeepers
        assert_eq!(
            discarded_of(&summary),
            vec![5, 6, -1, 6, 4, 6, -2]
        );
        assert_eq!(summary.discarded.iter().filter(|d| d.penetrator).count(), 5);
    }

    #[tokio::test]
    async fn test_addition_order_is_deterministic() {
        // scenario 7
        let summary = roll_with("2d6+3", [6, 1]).await;
        assert_eq!(summary.total, 10);
        assert_eq!(results_of(&summary), vec![6, 1, 3]);
    }

    #[tokio::test]
    async fn test_exhausted_queue_surfaces() {
        // scenario 8
        let err = roll_err("3d6", [1, 2]).await;
        assert_eq!(err, RollError::Roller(RollerError::Exhausted));
    }

    #[tokio::test]
    async fn test_empty_input_is_zero() {
        let summary = roll_with("", []).await;
        assert_eq!(summary.total, 0);
        assert!(summary.results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_dice() {
        let summary = roll_with("0d6", []).await;
        assert_eq!(summary.total, 0);
        assert!(summary.results.is_empty());
    }

    #[tokio::test]
    async fn test_unary_dice_defaults_to_one() {
        let summary = roll_with("d6", [4]).await;
        assert_eq!(summary.total, 4);
    }

    #[tokio::test]
    async fn test_dice_operands_can_be_expressions() {
        let summary = roll_with("(1+1)d(2d6)", [3, 4, 5, 6]).await;
        // sides = 3 + 4 = 7, then two d7 rolls
        assert_eq!(summary.total, 11);
        assert!(summary.detailed_results.left.is_some());
        assert!(summary.detailed_results.right.is_some());
    }

    #[tokio::test]
    async fn test_drop_compare() {
        let summary = roll_with("4d6-<=2", D6_SEQUENCE).await;
        assert_eq!(summary.total, 11);
        assert_eq!(results_of(&summary), vec![6, 5]);
        assert_eq!(discarded_of(&summary), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_drop_and_keep_variants() {
        let summary = roll_with("4d6-h1", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![1, 2, 5]);

        let summary = roll_with("4d6-l1", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![2, 5, 6]);

        let summary = roll_with("4d6kl2", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![1, 2]);

        // `k` is an alias of `kh`, and a missing target keeps one die
        let summary = roll_with("4d6k", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![6]);

        // k >= len empties the pool
        let summary = roll_with("4d6-h9", D6_SEQUENCE).await;
        assert!(summary.results.is_empty());
        assert_eq!(summary.discarded.len(), 4);
    }

    #[tokio::test]
    async fn test_drop_keep_complementarity() {
        for notation in ["4d6-h2", "4d6-l2", "4d6kh2", "4d6kl2", "4d6-<=2"] {
            let summary = roll_with(notation, D6_SEQUENCE).await;
            assert_eq!(
                summary.results.len() + summary.discarded.len(),
                4,
                "pool not preserved for {}",
                notation
            );
        }
    }

    #[tokio::test]
    async fn test_clamp() {
        let summary = roll_with("4d6C>4", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![4, 2, 1, 4]);
        assert_eq!(discarded_of(&summary), vec![6, 5]);
        assert_eq!(
            summary.results.iter().filter(|d| d.clamp_ceiling).count(),
            2
        );

        let summary = roll_with("4d6c<2", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![6, 2, 2, 5]);
        assert_eq!(summary.results.iter().filter(|d| d.clamp_floor).count(), 1);
    }

    #[tokio::test]
    async fn test_sort() {
        let summary = roll_with("4d6s", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![1, 2, 5, 6]);
        assert_eq!(summary.detailed_results.op, OpType::Sort);

        let summary = roll_with("4d6sd", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![6, 5, 2, 1]);
    }

    #[tokio::test]
    async fn test_reroll() {
        let summary = roll_with("4d6r1", [6, 2, 1, 5, 1, 3]).await;
        assert_eq!(summary.total, 16);
        assert_eq!(results_of(&summary), vec![6, 2, 3, 5]);
        let fresh = summary.results.iter().find(|d| d.reroll).unwrap();
        assert_eq!(fresh.result, 3);
        assert_eq!(fresh.from.len(), 1);
        assert_eq!(fresh.from[0].result, 1);
        let spent = summary.discarded.iter().find(|d| d.rerolled).unwrap();
        assert_eq!(spent.result, 1);
    }

    #[tokio::test]
    async fn test_reroll_once_stops_after_one_replacement() {
        let summary = roll_with("1d6ro6", [6, 6]).await;
        assert_eq!(summary.total, 6);
        assert!(summary.results[0].reroll);
    }

    #[tokio::test]
    async fn test_reroll_missing_target_is_an_error() {
        let err = roll_err("4d6r", D6_SEQUENCE).await;
        assert!(matches!(err, RollError::Format(_)));
    }

    #[tokio::test]
    async fn test_explode_once() {
        let summary = roll_with("1d6!o", [6, 6]).await;
        assert_eq!(summary.total, 12);
        assert_eq!(summary.results.len(), 2);
    }

    #[tokio::test]
    async fn test_explode_iteration_cap() {
        let expr = crate::parse::parse("1d6!").unwrap();
        let mut ctx =
            RollContext::new(PreRolledRoller::new([6, 6, 6])).iteration_limit(2);
        let summary = ctx.evaluate(&expr).await.unwrap();
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.total, 18);
    }

    #[tokio::test]
    async fn test_explode_heterogeneous_pool_uses_per_die_maximum() {
        // d6 explodes on 6, d10 on 10
        let summary = roll_with("(1d6+1d10)!", [6, 10, 3, 9]).await;
        assert_eq!(summary.total, 28);
        assert_eq!(summary.results.iter().filter(|d| d.exploded).count(), 2);
    }

    #[tokio::test]
    async fn test_compound() {
        let summary = roll_with("3d6!!", [6, 2, 1, 6, 3]).await;
        assert_eq!(summary.total, 18);
        assert_eq!(summary.results.len(), 3);
        let merged = summary.results.iter().find(|d| d.compounded_final).unwrap();
        assert_eq!(merged.result, 15);
        assert_eq!(merged.from.len(), 3);
        assert_eq!(
            summary.discarded.iter().filter(|d| d.compounded).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_compound_once() {
        let summary = roll_with("1d6!!o", [6, 6]).await;
        assert_eq!(summary.total, 12);
        assert_eq!(summary.results.len(), 1);
    }

    #[tokio::test]
    async fn test_penetrate_with_custom_die() {
        // p4 rolls d4 penetration dice
        let summary = roll_with("1d6p4", [6, 4, 2]).await;
        // 6 + 4 + 2 = 12, minus two penetrations
        assert_eq!(summary.total, 10);
        assert!(summary.results[0].penetrated);
    }

    #[tokio::test]
    async fn test_count_equals_shorthand() {
        let summary = roll_with("4d6#5", D6_SEQUENCE).await;
        assert_eq!(summary.total, 1);
    }

    #[tokio::test]
    async fn test_count_missing_target_with_comparator_is_an_error() {
        let err = roll_err("4d6#=", D6_SEQUENCE).await;
        assert!(matches!(err, RollError::Format(_)));
    }

    #[tokio::test]
    async fn test_bare_count_skips_trivial_dice() {
        // the literal 1 can only roll one value; only real dice count
        let summary = roll_with("(4d6+1)#", D6_SEQUENCE).await;
        assert_eq!(summary.total, 4);
    }

    #[tokio::test]
    async fn test_crit_flags_imply_plain_counts() {
        let summary = roll_with("4d6#cs#cf", D6_SEQUENCE).await;
        assert_eq!(summary.crit_success_count, 1);
        assert_eq!(summary.crit_failure_count, 1);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
    }

    #[tokio::test]
    async fn test_counting_is_idempotent() {
        let once = roll_with("4d6#s", D6_SEQUENCE).await;
        let twice = roll_with("(4d6#s)#s", D6_SEQUENCE).await;
        assert_eq!(once.results, twice.results);
        assert_eq!(once.success_count, twice.success_count);
    }

    #[tokio::test]
    async fn test_aggregate_braces() {
        let summary = roll_with("{2d6+3}", [6, 2]).await;
        assert_eq!(summary.total, 11);
        assert_eq!(summary.results.len(), 1);
        assert!(summary.results[0].totaled);
        assert_eq!(summary.detailed_results.op, OpType::Total);
    }

    #[tokio::test]
    async fn test_comma_aggregation() {
        let summary = roll_with("2d6,3d6,4", D6_SEQUENCE).await;
        assert_eq!(results_of(&summary), vec![8, 9, 4]);
        assert_eq!(summary.detailed_results.op, OpType::Comma);
    }

    #[tokio::test]
    async fn test_multiply_and_subtract() {
        let summary = roll_with("2d6*2", [6, 2]).await;
        assert_eq!(summary.total, 16);
        assert_eq!(summary.results.len(), 1);

        let summary = roll_with("10-2d6", [6, 2]).await;
        assert_eq!(summary.total, 2);

        let summary = roll_with("-6", []).await;
        assert_eq!(summary.total, -6);
    }

    #[tokio::test]
    async fn test_fudge_percent_d66_csv() {
        let summary = roll_with("4dF", [1, -1, 0, 1]).await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.detailed_results.op, OpType::RollFudge);

        let summary = roll_with("d%", [55]).await;
        assert_eq!(summary.total, 55);
        assert_eq!(summary.results[0].nsides, 100);

        let summary = roll_with("2D66", [1, 2, 3, 4]).await;
        assert_eq!(results_of(&summary), vec![12, 34]);
        assert_eq!(discarded_of(&summary), vec![1, 2, 3, 4]);

        let summary = roll_with("d66", [42]).await;
        assert_eq!(summary.total, 42);
        assert_eq!(summary.results[0].kind, DieKind::Polyhedral);

        let summary = roll_with("2d[-1,0,1]", [-1, 1]).await;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.results[0].kind, DieKind::NVals);
    }

    #[tokio::test]
    async fn test_dice_limit_violations_are_format_errors() {
        let err = roll_err("1001d6", []).await;
        assert!(matches!(err, RollError::Format(_)));

        let err = roll_err("1d1", []).await;
        assert!(matches!(err, RollError::Format(_)));

        let err = roll_err("3d", []).await;
        assert!(matches!(err, RollError::Format(_)));

        let err = roll_err("4d6C>", D6_SEQUENCE).await;
        assert!(matches!(err, RollError::Format(_)));

        let err = roll_err("4d6->", D6_SEQUENCE).await;
        assert!(matches!(err, RollError::Format(_)));
    }

    #[tokio::test]
    async fn test_listeners_fire_per_node_and_per_root() {
        static ROLLS: AtomicUsize = AtomicUsize::new(0);
        static SUMMARIES: AtomicUsize = AtomicUsize::new(0);
        ROLLS.store(0, Ordering::SeqCst);
        SUMMARIES.store(0, Ordering::SeqCst);

        let expr = crate::parse::parse("2d6+3").unwrap();
        let mut ctx = RollContext::new(PreRolledRoller::new([6, 1]))
            .on_roll(|_| {
                ROLLS.fetch_add(1, Ordering::SeqCst);
            })
            .on_summary(|_| {
                SUMMARIES.fetch_add(1, Ordering::SeqCst);
            });
        ctx.evaluate(&expr).await.unwrap();

        // the dice-count operand, the dice node, and the literal 3; the root
        // itself only reaches the summary listener
        assert_eq!(ROLLS.load(Ordering::SeqCst), 3);
        assert_eq!(SUMMARIES.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expression_tree_is_reusable() {
        let expr = crate::parse::parse("4d6kh2").unwrap();
        let first = RollContext::new(PreRolledRoller::new(D6_SEQUENCE))
            .evaluate(&expr)
            .await
            .unwrap();
        let second = RollContext::new(PreRolledRoller::new(D6_SEQUENCE))
            .evaluate(&expr)
            .await
            .unwrap();
        assert_eq!(first, second);

        // an error leaves the tree reusable too
        let mut starved = RollContext::new(PreRolledRoller::new([6]));
        assert!(starved.evaluate(&expr).await.is_err());
        let third = RollContext::new(PreRolledRoller::new(D6_SEQUENCE))
            .evaluate(&expr)
            .await
            .unwrap();
        assert_eq!(first, third);
    }

    #[tokio::test]
    async fn test_seeded_rng_reproduces_results() {
        use rand::SeedableRng;
        let expr = crate::parse::parse("6d6kh3+2").unwrap();
        let first = RollContext::new(crate::roll::RngRoller::new(
            rand_pcg::Pcg64::seed_from_u64(7),
        ))
        .evaluate(&expr)
        .await
        .unwrap();
        let second = RollContext::new(crate::roll::RngRoller::new(
            rand_pcg::Pcg64::seed_from_u64(7),
        ))
        .evaluate(&expr)
        .await
        .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_pre_rolled_replay_matches_rng_run() {
        use rand::SeedableRng;
        // no reordering modifiers, so the kept pool is the raw roll order
        let expr = crate::parse::parse("3d6+1d4").unwrap();
        let original = RollContext::new(crate::roll::RngRoller::new(
            rand_pcg::Pcg64::seed_from_u64(11),
        ))
        .evaluate(&expr)
        .await
        .unwrap();
        let recorded: Vec<Int> = original.results.iter().map(|d| d.result).collect();
        let replayed = RollContext::new(PreRolledRoller::new(recorded))
            .evaluate(&expr)
            .await
            .unwrap();
        assert_eq!(original, replayed);
    }
}
