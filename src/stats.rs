//! Repeated-evaluation statistics over a parsed expression.

use crate::common::Int;
use crate::parse::ast::Expr;
use crate::roll::{RollContext, RollError, Roller};
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of evaluations when the caller does not choose one.
pub const DEFAULT_SAMPLES: usize = 1000;

/// Aggregate over `count` evaluations, keyed by total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation, rounded to two decimals.
    pub stddev: f64,
    pub min: Int,
    pub max: Int,
    pub histogram: BTreeMap<Int, u64>,
}

/// [`gather`] with [`DEFAULT_SAMPLES`] evaluations.
pub async fn gather_default<R: Roller>(expr: &Expr, roller: R) -> Result<Stats, RollError> {
    gather(expr, roller, DEFAULT_SAMPLES).await
}

/// Roll the expression `samples` times and aggregate the totals.
pub async fn gather<R: Roller>(
    expr: &Expr,
    roller: R,
    samples: usize,
) -> Result<Stats, RollError> {
    let mut ctx = RollContext::new(roller);
    let mut totals = Vec::with_capacity(samples);
    for _ in 0..samples {
        totals.push(ctx.evaluate(expr).await?.total);
    }
    Ok(aggregate(&totals))
}

fn aggregate(totals: &[Int]) -> Stats {
    let count = totals.len();
    if count == 0 {
        return Stats {
            count: 0,
            mean: 0.0,
            stddev: 0.0,
            min: 0,
            max: 0,
            histogram: BTreeMap::new(),
        };
    }
    let sum: Int = totals.iter().sum();
    let mean = sum as f64 / count as f64;
    let variance = totals
        .iter()
        .map(|&t| {
            let d = t as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / count as f64;
    let stddev = (variance.sqrt() * 100.0).round() / 100.0;
    let mut histogram = BTreeMap::new();
    for &t in totals {
        *histogram.entry(t).or_insert(0u64) += 1;
    }
    Stats {
        count,
        mean,
        stddev,
        min: *totals.iter().min().expect("totals is non-empty"),
        max: *totals.iter().max().expect("totals is non-empty"),
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use crate::roll::{PreRolledRoller, RngRoller};
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_gather_with_deterministic_queue() {
        let expr = parse("2d6").unwrap();
        let roller = PreRolledRoller::new([1, 2, 3, 4, 5, 6, 6, 6]);
        let stats = gather(&expr, roller, 4).await.unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 3);
        assert_eq!(stats.max, 12);
        assert_eq!(stats.mean, 8.25);
        assert_eq!(stats.stddev, 3.56);
        let expected: BTreeMap<i64, u64> = [(3, 1), (7, 1), (11, 1), (12, 1)].into_iter().collect();
        assert_eq!(stats.histogram, expected);
    }

    #[tokio::test]
    async fn test_gather_bounds_with_rng() {
        let expr = parse("3d4").unwrap();
        let roller = RngRoller::new(rand_pcg::Pcg64::seed_from_u64(3));
        let stats = gather(&expr, roller, 200).await.unwrap();
        assert_eq!(stats.count, 200);
        assert!(stats.min >= 3);
        assert!(stats.max <= 12);
        assert!(stats.mean >= 3.0 && stats.mean <= 12.0);
        assert_eq!(stats.histogram.values().sum::<u64>(), 200);
    }

    #[tokio::test]
    async fn test_gather_zero_samples() {
        let expr = parse("1d6").unwrap();
        let stats = gather(&expr, PreRolledRoller::new([]), 0).await.unwrap();
        assert_eq!(stats.count, 0);
        assert!(stats.histogram.is_empty());
    }

    #[tokio::test]
    async fn test_gather_propagates_errors() {
        let expr = parse("1d6").unwrap();
        assert!(gather(&expr, PreRolledRoller::new([6]), 2).await.is_err());
    }
}
