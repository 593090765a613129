use super::die::RolledDie;
use super::stringify::{SimpleStringifier, TreeStringifier};
use super::tree::RollResult;
use crate::common::Int;
use std::fmt;

/// Root wrapper around an evaluated tree.
///
/// Caches the flattened view (total and flag counts over the root pool) and
/// keeps the full node graph in `detailed_results` for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct RollSummary {
    pub expression: String,
    pub total: Int,
    pub success_count: usize,
    pub failure_count: usize,
    pub crit_success_count: usize,
    pub crit_failure_count: usize,
    pub results: Vec<RolledDie>,
    pub discarded: Vec<RolledDie>,
    pub detailed_results: RollResult,
}

impl RollSummary {
    pub fn new(root: RollResult) -> Self {
        Self {
            expression: root.expression.clone(),
            total: root.total(),
            success_count: root.success_count(),
            failure_count: root.failure_count(),
            crit_success_count: root.crit_success_count(),
            crit_failure_count: root.crit_failure_count(),
            results: root.results.clone(),
            discarded: root.discarded.clone(),
            detailed_results: root,
        }
    }

    /// Indented dump of the whole node graph.
    pub fn tree(&self) -> String {
        TreeStringifier::new().stringify(&self.detailed_results)
    }

    /// JSON projection of the root node.
    pub fn to_json(&self) -> serde_json::Value {
        self.detailed_results.to_json()
    }
}

impl fmt::Display for RollSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&SimpleStringifier::new().stringify(self))
    }
}
