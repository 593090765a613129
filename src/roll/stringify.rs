use super::die::RolledDie;
use super::summary::RollSummary;
use super::tree::RollResult;
use std::fmt::Write;

fn fmt_die(die: &RolledDie) -> String {
    let mut out = die.result.to_string();
    if die.exploded || die.explosion {
        out.push('!');
    }
    if die.compounded_final {
        out.push_str("!!");
    }
    if die.penetrated {
        out.push_str("!p");
    }
    if die.reroll {
        out.push('r');
    }
    if die.clamp_ceiling || die.clamp_floor {
        out.push('c');
    }
    out
}

fn fmt_dice(dice: &[RolledDie]) -> String {
    dice.iter()
        .map(fmt_die)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compact one-line rendering of a summary.
#[derive(Default)]
pub struct SimpleStringifier;

impl SimpleStringifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stringify(&self, summary: &RollSummary) -> String {
        let mut out = String::new();
        let _ = write!(out, "{} ({})", summary.expression, fmt_dice(&summary.results));
        if !summary.discarded.is_empty() {
            let _ = write!(out, " [dropped: {}]", fmt_dice(&summary.discarded));
        }
        let _ = write!(out, " = {}", summary.total);
        let counts = [
            ("successes", summary.success_count),
            ("failures", summary.failure_count),
            ("crit successes", summary.crit_success_count),
            ("crit failures", summary.crit_failure_count),
        ];
        for (label, count) in counts {
            if count > 0 {
                let _ = write!(out, ", {}: {}", label, count);
            }
        }
        out
    }
}

/// Indented dump of a result graph, one node per line.
#[derive(Default)]
pub struct TreeStringifier;

impl TreeStringifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stringify(&self, root: &RollResult) -> String {
        let mut out = String::new();
        self.render(root, 0, None, &mut out);
        out
    }

    fn render(&self, node: &RollResult, depth: usize, label: Option<&str>, out: &mut String) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{}", indent);
        if let Some(label) = label {
            let _ = write!(out, "{}: ", label);
        }
        let _ = write!(out, "{} {:?} = {}", node.op, node.expression, node.total());
        if !node.results.is_empty() {
            let _ = write!(out, " [{}]", fmt_dice(&node.results));
        }
        if !node.discarded.is_empty() {
            let _ = write!(out, " dropped [{}]", fmt_dice(&node.discarded));
        }
        out.push('\n');
        if let Some(left) = &node.left {
            self.render(left, depth + 1, Some("left"), out);
        }
        if let Some(right) = &node.right {
            self.render(right, depth + 1, Some("right"), out);
        }
    }
}
