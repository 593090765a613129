use crate::common::{is_false, is_zero, DieKind, Int, FUDGE_FACES};
use serde::Serialize;
use std::sync::Arc;

/// One atomic die outcome with its provenance flags.
///
/// Values are created by the roller or derived by copy-with-overrides during
/// modifier application; once a die sits in a
/// [`RollResult`](super::RollResult) it is never mutated again. `from` links
/// a derived die back to the outcomes it was built from, forming a DAG.
///
/// Field order doubles as the natural order: dice sort by `result` first,
/// with the remaining fields as tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolledDie {
    #[serde(skip_serializing_if = "is_zero")]
    pub result: Int,
    #[serde(skip_serializing_if = "is_zero")]
    pub nsides: Int,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub potential_values: Vec<Int>,
    #[serde(rename = "dieType")]
    pub kind: DieKind,
    #[serde(skip_serializing_if = "is_false")]
    pub discarded: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub success: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub failure: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub crit_success: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub crit_failure: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub exploded: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub explosion: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub compounded: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub compounded_final: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub reroll: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub rerolled: bool,
    #[serde(rename = "clampHigh", skip_serializing_if = "is_false")]
    pub clamp_ceiling: bool,
    #[serde(rename = "clampLow", skip_serializing_if = "is_false")]
    pub clamp_floor: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub penetrated: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub penetrator: bool,
    #[serde(skip)]
    pub totaled: bool,
    #[serde(skip)]
    pub from: Vec<Arc<RolledDie>>,
}

impl RolledDie {
    fn base(kind: DieKind, result: Int) -> Self {
        Self {
            result,
            nsides: 0,
            potential_values: Vec::new(),
            kind,
            discarded: false,
            success: false,
            failure: false,
            crit_success: false,
            crit_failure: false,
            exploded: false,
            explosion: false,
            compounded: false,
            compounded_final: false,
            reroll: false,
            rerolled: false,
            clamp_ceiling: false,
            clamp_floor: false,
            penetrated: false,
            penetrator: false,
            totaled: false,
            from: Vec::new(),
        }
    }

    pub fn polyhedral(result: Int, nsides: Int) -> Self {
        let mut die = Self::base(DieKind::Polyhedral, result);
        die.nsides = nsides;
        die
    }

    pub fn fudge(result: Int) -> Self {
        let mut die = Self::base(DieKind::Fudge, result);
        die.potential_values = FUDGE_FACES.to_vec();
        die
    }

    /// The composed die; `tens` and `ones` are the two source d6 outcomes.
    pub fn d66(result: Int, tens: RolledDie, ones: RolledDie) -> Self {
        let mut die = Self::base(DieKind::D66, result);
        die.from = vec![Arc::new(tens), Arc::new(ones)];
        die
    }

    pub fn nvals(result: Int, vals: &[Int]) -> Self {
        let mut die = Self::base(DieKind::NVals, result);
        die.potential_values = vals.to_vec();
        die
    }

    pub fn single(result: Int) -> Self {
        let mut die = Self::base(DieKind::SingleVal, result);
        die.potential_values = vec![result];
        die
    }

    /// Smallest value this die could have rolled.
    pub fn min_potential(&self) -> Int {
        match self.kind {
            DieKind::Polyhedral | DieKind::D66 => 1,
            DieKind::Fudge | DieKind::NVals | DieKind::SingleVal => self
                .potential_values
                .iter()
                .copied()
                .min()
                .unwrap_or(self.result),
        }
    }

    /// Largest value this die could have rolled. Only valid for the initial
    /// roll: compounding and penetration legitimately push `result` past it.
    pub fn max_potential(&self) -> Int {
        match self.kind {
            DieKind::Polyhedral => self.nsides,
            DieKind::D66 => 66,
            DieKind::Fudge | DieKind::NVals | DieKind::SingleVal => self
                .potential_values
                .iter()
                .copied()
                .max()
                .unwrap_or(self.result),
        }
    }

    /// JSON projection with the sparsity rule (zero/false/empty omitted).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("die projection is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_potential_ranges() {
        let d20 = RolledDie::polyhedral(7, 20);
        assert_eq!(d20.min_potential(), 1);
        assert_eq!(d20.max_potential(), 20);

        let fudge = RolledDie::fudge(0);
        assert_eq!(fudge.min_potential(), -1);
        assert_eq!(fudge.max_potential(), 1);

        let composed = RolledDie::d66(
            34,
            RolledDie::polyhedral(3, 6),
            RolledDie::polyhedral(4, 6),
        );
        assert_eq!(composed.min_potential(), 1);
        assert_eq!(composed.max_potential(), 66);

        let nvals = RolledDie::nvals(4, &[-2, 4, 9]);
        assert_eq!(nvals.min_potential(), -2);
        assert_eq!(nvals.max_potential(), 9);

        let single = RolledDie::single(5);
        assert_eq!(single.min_potential(), 5);
        assert_eq!(single.max_potential(), 5);
    }

    #[test]
    fn test_natural_order_sorts_by_result_first() {
        let mut dice = vec![
            RolledDie::polyhedral(5, 6),
            RolledDie::polyhedral(1, 6),
            RolledDie::polyhedral(6, 6),
            RolledDie::polyhedral(2, 6),
        ];
        dice.sort();
        let results: Vec<Int> = dice.iter().map(|d| d.result).collect();
        assert_eq!(results, vec![1, 2, 5, 6]);
    }

    #[test]
    fn test_d66_records_sources() {
        let composed = RolledDie::d66(
            12,
            RolledDie::polyhedral(1, 6),
            RolledDie::polyhedral(2, 6),
        );
        assert_eq!(composed.from.len(), 2);
        assert_eq!(composed.from[0].result, 1);
        assert_eq!(composed.from[1].result, 2);
    }

    #[test]
    fn test_json_sparsity() {
        let json = RolledDie::polyhedral(4, 6).to_json();
        assert_eq!(json["result"], 4);
        assert_eq!(json["nsides"], 6);
        assert_eq!(json["dieType"], "polyhedral");
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("discarded"));
        assert!(!obj.contains_key("potentialValues"));
        assert!(!obj.contains_key("from"));

        // a zero result is itself omitted by the sparsity rule
        let json = RolledDie::fudge(0).to_json();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("result"));
        assert_eq!(json["potentialValues"], serde_json::json!([-1, -1, 0, 0, 1, 1]));

        let mut flagged = RolledDie::polyhedral(6, 6);
        flagged.crit_success = true;
        flagged.clamp_ceiling = true;
        let json = flagged.to_json();
        assert_eq!(json["critSuccess"], true);
        assert_eq!(json["clampHigh"], true);
    }
}
