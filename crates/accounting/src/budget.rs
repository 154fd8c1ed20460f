//! Privacy budget allocation across named marginal groups.

use margsynth_core::{Result, SynthError};
use tracing::info;

use crate::calibrate::{calibrate, Composition, NoiseCalibration};
use crate::params::PrivacyParams;

/// Group measuring the per-stratum record totals.
pub const STRATUM_GROUP: &str = "stratum";
/// Group measuring one-way marginals.
pub const ONE_WAY_GROUP: &str = "one_way";
/// Group measuring two-way marginals.
pub const TWO_WAY_GROUP: &str = "two_way";

/// Relative share of the budget assigned to one marginal group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupShare {
    /// Group name.
    pub name: String,
    /// Relative weight; shares are normalized over all groups.
    pub weight: f64,
    /// Composition used to split the group budget across its marginals.
    pub composition: Composition,
}

impl GroupShare {
    /// Create a group share.
    pub fn new<S: Into<String>>(name: S, weight: f64, composition: Composition) -> Self {
        Self {
            name: name.into(),
            weight,
            composition,
        }
    }
}

/// Fixed policy dividing the total budget between marginal groups.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationPolicy {
    /// Groups in declaration order.
    pub groups: Vec<GroupShare>,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            groups: vec![
                GroupShare::new(STRATUM_GROUP, 0.1, Composition::Auto),
                GroupShare::new(ONE_WAY_GROUP, 0.3, Composition::Auto),
                GroupShare::new(TWO_WAY_GROUP, 0.6, Composition::Auto),
            ],
        }
    }
}

impl AllocationPolicy {
    /// An empty policy.
    pub fn empty() -> Self {
        Self { groups: Vec::new() }
    }

    /// Add a group.
    pub fn with_group<S: Into<String>>(
        mut self,
        name: S,
        weight: f64,
        composition: Composition,
    ) -> Self {
        self.groups.push(GroupShare::new(name, weight, composition));
        self
    }

    /// Look up a group share by name.
    pub fn group(&self, name: &str) -> Option<&GroupShare> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(SynthError::config("allocation policy has no groups"));
        }
        for (i, g) in self.groups.iter().enumerate() {
            if !g.weight.is_finite() || g.weight <= 0.0 {
                return Err(SynthError::config(format!(
                    "group '{}' must have a positive weight",
                    g.name
                )));
            }
            if self.groups[..i].iter().any(|prev| prev.name == g.name) {
                return Err(SynthError::config(format!(
                    "group '{}' declared twice",
                    g.name
                )));
            }
        }
        Ok(())
    }
}

/// Budget assigned to a single group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupBudget {
    /// Group name.
    pub name: String,
    /// Epsilon share.
    pub epsilon: f64,
    /// Delta share.
    pub delta: f64,
    /// Composition used within the group.
    pub composition: Composition,
}

/// Immutable split of a total budget across marginal groups.
#[derive(Clone, Debug)]
pub struct BudgetAllocation {
    params: PrivacyParams,
    groups: Vec<GroupBudget>,
}

impl BudgetAllocation {
    /// Split `params` across the groups of `policy` proportionally to weight.
    pub fn new(params: PrivacyParams, policy: &AllocationPolicy) -> Result<Self> {
        params.validate()?;
        policy.validate()?;
        let total_weight: f64 = policy.groups.iter().map(|g| g.weight).sum();
        let groups = policy
            .groups
            .iter()
            .map(|g| {
                let share = params.share(g.weight / total_weight)?;
                Ok(GroupBudget {
                    name: g.name.clone(),
                    epsilon: share.epsilon,
                    delta: share.delta,
                    composition: g.composition,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        for g in &groups {
            info!(
                group = %g.name,
                epsilon = g.epsilon,
                delta = g.delta,
                composition = %g.composition,
                "allocated privacy budget"
            );
        }
        Ok(Self { params, groups })
    }

    /// The total parameters that were split.
    pub fn params(&self) -> &PrivacyParams {
        &self.params
    }

    /// All group budgets.
    pub fn groups(&self) -> &[GroupBudget] {
        &self.groups
    }

    /// Budget of the group called `name`.
    pub fn group(&self, name: &str) -> Option<&GroupBudget> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Sum of epsilon over all groups.
    pub fn total_epsilon(&self) -> f64 {
        self.groups.iter().map(|g| g.epsilon).sum()
    }

    /// Calibrate noise for `k` marginals measured in group `name`.
    pub fn calibrate(&self, name: &str, k: usize) -> Result<NoiseCalibration> {
        let g = self
            .group(name)
            .ok_or_else(|| SynthError::config(format!("no budget allocated to group '{name}'")))?;
        calibrate(
            g.composition,
            g.epsilon,
            g.delta,
            self.params.sensitivity,
            k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_splits_whole_budget() {
        let params = PrivacyParams::new(2.0, 1e-6, 1.0).expect("params");
        let alloc = BudgetAllocation::new(params, &AllocationPolicy::default()).expect("alloc");
        assert!((alloc.total_epsilon() - 2.0).abs() < 1e-12);
        let two_way = alloc.group(TWO_WAY_GROUP).expect("group");
        assert!((two_way.epsilon - 1.2).abs() < 1e-12);
    }

    #[test]
    fn calibrates_named_group() {
        let params = PrivacyParams::new(1.0, 1e-6, 1.0).expect("params");
        let policy = AllocationPolicy::empty()
            .with_group("a", 1.0, Composition::NaiveLaplace)
            .with_group("b", 3.0, Composition::ZcdpGaussian);
        let alloc = BudgetAllocation::new(params, &policy).expect("alloc");
        let a = alloc.calibrate("a", 5).expect("calibration");
        assert_eq!(a.composition, Composition::NaiveLaplace);
        assert!((a.mechanism.std_dev() - (2.0f64).sqrt() * 20.0).abs() < 1e-9);
        assert!(alloc.calibrate("missing", 1).is_err());
    }

    #[test]
    fn rejects_bad_policies() {
        let params = PrivacyParams::new(1.0, 1e-6, 1.0).expect("params");
        assert!(BudgetAllocation::new(params, &AllocationPolicy::empty()).is_err());
        let dup = AllocationPolicy::empty()
            .with_group("a", 1.0, Composition::Auto)
            .with_group("a", 1.0, Composition::Auto);
        assert!(BudgetAllocation::new(params, &dup).is_err());
        let zero = AllocationPolicy::empty().with_group("a", 0.0, Composition::Auto);
        assert!(BudgetAllocation::new(params, &zero).is_err());
    }
}
