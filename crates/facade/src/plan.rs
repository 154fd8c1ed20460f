//! Which marginals are measured, and under which budget group.

use margsynth_accounting::{ONE_WAY_GROUP, TWO_WAY_GROUP};
use margsynth_core::{AttributeDomain, Result, SynthError};

/// Attribute subsets measured from one budget group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarginalGroup {
    /// Budget group name, as declared in the allocation policy.
    pub name: String,
    /// Measured attribute subsets.
    pub subsets: Vec<Vec<usize>>,
}

impl MarginalGroup {
    /// Create a group.
    pub fn new<S: Into<String>>(name: S, subsets: Vec<Vec<usize>>) -> Self {
        Self {
            name: name.into(),
            subsets,
        }
    }
}

/// Declarative list of measurements for a run.
///
/// The marginal over `stratum_attributes` is always measured, in the
/// stratum budget group, and fixes the record count of every stratum.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeasurementPlan {
    /// Measured groups, in order.
    pub groups: Vec<MarginalGroup>,
    /// Attributes identifying a stratum; empty means one stratum.
    pub stratum_attributes: Vec<usize>,
}

impl MeasurementPlan {
    /// An empty plan stratified by `stratum_attributes`.
    pub fn new(stratum_attributes: Vec<usize>) -> Self {
        Self {
            groups: Vec::new(),
            stratum_attributes,
        }
    }

    /// Add a group.
    pub fn with_group<S: Into<String>>(mut self, name: S, subsets: Vec<Vec<usize>>) -> Self {
        self.groups.push(MarginalGroup::new(name, subsets));
        self
    }

    /// One-way marginals of every non-stratum attribute (joined with the
    /// stratum attributes) and two-way marginals of every pair of
    /// non-stratum attributes. Groups with nothing to measure are left out.
    pub fn standard(domain: &AttributeDomain, stratum_attributes: Vec<usize>) -> Self {
        let free: Vec<usize> = (0..domain.len())
            .filter(|a| !stratum_attributes.contains(a))
            .collect();
        let one_way: Vec<Vec<usize>> = free
            .iter()
            .map(|&a| {
                let mut subset = stratum_attributes.clone();
                subset.push(a);
                subset
            })
            .collect();
        let mut two_way = Vec::new();
        for (i, &a) in free.iter().enumerate() {
            for &b in &free[i + 1..] {
                two_way.push(vec![a, b]);
            }
        }
        let mut plan = Self::new(stratum_attributes);
        for (name, subsets) in [(ONE_WAY_GROUP, one_way), (TWO_WAY_GROUP, two_way)] {
            if !subsets.is_empty() {
                plan = plan.with_group(name, subsets);
            }
        }
        plan
    }

    /// Number of measured subsets, excluding the stratum marginal.
    pub fn num_measurements(&self) -> usize {
        self.groups.iter().map(|g| g.subsets.len()).sum()
    }

    /// Check every attribute index against `domain`.
    pub fn validate(&self, domain: &AttributeDomain) -> Result<()> {
        let check = |subset: &[usize], what: &str| -> Result<()> {
            for (i, &attr) in subset.iter().enumerate() {
                if attr >= domain.len() {
                    return Err(SynthError::config(format!(
                        "{what} references attribute {attr} of a {}-attribute domain",
                        domain.len()
                    )));
                }
                if subset[..i].contains(&attr) {
                    return Err(SynthError::config(format!(
                        "{what} lists attribute '{}' twice",
                        domain.name(attr)
                    )));
                }
            }
            Ok(())
        };
        check(&self.stratum_attributes, "stratum")?;
        if self.groups.is_empty() {
            return Err(SynthError::config("measurement plan has no groups"));
        }
        for group in &self.groups {
            if group.subsets.is_empty() {
                return Err(SynthError::config(format!(
                    "group '{}' measures nothing",
                    group.name
                )));
            }
            for subset in &group.subsets {
                check(subset, &group.name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn standard_plan_shape() {
        let domain = AttributeDomain::from_sizes(vec![3, 2, 2, 4]).expect("domain");
        let plan = MeasurementPlan::standard(&domain, vec![0]);
        assert_eq!(plan.groups[0].subsets, vec![vec![0, 1], vec![0, 2], vec![0, 3]]);
        assert_eq!(plan.groups[1].subsets, vec![vec![1, 2], vec![1, 3], vec![2, 3]]);
        assert_eq!(plan.num_measurements(), 6);
        assert!(plan.validate(&domain).is_ok());
    }

    #[test]
    fn single_free_attribute_plan_is_valid() {
        let domain = AttributeDomain::from_sizes(vec![3, 2]).expect("domain");
        let plan = MeasurementPlan::standard(&domain, vec![0]);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].name, ONE_WAY_GROUP);
        assert_eq!(plan.groups[0].subsets, vec![vec![0, 1]]);
        assert!(plan.validate(&domain).is_ok());
    }

    #[test]
    fn rejects_unknown_attributes() {
        let domain = AttributeDomain::from_sizes(vec![2, 2]).expect("domain");
        let plan = MeasurementPlan::new(vec![]).with_group("g", vec![vec![0, 5]]);
        assert!(plan.validate(&domain).is_err());
        let dup = MeasurementPlan::new(vec![1, 1]).with_group("g", vec![vec![0]]);
        assert!(dup.validate(&domain).is_err());
        assert!(MeasurementPlan::new(vec![]).validate(&domain).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

        #[test]
        fn standard_plan_counts(sizes in proptest::collection::vec(1usize..5, 1..7), strata in 0usize..3) {
            let domain = AttributeDomain::from_sizes(sizes.clone()).expect("domain");
            let strata = strata.min(sizes.len());
            let plan = MeasurementPlan::standard(&domain, (0..strata).collect());
            let free = sizes.len() - strata;
            let pairs = free * free.saturating_sub(1) / 2;
            prop_assert_eq!(plan.num_measurements(), free + pairs);
            prop_assert!(plan.groups.iter().all(|g| !g.subsets.is_empty()));
            prop_assert_eq!(plan.validate(&domain).is_ok(), free > 0);
            prop_assert!(plan.groups.iter().flat_map(|g| g.subsets.iter()).all(|s| s.len() <= strata + 2));
        }
    }
}
