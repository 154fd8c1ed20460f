//! Where raw marginal counts come from.

use std::collections::BTreeMap;

use margsynth_core::{AttributeDomain, Counts, MarginalView, Records, Result, SynthError};

/// Extracts raw, un-noised marginal counts from a table.
pub trait MarginalSource {
    /// Raw counts over `attributes`, laid out in the cell order of
    /// `MarginalView::new(domain, attributes)`.
    fn raw_counts(&self, attributes: &[usize]) -> Result<Counts>;
}

/// An in-memory coded record table.
#[derive(Clone, Debug)]
pub struct RecordTableSource {
    domain: AttributeDomain,
    records: Records,
}

impl RecordTableSource {
    /// Wrap `records`, checking every value against `domain`.
    pub fn new(domain: AttributeDomain, records: Records) -> Result<Self> {
        if records.ncols() != domain.len() {
            return Err(SynthError::domain_mismatch(
                "record table",
                domain.len(),
                records.ncols(),
            ));
        }
        for (attr, column) in records.columns().into_iter().enumerate() {
            let size = domain.size(attr);
            if let Some(&bad) = column.iter().find(|&&v| v as usize >= size) {
                return Err(SynthError::invalid(format!(
                    "value {bad} outside the domain of attribute '{}' (size {size})",
                    domain.name(attr)
                )));
            }
        }
        Ok(Self { domain, records })
    }

    /// The attribute catalog.
    pub fn domain(&self) -> &AttributeDomain {
        &self.domain
    }

    /// The wrapped records.
    pub fn records(&self) -> &Records {
        &self.records
    }
}

impl MarginalSource for RecordTableSource {
    fn raw_counts(&self, attributes: &[usize]) -> Result<Counts> {
        let mut view = MarginalView::new(&self.domain, attributes)?;
        view.count_records(&self.records);
        Ok(view.count)
    }
}

/// Marginals tabulated elsewhere, keyed by their sorted attribute indices.
#[derive(Clone, Debug, Default)]
pub struct PrecomputedSource {
    tables: BTreeMap<Vec<usize>, Counts>,
}

impl PrecomputedSource {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the counts for `attributes`.
    pub fn with_table(mut self, attributes: &[usize], counts: Counts) -> Self {
        self.tables.insert(canonical(attributes), counts);
        self
    }
}

fn canonical(attributes: &[usize]) -> Vec<usize> {
    let mut key = attributes.to_vec();
    key.sort_unstable();
    key.dedup();
    key
}

impl MarginalSource for PrecomputedSource {
    fn raw_counts(&self, attributes: &[usize]) -> Result<Counts> {
        self.tables
            .get(&canonical(attributes))
            .cloned()
            .ok_or_else(|| SynthError::config(format!("no table for attributes {attributes:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn counts_records_per_cell() {
        let domain = AttributeDomain::new(vec!["a", "b"], vec![2, 3]).expect("domain");
        let records = array![[0u32, 2], [1, 0], [1, 0], [0, 2]];
        let source = RecordTableSource::new(domain, records).expect("source");
        assert_eq!(source.raw_counts(&[1]).expect("counts"), array![2.0, 0.0, 2.0]);
        assert_eq!(source.raw_counts(&[]).expect("counts"), array![4.0]);
    }

    #[test]
    fn rejects_out_of_domain_values() {
        let domain = AttributeDomain::new(vec!["a"], vec![2]).expect("domain");
        assert!(RecordTableSource::new(domain.clone(), array![[0u32], [2]]).is_err());
        assert!(RecordTableSource::new(domain, array![[0u32, 0]]).is_err());
    }

    #[test]
    fn precomputed_lookup_is_order_insensitive() {
        let source = PrecomputedSource::new().with_table(&[2, 0], array![1.0, 2.0]);
        assert_eq!(source.raw_counts(&[0, 2]).expect("counts"), array![1.0, 2.0]);
        assert!(source.raw_counts(&[1]).is_err());
    }
}
