//! Marginal views: frequency tables over a subset of attributes.
//!
//! A view over the attribute subset `S` stores one weight per cell of the
//! joint domain of `S`. Cells are addressed with a mixed-radix encoding: the
//! attribute listed first is the most significant digit, so for domain sizes
//! `[2, 3]` the multipliers are `[3, 1]` and the six cells enumerate
//! `(0,0), (0,1), (0,2), (1,0), (1,1), (1,2)` in that order.

use std::sync::OnceLock;

use ndarray::{Array2, ArrayView1};

use crate::counts::{normalize_to_distribution, total_mass, Counts};
use crate::domain::AttributeDomain;
use crate::error::{Result, SynthError};
use crate::records::Records;

/// Frequency table over an ordered subset of the global attributes.
#[derive(Clone, Debug)]
pub struct MarginalView {
    attributes_index: Vec<usize>,
    sizes: Vec<usize>,
    domain_size: usize,
    encode_num: Vec<usize>,
    cum_mul: Vec<usize>,
    tuple_key: OnceLock<Array2<u32>>,
    /// Cell weights, indexed by encoded cell.
    pub count: Counts,
    /// Relative weight of this view when reconciling shared projections.
    pub weight_coeff: f64,
}

impl MarginalView {
    /// Create an all-zero view over `attributes` of `domain`.
    ///
    /// Attribute indices are sorted and deduplicated so that every subset has a
    /// single canonical encoding.
    pub fn new(domain: &AttributeDomain, attributes: &[usize]) -> Result<Self> {
        let mut attrs = attributes.to_vec();
        attrs.sort_unstable();
        attrs.dedup();
        if let Some(&bad) = attrs.iter().find(|&&a| a >= domain.len()) {
            return Err(SynthError::config(format!(
                "attribute index {bad} outside a catalog of {} attributes",
                domain.len()
            )));
        }
        let sizes = attrs.iter().map(|&a| domain.size(a)).collect();
        Self::from_parts(attrs, sizes)
    }

    /// Create a view over `attributes` holding `counts`.
    ///
    /// Fails with [`SynthError::DomainMismatch`] when the number of supplied
    /// cells differs from the catalog's joint domain size.
    pub fn from_counts(domain: &AttributeDomain, attributes: &[usize], counts: Counts) -> Result<Self> {
        let mut view = Self::new(domain, attributes)?;
        if counts.len() != view.domain_size {
            return Err(SynthError::domain_mismatch(
                view.label(domain),
                view.domain_size,
                counts.len(),
            ));
        }
        view.count = counts;
        Ok(view)
    }

    fn from_parts(attributes_index: Vec<usize>, sizes: Vec<usize>) -> Result<Self> {
        let domain_size = sizes
            .iter()
            .try_fold(1usize, |acc, &s| acc.checked_mul(s))
            .ok_or_else(|| SynthError::config("view domain size overflows usize"))?;

        let k = sizes.len();
        let mut encode_num = vec![1usize; k];
        for i in (0..k.saturating_sub(1)).rev() {
            encode_num[i] = encode_num[i + 1] * sizes[i + 1];
        }
        let mut cum_mul = vec![1usize; k];
        for i in 1..k {
            cum_mul[i] = cum_mul[i - 1] * sizes[i - 1];
        }

        Ok(Self {
            attributes_index,
            sizes,
            domain_size,
            encode_num,
            cum_mul,
            tuple_key: OnceLock::new(),
            count: Counts::zeros(domain_size),
            weight_coeff: 1.0,
        })
    }

    /// Global indices of the attributes in this view, ascending.
    pub fn attributes_index(&self) -> &[usize] {
        &self.attributes_index
    }

    /// Domain size of each attribute in this view.
    pub fn attribute_sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Number of cells.
    pub fn domain_size(&self) -> usize {
        self.domain_size
    }

    /// Mixed-radix multiplier of each attribute.
    pub fn encode_num(&self) -> &[usize] {
        &self.encode_num
    }

    /// Product of the domain sizes preceding each attribute.
    pub fn cum_mul(&self) -> &[usize] {
        &self.cum_mul
    }

    /// Number of attributes.
    pub fn arity(&self) -> usize {
        self.attributes_index.len()
    }

    /// Whether this is the zero-attribute view (a single total cell).
    pub fn is_empty_view(&self) -> bool {
        self.attributes_index.is_empty()
    }

    /// Whether every attribute in `attrs` belongs to this view.
    pub fn contains(&self, attrs: &[usize]) -> bool {
        attrs
            .iter()
            .all(|a| self.attributes_index.binary_search(a).is_ok())
    }

    /// Comma-separated attribute names of this view.
    pub fn label(&self, domain: &AttributeDomain) -> String {
        domain.label(&self.attributes_index)
    }

    /// Sum of all cell weights.
    pub fn total(&self) -> f64 {
        total_mass(&self.count)
    }

    /// Copy of the counts rescaled to a probability distribution.
    pub fn normalized_counts(&self) -> Counts {
        let mut c = self.count.clone();
        normalize_to_distribution(&mut c);
        c
    }

    /// Encode a tuple of values, one per attribute of this view.
    pub fn encode(&self, tuple: &[u32]) -> usize {
        assert_eq!(tuple.len(), self.arity(), "tuple arity must match view");
        tuple
            .iter()
            .zip(&self.encode_num)
            .map(|(&v, &m)| v as usize * m)
            .sum()
    }

    /// Decode a cell index into its attribute values.
    pub fn decode(&self, cell: usize) -> Vec<u32> {
        assert!(cell < self.domain_size, "cell index out of range");
        self.encode_num
            .iter()
            .zip(&self.sizes)
            .map(|(&m, &s)| ((cell / m) % s) as u32)
            .collect()
    }

    /// Encode the view's attributes of a full record row.
    pub fn encode_row(&self, row: ArrayView1<'_, u32>) -> usize {
        self.attributes_index
            .iter()
            .zip(&self.encode_num)
            .map(|(&a, &m)| row[a] as usize * m)
            .sum()
    }

    /// Encode every record of a pool into this view's cells.
    pub fn encode_records(&self, records: &Records) -> Vec<usize> {
        records.outer_iter().map(|row| self.encode_row(row)).collect()
    }

    /// Cell index to attribute-value table, materialized on first use.
    ///
    /// Row `i` holds the tuple encoded by cell `i`. Each column is the
    /// attribute's value range with every value repeated `encode_num` times,
    /// tiled `cum_mul` times.
    pub fn tuple_key(&self) -> &Array2<u32> {
        self.tuple_key.get_or_init(|| {
            let mut key = Array2::<u32>::zeros((self.domain_size, self.arity()));
            for (i, &size) in self.sizes.iter().enumerate() {
                let mut column = key.column_mut(i);
                let mut row = 0usize;
                for _ in 0..self.cum_mul[i] {
                    for value in 0..size as u32 {
                        for _ in 0..self.encode_num[i] {
                            column[row] = value;
                            row += 1;
                        }
                    }
                }
            }
            key
        })
    }

    /// Tabulate the records of a pool into this view's counts.
    pub fn count_records(&mut self, records: &Records) {
        let mut count = Counts::zeros(self.domain_size);
        for row in records.outer_iter() {
            count[self.encode_row(row)] += 1.0;
        }
        self.count = count;
    }

    /// For every cell of `bigger`, the cell of this view it projects onto.
    pub fn projection_index(&self, bigger: &MarginalView) -> Result<Vec<usize>> {
        if !bigger.contains(&self.attributes_index) {
            return Err(SynthError::invalid(format!(
                "cannot project view {:?} onto {:?}: not a superset",
                bigger.attributes_index, self.attributes_index
            )));
        }
        let multipliers: Vec<usize> = bigger
            .attributes_index
            .iter()
            .map(|a| match self.attributes_index.binary_search(a) {
                Ok(pos) => self.encode_num[pos],
                Err(_) => 0,
            })
            .collect();
        let key = bigger.tuple_key();
        Ok(key
            .outer_iter()
            .map(|tuple| {
                tuple
                    .iter()
                    .zip(&multipliers)
                    .map(|(&v, &m)| v as usize * m)
                    .sum()
            })
            .collect())
    }

    /// Marginalize the counts of a superset view onto this view's attributes.
    pub fn project_counts(&self, bigger: &MarginalView) -> Result<Counts> {
        let index = self.projection_index(bigger)?;
        let mut out = Counts::zeros(self.domain_size);
        for (cell, &small) in index.iter().enumerate() {
            out[small] += bigger.count[cell];
        }
        Ok(out)
    }

    /// Replace this view's counts with the projection of `bigger`.
    pub fn project_from_bigger_view(&mut self, bigger: &MarginalView) -> Result<()> {
        self.count = self.project_counts(bigger)?;
        Ok(())
    }

    /// An all-zero view over a subset of this view's attributes.
    pub fn sub_view(&self, attrs: &[usize]) -> Result<MarginalView> {
        let mut attrs = attrs.to_vec();
        attrs.sort_unstable();
        attrs.dedup();
        if !self.contains(&attrs) {
            return Err(SynthError::invalid(format!(
                "attributes {attrs:?} are not a subset of {:?}",
                self.attributes_index
            )));
        }
        let sizes = attrs
            .iter()
            .filter_map(|a| {
                self.attributes_index
                    .binary_search(a)
                    .ok()
                    .map(|pos| self.sizes[pos])
            })
            .collect();
        Self::from_parts(attrs, sizes)
    }

    /// Slice this view to the cells matching `fixed` attribute values.
    ///
    /// Returns the conditional view over the remaining attributes. Fixed
    /// attributes that are not part of this view are ignored.
    pub fn condition_on(&self, fixed: &[(usize, u32)]) -> Result<MarginalView> {
        let mut matches: Vec<(usize, u32)> = Vec::new();
        for &(attr, value) in fixed {
            if let Ok(pos) = self.attributes_index.binary_search(&attr) {
                if value as usize >= self.sizes[pos] {
                    return Err(SynthError::invalid(format!(
                        "value {value} outside the domain of attribute {attr}"
                    )));
                }
                matches.push((pos, value));
            }
        }
        let remaining: Vec<usize> = self
            .attributes_index
            .iter()
            .enumerate()
            .filter(|(pos, _)| !matches.iter().any(|(p, _)| p == pos))
            .map(|(_, &a)| a)
            .collect();

        let mut out = self.sub_view(&remaining)?;
        out.weight_coeff = self.weight_coeff;
        let index = out.projection_index(self)?;
        let key = self.tuple_key();
        for (cell, tuple) in key.outer_iter().enumerate() {
            if matches.iter().all(|&(pos, v)| tuple[pos] == v) {
                out.count[index[cell]] += self.count[cell];
            }
        }
        Ok(out)
    }
}
