//! Attribute catalog: ordered attributes with finite coded domains.

use std::collections::HashSet;

use crate::error::{Result, SynthError};

/// Ordered list of attributes, each with a finite integer domain size.
///
/// Attribute values are coded as `0..size`. The domain is read-only for the
/// duration of a synthesis run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDomain {
    names: Vec<String>,
    sizes: Vec<usize>,
}

impl AttributeDomain {
    /// Create a domain from attribute names and their domain sizes.
    pub fn new<S: Into<String>>(names: Vec<S>, sizes: Vec<usize>) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.len() != sizes.len() {
            return Err(SynthError::config(format!(
                "{} attribute names but {} domain sizes",
                names.len(),
                sizes.len()
            )));
        }
        if let Some(pos) = sizes.iter().position(|&s| s == 0) {
            return Err(SynthError::config(format!(
                "attribute '{}' has an empty domain",
                names[pos]
            )));
        }
        if sizes.iter().any(|&s| s > u32::MAX as usize) {
            return Err(SynthError::config("attribute domain exceeds u32 codes"));
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(SynthError::config(format!(
                    "duplicate attribute name '{name}'"
                )));
            }
        }
        Ok(Self { names, sizes })
    }

    /// Create an anonymous domain whose attributes are named `a0`, `a1`, ...
    pub fn from_sizes(sizes: Vec<usize>) -> Result<Self> {
        let names = (0..sizes.len()).map(|i| format!("a{i}")).collect();
        Self::new(names, sizes)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Whether the domain has no attributes.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Domain size of attribute `index`.
    pub fn size(&self, index: usize) -> usize {
        self.sizes[index]
    }

    /// All domain sizes in attribute order.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Name of attribute `index`.
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// All attribute names in attribute order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of the attribute called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Resolve several attribute names to indices.
    pub fn indices_of<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                let n = n.as_ref();
                self.index_of(n)
                    .ok_or_else(|| SynthError::config(format!("unknown attribute '{n}'")))
            })
            .collect()
    }

    /// Number of cells in the joint domain of `indices`.
    pub fn cell_count(&self, indices: &[usize]) -> usize {
        indices.iter().map(|&i| self.sizes[i]).product()
    }

    /// Comma-separated attribute names, used to label views in diagnostics.
    pub fn label(&self, indices: &[usize]) -> String {
        indices
            .iter()
            .map(|&i| self.names.get(i).map(String::as_str).unwrap_or("?"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_and_cells() {
        let d = AttributeDomain::new(vec!["age", "sex", "puma"], vec![5, 2, 7]).expect("domain");
        assert_eq!(d.len(), 3);
        assert_eq!(d.indices_of(&["puma", "age"]).expect("known"), vec![2, 0]);
        assert_eq!(d.cell_count(&[0, 1]), 10);
        assert_eq!(d.cell_count(&[]), 1);
        assert_eq!(d.label(&[1, 2]), "sex,puma");
    }

    #[test]
    fn rejects_bad_catalogs() {
        assert!(AttributeDomain::new(vec!["a", "b"], vec![2]).is_err());
        assert!(AttributeDomain::new(vec!["a", "a"], vec![2, 2]).is_err());
        assert!(AttributeDomain::new(vec!["a"], vec![0]).is_err());
        assert!(AttributeDomain::from_sizes(vec![3, 4])
            .expect("domain")
            .indices_of(&["zzz"])
            .is_err());
    }
}
