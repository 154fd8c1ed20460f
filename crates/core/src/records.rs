//! Synthetic record pools.

use ndarray::Array2;
use rand::Rng;

use crate::domain::AttributeDomain;
use crate::error::{Result, SynthError};

/// Row-major record table: one row per record, one coded column per attribute.
pub type Records = Array2<u32>;

/// Draw `num_records` records with every attribute uniform over its domain.
pub fn random_records<R: Rng + ?Sized>(
    domain: &AttributeDomain,
    num_records: usize,
    rng: &mut R,
) -> Records {
    let mut records = Records::zeros((num_records, domain.len()));
    for (attr, mut column) in records.columns_mut().into_iter().enumerate() {
        let size = domain.size(attr) as u32;
        column.mapv_inplace(|_| rng.gen_range(0..size));
    }
    records
}

/// Assemble a record table from equally long attribute columns.
pub fn records_from_columns(columns: &[Vec<u32>]) -> Result<Records> {
    let num_records = columns.first().map_or(0, Vec::len);
    if columns.iter().any(|c| c.len() != num_records) {
        return Err(SynthError::invalid("record columns must have equal length"));
    }
    let mut records = Records::zeros((num_records, columns.len()));
    for (attr, values) in columns.iter().enumerate() {
        for (row, &v) in values.iter().enumerate() {
            records[[row, attr]] = v;
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn random_records_respect_domain() {
        let d = AttributeDomain::from_sizes(vec![2, 5, 1]).expect("domain");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let records = random_records(&d, 500, &mut rng);
        assert_eq!(records.dim(), (500, 3));
        for row in records.outer_iter() {
            assert!(row[0] < 2 && row[1] < 5 && row[2] == 0);
        }
    }

    #[test]
    fn columns_assemble_row_major() {
        let records = records_from_columns(&[vec![0, 1, 1], vec![2, 0, 1]]).expect("records");
        assert_eq!(records, ndarray::array![[0, 2], [1, 0], [1, 1]]);
        assert!(records_from_columns(&[vec![0], vec![1, 2]]).is_err());
    }
}
