//! Count vectors and low-level operations on them.

use ndarray::Array1;

/// Weights of a marginal, one entry per cell.
///
/// Entries may be fractional or negative before reconciliation.
pub type Counts = Array1<f64>;

/// Sum of all entries.
pub fn total_mass(c: &Counts) -> f64 {
    c.sum()
}

/// L1 distance between two count vectors of equal length.
pub fn l1_distance(a: &Counts, b: &Counts) -> f64 {
    assert_eq!(a.len(), b.len(), "count vectors must have equal length");
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Rescale `c` in-place to sum to one.
///
/// A vector with no positive mass falls back to the uniform distribution.
/// Returns the total before normalization.
pub fn normalize_to_distribution(c: &mut Counts) -> f64 {
    let total = total_mass(c);
    if c.is_empty() {
        return total;
    }
    if !total.is_finite() || total <= 0.0 {
        let uniform = 1.0 / c.len() as f64;
        c.fill(uniform);
        return total;
    }
    c.mapv_inplace(|x| x / total);
    total
}

/// Replace NaN and infinite entries with zero.
pub fn sanitize(c: &mut Counts) {
    c.mapv_inplace(|x| if x.is_finite() { x } else { 0.0 });
}
