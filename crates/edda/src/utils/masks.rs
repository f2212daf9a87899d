//! Causal masking for decoder self-attention.

use ndarray::{Array2, Array4};

/// Lower-triangular attend-allowed table: `mask[i][j]` is true when key `j`
/// is at or before query `i`.
pub fn causal_mask(block_size: usize) -> Array2<bool> {
    Array2::from_shape_fn((block_size, block_size), |(i, j)| j <= i)
}

/// Sets every score that looks at a future position to negative infinity.
///
/// Softmax of `-inf` is exactly zero, which is what makes the causality
/// guarantee exact rather than approximate. The diagonal is always allowed,
/// so no score row ever becomes entirely `-inf`.
pub fn mask_future_scores(scores: &mut Array4<f32>, mask: &Array2<bool>) {
    scores.indexed_iter_mut().for_each(|((_b, _h, i, j), value)| {
        if !mask[(i, j)] {
            *value = f32::NEG_INFINITY;
        }
    });
}
