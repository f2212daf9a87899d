//! faer-backed matrix products in the layouts the decoder uses.
//!
//! Projection weights are kept in `[out_features, in_features]` layout, so
//! the workhorse here is the transposed product `a @ wᵗ`. Attention scores
//! and context use the per-head batched product over 4-D arrays.

use faer::Parallelism;
use ndarray::{Array2, Array3, Array4, ArrayView2, Zip};

/// `a [m, k] @ bᵗ` where `b` is stored `[n, k]`.
#[inline]
pub fn matmul_2d_transposed(a: &ArrayView2<f32>, b_transposed: &ArrayView2<f32>) -> Array2<f32> {
    let (m, k) = a.dim();
    let (n, k2) = b_transposed.dim();
    assert_eq!(k, k2, "inner dimensions do not match: {} vs {}", k, k2);

    let mut out = Array2::<f32>::zeros((m, n));
    let a_std = a.as_standard_layout();
    let b_std = b_transposed.as_standard_layout();
    let out_slice = out.as_slice_mut().unwrap();

    faer::linalg::matmul::matmul(
        faer::mat::from_row_major_slice_mut(out_slice, m, n),
        faer::mat::from_row_major_slice(a_std.as_slice().unwrap(), m, k),
        faer::mat::from_row_major_slice(b_std.as_slice().unwrap(), n, k).transpose(),
        None,
        1.0,
        Parallelism::Rayon(0),
    );
    out
}

/// 3-D input against a `[out, in]` weight matrix, batch and sequence flattened.
#[inline]
pub fn matmul_3d_2d_transposed(a: &Array3<f32>, b_transposed: &Array2<f32>) -> Array3<f32> {
    let (batch, seq, k) = a.dim();
    let (n, k2) = b_transposed.dim();
    assert_eq!(k, k2, "inner dimensions do not match: {} vs {}", k, k2);

    let a_flat = a.view().into_shape_with_order((batch * seq, k)).unwrap();
    let out_flat = matmul_2d_transposed(&a_flat, &b_transposed.view());
    out_flat.into_shape_with_order((batch, seq, n)).unwrap()
}

/// Batched product over `[batch, heads, m, k] @ [batch, heads, k, n]`.
///
/// Outer batch runs on the rayon pool; each head multiplication runs with
/// faer's internal threading off since the pool is already saturated.
#[inline]
pub fn matmul_4d(a: &Array4<f32>, b: &Array4<f32>) -> Array4<f32> {
    let (batch, heads, m, k) = a.dim();
    let (b_batch, b_heads, k2, n) = b.dim();
    assert_eq!((batch, heads), (b_batch, b_heads), "batch/head dims do not match");
    assert_eq!(k, k2, "inner dimensions do not match: {} vs {}", k, k2);

    let mut out = Array4::<f32>::zeros((batch, heads, m, n));

    Zip::from(out.outer_iter_mut())
        .and(a.outer_iter())
        .and(b.outer_iter())
        .par_for_each(|mut out_b, a_b, b_b| {
            Zip::from(out_b.outer_iter_mut())
                .and(a_b.outer_iter())
                .and(b_b.outer_iter())
                .for_each(|mut out_h, a_h, b_h| {
                    let a_std = a_h.as_standard_layout();
                    let b_std = b_h.as_standard_layout();
                    let out_slice = out_h.as_slice_mut().expect("output buffer is contiguous");

                    faer::linalg::matmul::matmul(
                        faer::mat::from_row_major_slice_mut(out_slice, m, n),
                        faer::mat::from_row_major_slice(a_std.as_slice().unwrap(), m, k),
                        faer::mat::from_row_major_slice(b_std.as_slice().unwrap(), k, n),
                        None,
                        1.0,
                        Parallelism::None,
                    );
                });
        });

    out
}
