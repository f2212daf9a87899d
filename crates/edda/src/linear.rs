//! Dense projection with `[out_features, in_features]` weight layout.

use ndarray::{Array1, Array2, Array3};

use crate::utils::linear_algebra::matmul_3d_2d_transposed;

/// `y = x @ wᵗ + b`.
///
/// GPT-2 checkpoints store the attention and MLP projection matrices in the
/// opposite `[in, out]` layout (Conv1D), which is why those four matrices
/// are transposed when a checkpoint is imported.
pub struct Linear {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Self {
        Self { weight, bias }
    }

    /// Fresh-model initialization with zeroed parameters.
    pub fn zeros(out_features: usize, in_features: usize) -> Self {
        Self {
            weight: Array2::zeros((out_features, in_features)),
            bias: Array1::zeros(out_features),
        }
    }

    pub fn out_features(&self) -> usize {
        self.weight.dim().0
    }

    pub fn in_features(&self) -> usize {
        self.weight.dim().1
    }

    pub fn forward(&self, x: &Array3<f32>) -> Array3<f32> {
        matmul_3d_2d_transposed(x, &self.weight) + &self.bias
    }
}
