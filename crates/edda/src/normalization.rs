//! Layer normalization.

use ndarray::{Array1, Array3, Axis};

/// Learnable scale and shift applied over the feature axis.
pub struct LayerNorm {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(weight: Array1<f32>, bias: Array1<f32>, eps: f32) -> Self {
        Self { weight, bias, eps }
    }

    /// Fresh-model initialization: unit scale, zero shift.
    pub fn identity(size: usize, eps: f32) -> Self {
        Self {
            weight: Array1::ones(size),
            bias: Array1::zeros(size),
            eps,
        }
    }

    /// Normalizes over the feature axis of a `[batch, seq, features]` tensor.
    #[inline]
    pub fn forward(&self, hidden: &Array3<f32>) -> Array3<f32> {
        let mean = hidden.mean_axis(Axis(2)).unwrap().insert_axis(Axis(2));
        let variance = hidden.var_axis(Axis(2), 0.0).insert_axis(Axis(2));

        let inv_std = (&variance + self.eps).mapv(|v| 1.0 / v.sqrt());
        let normalized = (hidden - &mean) * &inv_std;

        normalized * &self.weight + &self.bias
    }
}
