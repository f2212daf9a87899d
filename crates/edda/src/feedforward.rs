//! Position-wise feed-forward block.

use ndarray::Array3;

use crate::activations::{apply_activation, Activation};
use crate::linear::Linear;

/// Expands to `4 * n_embd`, applies the GELU nonlinearity, projects back.
/// Works on each position independently; only attention mixes tokens.
pub struct FeedForward {
    pub c_fc: Linear,
    pub c_proj: Linear,
    pub activation: Activation,
}

impl FeedForward {
    pub fn new(n_embd: usize, activation: Activation) -> Self {
        Self {
            c_fc: Linear::zeros(4 * n_embd, n_embd),
            c_proj: Linear::zeros(n_embd, 4 * n_embd),
            activation,
        }
    }

    pub fn forward(&self, hidden: &Array3<f32>) -> Array3<f32> {
        let mut expanded = self.c_fc.forward(hidden);
        apply_activation(&mut expanded, self.activation);
        self.c_proj.forward(&expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::gelu_new_scalar;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn expands_activates_and_projects_back() {
        let mut ffn = FeedForward::new(2, Activation::GeluNew);
        // c_fc copies the input into the first two hidden features, c_proj
        // sums those two back into the first output feature.
        ffn.c_fc.weight[[0, 0]] = 1.0;
        ffn.c_fc.weight[[1, 1]] = 1.0;
        ffn.c_proj.weight[[0, 0]] = 1.0;
        ffn.c_proj.weight[[0, 1]] = 1.0;

        let x = Array3::from_shape_vec((1, 1, 2), vec![1.0, -2.0]).unwrap();
        let y = ffn.forward(&x);

        assert_eq!(y.dim(), (1, 1, 2));
        let expected = gelu_new_scalar(1.0) + gelu_new_scalar(-2.0);
        assert_relative_eq!(y[[0, 0, 0]], expected, epsilon = 1e-6);
        assert_relative_eq!(y[[0, 0, 1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn positions_do_not_interact() {
        let mut ffn = FeedForward::new(2, Activation::GeluNew);
        for r in 0..8 {
            for c in 0..2 {
                ffn.c_fc.weight[[r, c]] = ((r + c) % 3) as f32 * 0.4 - 0.2;
            }
        }
        for r in 0..2 {
            for c in 0..8 {
                ffn.c_proj.weight[[r, c]] = ((r * 3 + c) % 5) as f32 * 0.1;
            }
        }

        let row = vec![0.7f32, -1.3];
        let single = Array3::from_shape_vec((1, 1, 2), row.clone()).unwrap();
        let mut repeated_data = row.clone();
        repeated_data.extend_from_slice(&[5.0, 5.0]);
        repeated_data.extend_from_slice(&row);
        let repeated = Array3::from_shape_vec((1, 3, 2), repeated_data).unwrap();

        let y_single = ffn.forward(&single);
        let y_repeated = ffn.forward(&repeated);

        for f in 0..2 {
            assert_relative_eq!(y_repeated[[0, 0, f]], y_single[[0, 0, f]], epsilon = 1e-6);
            assert_relative_eq!(y_repeated[[0, 2, f]], y_single[[0, 0, f]], epsilon = 1e-6);
        }
    }
}
