//! Activation functions and softmax.

use std::str::FromStr;

use libm::{erff, tanhf};
use ndarray::{parallel::prelude::*, s, Array3, Array4};
use serde::{Deserialize, Serialize};

/// Minimum element count before activations run on the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 16_384;

const SQRT_2_INV: f32 = 0.7071067811865475;
const SQRT_2_OVER_PI: f32 = 0.7978845608;
const GELU_COEFF: f32 = 0.044715;

/// GELU-family nonlinearities used by GPT-2 checkpoints.
///
/// `gelu_new` is the tanh approximation the original model was trained with;
/// `gelu` is the exact erf form some configs request instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Gelu,
    GeluNew,
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gelu" => Ok(Activation::Gelu),
            "gelu_new" | "gelu_fast" | "gelu_pytorch_tanh" => Ok(Activation::GeluNew),
            _ => Err(format!(
                "unknown activation function: {} (expected gelu or gelu_new)",
                s
            )),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::GeluNew
    }
}

#[inline(always)]
pub fn gelu_scalar(x: f32) -> f32 {
    0.5 * x * (1.0 + erff(x * SQRT_2_INV))
}

#[inline(always)]
pub fn gelu_new_scalar(x: f32) -> f32 {
    let x_cubed = x * x * x;
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x_cubed);
    0.5 * x * (1.0 + tanhf(inner))
}

/// Applies the activation in place to a 3-D array.
pub fn apply_activation(arr: &mut Array3<f32>, activation: Activation) {
    let use_parallel = arr.len() >= PARALLEL_THRESHOLD;
    let scalar = match activation {
        Activation::Gelu => gelu_scalar,
        Activation::GeluNew => gelu_new_scalar,
    };
    if let Some(slice) = arr.as_slice_mut() {
        if use_parallel {
            slice.par_iter_mut().for_each(|x| *x = scalar(*x));
        } else {
            slice.iter_mut().for_each(|x| *x = scalar(*x));
        }
    } else if use_parallel {
        arr.par_mapv_inplace(scalar);
    } else {
        arr.mapv_inplace(scalar);
    }
}

/// Applies softmax in place to a slice.
pub fn softmax_inplace(slice: &mut [f32]) {
    if slice.is_empty() {
        return;
    }

    let max = slice.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));

    let mut sum = 0.0;
    for v in slice.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    if sum > 0.0 {
        let scale = 1.0 / sum;
        for v in slice.iter_mut() {
            *v *= scale;
        }
    }
}

/// Applies softmax along the last axis of a 4-D score array.
///
/// Rows are max-subtracted first, so `-inf` entries come out as exactly
/// `0.0` as long as at least one entry in the row is finite.
pub fn softmax_4d_inplace(scores: &mut Array4<f32>) {
    let (batch, heads, rows, _) = scores.dim();

    for b in 0..batch {
        for h in 0..heads {
            for r in 0..rows {
                let mut row = scores.slice_mut(s![b, h, r, ..]);
                if let Some(slice) = row.as_slice_mut() {
                    softmax_inplace(slice);
                } else {
                    let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                    row.mapv_inplace(|x| (x - max).exp());
                    let sum = row.sum();
                    if sum > 0.0 {
                        row /= sum;
                    }
                }
            }
        }
    }
}
