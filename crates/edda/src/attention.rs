//! Causal multi-head self-attention.

use anyhow::{ensure, Result};
use ndarray::{s, Array2, Array3, Array4};

use crate::activations::softmax_4d_inplace;
use crate::linear::Linear;
use crate::utils::linear_algebra::matmul_4d;
use crate::utils::masks::{causal_mask, mask_future_scores};

/// One attention block: a fused query/key/value projection, an output
/// projection, and the precomputed causal mask for the full context window.
///
/// The fused projection widens `n_embd` to `3 * n_embd`; query, key, and
/// value are three independent contiguous chunks of that output.
pub struct CausalSelfAttention {
    pub qkv: Linear,
    pub proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale_factor: f32,
    mask: Array2<bool>,
}

impl CausalSelfAttention {
    /// Fails before allocating anything when the head geometry is invalid.
    pub fn new(n_embd: usize, n_head: usize, block_size: usize) -> Result<Self> {
        ensure!(n_head > 0, "head count must be positive");
        ensure!(
            n_embd % n_head == 0,
            "embedding width {} is not divisible by head count {}",
            n_embd,
            n_head
        );

        let head_dim = n_embd / n_head;
        Ok(Self {
            qkv: Linear::zeros(3 * n_embd, n_embd),
            proj: Linear::zeros(n_embd, n_embd),
            num_heads: n_head,
            head_dim,
            scale_factor: 1.0 / (head_dim as f32).sqrt(),
            mask: causal_mask(block_size),
        })
    }

    pub fn block_size(&self) -> usize {
        self.mask.dim().0
    }

    pub fn forward(&self, hidden: &Array3<f32>) -> Result<Array3<f32>> {
        let (batch, seq, embd) = hidden.dim();
        ensure!(
            seq <= self.block_size(),
            "sequence length {} exceeds block size {}",
            seq,
            self.block_size()
        );
        ensure!(
            embd == self.qkv.in_features(),
            "input width {} does not match embedding width {}",
            embd,
            self.qkv.in_features()
        );

        let qkv = self.qkv.forward(hidden);
        let q = qkv.slice(s![.., .., ..embd]).to_owned();
        let k = qkv.slice(s![.., .., embd..2 * embd]).to_owned();
        let v = qkv.slice(s![.., .., 2 * embd..]).to_owned();

        let q = self.split_heads(&q)?;
        let k = self.split_heads(&k)?;
        let v = self.split_heads(&v)?;

        let weights = self.attention_weights(&q, &k);
        let context = matmul_4d(&weights, &v);

        let merged = context
            .permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .to_owned()
            .into_shape_with_order((batch, seq, embd))?;
        Ok(self.proj.forward(&merged))
    }

    /// `[batch, seq, embd]` to `[batch, heads, seq, head_dim]`.
    fn split_heads(&self, x: &Array3<f32>) -> Result<Array4<f32>> {
        let (batch, seq, _) = x.dim();
        let heads = x
            .to_owned()
            .into_shape_with_order((batch, seq, self.num_heads, self.head_dim))?
            .permuted_axes([0, 2, 1, 3]);
        Ok(heads.as_standard_layout().to_owned())
    }

    /// Post-softmax attention probabilities with the causal mask applied.
    /// Probabilities at future positions are exactly zero.
    fn attention_weights(&self, q: &Array4<f32>, k: &Array4<f32>) -> Array4<f32> {
        let k_t = k
            .clone()
            .permuted_axes([0, 1, 3, 2])
            .as_standard_layout()
            .to_owned();
        let mut scores = matmul_4d(q, &k_t);
        scores *= self.scale_factor;
        mask_future_scores(&mut scores, &self.mask);
        softmax_4d_inplace(&mut scores);
        scores
    }
}
