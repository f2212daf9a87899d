//! Token and position embeddings, plus the tied output projection.

use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use ndarray::{parallel::prelude::*, s, Array2, Array3, Axis};

use crate::utils::linear_algebra::matmul_2d_transposed;

/// Token-embedding storage shared between the embedding lookup and the
/// output projection. Both sides hold the same allocation; writing through
/// one handle is visible through the other.
pub type SharedEmbedding = Arc<RwLock<Array2<f32>>>;

pub fn shared_embedding(vocab_size: usize, n_embd: usize) -> SharedEmbedding {
    Arc::new(RwLock::new(Array2::zeros((vocab_size, n_embd))))
}

/// Sum of token-embedding rows and position embeddings `0..seq_len`.
pub struct Embeddings {
    pub wte: SharedEmbedding,
    pub wpe: Array2<f32>,
}

impl Embeddings {
    pub fn new(wte: SharedEmbedding, wpe: Array2<f32>) -> Self {
        Self { wte, wpe }
    }

    /// Token ids must already be validated against the vocabulary size.
    pub fn forward(&self, input_ids: &Array2<u32>) -> Result<Array3<f32>> {
        let (batch, seq) = input_ids.dim();
        let table = self
            .wte
            .read()
            .map_err(|_| anyhow!("token embedding storage is poisoned"))?;
        let n_embd = table.dim().1;

        let mut hidden = Array3::<f32>::zeros((batch, seq, n_embd));
        hidden
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(input_ids.axis_iter(Axis(0)))
            .for_each(|(mut rows, ids)| {
                for (t, &id) in ids.iter().enumerate() {
                    rows.slice_mut(s![t, ..]).assign(&table.row(id as usize));
                }
            });

        let positions = self.wpe.slice(s![..seq, ..]);
        hidden += &positions.insert_axis(Axis(0));
        Ok(hidden)
    }
}

/// Output projection over the shared token-embedding table.
pub struct LmHead {
    pub weight: SharedEmbedding,
}

impl LmHead {
    pub fn new(weight: SharedEmbedding) -> Self {
        Self { weight }
    }

    /// Projects hidden states to vocabulary logits: `hidden @ wteᵗ`.
    pub fn project(&self, hidden: &Array3<f32>) -> Result<Array3<f32>> {
        let (batch, seq, n_embd) = hidden.dim();
        let table = self
            .weight
            .read()
            .map_err(|_| anyhow!("token embedding storage is poisoned"))?;
        let vocab_size = table.dim().0;

        let flat = hidden.view().into_shape_with_order((batch * seq, n_embd))?;
        let logits = matmul_2d_transposed(&flat, &table.view());
        Ok(logits.into_shape_with_order((batch, seq, vocab_size))?)
    }
}
