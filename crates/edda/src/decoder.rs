//! Pre-norm transformer decoder block.

use anyhow::Result;
use ndarray::Array3;

use crate::attention::CausalSelfAttention;
use crate::config::Gpt2Config;
use crate::feedforward::FeedForward;
use crate::normalization::LayerNorm;

/// `x + attn(ln_1(x))` followed by `x + mlp(ln_2(x))`.
///
/// Each submodule sees a normalized copy of its input while the residual
/// stream itself stays un-normalized.
pub struct DecoderBlock {
    pub ln_1: LayerNorm,
    pub attn: CausalSelfAttention,
    pub ln_2: LayerNorm,
    pub mlp: FeedForward,
}

impl DecoderBlock {
    pub fn new(config: &Gpt2Config) -> Result<Self> {
        Ok(Self {
            ln_1: LayerNorm::identity(config.n_embd, config.layer_norm_epsilon),
            attn: CausalSelfAttention::new(config.n_embd, config.n_head, config.n_ctx)?,
            ln_2: LayerNorm::identity(config.n_embd, config.layer_norm_epsilon),
            mlp: FeedForward::new(config.n_embd, config.activation()?),
        })
    }

    pub fn forward(&self, hidden: &Array3<f32>) -> Result<Array3<f32>> {
        let attended = self.attn.forward(&self.ln_1.forward(hidden))?;
        let hidden = hidden + &attended;
        let fed = self.mlp.forward(&self.ln_2.forward(&hidden));
        Ok(hidden + fed)
    }
}
