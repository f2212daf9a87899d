//! GPT-2 model configuration.

use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};

use crate::activations::Activation;

fn default_layer_norm_epsilon() -> f32 {
    1e-5
}

/// Architecture hyperparameters, deserializable from a Hugging Face
/// `config.json`. Field names follow the checkpoint conventions; unknown
/// fields in the file are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gpt2Config {
    pub vocab_size: usize,
    /// Maximum sequence length (the context window).
    pub n_ctx: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f32,
    #[serde(default)]
    pub activation_function: Option<String>,
}

impl Gpt2Config {
    /// Rejects invalid head geometry before any tensor is allocated.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.n_layer > 0, "layer count must be positive");
        ensure!(self.n_head > 0, "head count must be positive");
        ensure!(self.n_embd > 0, "embedding width must be positive");
        ensure!(
            self.n_embd % self.n_head == 0,
            "embedding width {} is not divisible by head count {}",
            self.n_embd,
            self.n_head
        );
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }

    pub fn activation(&self) -> Result<Activation> {
        match &self.activation_function {
            Some(name) => name.parse().map_err(|e: String| anyhow!(e)),
            None => Ok(Activation::default()),
        }
    }

    /// Trainable parameter names in checkpoint order.
    ///
    /// The tied output projection shares the `wte.weight` storage and so
    /// contributes no name of its own. The causal mask is derived state and
    /// is likewise absent.
    pub fn parameter_layout(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(4 + self.n_layer * 12);
        names.push("wte.weight".to_string());
        names.push("wpe.weight".to_string());
        for i in 0..self.n_layer {
            for suffix in [
                "ln_1.weight",
                "ln_1.bias",
                "attn.c_attn.weight",
                "attn.c_attn.bias",
                "attn.c_proj.weight",
                "attn.c_proj.bias",
                "ln_2.weight",
                "ln_2.bias",
                "mlp.c_fc.weight",
                "mlp.c_fc.bias",
                "mlp.c_proj.weight",
                "mlp.c_proj.bias",
            ] {
                names.push(format!("h.{}.{}", i, suffix));
            }
        }
        names.push("ln_f.weight".to_string());
        names.push("ln_f.bias".to_string());
        names
    }

    /// Total trainable parameter count, with the tied projection counted
    /// once.
    pub fn num_parameters(&self) -> usize {
        let e = self.n_embd;
        let per_layer = 2 * e                   // ln_1
            + (3 * e) * e + 3 * e               // attn.c_attn
            + e * e + e                         // attn.c_proj
            + 2 * e                             // ln_2
            + (4 * e) * e + 4 * e               // mlp.c_fc
            + e * (4 * e) + e; // mlp.c_proj
        self.vocab_size * e + self.n_ctx * e + self.n_layer * per_layer + 2 * e
    }
}
