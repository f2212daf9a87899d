//! Checkpoint import with per-parameter shape verification.

use anyhow::{ensure, Context, Result};

use crate::model::Gpt2Model;
use crate::weights::Checkpoint;

/// Checkpoint matrices stored as `[in_features, out_features]`.
///
/// The original GPT-2 implemented its projections as 1x1 convolutions, so
/// these four weights arrive transposed relative to the
/// `[out_features, in_features]` layout used here.
pub const TRANSPOSED_SUFFIXES: [&str; 4] = [
    "attn.c_attn.weight",
    "attn.c_proj.weight",
    "mlp.c_fc.weight",
    "mlp.c_proj.weight",
];

/// Autoregressive mask buffers shipped inside GPT-2 checkpoints. They are
/// derived state, not weights, and are never imported.
fn is_mask_buffer(name: &str) -> bool {
    name.ends_with(".attn.masked_bias") || name.ends_with(".attn.bias")
}

fn needs_transpose(name: &str) -> bool {
    TRANSPOSED_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Summary of a completed import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    /// Parameters copied without layout changes.
    pub copied: usize,
    /// Conv1D-style matrices transposed during the copy.
    pub transposed: usize,
    /// Mask buffers present in the checkpoint and ignored.
    pub skipped_buffers: usize,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.copied + self.transposed
    }
}

/// Copies every trainable parameter from `checkpoint` into `model`.
///
/// Both name sets are enumerated up front and the import fails before any
/// copy if the counts disagree. Each copy then verifies shapes: the four
/// projection matrices must arrive with reversed axes, everything else
/// must match exactly.
pub fn import_checkpoint(model: &mut Gpt2Model, checkpoint: &Checkpoint) -> Result<ImportReport> {
    let expected = model.parameter_names();

    let provided: Vec<&str> = checkpoint
        .names()
        .into_iter()
        .filter(|name| !is_mask_buffer(name))
        .collect();
    let skipped_buffers = checkpoint.len() - provided.len();

    ensure!(
        provided.len() == expected.len(),
        "parameter count mismatch: model expects {} tensors, checkpoint provides {} (after ignoring {} mask buffers)",
        expected.len(),
        provided.len(),
        skipped_buffers
    );

    let mut report = ImportReport {
        copied: 0,
        transposed: 0,
        skipped_buffers,
    };

    for name in &expected {
        let source = checkpoint
            .tensor_f32(name)
            .with_context(|| format!("importing parameter '{}'", name))?;
        let stored_shape = source.shape().to_vec();
        let transpose = needs_transpose(name);

        model.with_parameter_mut(name, |param| {
            let target = param.shape()?;

            if transpose {
                ensure!(
                    stored_shape.len() == 2,
                    "parameter '{}' should be a matrix, checkpoint stores rank {}",
                    name,
                    stored_shape.len()
                );
                let reversed: Vec<usize> = target.iter().rev().copied().collect();
                ensure!(
                    stored_shape == reversed,
                    "shape mismatch for parameter '{}': expected transposed {:?}, checkpoint stores {:?}",
                    name,
                    reversed,
                    stored_shape
                );
                param.assign(&source.reversed_axes())
            } else {
                ensure!(
                    stored_shape == target,
                    "shape mismatch for parameter '{}': model expects {:?}, checkpoint stores {:?}",
                    name,
                    target,
                    stored_shape
                );
                param.assign(&source)
            }
        })?;

        log::debug!(
            "imported '{}'{}",
            name,
            if transpose { " (transposed)" } else { "" }
        );

        if transpose {
            report.transposed += 1;
        } else {
            report.copied += 1;
        }
    }

    log::info!(
        "imported {} tensors ({} transposed, {} mask buffers ignored)",
        report.total(),
        report.transposed,
        report.skipped_buffers
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Gpt2Config;
    use crate::model::Gpt2Model;
    use safetensors::tensor::TensorView;
    use safetensors::Dtype;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn tiny_config() -> Gpt2Config {
        Gpt2Config {
            vocab_size: 11,
            n_ctx: 16,
            n_embd: 8,
            n_layer: 2,
            n_head: 2,
            layer_norm_epsilon: 1e-5,
            activation_function: Some("gelu_new".to_string()),
        }
    }

    /// Shape of a tensor as a checkpoint stores it, with the four
    /// projection matrices in their `[in, out]` layout.
    fn checkpoint_shape(config: &Gpt2Config, name: &str) -> Vec<usize> {
        let e = config.n_embd;
        if name == "wte.weight" {
            vec![config.vocab_size, e]
        } else if name == "wpe.weight" {
            vec![config.n_ctx, e]
        } else if name.ends_with("attn.c_attn.weight") {
            vec![e, 3 * e]
        } else if name.ends_with("attn.c_attn.bias") {
            vec![3 * e]
        } else if name.ends_with("attn.c_proj.weight") {
            vec![e, e]
        } else if name.ends_with("mlp.c_fc.weight") {
            vec![e, 4 * e]
        } else if name.ends_with("mlp.c_fc.bias") {
            vec![4 * e]
        } else if name.ends_with("mlp.c_proj.weight") {
            vec![4 * e, e]
        } else {
            vec![e]
        }
    }

    fn full_tensor_set(config: &Gpt2Config) -> Vec<(String, Vec<usize>, Vec<f32>)> {
        config
            .parameter_layout()
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let shape = checkpoint_shape(config, &name);
                let len: usize = shape.iter().product();
                // distinct values per tensor so a botched transpose shows up
                let values: Vec<f32> = (0..len)
                    .map(|i| (idx * 10_000 + i) as f32 * 0.001)
                    .collect();
                (name, shape, values)
            })
            .collect()
    }

    fn write_checkpoint(dir: &TempDir, tensors: &[(String, Vec<usize>, Vec<f32>)]) -> PathBuf {
        let stored: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
            .iter()
            .map(|(name, shape, values)| {
                let bytes: Vec<u8> = values.iter().flat_map(|f| f.to_le_bytes()).collect();
                (name.clone(), shape.clone(), bytes)
            })
            .collect();

        let mut tensor_map = HashMap::new();
        for (name, shape, bytes) in &stored {
            tensor_map.insert(
                name.clone(),
                TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
            );
        }

        let path = dir.path().join("model.safetensors");
        safetensors::serialize_to_file(&tensor_map, &None, &path).unwrap();
        path
    }

    #[test]
    fn mask_buffer_names_are_recognized() {
        assert!(is_mask_buffer("h.0.attn.bias"));
        assert!(is_mask_buffer("h.11.attn.masked_bias"));
        assert!(!is_mask_buffer("h.0.attn.c_attn.bias"));
        assert!(!is_mask_buffer("h.0.attn.c_proj.bias"));
        assert!(!is_mask_buffer("ln_f.bias"));
    }

    #[test]
    fn transpose_set_is_exactly_the_four_projections() {
        assert!(needs_transpose("h.3.attn.c_attn.weight"));
        assert!(needs_transpose("h.3.attn.c_proj.weight"));
        assert!(needs_transpose("h.3.mlp.c_fc.weight"));
        assert!(needs_transpose("h.3.mlp.c_proj.weight"));
        assert!(!needs_transpose("h.3.attn.c_attn.bias"));
        assert!(!needs_transpose("h.3.ln_1.weight"));
        assert!(!needs_transpose("wte.weight"));
    }

    #[test]
    fn imports_every_tensor_and_transposes_projections() {
        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();

        let mut tensors = full_tensor_set(&config);
        // mask buffers ship with real checkpoints and must be ignored
        tensors.push((
            "h.0.attn.bias".to_string(),
            vec![1, 1, 16, 16],
            vec![1.0; 256],
        ));
        tensors.push((
            "h.1.attn.bias".to_string(),
            vec![1, 1, 16, 16],
            vec![1.0; 256],
        ));
        tensors.push(("h.0.attn.masked_bias".to_string(), vec![], vec![-1e4]));

        let checkpoint = Checkpoint::open(&write_checkpoint(&dir, &tensors)).unwrap();
        let mut model = Gpt2Model::new(config.clone()).unwrap();
        let report = import_checkpoint(&mut model, &checkpoint).unwrap();

        assert_eq!(report.total(), config.parameter_layout().len());
        assert_eq!(report.transposed, 4 * config.n_layer);
        assert_eq!(report.skipped_buffers, 3);

        // wte.weight is index 0 in the layout and copies straight through
        let wte = model.embeddings.wte.read().unwrap();
        assert_eq!(wte[[3, 5]], (3 * 8 + 5) as f32 * 0.001);
        drop(wte);

        // the tied head reads the same storage
        let head = model.lm_head.weight.read().unwrap();
        assert_eq!(head[[3, 5]], (3 * 8 + 5) as f32 * 0.001);
        drop(head);

        // h.0.attn.c_attn.weight is index 4; dest[o, i] == checkpoint[i, o]
        let qkv = &model.blocks[0].attn.qkv.weight;
        assert_eq!(qkv.shape(), &[24, 8]);
        for o in 0..24 {
            for i in 0..8 {
                let expected = (4 * 10_000 + i * 24 + o) as f32 * 0.001;
                assert_eq!(qkv[[o, i]], expected);
            }
        }
    }

    #[test]
    fn missing_tensor_fails_before_any_copy() {
        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();

        let mut tensors = full_tensor_set(&config);
        tensors.retain(|(name, _, _)| name != "h.1.mlp.c_fc.bias");

        let checkpoint = Checkpoint::open(&write_checkpoint(&dir, &tensors)).unwrap();
        let mut model = Gpt2Model::new(config.clone()).unwrap();
        let err = import_checkpoint(&mut model, &checkpoint).unwrap_err();

        let total = config.parameter_layout().len();
        let message = err.to_string();
        assert!(message.contains("parameter count mismatch"));
        assert!(message.contains(&total.to_string()));
        assert!(message.contains(&(total - 1).to_string()));

        let wte = model.embeddings.wte.read().unwrap();
        assert!(wte.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn extra_tensor_fails_the_cardinality_check() {
        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();

        let mut tensors = full_tensor_set(&config);
        tensors.push(("h.2.ln_1.weight".to_string(), vec![8], vec![1.0; 8]));

        let checkpoint = Checkpoint::open(&write_checkpoint(&dir, &tensors)).unwrap();
        let mut model = Gpt2Model::new(config).unwrap();
        let err = import_checkpoint(&mut model, &checkpoint).unwrap_err();
        assert!(err.to_string().contains("parameter count mismatch"));
    }

    #[test]
    fn wrong_shape_names_the_parameter() {
        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();

        let mut tensors = full_tensor_set(&config);
        for tensor in &mut tensors {
            if tensor.0 == "h.0.ln_2.bias" {
                tensor.1 = vec![9];
                tensor.2 = vec![0.0; 9];
            }
        }

        let checkpoint = Checkpoint::open(&write_checkpoint(&dir, &tensors)).unwrap();
        let mut model = Gpt2Model::new(config).unwrap();
        let err = import_checkpoint(&mut model, &checkpoint).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("shape mismatch"));
        assert!(message.contains("h.0.ln_2.bias"));
    }

    #[test]
    fn projection_stored_in_row_major_layout_is_rejected() {
        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();

        // store c_attn as [3E, E] instead of the expected [E, 3E]
        let mut tensors = full_tensor_set(&config);
        for tensor in &mut tensors {
            if tensor.0 == "h.1.attn.c_attn.weight" {
                tensor.1 = vec![24, 8];
            }
        }

        let checkpoint = Checkpoint::open(&write_checkpoint(&dir, &tensors)).unwrap();
        let mut model = Gpt2Model::new(config).unwrap();
        let err = import_checkpoint(&mut model, &checkpoint).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("h.1.attn.c_attn.weight"));
        assert!(message.contains("transposed"));
    }

    #[test]
    fn renamed_tensor_fails_with_the_missing_name() {
        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();

        // same cardinality, one name off
        let mut tensors = full_tensor_set(&config);
        for tensor in &mut tensors {
            if tensor.0 == "ln_f.bias" {
                tensor.0 = "final_norm.bias".to_string();
            }
        }

        let checkpoint = Checkpoint::open(&write_checkpoint(&dir, &tensors)).unwrap();
        let mut model = Gpt2Model::new(config).unwrap();
        let err = import_checkpoint(&mut model, &checkpoint).unwrap_err();
        assert!(format!("{:#}", err).contains("ln_f.bias"));
    }
}
