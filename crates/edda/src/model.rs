//! Model assembly: embeddings, decoder stack, and the tied output head.

use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use ndarray::{Array1, Array2, Array3, ArrayD, Ix1, Ix2};

use crate::config::Gpt2Config;
use crate::decoder::DecoderBlock;
use crate::embeddings::{shared_embedding, Embeddings, LmHead, SharedEmbedding};
use crate::importer::import_checkpoint;
use crate::normalization::LayerNorm;
use crate::registry::{default_cache_dir, download_model_files, ModelType};
use crate::weights::Checkpoint;

/// Mutable access to one named parameter.
pub enum ParamMut<'a> {
    Matrix(&'a mut Array2<f32>),
    Vector(&'a mut Array1<f32>),
    Shared(&'a SharedEmbedding),
}

impl ParamMut<'_> {
    pub fn shape(&self) -> Result<Vec<usize>> {
        match self {
            Self::Matrix(m) => Ok(m.shape().to_vec()),
            Self::Vector(v) => Ok(v.shape().to_vec()),
            Self::Shared(s) => Ok(s
                .read()
                .map_err(|_| anyhow!("token embedding storage is poisoned"))?
                .shape()
                .to_vec()),
        }
    }

    /// Overwrites the parameter with `source`, which must match its shape
    /// exactly.
    pub fn assign(self, source: &ArrayD<f32>) -> Result<()> {
        let target = self.shape()?;
        ensure!(
            source.shape() == target.as_slice(),
            "cannot assign {:?} into a parameter of shape {:?}",
            source.shape(),
            target
        );

        match self {
            Self::Matrix(dest) => {
                dest.assign(&source.view().into_dimensionality::<Ix2>()?);
            }
            Self::Vector(dest) => {
                dest.assign(&source.view().into_dimensionality::<Ix1>()?);
            }
            Self::Shared(shared) => {
                let mut table = shared
                    .write()
                    .map_err(|_| anyhow!("token embedding storage is poisoned"))?;
                table.assign(&source.view().into_dimensionality::<Ix2>()?);
            }
        }
        Ok(())
    }
}

/// The full decoder-only transformer.
pub struct Gpt2Model {
    pub config: Gpt2Config,
    pub embeddings: Embeddings,
    pub blocks: Vec<DecoderBlock>,
    pub ln_f: LayerNorm,
    pub lm_head: LmHead,
}

impl Gpt2Model {
    /// Builds a model with identity layer norms and zeroed weights.
    ///
    /// The token-embedding table and the output projection are one shared
    /// storage, so an import into `wte.weight` is immediately visible to
    /// the head.
    pub fn new(config: Gpt2Config) -> Result<Self> {
        config.validate()?;

        let wte = shared_embedding(config.vocab_size, config.n_embd);
        let wpe = Array2::zeros((config.n_ctx, config.n_embd));
        let blocks = (0..config.n_layer)
            .map(|_| DecoderBlock::new(&config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            embeddings: Embeddings::new(wte.clone(), wpe),
            blocks,
            ln_f: LayerNorm::identity(config.n_embd, config.layer_norm_epsilon),
            lm_head: LmHead::new(wte),
            config,
        })
    }

    /// Runs the decoder over a `[batch, seq]` grid of token ids and returns
    /// `[batch, seq, vocab]` logits.
    pub fn forward(&self, input_ids: &Array2<u32>) -> Result<Array3<f32>> {
        let (batch, seq) = input_ids.dim();
        ensure!(batch > 0 && seq > 0, "input is empty");
        ensure!(
            seq <= self.config.n_ctx,
            "sequence length {} exceeds the context window {}",
            seq,
            self.config.n_ctx
        );
        if let Some(bad) = input_ids
            .iter()
            .find(|id| **id as usize >= self.config.vocab_size)
        {
            bail!(
                "token id {} is out of range for vocabulary size {}",
                bad,
                self.config.vocab_size
            );
        }

        let mut hidden = self.embeddings.forward(input_ids)?;
        for block in &self.blocks {
            hidden = block.forward(&hidden)?;
        }
        let hidden = self.ln_f.forward(&hidden);
        self.lm_head.project(&hidden)
    }

    pub fn num_parameters(&self) -> usize {
        self.config.num_parameters()
    }

    /// Trainable parameter names in checkpoint order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.config.parameter_layout()
    }

    /// Resolves `name` and hands the parameter to `f`.
    pub fn with_parameter_mut<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(ParamMut<'_>) -> Result<T>,
    ) -> Result<T> {
        f(self.parameter_mut(name)?)
    }

    fn parameter_mut(&mut self, name: &str) -> Result<ParamMut<'_>> {
        match name {
            "wte.weight" => return Ok(ParamMut::Shared(&self.embeddings.wte)),
            "wpe.weight" => return Ok(ParamMut::Matrix(&mut self.embeddings.wpe)),
            "ln_f.weight" => return Ok(ParamMut::Vector(&mut self.ln_f.weight)),
            "ln_f.bias" => return Ok(ParamMut::Vector(&mut self.ln_f.bias)),
            _ => {}
        }

        let rest = name
            .strip_prefix("h.")
            .ok_or_else(|| anyhow!("unknown parameter '{}'", name))?;
        let (index, field) = rest
            .split_once('.')
            .ok_or_else(|| anyhow!("unknown parameter '{}'", name))?;
        let index: usize = index
            .parse()
            .with_context(|| format!("invalid layer index in parameter '{}'", name))?;
        let layer_count = self.blocks.len();
        let block = self.blocks.get_mut(index).ok_or_else(|| {
            anyhow!(
                "layer index {} out of range for {} layers in parameter '{}'",
                index,
                layer_count,
                name
            )
        })?;

        let param = match field {
            "ln_1.weight" => ParamMut::Vector(&mut block.ln_1.weight),
            "ln_1.bias" => ParamMut::Vector(&mut block.ln_1.bias),
            "attn.c_attn.weight" => ParamMut::Matrix(&mut block.attn.qkv.weight),
            "attn.c_attn.bias" => ParamMut::Vector(&mut block.attn.qkv.bias),
            "attn.c_proj.weight" => ParamMut::Matrix(&mut block.attn.proj.weight),
            "attn.c_proj.bias" => ParamMut::Vector(&mut block.attn.proj.bias),
            "ln_2.weight" => ParamMut::Vector(&mut block.ln_2.weight),
            "ln_2.bias" => ParamMut::Vector(&mut block.ln_2.bias),
            "mlp.c_fc.weight" => ParamMut::Matrix(&mut block.mlp.c_fc.weight),
            "mlp.c_fc.bias" => ParamMut::Vector(&mut block.mlp.c_fc.bias),
            "mlp.c_proj.weight" => ParamMut::Matrix(&mut block.mlp.c_proj.weight),
            "mlp.c_proj.bias" => ParamMut::Vector(&mut block.mlp.c_proj.bias),
            _ => bail!("unknown parameter '{}'", name),
        };
        Ok(param)
    }

    /// Loads a model from a directory containing `config.json` and
    /// `model.safetensors`.
    pub fn from_pretrained_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.json");
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config: {:?}", config_path))?;
        let config: Gpt2Config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config: {:?}", config_path))?;

        let mut model = Self::new(config)?;
        let checkpoint = Checkpoint::open(&dir.join("model.safetensors"))?;
        import_checkpoint(&mut model, &checkpoint)?;

        log::info!(
            "loaded model from {:?}: {} parameters",
            dir,
            model.num_parameters()
        );
        Ok(model)
    }

    /// Builds the preset's architecture and imports `model.safetensors`
    /// from `dir` into it.
    ///
    /// The configuration comes from the preset table, not from the
    /// directory, so a cached artifact whose layout diverges from the
    /// preset fails reconciliation instead of loading silently.
    pub fn from_preset_dir(model_type: ModelType, dir: &Path) -> Result<Self> {
        let mut model = Self::new(model_type.config())?;
        let checkpoint = Checkpoint::open(&dir.join("model.safetensors"))?;
        import_checkpoint(&mut model, &checkpoint)?;

        log::info!(
            "loaded {} from {:?}: {} parameters",
            model_type,
            dir,
            model.num_parameters()
        );
        Ok(model)
    }

    /// Downloads a registry preset into the cache if needed, then loads it
    /// against the preset's own architecture.
    pub async fn from_registry(model_type: ModelType) -> Result<Self> {
        let model_dir = model_type.cache_dir(&default_cache_dir());
        download_model_files(&model_dir, &model_type.info().paths).await?;
        Self::from_preset_dir(model_type, &model_dir)
    }
}
