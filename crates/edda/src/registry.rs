//! Pretrained checkpoint registry with metadata and download utilities.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::config::Gpt2Config;

/// The GPT-2 family sizes this crate can import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Gpt2,
    Gpt2Medium,
    Gpt2Large,
    Gpt2Xl,
}

/// Download URLs for all required model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    /// URL to the single SafeTensors weights file.
    pub weights_url: &'static str,

    /// URL to model configuration.
    ///
    /// Contains hyperparameters like embedding width and layer count.
    pub config_url: &'static str,
}

/// Complete metadata for a pretrained model.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Download URLs for all model files.
    pub paths: ModelPaths,
    /// Human-readable description of the model.
    pub description: &'static str,
    /// Approximate disk size in megabytes (SafeTensors format).
    pub size_mb: usize,
    /// Number of parameters in millions.
    pub params_millions: usize,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [
        Self::Gpt2,
        Self::Gpt2Medium,
        Self::Gpt2Large,
        Self::Gpt2Xl,
    ];

    /// The CLI-friendly slug (e.g. "gpt2-medium").
    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::Gpt2 => "gpt2",
            Self::Gpt2Medium => "gpt2-medium",
            Self::Gpt2Large => "gpt2-large",
            Self::Gpt2Xl => "gpt2-xl",
        }
    }

    pub fn hub_repo(&self) -> &'static str {
        match self {
            Self::Gpt2 => "openai-community/gpt2",
            Self::Gpt2Medium => "openai-community/gpt2-medium",
            Self::Gpt2Large => "openai-community/gpt2-large",
            Self::Gpt2Xl => "openai-community/gpt2-xl",
        }
    }

    /// Architecture hyperparameters for this preset.
    pub fn config(&self) -> Gpt2Config {
        let (n_layer, n_head, n_embd) = match self {
            Self::Gpt2 => (12, 12, 768),
            Self::Gpt2Medium => (24, 16, 1024),
            Self::Gpt2Large => (36, 20, 1280),
            Self::Gpt2Xl => (48, 25, 1600),
        };
        Gpt2Config {
            vocab_size: 50257,
            n_ctx: 1024,
            n_embd,
            n_layer,
            n_head,
            layer_norm_epsilon: 1e-5,
            activation_function: Some("gelu_new".to_string()),
        }
    }

    pub fn info(&self) -> ModelInfo {
        match self {
            Self::Gpt2 => ModelInfo {
                paths: ModelPaths {
                    weights_url:
                        "https://huggingface.co/openai-community/gpt2/resolve/main/model.safetensors",
                    config_url:
                        "https://huggingface.co/openai-community/gpt2/resolve/main/config.json",
                },
                description: "Smallest GPT-2. Good for smoke tests and quick experiments.",
                size_mb: 548,
                params_millions: 124,
            },
            Self::Gpt2Medium => ModelInfo {
                paths: ModelPaths {
                    weights_url:
                        "https://huggingface.co/openai-community/gpt2-medium/resolve/main/model.safetensors",
                    config_url:
                        "https://huggingface.co/openai-community/gpt2-medium/resolve/main/config.json",
                },
                description: "Mid-size GPT-2 with noticeably better completions than the base model.",
                size_mb: 1520,
                params_millions: 355,
            },
            Self::Gpt2Large => ModelInfo {
                paths: ModelPaths {
                    weights_url:
                        "https://huggingface.co/openai-community/gpt2-large/resolve/main/model.safetensors",
                    config_url:
                        "https://huggingface.co/openai-community/gpt2-large/resolve/main/config.json",
                },
                description: "Large GPT-2. Needs several gigabytes of RAM for f32 inference.",
                size_mb: 3250,
                params_millions: 774,
            },
            Self::Gpt2Xl => ModelInfo {
                paths: ModelPaths {
                    weights_url:
                        "https://huggingface.co/openai-community/gpt2-xl/resolve/main/model.safetensors",
                    config_url:
                        "https://huggingface.co/openai-community/gpt2-xl/resolve/main/config.json",
                },
                description: "The 1.5B-parameter GPT-2. The largest size OpenAI released.",
                size_mb: 6430,
                params_millions: 1558,
            },
        }
    }

    /// Get the local cache directory for this model.
    pub fn cache_dir(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.hub_repo().replace('/', "_"))
    }

    /// Check if this model is downloaded in the given cache directory.
    pub fn is_downloaded(&self, base_dir: &Path) -> bool {
        let model_dir = self.cache_dir(base_dir);
        model_dir.join("config.json").exists() && model_dir.join("model.safetensors").exists()
    }
}

impl FromStr for ModelType {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        let normalized = name.to_lowercase();
        for model in Self::ALL {
            if model.cli_name() == normalized || model.hub_repo() == normalized {
                return Ok(model);
            }
        }

        let known: Vec<&str> = Self::ALL.iter().map(|m| m.cli_name()).collect();
        Err(anyhow!(
            "unknown model '{}', expected one of: {}",
            name,
            known.join(", ")
        ))
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

// Download Utilities

/// Downloads config and weights for a model into `model_dir`.
///
/// Files already present are left untouched, so an interrupted download
/// resumes with the missing files only.
pub async fn download_model_files(model_dir: &Path, paths: &ModelPaths) -> Result<PathBuf> {
    tokio::fs::create_dir_all(model_dir).await?;

    download_file(model_dir, "config.json", paths.config_url).await?;
    download_file(model_dir, "model.safetensors", paths.weights_url).await?;

    Ok(model_dir.join("model.safetensors"))
}

async fn download_file(model_dir: &Path, filename: &str, url: &str) -> Result<()> {
    let local_path = model_dir.join(filename);
    if local_path.exists() {
        log::debug!("{} already present, skipping download", filename);
        return Ok(());
    }

    log::info!("downloading {} from {}", filename, url);

    let client = reqwest::Client::new();
    let mut req = client.get(url);
    if let Ok(token) = std::env::var("HF_TOKEN") {
        req = req.header("Authorization", format!("Bearer {}", token));
    }

    let response = req.send().await?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "failed to download {}: HTTP {}",
            filename,
            response.status()
        ));
    }

    let bytes = response.bytes().await?;
    tokio::fs::write(&local_path, &bytes).await?;

    log::info!("wrote {:?} ({} bytes)", local_path, bytes.len());
    Ok(())
}

/// Returns the default cache directory for model files, honoring the
/// `EDDA_CACHE_DIR` override.
pub fn default_cache_dir() -> PathBuf {
    cache_root_from(std::env::var_os("EDDA_CACHE_DIR"))
}

fn cache_root_from(override_dir: Option<OsString>) -> PathBuf {
    match override_dir {
        Some(dir) => PathBuf::from(dir),
        None => dirs::cache_dir()
            .expect("no cache directory found on system")
            .join("edda"),
    }
}

/// Formats parameter count in human-readable form.
pub fn format_params(millions: usize) -> String {
    if millions >= 1000 {
        format!("{:.1}B", millions as f64 / 1000.0)
    } else {
        format!("{}M", millions)
    }
}
