//! GPT-2 decoder construction and pretrained-checkpoint verification.
//!
//! The crate builds a GPT-2-style transformer decoder on an ndarray/faer CPU
//! stack, downloads a pretrained checkpoint from the Hugging Face hub, and
//! imports it into the freshly built model while validating every parameter
//! name and shape. The four Conv1D matrices that GPT-2 checkpoints store in
//! `[in, out]` layout are transposed during import; everything else must
//! match exactly.

pub mod activations;
pub mod attention;
pub mod config;
pub mod decoder;
pub mod embeddings;
pub mod feedforward;
pub mod importer;
pub mod linear;
pub mod model;
pub mod normalization;
pub mod registry;
pub mod utils;
pub mod weights;

pub use activations::Activation;
pub use config::Gpt2Config;
pub use importer::{import_checkpoint, ImportReport};
pub use model::Gpt2Model;
pub use registry::{ModelInfo, ModelType};
pub use weights::Checkpoint;

pub mod prelude {
    pub use crate::activations::Activation;
    pub use crate::config::Gpt2Config;
    pub use crate::importer::{import_checkpoint, ImportReport};
    pub use crate::model::Gpt2Model;
    pub use crate::registry::ModelType;
    pub use crate::weights::Checkpoint;
}
