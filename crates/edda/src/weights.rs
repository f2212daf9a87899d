//! Memory-mapped safetensors checkpoint access.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use half::{bf16, f16};
use memmap2::Mmap;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors};

/// A parsed `.safetensors` file backed by a memory map.
///
/// Tensor bytes stay on disk until requested; [`Checkpoint::tensor_f32`]
/// materializes one tensor at a time.
pub struct Checkpoint {
    // The 'static lifetime is sound because the mmap is owned by the Arc
    // stored alongside the parsed view, so it outlives every tensor access.
    tensors: SafeTensors<'static>,
    _mmap: Arc<Mmap>,
    path: PathBuf,
}

impl Checkpoint {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open checkpoint file: {:?}", path))?;

        // SAFETY: the file is opened read-only and the mapping is kept alive
        // for the lifetime of the Checkpoint.
        let mmap = Arc::new(unsafe { Mmap::map(&file)? });
        let static_slice: &'static [u8] =
            unsafe { std::mem::transmute::<&[u8], &'static [u8]>(&mmap[..]) };

        let tensors = SafeTensors::deserialize(static_slice)
            .with_context(|| format!("failed to parse safetensors: {:?}", path))?;

        log::info!(
            "opened checkpoint {:?}: {} tensors",
            path.file_name().unwrap_or_default(),
            tensors.len()
        );

        Ok(Self {
            tensors,
            _mmap: mmap,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored tensor names, in no particular order.
    pub fn names(&self) -> Vec<&str> {
        self.tensors
            .names()
            .into_iter()
            .map(|s| s.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.tensor(name).is_ok()
    }

    pub fn shape(&self, name: &str) -> Result<Vec<usize>> {
        let view = self
            .tensors
            .tensor(name)
            .with_context(|| format!("tensor '{}' not found in checkpoint", name))?;
        Ok(view.shape().to_vec())
    }

    /// Reads a tensor and converts it to `f32` regardless of stored dtype.
    pub fn tensor_f32(&self, name: &str) -> Result<ArrayD<f32>> {
        let view = self
            .tensors
            .tensor(name)
            .with_context(|| format!("tensor '{}' not found in checkpoint", name))?;

        let bytes = view.data();
        let data: Vec<f32> = match view.dtype() {
            // mmap offsets are not guaranteed 4-byte aligned, so the
            // zero-copy cast can fail and we fall back to a byte-wise read.
            Dtype::F32 => match bytemuck::try_cast_slice::<u8, f32>(bytes) {
                Ok(slice) => slice.to_vec(),
                Err(_) => bytes
                    .chunks_exact(4)
                    .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
                    .collect(),
            },
            Dtype::F16 => bytes
                .chunks_exact(2)
                .map(|chunk| f16::from_le_bytes([chunk[0], chunk[1]]).to_f32())
                .collect(),
            Dtype::BF16 => bytes
                .chunks_exact(2)
                .map(|chunk| bf16::from_le_bytes([chunk[0], chunk[1]]).to_f32())
                .collect(),
            other => bail!(
                "f32 conversion not supported for dtype {:?} on tensor '{}'",
                other,
                name
            ),
        };

        Ok(ArrayD::from_shape_vec(IxDyn(view.shape()), data)?)
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("path", &self.path)
            .field("tensors", &self.tensors.len())
            .finish()
    }
}
