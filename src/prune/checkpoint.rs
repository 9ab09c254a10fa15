//! Mask checkpoints in SafeTensors format.
//!
//! A checkpoint is the flat map produced by `state_dict()` on a modifier or
//! manager: `<param>.sparsity_mask` keys mapping to 0/1 `f32` tensors. Keys
//! are written in sorted order so identical masks give identical files.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use crate::error::{PruneError, Result};

fn serialization_error(path: &Path, message: impl Into<String>) -> PruneError {
    PruneError::Serialization { path: Some(path.to_path_buf()), message: message.into() }
}

/// Write `state` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// `Io` when the file cannot be written, `Serialization` when the tensors
/// cannot be encoded.
pub fn save_mask_state(
    path: impl AsRef<Path>,
    state: &BTreeMap<String, ArrayD<f32>>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PruneError::Io {
            context: format!("creating {}", parent.display()),
            source,
        })?;
    }

    let tensor_data: Vec<(&str, Vec<u8>, Vec<usize>)> = state
        .iter()
        .map(|(key, mask)| {
            let flat: Vec<f32> = mask.iter().copied().collect();
            (key.as_str(), bytemuck::cast_slice(&flat).to_vec(), mask.shape().to_vec())
        })
        .collect();

    let views = tensor_data
        .iter()
        .map(|(key, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (*key, view))
                .map_err(|e| serialization_error(path, format!("{key}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, &None)
        .map_err(|e| serialization_error(path, e.to_string()))?;
    std::fs::write(path, bytes).map_err(|source| PruneError::Io {
        context: format!("writing {}", path.display()),
        source,
    })?;

    info!("saved {} masks to {}", state.len(), path.display());
    Ok(())
}

/// Read a checkpoint written by [`save_mask_state`].
///
/// # Errors
///
/// `Io` when the file cannot be read, `Serialization` when it is not a
/// SafeTensors file or holds a tensor that is not `f32`.
pub fn load_mask_state(path: impl AsRef<Path>) -> Result<BTreeMap<String, ArrayD<f32>>> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| PruneError::Io {
        context: format!("reading {}", path.display()),
        source,
    })?;
    let tensors =
        SafeTensors::deserialize(&data).map_err(|e| serialization_error(path, e.to_string()))?;

    let mut state = BTreeMap::new();
    for (key, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(serialization_error(
                path,
                format!("{key} has dtype {:?}, expected F32", view.dtype()),
            ));
        }
        // file offsets carry no alignment guarantee
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        let mask = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
            .map_err(|e| serialization_error(path, format!("{key}: {e}")))?;
        debug!("loaded mask {key} with shape {:?}", mask.shape());
        state.insert(key, mask);
    }
    Ok(state)
}
