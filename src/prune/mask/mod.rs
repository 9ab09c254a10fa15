//! Sparsity mask creation
//!
//! Turns a tensor (or an importance score tensor) and a target sparsity
//! into a binary mask of the same shape. Supported granularities:
//! unstructured elements, `[rows, cols]` blocks, input channels, and
//! filters.
//!
//! Equal scores are broken by flat index: the group whose first element
//! comes first in row-major order is pruned first.

mod creator;
pub(crate) mod groups;

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod tests;

pub use creator::{load_mask_creator, MaskCreator, MaskTypeRepr};

use ndarray::ArrayD;

/// Fraction of zero entries in a mask (0.0 for an empty mask).
pub fn mask_sparsity(mask: &ArrayD<f32>) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|&&v| v == 0.0).count() as f64 / mask.len() as f64
}
