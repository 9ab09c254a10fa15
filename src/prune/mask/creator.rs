//! Mask creator strategies.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::groups::{select_lowest, Candidate, GroupLayout};
use crate::error::{PruneError, Result};

/// Granularity at which a mask zeroes values.
///
/// Serialized as a string (`unstructured`, `channel`, `filter`) or, for
/// blocks, as the two-element block shape.
///
/// # Example
///
/// ```
/// use ndarray::{ArrayD, IxDyn};
/// use podar::prune::MaskCreator;
///
/// let values = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.1, -3.0, 0.2, 4.0]).unwrap();
/// let mask = MaskCreator::Unstructured.create_mask(&values, 0.5);
/// assert_eq!(mask.as_slice().unwrap(), &[0.0, 1.0, 0.0, 1.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "MaskTypeRepr", into = "MaskTypeRepr")]
pub enum MaskCreator {
    /// Every element ranked independently.
    #[default]
    Unstructured,
    /// Whole input channels (dimension 1) pruned together.
    Channel,
    /// Whole filters / output channels (dimension 0) pruned together.
    Filter,
    /// Tiles of `shape[0] x shape[1]` over the tensor viewed as
    /// `[dim0, product(rest)]`.
    Block {
        /// Block height and width.
        shape: [usize; 2],
    },
}

impl MaskCreator {
    /// Create a block creator, rejecting empty blocks.
    pub fn block(rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(PruneError::config(format!(
                "block mask shape [{rows}, {cols}] must have non-zero dimensions"
            )));
        }
        Ok(MaskCreator::Block { shape: [rows, cols] })
    }

    /// Mask zeroing the lowest-magnitude values.
    pub fn create_mask(&self, values: &ArrayD<f32>, sparsity: f64) -> ArrayD<f32> {
        self.create_mask_from_scores(&values.mapv(f32::abs), sparsity)
    }

    /// Mask zeroing the lowest-scoring values; scores are used as given.
    pub fn create_mask_from_scores(&self, scores: &ArrayD<f32>, sparsity: f64) -> ArrayD<f32> {
        self.create_global_masks_from_scores(std::slice::from_ref(scores), sparsity)
            .pop()
            .unwrap_or_else(|| ArrayD::ones(scores.raw_dim()))
    }

    /// Masks ranking the magnitudes of all tensors in one pool.
    pub fn create_global_masks(&self, values: &[ArrayD<f32>], sparsity: f64) -> Vec<ArrayD<f32>> {
        let scores: Vec<ArrayD<f32>> = values.iter().map(|v| v.mapv(f32::abs)).collect();
        self.create_global_masks_from_scores(&scores, sparsity)
    }

    /// Masks ranking the scores of all tensors in one pool.
    ///
    /// A single threshold is found over every group of every tensor, so
    /// each tensor ends up with its own share of the pruned elements.
    pub fn create_global_masks_from_scores(
        &self,
        scores: &[ArrayD<f32>],
        sparsity: f64,
    ) -> Vec<ArrayD<f32>> {
        let layouts: Vec<GroupLayout> =
            scores.iter().map(|s| GroupLayout::new(self, s.shape())).collect();

        let mut candidates = Vec::new();
        for (tensor, (score, layout)) in scores.iter().zip(&layouts).enumerate() {
            for (group, (mean, size)) in layout.reduce(score.iter().copied()).into_iter().enumerate()
            {
                if size > 0 {
                    candidates.push(Candidate { score: mean, tensor, group, size });
                }
            }
        }

        let mut pruned: Vec<Vec<bool>> = layouts.iter().map(|l| vec![false; l.num_groups]).collect();
        for candidate in select_lowest(candidates, sparsity) {
            pruned[candidate.tensor][candidate.group] = true;
        }

        scores
            .iter()
            .zip(&layouts)
            .zip(&pruned)
            .map(|((score, layout), pruned)| {
                let mut mask = ArrayD::<f32>::ones(score.raw_dim());
                for (slot, &group) in mask.iter_mut().zip(&layout.group_of) {
                    if pruned[group] {
                        *slot = 0.0;
                    }
                }
                mask
            })
            .collect()
    }

    /// Mask keeping exactly the non-zero values.
    pub fn mask_from_nonzero(values: &ArrayD<f32>) -> ArrayD<f32> {
        values.mapv(|v| if v == 0.0 { 0.0 } else { 1.0 })
    }

    /// Descriptor string of this creator.
    pub fn descriptor(&self) -> String {
        match self {
            MaskCreator::Unstructured => "unstructured".to_string(),
            MaskCreator::Channel => "channel".to_string(),
            MaskCreator::Filter => "filter".to_string(),
            MaskCreator::Block { shape } => format!("[{}, {}]", shape[0], shape[1]),
        }
    }
}

impl fmt::Display for MaskCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl FromStr for MaskCreator {
    type Err = PruneError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with('[') {
            let inner = trimmed.trim_start_matches('[').trim_end_matches(']');
            let dims = inner
                .split(',')
                .map(|d| d.trim().parse::<usize>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| PruneError::config(format!("invalid block mask shape '{s}': {e}")))?;
            return MaskCreator::try_from(MaskTypeRepr::Shape(dims));
        }
        MaskCreator::try_from(MaskTypeRepr::Name(trimmed.to_string()))
    }
}

/// Resolve a mask-type descriptor to its creator.
///
/// # Errors
///
/// Returns `Config` for an unknown name or a malformed block shape.
pub fn load_mask_creator(descriptor: &str) -> Result<MaskCreator> {
    descriptor.parse()
}

/// Wire form of [`MaskCreator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskTypeRepr {
    /// Named granularity.
    Name(String),
    /// Explicit block shape.
    Shape(Vec<usize>),
}

impl TryFrom<MaskTypeRepr> for MaskCreator {
    type Error = PruneError;

    fn try_from(repr: MaskTypeRepr) -> Result<Self> {
        match repr {
            MaskTypeRepr::Name(name) => match name.as_str() {
                "unstructured" => Ok(MaskCreator::Unstructured),
                "channel" => Ok(MaskCreator::Channel),
                "filter" => Ok(MaskCreator::Filter),
                "block" => MaskCreator::block(1, 4),
                other => Err(PruneError::config(format!(
                    "unknown mask_type '{other}' (expected unstructured, channel, filter, block, or [rows, cols])"
                ))),
            },
            MaskTypeRepr::Shape(dims) => match dims.as_slice() {
                [rows, cols] => MaskCreator::block(*rows, *cols),
                _ => Err(PruneError::config(format!(
                    "block mask shape must have exactly two dimensions, got {dims:?}"
                ))),
            },
        }
    }
}

impl From<MaskCreator> for MaskTypeRepr {
    fn from(creator: MaskCreator) -> Self {
        match creator {
            MaskCreator::Block { shape } => MaskTypeRepr::Shape(shape.to_vec()),
            named => MaskTypeRepr::Name(named.descriptor()),
        }
    }
}
