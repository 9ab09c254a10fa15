//! Sparsity interpolation curves.
//!
//! # References
//! - Zhu, M., & Gupta, S. (2017). To prune, or not to prune: exploring the
//!   efficacy of pruning for model compression. arXiv:1710.01878.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PruneError;

/// Shape of the sparsity ramp between `init_sparsity` and `final_sparsity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationFunction {
    /// `p`
    Linear,
    /// `1 - (1 - p)^3`: fast early pruning that slows near the target.
    #[default]
    Cubic,
    /// `1 - (1 - p)^(1/3)`: the functional inverse of cubic; slow start, steep finish.
    InverseCubic,
}

impl InterpolationFunction {
    /// Map schedule progress in `[0, 1]` to sparsity progress in `[0, 1]`.
    pub fn apply(self, progress: f64) -> f64 {
        let p = progress.clamp(0.0, 1.0);
        match self {
            InterpolationFunction::Linear => p,
            InterpolationFunction::Cubic => 1.0 - (1.0 - p).powi(3),
            InterpolationFunction::InverseCubic => 1.0 - (1.0 - p).cbrt(),
        }
    }

    /// Config name of the curve.
    pub fn name(self) -> &'static str {
        match self {
            InterpolationFunction::Linear => "linear",
            InterpolationFunction::Cubic => "cubic",
            InterpolationFunction::InverseCubic => "inverse_cubic",
        }
    }
}

impl fmt::Display for InterpolationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InterpolationFunction {
    type Err = PruneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(InterpolationFunction::Linear),
            "cubic" => Ok(InterpolationFunction::Cubic),
            "inverse_cubic" => Ok(InterpolationFunction::InverseCubic),
            other => Err(PruneError::config(format!(
                "unknown inter_func '{other}' (expected linear, cubic or inverse_cubic)"
            ))),
        }
    }
}

/// Interpolate between `init` and `final_value` at `epoch`.
///
/// Progress is `(epoch - start) / (end - start)` clamped to `[0, 1]`. A
/// window with `end <= start` counts as complete.
pub fn interpolate(
    epoch: f64,
    start: f64,
    end: f64,
    init: f64,
    final_value: f64,
    func: InterpolationFunction,
) -> f64 {
    let progress = if end > start { (epoch - start) / (end - start) } else { 1.0 };
    init + (final_value - init) * func.apply(progress)
}
