//! Magnitude-only sensitivity estimate.

use log::{debug, warn};

use super::analysis::KsLossSensitivityAnalysis;
use crate::engine::TensorEngine;
use crate::error::Result;
use crate::prune::params::ParamSelector;

/// Levels at or below this are treated as the dense baseline.
pub const BASELINE_SPARSITY: f64 = 1e-9;

/// Estimate sensitivity from weight magnitudes alone.
///
/// For each parameter the absolute values are sorted once. Each level then
/// records the mean magnitude of the slice newly pruned since the previous
/// level, i.e. the sorted values in `[prev, round(s * n))`. When that slice
/// is empty the value at the current index stands in. Levels at or below
/// [`BASELINE_SPARSITY`] record `0.0` as the baseline. Nothing is written to
/// the engine.
///
/// Levels are expected in ascending order.
pub fn approx_ks_loss_sensitivity(
    engine: &dyn TensorEngine,
    selector: &ParamSelector,
    sparsity_levels: &[f64],
) -> Result<KsLossSensitivityAnalysis> {
    let names = selector.resolve_parameters(engine)?;
    let mut analysis = KsLossSensitivityAnalysis::new();

    for (index, name) in names.iter().enumerate() {
        let values = engine.get_values(engine.resolve_parameter(name)?)?;
        let mut sorted: Vec<f32> = values.iter().map(|v| v.abs()).collect();
        if sorted.is_empty() {
            warn!("skipping empty parameter {name}");
            continue;
        }
        sorted.sort_by(f32::total_cmp);
        let last = sorted.len() - 1;
        let mut prev = 0usize;

        for &sparsity in sparsity_levels {
            let current = ((sparsity * sorted.len() as f64).round() as usize).min(last);
            if sparsity <= BASELINE_SPARSITY {
                analysis.add_result(None, name.as_str(), index, 0.0, 0.0, true);
            } else {
                let value = if current > prev {
                    let slice = &sorted[prev..current];
                    slice.iter().map(|&v| f64::from(v)).sum::<f64>() / slice.len() as f64
                } else {
                    f64::from(sorted[current])
                };
                analysis.add_result(None, name.as_str(), index, sparsity, value, false);
            }
            prev = current + 1;
        }
        debug!("approximated sensitivity of {name} over {} levels", sparsity_levels.len());
    }

    Ok(analysis)
}
