//! Per-parameter handles for a one-shot sweep.

use log::debug;
use ndarray::ArrayD;

use crate::engine::{ParamHandle, TensorEngine};
use crate::error::{PruneError, Result};
use crate::prune::applier::MaskApplier;
use crate::prune::mask::MaskCreator;
use crate::prune::params::ParamSelector;
use crate::prune::scorer::Scorer;

/// A prunable parameter prepared for sensitivity measurement.
///
/// Holds the values the parameter had when the handles were built. Every
/// [`SparsePruningOpVars::update`] masks those original values, so levels
/// never compound, and [`SparsePruningOpVars::reset`] writes them back.
#[derive(Debug)]
pub struct SparsePruningOpVars {
    name: String,
    index: usize,
    handle: ParamHandle,
    original: ArrayD<f32>,
    applier: MaskApplier,
    sparsity: f64,
}

impl SparsePruningOpVars {
    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the parameter in the sweep.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Sparsity currently installed.
    pub fn sparsity(&self) -> f64 {
        self.sparsity
    }

    /// Mask currently installed.
    pub fn mask(&self) -> Option<&ArrayD<f32>> {
        self.applier.mask(&self.name)
    }

    /// Values captured when the handles were built.
    pub fn original(&self) -> &ArrayD<f32> {
        &self.original
    }

    /// Restore the original values and mask them to `sparsity`.
    ///
    /// # Errors
    ///
    /// `Config` when `sparsity` is outside `[0, 1]`, or whatever the engine
    /// reports while writing values.
    pub fn update(&mut self, engine: &mut dyn TensorEngine, sparsity: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&sparsity) {
            return Err(PruneError::config(format!(
                "sensitivity sparsity ({sparsity}) must be between 0.0 and 1.0"
            )));
        }
        engine.set_values(self.handle, self.original.clone())?;
        if sparsity > 0.0 {
            self.applier.set_param_masks_from_sparsity(engine, sparsity)?;
        } else {
            self.applier.reset(engine)?;
        }
        self.sparsity = sparsity;
        debug!("{} masked to sparsity {sparsity:.4}", self.name);
        Ok(())
    }

    /// Write the original values back and drop the mask.
    pub fn reset(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        engine.set_values(self.handle, self.original.clone())?;
        self.applier.reset(engine)?;
        self.sparsity = 0.0;
        Ok(())
    }
}

/// Prepare every parameter matched by `selector` for a one-shot sweep.
///
/// # Errors
///
/// `ParameterNotFound` or `Config` from resolving `selector`.
pub fn ks_loss_sensitivity_op_vars(
    engine: &dyn TensorEngine,
    selector: &ParamSelector,
    creator: MaskCreator,
) -> Result<Vec<SparsePruningOpVars>> {
    let names = selector.resolve_parameters(engine)?;
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let handle = engine.resolve_parameter(&name)?;
            let original = engine.get_values(handle)?;
            let applier = MaskApplier::new(
                engine,
                std::slice::from_ref(&name),
                creator.clone(),
                Scorer::Magnitude,
                false,
            )?;
            Ok(SparsePruningOpVars { name, index, handle, original, applier, sparsity: 0.0 })
        })
        .collect()
}
