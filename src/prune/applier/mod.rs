//! Mask ownership and application
//!
//! A [`MaskApplier`] holds one mask per parameter of a modifier. Every
//! mask change is written straight into the engine, so after any
//! `set_param_mask*` call the live tensor satisfies `w[mask == 0] == 0`.
//! With gradient masking on, a backward hook zeroes the same entries of
//! every gradient.


use std::collections::BTreeMap;

use log::debug;
use ndarray::ArrayD;

use crate::engine::{HookHandle, ParamHandle, TensorEngine};
use crate::error::{PruneError, Result};
use crate::prune::mask::{mask_sparsity, MaskCreator};
use crate::prune::scorer::Scorer;

/// Suffix of every mask entry in a state dict.
pub const MASK_KEY_SUFFIX: &str = ".sparsity_mask";

/// State-dict key for a parameter's mask.
pub fn mask_key(param: &str) -> String {
    format!("{param}{MASK_KEY_SUFFIX}")
}

#[derive(Debug)]
struct MaskedParam {
    name: String,
    handle: ParamHandle,
    mask: ArrayD<f32>,
    hook: Option<HookHandle>,
}

/// Masks for a fixed, ordered set of parameters.
#[derive(Debug)]
pub struct MaskApplier {
    params: Vec<MaskedParam>,
    creator: MaskCreator,
    scorer: Scorer,
    enabled: bool,
    mask_gradients: bool,
    applied_sparsity: Option<f64>,
}

impl MaskApplier {
    /// Resolve `names` and start with all-ones masks.
    ///
    /// # Errors
    ///
    /// `ParameterNotFound` if a name does not resolve, `Config` if `names`
    /// is empty.
    pub fn new(
        engine: &dyn TensorEngine,
        names: &[String],
        creator: MaskCreator,
        scorer: Scorer,
        mask_gradients: bool,
    ) -> Result<Self> {
        if names.is_empty() {
            return Err(PruneError::config("mask applier needs at least one parameter"));
        }
        let params = names
            .iter()
            .map(|name| {
                let handle = engine.resolve_parameter(name)?;
                let values = engine.get_values(handle)?;
                Ok(MaskedParam {
                    name: name.clone(),
                    handle,
                    mask: ArrayD::ones(values.raw_dim()),
                    hook: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            params,
            creator,
            scorer,
            enabled: true,
            mask_gradients,
            applied_sparsity: None,
        })
    }

    /// Parameter names in order.
    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Current mask of a parameter.
    pub fn mask(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.mask)
    }

    /// Current masks in parameter order.
    pub fn masks(&self) -> Vec<&ArrayD<f32>> {
        self.params.iter().map(|p| &p.mask).collect()
    }

    /// Fraction of zeros in each mask, in parameter order.
    pub fn mask_sparsities(&self) -> Vec<(String, f64)> {
        self.params.iter().map(|p| (p.name.clone(), mask_sparsity(&p.mask))).collect()
    }

    /// Mask creator in use.
    pub fn creator(&self) -> &MaskCreator {
        &self.creator
    }

    /// Scorer in use.
    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Whether masks are being applied.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether gradients are masked on backward.
    pub fn masks_gradients(&self) -> bool {
        self.mask_gradients
    }

    /// Last target sparsity installed through `set_param_masks_from_*sparsity`.
    pub fn applied_sparsity(&self) -> Option<f64> {
        self.applied_sparsity
    }

    /// Install a mask for one parameter.
    ///
    /// # Errors
    ///
    /// `ParameterNotFound` for an unknown name, `Config` for a shape mismatch.
    pub fn set_param_mask(
        &mut self,
        engine: &mut dyn TensorEngine,
        name: &str,
        mask: ArrayD<f32>,
    ) -> Result<()> {
        let index = self
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| PruneError::parameter_not_found(name))?;
        self.install(engine, index, mask)
    }

    /// Install one mask per parameter, in parameter order.
    pub fn set_param_masks(
        &mut self,
        engine: &mut dyn TensorEngine,
        masks: Vec<ArrayD<f32>>,
    ) -> Result<()> {
        if masks.len() != self.params.len() {
            return Err(PruneError::config(format!(
                "expected {} masks, got {}",
                self.params.len(),
                masks.len()
            )));
        }
        for (index, mask) in masks.into_iter().enumerate() {
            self.install(engine, index, mask)?;
        }
        Ok(())
    }

    /// Mask each parameter independently to `sparsity` by score.
    pub fn set_param_masks_from_sparsity(
        &mut self,
        engine: &mut dyn TensorEngine,
        sparsity: f64,
    ) -> Result<()> {
        let scores = self.scores(engine)?;
        let masks =
            scores.iter().map(|s| self.creator.create_mask_from_scores(s, sparsity)).collect();
        self.set_param_masks(engine, masks)?;
        self.applied_sparsity = Some(sparsity);
        Ok(())
    }

    /// Mask all parameters to `sparsity` with one shared ranking.
    pub fn set_param_masks_from_global_sparsity(
        &mut self,
        engine: &mut dyn TensorEngine,
        sparsity: f64,
    ) -> Result<()> {
        let scores = self.scores(engine)?;
        let masks = self.creator.create_global_masks_from_scores(&scores, sparsity);
        self.set_param_masks(engine, masks)?;
        self.applied_sparsity = Some(sparsity);
        Ok(())
    }

    /// Freeze the current zero pattern of every parameter.
    pub fn set_param_masks_from_weights(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        let masks = self
            .params
            .iter()
            .map(|p| Ok(MaskCreator::mask_from_nonzero(&engine.get_values(p.handle)?)))
            .collect::<Result<Vec<_>>>()?;
        self.set_param_masks(engine, masks)
    }

    /// Back to all-ones masks and no gradient history.
    pub fn reset(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        let masks = self.params.iter().map(|p| ArrayD::ones(p.mask.raw_dim())).collect();
        self.set_param_masks(engine, masks)?;
        self.scorer.reset();
        self.applied_sparsity = None;
        Ok(())
    }

    /// Multiply every live tensor by its mask (no-op while disabled).
    pub fn apply(&self, engine: &mut dyn TensorEngine) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        for param in &self.params {
            apply_mask(engine, param)?;
        }
        Ok(())
    }

    /// Turn masking on or off; stored masks are kept either way.
    pub fn set_enabled(&mut self, engine: &mut dyn TensorEngine, enabled: bool) -> Result<()> {
        if self.enabled == enabled {
            return Ok(());
        }
        self.enabled = enabled;
        for index in 0..self.params.len() {
            self.refresh_hook(engine, index)?;
        }
        self.apply(engine)
    }

    /// Collect weights and gradients for gradient-based scorers.
    pub fn pre_optim_step_update(&mut self, engine: &dyn TensorEngine) -> Result<()> {
        if !self.scorer.needs_gradients() {
            return Ok(());
        }
        let mut weights = Vec::with_capacity(self.params.len());
        let mut grads = Vec::with_capacity(self.params.len());
        for param in &self.params {
            weights.push(engine.get_values(param.handle)?);
            grads.push(engine.get_gradient(param.handle)?);
        }
        self.scorer.observe(&weights, &grads);
        Ok(())
    }

    /// Masks keyed `"<param>.sparsity_mask"`.
    pub fn state_dict(&self) -> BTreeMap<String, ArrayD<f32>> {
        self.params.iter().map(|p| (mask_key(&p.name), p.mask.clone())).collect()
    }

    /// Install masks from a state dict and apply them immediately.
    ///
    /// # Errors
    ///
    /// `ParameterNotFound` when a parameter has no entry, `Config` when an
    /// entry has the wrong shape.
    pub fn load_state_dict(
        &mut self,
        engine: &mut dyn TensorEngine,
        state: &BTreeMap<String, ArrayD<f32>>,
    ) -> Result<()> {
        let masks = self
            .params
            .iter()
            .map(|p| {
                state
                    .get(&mask_key(&p.name))
                    .cloned()
                    .ok_or_else(|| PruneError::parameter_not_found(mask_key(&p.name)))
            })
            .collect::<Result<Vec<_>>>()?;
        self.set_param_masks(engine, masks)
    }

    /// Remove every gradient hook.
    pub fn finalize(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        for param in &mut self.params {
            if let Some(hook) = param.hook.take() {
                engine.remove_gradient_hook(hook)?;
            }
        }
        Ok(())
    }

    fn scores(&self, engine: &dyn TensorEngine) -> Result<Vec<ArrayD<f32>>> {
        let weights = self
            .params
            .iter()
            .map(|p| engine.get_values(p.handle))
            .collect::<Result<Vec<_>>>()?;
        let mut scores = self.scorer.scores(&weights);

        // Pruned entries hold exact zeros but keep their gradient history;
        // floor them so a stale score never outranks a live weight.
        if self.enabled && self.scorer.needs_gradients() {
            for (score, param) in scores.iter_mut().zip(&self.params) {
                if score.shape() == param.mask.shape() {
                    score.zip_mut_with(&param.mask, |s, &m| {
                        if m == 0.0 {
                            *s = f32::NEG_INFINITY;
                        }
                    });
                }
            }
        }
        Ok(scores)
    }

    fn install(
        &mut self,
        engine: &mut dyn TensorEngine,
        index: usize,
        mask: ArrayD<f32>,
    ) -> Result<()> {
        let param = &mut self.params[index];
        if mask.shape() != param.mask.shape() {
            return Err(PruneError::config(format!(
                "mask shape {:?} does not match parameter '{}' shape {:?}",
                mask.shape(),
                param.name,
                param.mask.shape()
            )));
        }
        param.mask = mask;
        debug!("mask for {} now at sparsity {:.4}", param.name, mask_sparsity(&param.mask));

        self.refresh_hook(engine, index)?;
        if self.enabled {
            apply_mask(engine, &self.params[index])?;
        }
        Ok(())
    }

    /// Hooks capture a copy of the mask, so every mask change re-registers.
    fn refresh_hook(&mut self, engine: &mut dyn TensorEngine, index: usize) -> Result<()> {
        let param = &mut self.params[index];
        if let Some(hook) = param.hook.take() {
            engine.remove_gradient_hook(hook)?;
        }
        if self.enabled && self.mask_gradients {
            let mask = param.mask.clone();
            let hook = engine.register_gradient_hook(
                param.handle,
                Box::new(move |grad: &mut ArrayD<f32>| {
                    if grad.shape() == mask.shape() {
                        zero_masked(grad, &mask);
                    }
                }),
            )?;
            param.hook = Some(hook);
        }
        Ok(())
    }
}

fn apply_mask(engine: &mut dyn TensorEngine, param: &MaskedParam) -> Result<()> {
    let mut values = engine.get_values(param.handle)?;
    zero_masked(&mut values, &param.mask);
    engine.set_values(param.handle, values)
}

/// Multiply by `mask`, writing exact `0.0` where it is zero so `-0.0` and
/// `NaN * 0` never survive.
fn zero_masked(values: &mut ArrayD<f32>, mask: &ArrayD<f32>) {
    values.zip_mut_with(mask, |v, &m| *v = if m == 0.0 { 0.0 } else { *v * m });
}
