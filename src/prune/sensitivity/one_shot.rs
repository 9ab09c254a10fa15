//! Measured sensitivity: prune one parameter at a time and run the loss.

use log::{debug, info};

use super::analysis::{default_check_sparsities_loss, KsLossSensitivityAnalysis};
use super::approx::BASELINE_SPARSITY;
use super::op_vars::SparsePruningOpVars;
use crate::engine::{Feed, OpHandle, TensorEngine};
use crate::error::{PruneError, Result};

/// Extra ops to run alongside the loss, per measurement step.
pub type AddOpsFn<'a> = Box<dyn FnMut(usize) -> Vec<OpHandle> + 'a>;

/// Feed for a measurement step.
pub type FeedFn<'a> = Box<dyn FnMut(usize) -> Feed + 'a>;

/// Progress callback receiving `(completed, total)` measurement units.
pub type ProgressFn<'a> = Box<dyn FnMut(usize, usize) + 'a>;

/// How a one-shot sweep runs.
pub struct OneShotOptions<'a> {
    /// Loss evaluations per parameter and level.
    pub steps_per_measurement: usize,
    /// Levels checked for every parameter.
    pub sparsity_levels: Vec<f64>,
    /// Log progress at info level.
    pub show_progress: bool,
    /// Called with the step index; returned ops run after the loss.
    pub add_ops: Option<AddOpsFn<'a>>,
    /// Called with the step index; the returned feed is used for the run.
    pub feed: Option<FeedFn<'a>>,
    /// Called after every measurement step.
    pub progress: Option<ProgressFn<'a>>,
}

impl<'a> OneShotOptions<'a> {
    /// Default levels, no callbacks, progress logging on.
    pub fn new(steps_per_measurement: usize) -> Self {
        Self {
            steps_per_measurement,
            sparsity_levels: default_check_sparsities_loss(false),
            show_progress: true,
            add_ops: None,
            feed: None,
            progress: None,
        }
    }

    /// Replace the sparsity levels.
    pub fn with_levels(mut self, levels: impl Into<Vec<f64>>) -> Self {
        self.sparsity_levels = levels.into();
        self
    }

    /// Toggle progress logging.
    pub fn with_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run extra ops with every measurement.
    pub fn with_add_ops(mut self, add_ops: impl FnMut(usize) -> Vec<OpHandle> + 'a) -> Self {
        self.add_ops = Some(Box::new(add_ops));
        self
    }

    /// Build the feed for every measurement.
    pub fn with_feed(mut self, feed: impl FnMut(usize) -> Feed + 'a) -> Self {
        self.feed = Some(Box::new(feed));
        self
    }

    /// Observe progress.
    pub fn with_progress(mut self, progress: impl FnMut(usize, usize) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.steps_per_measurement == 0 {
            return Err(PruneError::config("steps_per_measurement must be at least 1"));
        }
        if self.sparsity_levels.is_empty() {
            return Err(PruneError::config("at least one sparsity level is required"));
        }
        if let Some(level) = self.sparsity_levels.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(PruneError::config(format!(
                "sparsity level ({level}) must be between 0.0 and 1.0"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for OneShotOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotOptions")
            .field("steps_per_measurement", &self.steps_per_measurement)
            .field("sparsity_levels", &self.sparsity_levels)
            .field("show_progress", &self.show_progress)
            .field("add_ops", &self.add_ops.is_some())
            .field("feed", &self.feed.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Measure the loss of each parameter pruned alone at every level.
///
/// Parameters are handled one after another. For each level the parameter
/// is masked from its original values, `loss` is run
/// `steps_per_measurement` times, and one record is appended per run.
/// Once all levels are done the parameter is reset before the next one is
/// touched, so measurements never compound across parameters.
///
/// # Errors
///
/// `Config` for invalid options; engine failures propagate unchanged. Use
/// [`one_shot_ks_loss_sensitivity_into`] to keep partial results.
pub fn one_shot_ks_loss_sensitivity(
    engine: &mut dyn TensorEngine,
    op_vars: &mut [SparsePruningOpVars],
    loss: OpHandle,
    options: OneShotOptions<'_>,
) -> Result<KsLossSensitivityAnalysis> {
    let mut analysis = KsLossSensitivityAnalysis::new();
    one_shot_ks_loss_sensitivity_into(engine, op_vars, loss, options, &mut analysis)?;
    Ok(analysis)
}

/// Like [`one_shot_ks_loss_sensitivity`], appending to `analysis`.
///
/// On error, every record taken before the failure stays in `analysis` and
/// the mask of the parameter being measured is left in place.
pub fn one_shot_ks_loss_sensitivity_into(
    engine: &mut dyn TensorEngine,
    op_vars: &mut [SparsePruningOpVars],
    loss: OpHandle,
    mut options: OneShotOptions<'_>,
    analysis: &mut KsLossSensitivityAnalysis,
) -> Result<()> {
    options.validate()?;
    let steps = options.steps_per_measurement;
    let levels = options.sparsity_levels.clone();
    let total = op_vars.len() * levels.len() * steps;
    let mut completed = 0usize;
    if options.show_progress {
        info!("KS analysis: {} parameters x {} levels x {steps} steps", op_vars.len(), levels.len());
    }

    for vars in op_vars.iter_mut() {
        for &sparsity in &levels {
            vars.update(engine, sparsity)?;

            for step in 0..steps {
                let mut ops = vec![loss];
                if let Some(add_ops) = options.add_ops.as_mut() {
                    ops.extend(add_ops(step));
                }
                let feed = options.feed.as_mut().map(|feed| feed(step)).unwrap_or_default();

                let outputs = engine.run(&ops, &feed)?;
                let value = outputs
                    .first()
                    .and_then(|out| out.mean())
                    .ok_or_else(|| PruneError::engine("loss op produced no value"))?;
                analysis.add_result(
                    None,
                    vars.name(),
                    vars.index(),
                    sparsity,
                    f64::from(value),
                    sparsity < BASELINE_SPARSITY,
                );

                completed += 1;
                if let Some(progress) = options.progress.as_mut() {
                    progress(completed, total);
                }
                debug!("KS analysis {completed}/{total}: {} @ {sparsity:.4} -> {value}", vars.name());
            }
        }
        vars.reset(engine)?;
        if options.show_progress {
            info!("KS analysis {completed}/{total}: finished {}", vars.name());
        }
    }

    Ok(())
}
