//! The scheduled pruning modifier.

use std::collections::BTreeMap;

use log::{debug, info};
use ndarray::ArrayD;

use crate::engine::TensorEngine;
use crate::error::{PruneError, Result};
use crate::prune::applier::MaskApplier;
use crate::prune::modifier::config::{GradualPruningArgs, ModifierConfig};
use crate::prune::schedule::{EpochWindow, ScheduleState, Scheduler, UpdateKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
    Finalized,
}

/// A pruning modifier bound (or ready to be bound) to an engine.
///
/// Lifecycle: [`PruningModifier::new`] validates the config,
/// [`PruningModifier::initialize`] resolves parameter names once,
/// [`PruningModifier::scheduled_update`] is called by the training loop
/// whenever [`PruningModifier::update_ready`] says so, and
/// [`PruningModifier::finalize`] releases hooks and layers.
///
/// # Example
///
/// ```
/// use ndarray::{ArrayD, IxDyn};
/// use podar::engine::InMemoryEngine;
/// use podar::prune::{PruningModifier, ScheduleState};
///
/// let yaml = r#"
/// !GMPruningModifier
/// init_sparsity: 0.0
/// final_sparsity: 0.5
/// start_epoch: 0.0
/// end_epoch: 2.0
/// params: __ALL_PRUNABLE__
/// inter_func: linear
/// "#;
/// let mut modifier = PruningModifier::from_yaml(yaml).unwrap();
///
/// let mut engine = InMemoryEngine::new();
/// let values = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.1, 0.2, 0.3, 0.4]).unwrap();
/// engine.add_parameter("fc.weight", values, true);
///
/// modifier.initialize(&mut engine).unwrap();
/// for epoch in [0.0, 1.0, 2.0] {
///     if modifier.update_ready(epoch, 0) {
///         modifier.scheduled_update(&mut engine, epoch, 0).unwrap();
///     }
/// }
/// assert_eq!(modifier.applied_sparsity(), Some(0.5));
/// assert_eq!(modifier.state(), ScheduleState::Completed);
/// ```
#[derive(Debug)]
pub struct PruningModifier {
    config: ModifierConfig,
    scheduler: Scheduler,
    lifecycle: Lifecycle,
    applier: Option<MaskApplier>,
    layers: Vec<String>,
    applied_sparsity: Option<f64>,
}

impl PruningModifier {
    /// Validate `config` and build an unbound modifier.
    ///
    /// # Errors
    ///
    /// Returns `Config` for contradictory schedules or invalid fields.
    pub fn new(config: ModifierConfig) -> Result<Self> {
        config.validate()?;
        let window = config.window();
        Ok(Self {
            config,
            scheduler: Scheduler::new(window),
            lifecycle: Lifecycle::Uninitialized,
            applier: None,
            layers: Vec::new(),
            applied_sparsity: None,
        })
    }

    /// Parse one tagged modifier from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ModifierConfig = serde_yaml::from_str(yaml)
            .map_err(|e| PruneError::config(format!("failed to parse modifier: {e}")))?;
        Self::new(config)
    }

    /// Serialize the modifier's config as tagged YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.config).map_err(|e| PruneError::Serialization {
            path: None,
            message: e.to_string(),
        })
    }

    /// The config this modifier was built from.
    pub fn config(&self) -> &ModifierConfig {
        &self.config
    }

    /// The schedule window.
    pub fn window(&self) -> &EpochWindow {
        self.scheduler.window()
    }

    /// Recipe tag of the variant.
    pub fn name(&self) -> &'static str {
        self.config.name()
    }

    /// Last sparsity applied; `None` before the first update and for
    /// variants that do not target a sparsity.
    pub fn applied_sparsity(&self) -> Option<f64> {
        self.applied_sparsity
    }

    /// Mask applier, once initialized (masking variants only).
    pub fn applier(&self) -> Option<&MaskApplier> {
        self.applier.as_ref()
    }

    /// Resolved parameter names (masking variants) or layer names.
    pub fn targets(&self) -> Vec<String> {
        match &self.applier {
            Some(applier) => applier.names().into_iter().map(str::to_string).collect(),
            None => self.layers.clone(),
        }
    }

    /// Where the modifier is in its lifecycle.
    pub fn state(&self) -> ScheduleState {
        match self.lifecycle {
            Lifecycle::Uninitialized => ScheduleState::Uninitialized,
            Lifecycle::Finalized => ScheduleState::Finalized,
            Lifecycle::Initialized => self.scheduler.state(),
        }
    }

    /// Bind to an engine: resolve names and create mask state.
    ///
    /// # Errors
    ///
    /// `IllegalState` when called twice, `ParameterNotFound` / `Config`
    /// when the selector does not resolve.
    pub fn initialize(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        if self.lifecycle != Lifecycle::Uninitialized {
            return Err(PruneError::illegal_state(format!(
                "{} is already {}",
                self.name(),
                self.state()
            )));
        }

        match &self.config {
            ModifierConfig::LayerPruning(args) => {
                self.layers = args.layers.resolve_layers(&*engine)?;
            }
            config => {
                let selector = config.params().ok_or_else(|| {
                    PruneError::config(format!("{} has no params", config.name()))
                })?;
                let names = selector.resolve_parameters(&*engine)?;
                let applier = MaskApplier::new(
                    &*engine,
                    &names,
                    config.mask_creator(),
                    config.scorer(),
                    true,
                )?;
                self.applier = Some(applier);
            }
        }

        info!("{} initialized over {} targets", self.name(), self.targets().len());
        self.lifecycle = Lifecycle::Initialized;
        Ok(())
    }

    /// Whether `scheduled_update` would act at `epoch`.
    ///
    /// Always false before `initialize` and after `finalize`.
    pub fn update_ready(&self, epoch: f64, steps_per_epoch: usize) -> bool {
        self.lifecycle == Lifecycle::Initialized
            && self.scheduler.pending(epoch, steps_per_epoch).is_some()
    }

    /// Apply the update due at `epoch`, if any; returns whether one was applied.
    ///
    /// # Errors
    ///
    /// `IllegalState` before `initialize` or after `finalize`; engine
    /// errors pass through.
    pub fn scheduled_update(
        &mut self,
        engine: &mut dyn TensorEngine,
        epoch: f64,
        steps_per_epoch: usize,
    ) -> Result<bool> {
        self.check_initialized("scheduled_update")?;
        let Some(kind) = self.scheduler.pending(epoch, steps_per_epoch) else {
            return Ok(false);
        };

        match self.config.clone() {
            ModifierConfig::ConstantPruning(_) => self.update_constant(engine, kind)?,
            ModifierConfig::LayerPruning(_) => self.update_layers(engine, kind)?,
            config => {
                let is_global = config.is_global();
                if let Some(args) = config.gradual() {
                    self.update_gradual(engine, args, is_global, kind, epoch, steps_per_epoch)?;
                }
            }
        }

        self.scheduler.record(kind, epoch, steps_per_epoch);
        if kind == UpdateKind::End {
            info!("{} finished at epoch {epoch}", self.name());
        }
        Ok(true)
    }

    /// Collect gradient statistics before the optimizer step.
    pub fn optimizer_pre_step(&mut self, engine: &dyn TensorEngine) -> Result<()> {
        self.check_initialized("optimizer_pre_step")?;
        if self.scheduler.ended() {
            return Ok(());
        }
        if let Some(applier) = self.applier.as_mut() {
            applier.pre_optim_step_update(engine)?;
        }
        Ok(())
    }

    /// Re-apply masks after the optimizer moved the weights.
    pub fn optimizer_post_step(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        self.check_initialized("optimizer_post_step")?;
        if let Some(applier) = &self.applier {
            applier.apply(engine)?;
        }
        Ok(())
    }

    /// Masks keyed `"<param>.sparsity_mask"`; empty for layer pruning.
    pub fn state_dict(&self) -> BTreeMap<String, ArrayD<f32>> {
        self.applier.as_ref().map(MaskApplier::state_dict).unwrap_or_default()
    }

    /// Restore masks saved by [`PruningModifier::state_dict`] and apply them now.
    pub fn load_state_dict(
        &mut self,
        engine: &mut dyn TensorEngine,
        state: &BTreeMap<String, ArrayD<f32>>,
    ) -> Result<()> {
        self.check_initialized("load_state_dict")?;
        match self.applier.as_mut() {
            Some(applier) => applier.load_state_dict(engine, state),
            None => Ok(()),
        }
    }

    /// Remove hooks, restore ablated layers, and refuse further calls.
    pub fn finalize(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        self.check_initialized("finalize")?;
        if let Some(applier) = self.applier.as_mut() {
            applier.finalize(engine)?;
        }
        for layer in &self.layers {
            if engine.is_layer_ablated(layer)? {
                engine.restore_layer(layer)?;
            }
        }
        self.lifecycle = Lifecycle::Finalized;
        debug!("{} finalized", self.name());
        Ok(())
    }

    fn check_initialized(&self, call: &str) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Initialized => Ok(()),
            Lifecycle::Uninitialized => Err(PruneError::illegal_state(format!(
                "{call} called on {} before initialize",
                self.name()
            ))),
            Lifecycle::Finalized => Err(PruneError::illegal_state(format!(
                "{call} called on {} after finalize",
                self.name()
            ))),
        }
    }

    fn applier_mut(&mut self) -> Result<&mut MaskApplier> {
        let name = self.config.name();
        self.applier
            .as_mut()
            .ok_or_else(|| PruneError::illegal_state(format!("{name} has no mask state")))
    }

    fn update_gradual(
        &mut self,
        engine: &mut dyn TensorEngine,
        args: &GradualPruningArgs,
        is_global: bool,
        kind: UpdateKind,
        epoch: f64,
        steps_per_epoch: usize,
    ) -> Result<()> {
        let sparsity = args.sparsity_for(kind, epoch);

        let applier = self.applier_mut()?;
        if is_global {
            applier.set_param_masks_from_global_sparsity(engine, sparsity)?;
        } else {
            applier.set_param_masks_from_sparsity(engine, sparsity)?;
        }
        for (name, achieved) in applier.mask_sparsities() {
            debug!("  {name}: {achieved:.4}");
        }
        if kind == UpdateKind::End && !args.leave_enabled {
            applier.set_enabled(engine, false)?;
        }

        info!(
            "{} applied sparsity {sparsity:.4} at epoch {epoch} (interval {})",
            self.config.name(),
            self.scheduler.window().interval_index(epoch, steps_per_epoch)
        );
        self.applied_sparsity = Some(sparsity);
        Ok(())
    }

    fn update_constant(&mut self, engine: &mut dyn TensorEngine, kind: UpdateKind) -> Result<()> {
        let started = self.scheduler.started();
        let applier = self.applier_mut()?;
        if !started {
            applier.set_param_masks_from_weights(engine)?;
        }
        if kind == UpdateKind::End {
            applier.set_enabled(engine, false)?;
        }
        info!("{} holding zero pattern ({kind:?})", self.config.name());
        Ok(())
    }

    fn update_layers(&mut self, engine: &mut dyn TensorEngine, kind: UpdateKind) -> Result<()> {
        for layer in &self.layers {
            let ablated = engine.is_layer_ablated(layer)?;
            match kind {
                UpdateKind::End if ablated => engine.restore_layer(layer)?,
                UpdateKind::Start | UpdateKind::Periodic { .. } if !ablated => {
                    engine.ablate_layer(layer)?
                }
                _ => {}
            }
        }
        debug!("{} layers {:?} after {kind:?}", self.config.name(), self.layers);
        Ok(())
    }
}
