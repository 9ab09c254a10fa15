//! Serializable modifier definitions.
//!
//! Each variant maps to a YAML tag, e.g.
//!
//! ```yaml
//! !GMPruningModifier
//! init_sparsity: 0.05
//! final_sparsity: 0.8
//! start_epoch: 5.0
//! end_epoch: 15.0
//! update_frequency: 1.0
//! params: ["re:.*weight"]
//! inter_func: cubic
//! mask_type: filter
//! global_sparsity: false
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PruneError, Result};
use crate::prune::mask::MaskCreator;
use crate::prune::params::ParamSelector;
use crate::prune::schedule::{interpolate, EpochWindow, InterpolationFunction, UpdateKind};
use crate::prune::scorer::{MfacOptions, Scorer};

fn default_update_frequency() -> f64 {
    1.0
}

fn default_disabled_epoch() -> f64 {
    -1.0
}

fn default_true() -> bool {
    true
}

/// Fields shared by every gradual (interpolated) pruning modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradualPruningArgs {
    /// Sparsity applied at `start_epoch`.
    pub init_sparsity: f64,
    /// Sparsity applied at `end_epoch`.
    pub final_sparsity: f64,
    /// Epoch of the first update.
    pub start_epoch: f64,
    /// Epoch of the last update.
    pub end_epoch: f64,
    /// Epochs between updates.
    #[serde(default = "default_update_frequency")]
    pub update_frequency: f64,
    /// Parameters to prune.
    pub params: ParamSelector,
    /// Ramp between the two sparsities.
    #[serde(default)]
    pub inter_func: InterpolationFunction,
    /// Mask granularity.
    #[serde(default)]
    pub mask_type: MaskCreator,
    /// Alternate pruned and dense intervals.
    #[serde(default)]
    pub phased: bool,
    /// Keep masks applied after `end_epoch`.
    #[serde(default = "default_true")]
    pub leave_enabled: bool,
}

impl GradualPruningArgs {
    /// Gradual args with the usual defaults.
    pub fn new(
        init_sparsity: f64,
        final_sparsity: f64,
        start_epoch: f64,
        end_epoch: f64,
        params: ParamSelector,
    ) -> Self {
        Self {
            init_sparsity,
            final_sparsity,
            start_epoch,
            end_epoch,
            update_frequency: default_update_frequency(),
            params,
            inter_func: InterpolationFunction::default(),
            mask_type: MaskCreator::default(),
            phased: false,
            leave_enabled: true,
        }
    }

    /// The schedule window.
    pub fn window(&self) -> EpochWindow {
        EpochWindow {
            start_epoch: self.start_epoch,
            end_epoch: self.end_epoch,
            update_frequency: self.update_frequency,
        }
    }

    /// Sparsity an update of `kind` at `epoch` applies.
    ///
    /// `End` applies `final_sparsity` exactly; odd intervals of a phased
    /// schedule are dense. Everything else follows the ramp, so a start at
    /// `start_epoch` gives `init_sparsity` and a late start (e.g. after
    /// resuming) picks up where the ramp would be.
    pub fn sparsity_for(&self, kind: UpdateKind, epoch: f64) -> f64 {
        match kind {
            UpdateKind::End => self.final_sparsity,
            UpdateKind::Periodic { interval } if self.phased && interval % 2 == 1 => 0.0,
            UpdateKind::Start | UpdateKind::Periodic { .. } => interpolate(
                epoch,
                self.start_epoch,
                self.end_epoch,
                self.init_sparsity,
                self.final_sparsity,
                self.inter_func,
            ),
        }
    }

    /// Check sparsities, window, and phasing.
    pub fn validate(&self) -> Result<()> {
        let sparsities = [("init_sparsity", self.init_sparsity), ("final_sparsity", self.final_sparsity)];
        for (field, value) in sparsities {
            if !(0.0..=1.0).contains(&value) {
                return Err(PruneError::config(format!(
                    "{field} ({value}) must be between 0.0 and 1.0"
                )));
            }
        }
        self.window().validate()?;
        if self.end_epoch < 0.0 || self.end_epoch <= self.start_epoch {
            return Err(PruneError::config(format!(
                "end_epoch ({}) must be greater than start_epoch ({}) for gradual pruning",
                self.end_epoch, self.start_epoch
            )));
        }
        if self.phased && self.update_frequency <= 0.0 {
            return Err(PruneError::config(format!(
                "phased pruning needs a positive update_frequency, got {}",
                self.update_frequency
            )));
        }
        Ok(())
    }
}

/// Gradual magnitude pruning with an optional global ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmPruningArgs {
    /// Schedule and selection.
    #[serde(flatten)]
    pub base: GradualPruningArgs,
    /// Rank all matched parameters together.
    #[serde(default)]
    pub global_sparsity: bool,
}

/// Second-order (M-FAC) pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfacPruningArgs {
    /// Schedule and selection.
    #[serde(flatten)]
    pub base: GradualPruningArgs,
    /// Rank all matched parameters together.
    #[serde(default = "default_true")]
    pub global_sparsity: bool,
    /// Gradient window and Fisher options.
    #[serde(default)]
    pub mfac_options: MfacOptions,
}

/// Hold the existing zero pattern of parameters fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantPruningArgs {
    /// Epoch masks are captured at (`-1`: immediately).
    #[serde(default = "default_disabled_epoch")]
    pub start_epoch: f64,
    /// Epoch masks are released at (`-1`: never).
    #[serde(default = "default_disabled_epoch")]
    pub end_epoch: f64,
    /// Parameters to hold.
    pub params: ParamSelector,
}

/// Swap whole layers for identities during a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPruningArgs {
    /// Layers to remove.
    pub layers: ParamSelector,
    /// Epoch the layers are removed at.
    #[serde(default = "default_disabled_epoch")]
    pub start_epoch: f64,
    /// Epoch the layers are restored at (`-1`: never).
    #[serde(default = "default_disabled_epoch")]
    pub end_epoch: f64,
    /// Kept for recipe compatibility; layers are re-removed on every step
    /// inside the window.
    #[serde(default = "default_disabled_epoch")]
    pub update_frequency: f64,
}

/// A pruning modifier as written in a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModifierConfig {
    #[serde(rename = "ConstantPruningModifier")]
    ConstantPruning(ConstantPruningArgs),
    #[serde(rename = "GMPruningModifier")]
    GmPruning(GmPruningArgs),
    #[serde(rename = "MagnitudePruningModifier")]
    MagnitudePruning(GradualPruningArgs),
    #[serde(rename = "GlobalMagnitudePruningModifier")]
    GlobalMagnitudePruning(GradualPruningArgs),
    #[serde(rename = "MovementPruningModifier")]
    MovementPruning(GradualPruningArgs),
    #[serde(rename = "MFACPruningModifier")]
    MfacPruning(MfacPruningArgs),
    #[serde(rename = "LayerPruningModifier")]
    LayerPruning(LayerPruningArgs),
}

impl ModifierConfig {
    /// Recipe tag of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            ModifierConfig::ConstantPruning(_) => "ConstantPruningModifier",
            ModifierConfig::GmPruning(_) => "GMPruningModifier",
            ModifierConfig::MagnitudePruning(_) => "MagnitudePruningModifier",
            ModifierConfig::GlobalMagnitudePruning(_) => "GlobalMagnitudePruningModifier",
            ModifierConfig::MovementPruning(_) => "MovementPruningModifier",
            ModifierConfig::MfacPruning(_) => "MFACPruningModifier",
            ModifierConfig::LayerPruning(_) => "LayerPruningModifier",
        }
    }

    /// Gradual fields, for the interpolating variants.
    pub fn gradual(&self) -> Option<&GradualPruningArgs> {
        match self {
            ModifierConfig::GmPruning(args) => Some(&args.base),
            ModifierConfig::MfacPruning(args) => Some(&args.base),
            ModifierConfig::MagnitudePruning(args)
            | ModifierConfig::GlobalMagnitudePruning(args)
            | ModifierConfig::MovementPruning(args) => Some(args),
            ModifierConfig::ConstantPruning(_) | ModifierConfig::LayerPruning(_) => None,
        }
    }

    /// Parameter selector, for the masking variants.
    pub fn params(&self) -> Option<&ParamSelector> {
        match self {
            ModifierConfig::ConstantPruning(args) => Some(&args.params),
            ModifierConfig::LayerPruning(_) => None,
            _ => self.gradual().map(|g| &g.params),
        }
    }

    /// When the modifier acts.
    pub fn window(&self) -> EpochWindow {
        match self {
            ModifierConfig::ConstantPruning(args) => EpochWindow {
                start_epoch: args.start_epoch,
                end_epoch: args.end_epoch,
                update_frequency: -1.0,
            },
            // layers are re-removed on every step inside the window,
            // whatever `update_frequency` says
            ModifierConfig::LayerPruning(args) => EpochWindow {
                start_epoch: args.start_epoch,
                end_epoch: args.end_epoch,
                update_frequency: 0.0,
            },
            _ => self.gradual().map(GradualPruningArgs::window).unwrap_or(EpochWindow {
                start_epoch: -1.0,
                end_epoch: -1.0,
                update_frequency: -1.0,
            }),
        }
    }

    /// Whether one ranking spans all parameters.
    pub fn is_global(&self) -> bool {
        match self {
            ModifierConfig::GmPruning(args) => args.global_sparsity,
            ModifierConfig::GlobalMagnitudePruning(_) => true,
            ModifierConfig::MfacPruning(args) => args.global_sparsity,
            _ => false,
        }
    }

    /// Mask granularity.
    pub fn mask_creator(&self) -> MaskCreator {
        self.gradual().map(|g| g.mask_type.clone()).unwrap_or_default()
    }

    /// Fresh importance scorer for the variant.
    pub fn scorer(&self) -> Scorer {
        match self {
            ModifierConfig::MovementPruning(_) => Scorer::movement(),
            ModifierConfig::MfacPruning(args) => Scorer::mfac(args.mfac_options.clone()),
            _ => Scorer::Magnitude,
        }
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let checked = match self {
            ModifierConfig::ConstantPruning(_) => self.window().validate(),
            ModifierConfig::LayerPruning(args) => EpochWindow {
                start_epoch: args.start_epoch,
                end_epoch: args.end_epoch,
                update_frequency: args.update_frequency,
            }
            .validate(),
            ModifierConfig::MfacPruning(args) => {
                args.base.validate()?;
                args.mfac_options.validate().map_err(PruneError::Config)
            }
            _ => self.gradual().map_or(Ok(()), GradualPruningArgs::validate),
        };
        checked.map_err(|e| match e {
            PruneError::Config(message) => {
                PruneError::Config(format!("{}: {message}", self.name()))
            }
            other => other,
        })
    }
}
