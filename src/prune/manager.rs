//! Recipe-level orchestration of several modifiers.
//!
//! A recipe is a YAML document with a `modifiers:` list:
//!
//! ```yaml
//! modifiers:
//!   - !GMPruningModifier
//!     init_sparsity: 0.05
//!     final_sparsity: 0.8
//!     start_epoch: 0.0
//!     end_epoch: 10.0
//!     params: __ALL_PRUNABLE__
//!   - !LayerPruningModifier
//!     layers: ["seq.fc2"]
//!     start_epoch: 10.0
//!     end_epoch: 12.0
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::engine::TensorEngine;
use crate::error::{PruneError, Result};
use crate::prune::modifier::{ModifierConfig, PruningModifier};

#[derive(Debug, Serialize, Deserialize)]
struct Recipe {
    modifiers: Vec<ModifierConfig>,
}

/// Runs every modifier of a recipe against one engine.
#[derive(Debug)]
pub struct ScheduledModifierManager {
    modifiers: Vec<PruningModifier>,
}

impl ScheduledModifierManager {
    /// Validate and wrap `configs`.
    pub fn new(configs: Vec<ModifierConfig>) -> Result<Self> {
        let modifiers = configs.into_iter().map(PruningModifier::new).collect::<Result<Vec<_>>>()?;
        Ok(Self { modifiers })
    }

    /// Parse a recipe document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let recipe: Recipe = serde_yaml::from_str(yaml)
            .map_err(|e| PruneError::config(format!("failed to parse recipe: {e}")))?;
        Self::new(recipe.modifiers)
    }

    /// Load a recipe file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| PruneError::Io {
            context: format!("reading recipe {}", path.display()),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Serialize back to a recipe document.
    pub fn to_yaml(&self) -> Result<String> {
        let recipe = Recipe {
            modifiers: self.modifiers.iter().map(|m| m.config().clone()).collect(),
        };
        serde_yaml::to_string(&recipe)
            .map_err(|e| PruneError::Serialization { path: None, message: e.to_string() })
    }

    /// Modifiers in recipe order.
    pub fn modifiers(&self) -> &[PruningModifier] {
        &self.modifiers
    }

    /// Number of modifiers.
    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    /// Whether the recipe is empty.
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Last epoch any modifier acts at, or the latest start for open windows.
    pub fn max_epoch(&self) -> f64 {
        self.modifiers
            .iter()
            .map(|m| m.window().end_epoch.max(m.window().start_epoch))
            .fold(0.0, f64::max)
    }

    /// Initialize every modifier.
    pub fn initialize(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        for modifier in &mut self.modifiers {
            modifier.initialize(engine)?;
        }
        info!("recipe initialized with {} modifiers", self.modifiers.len());
        Ok(())
    }

    /// Whether any modifier has an update due.
    pub fn update_ready(&self, epoch: f64, steps_per_epoch: usize) -> bool {
        self.modifiers.iter().any(|m| m.update_ready(epoch, steps_per_epoch))
    }

    /// Run every due update; returns how many modifiers acted.
    pub fn scheduled_update(
        &mut self,
        engine: &mut dyn TensorEngine,
        epoch: f64,
        steps_per_epoch: usize,
    ) -> Result<usize> {
        let mut applied = 0;
        for modifier in &mut self.modifiers {
            if modifier.scheduled_update(engine, epoch, steps_per_epoch)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Forward to every modifier before the optimizer step.
    pub fn optimizer_pre_step(&mut self, engine: &dyn TensorEngine) -> Result<()> {
        for modifier in &mut self.modifiers {
            modifier.optimizer_pre_step(engine)?;
        }
        Ok(())
    }

    /// Forward to every modifier after the optimizer step.
    pub fn optimizer_post_step(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        for modifier in &mut self.modifiers {
            modifier.optimizer_post_step(engine)?;
        }
        Ok(())
    }

    /// Union of every modifier's masks.
    pub fn state_dict(&self) -> BTreeMap<String, ArrayD<f32>> {
        self.modifiers.iter().flat_map(PruningModifier::state_dict).collect()
    }

    /// Hand the full map to every modifier.
    pub fn load_state_dict(
        &mut self,
        engine: &mut dyn TensorEngine,
        state: &BTreeMap<String, ArrayD<f32>>,
    ) -> Result<()> {
        for modifier in &mut self.modifiers {
            modifier.load_state_dict(engine, state)?;
        }
        Ok(())
    }

    /// Finalize every modifier.
    pub fn finalize(&mut self, engine: &mut dyn TensorEngine) -> Result<()> {
        for modifier in &mut self.modifiers {
            modifier.finalize(engine)?;
        }
        Ok(())
    }
}
