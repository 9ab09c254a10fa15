//! Pruning modifiers
//!
//! A modifier couples a schedule with a way of removing weights:
//!
//! | Tag | Behaviour |
//! |-----|-----------|
//! | `ConstantPruningModifier` | freeze the current zero pattern |
//! | `GMPruningModifier` | gradual magnitude pruning, optionally global |
//! | `MagnitudePruningModifier` | gradual magnitude pruning, per parameter |
//! | `GlobalMagnitudePruningModifier` | gradual magnitude pruning, one ranking |
//! | `MovementPruningModifier` | gradual pruning ranked by `-w * grad` |
//! | `MFACPruningModifier` | gradual pruning ranked by second-order saliency |
//! | `LayerPruningModifier` | swap whole layers for identities |
//!
//! All variants share one state machine, [`PruningModifier`].

mod config;
mod runtime;


pub use config::{
    ConstantPruningArgs, GmPruningArgs, GradualPruningArgs, LayerPruningArgs, MfacPruningArgs,
    ModifierConfig,
};
pub use runtime::PruningModifier;
