//! Training-time weight pruning for neural networks.
//!
//! This crate provides:
//! - Sparsity masks (unstructured, block, channel, filter) applied to live
//!   parameter tensors
//! - Scheduled pruning modifiers driven by training epochs, loadable from
//!   YAML recipes
//! - Kernel-sparsity sensitivity analysis (approximate and one-shot)
//! - A tensor-engine interface plus an in-memory reference engine
//!
//! The pruning core talks to a deep-learning runtime only through
//! [`engine::TensorEngine`]; see [`prune`] for the full workflow.

pub mod cli;
pub mod engine;
pub mod error;
pub mod prune;

pub use engine::{InMemoryEngine, TensorEngine};
pub use error::{PruneError, Result};
pub use prune::{ModifierConfig, PruningModifier, ScheduledModifierManager};
