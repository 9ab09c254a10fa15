//! Tensor-engine interface
//!
//! The pruning core never touches a deep-learning runtime directly. It
//! reads and writes parameter values, registers gradient hooks, swaps
//! layers for identities, and runs ops through the [`TensorEngine`] trait.
//!
//! [`InMemoryEngine`] is a plain ndarray implementation of the contract,
//! used by the test suites and as a reference for adapters.

mod memory;


pub use memory::{InMemoryEngine, OpFn, ParameterStore};

use std::collections::HashMap;

use ndarray::ArrayD;

use crate::error::Result;

/// Opaque handle to a resolved parameter tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamHandle(pub usize);

/// Opaque handle to a runnable op (loss tensor, metric, update).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpHandle(pub usize);

/// Handle returned by [`TensorEngine::register_gradient_hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(pub u64);

/// Named inputs fed to [`TensorEngine::run`].
pub type Feed = HashMap<String, ArrayD<f32>>;

/// Callback invoked on every gradient produced for a parameter.
pub type GradientHook = Box<dyn FnMut(&mut ArrayD<f32>) + Send>;

/// Description of a parameter the engine exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    /// Fully qualified parameter name (e.g. `seq.fc1.weight`).
    pub name: String,
    /// Tensor shape.
    pub shape: Vec<usize>,
    /// Whether the owning layer is a prunable kind (conv, linear).
    pub prunable: bool,
}

/// Description of a layer the engine can ablate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Fully qualified layer name (e.g. `seq.fc2`).
    pub name: String,
    /// Whether the layer is a prunable kind (conv, linear).
    pub prunable: bool,
}

/// The surface of a tensor-computation engine the pruning core consumes.
pub trait TensorEngine {
    /// All parameters in registration order.
    fn parameters(&self) -> Vec<ParameterInfo>;

    /// All layers in registration order.
    fn layers(&self) -> Vec<LayerInfo>;

    /// Resolve a parameter name to a handle.
    ///
    /// # Errors
    ///
    /// Returns `ParameterNotFound` when no parameter has that name.
    fn resolve_parameter(&self, name: &str) -> Result<ParamHandle>;

    /// Read the current values of a parameter.
    fn get_values(&self, handle: ParamHandle) -> Result<ArrayD<f32>>;

    /// Overwrite the values of a parameter. The shape must not change.
    fn set_values(&mut self, handle: ParamHandle, values: ArrayD<f32>) -> Result<()>;

    /// Read the most recent gradient of a parameter, if any.
    fn get_gradient(&self, handle: ParamHandle) -> Result<Option<ArrayD<f32>>>;

    /// Register a hook that may rewrite each gradient produced for a parameter.
    fn register_gradient_hook(&mut self, handle: ParamHandle, hook: GradientHook)
        -> Result<HookHandle>;

    /// Remove a previously registered hook.
    fn remove_gradient_hook(&mut self, hook: HookHandle) -> Result<()>;

    /// Evaluate ops against the current parameters and the given feed.
    fn run(&mut self, ops: &[OpHandle], feed: &Feed) -> Result<Vec<ArrayD<f32>>>;

    /// Swap a layer for an identity pass-through.
    fn ablate_layer(&mut self, name: &str) -> Result<()>;

    /// Put back a layer previously swapped out by [`TensorEngine::ablate_layer`].
    fn restore_layer(&mut self, name: &str) -> Result<()>;

    /// Whether a layer is currently swapped for an identity.
    fn is_layer_ablated(&self, name: &str) -> Result<bool>;
}
