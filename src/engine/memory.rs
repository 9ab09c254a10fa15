//! In-memory reference engine backed by ndarray.

use std::fmt;

use ndarray::ArrayD;

use super::{
    Feed, GradientHook, HookHandle, LayerInfo, OpHandle, ParamHandle, ParameterInfo, TensorEngine,
};
use crate::error::{PruneError, Result};

/// Op evaluated by [`InMemoryEngine::run`].
pub type OpFn = Box<dyn Fn(&ParameterStore, &Feed) -> Result<ArrayD<f32>> + Send>;

#[derive(Debug, Clone)]
struct ParamSlot {
    name: String,
    values: ArrayD<f32>,
    grad: Option<ArrayD<f32>>,
    prunable: bool,
}

#[derive(Debug, Clone)]
struct LayerSlot {
    name: String,
    prunable: bool,
    ablated: bool,
}

/// Read-only view of parameters and layer state handed to ops.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: Vec<ParamSlot>,
    layers: Vec<LayerSlot>,
}

impl ParameterStore {
    /// Values of a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.values)
    }

    /// Values of a parameter by name, failing if it does not exist.
    pub fn value(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.get(name).ok_or_else(|| PruneError::parameter_not_found(name))
    }

    /// Whether a layer is swapped for an identity. Unknown layers are not ablated.
    pub fn is_ablated(&self, layer: &str) -> bool {
        self.layers.iter().any(|l| l.name == layer && l.ablated)
    }

    fn slot(&self, handle: ParamHandle) -> Result<&ParamSlot> {
        self.params
            .get(handle.0)
            .ok_or_else(|| PruneError::engine(format!("invalid parameter handle {}", handle.0)))
    }

    fn slot_mut(&mut self, handle: ParamHandle) -> Result<&mut ParamSlot> {
        self.params
            .get_mut(handle.0)
            .ok_or_else(|| PruneError::engine(format!("invalid parameter handle {}", handle.0)))
    }

    fn layer_mut(&mut self, name: &str) -> Result<&mut LayerSlot> {
        self.layers
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| PruneError::engine(format!("unknown layer '{name}'")))
    }
}

/// Eager, single-threaded engine holding everything in memory.
///
/// Gradients enter through [`InMemoryEngine::backward`], which runs the
/// registered hooks before storing the result, so masked gradients look
/// exactly like they would coming out of a real backward pass.
///
/// # Example
///
/// ```
/// use ndarray::{ArrayD, IxDyn};
/// use podar::engine::{InMemoryEngine, TensorEngine};
///
/// let mut engine = InMemoryEngine::new();
/// let handle = engine.add_parameter("fc.weight", ArrayD::ones(IxDyn(&[2, 2])), true);
/// assert_eq!(engine.resolve_parameter("fc.weight").unwrap(), handle);
/// ```
#[derive(Default)]
pub struct InMemoryEngine {
    store: ParameterStore,
    hooks: Vec<(HookHandle, ParamHandle, GradientHook)>,
    ops: Vec<(String, OpFn)>,
    next_hook: u64,
    run_count: usize,
}

impl InMemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter and return its handle.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        values: ArrayD<f32>,
        prunable: bool,
    ) -> ParamHandle {
        self.store.params.push(ParamSlot {
            name: name.into(),
            values,
            grad: None,
            prunable,
        });
        ParamHandle(self.store.params.len() - 1)
    }

    /// Register a layer that can be ablated.
    pub fn add_layer(&mut self, name: impl Into<String>, prunable: bool) {
        self.store.layers.push(LayerSlot {
            name: name.into(),
            prunable,
            ablated: false,
        });
    }

    /// Register an op and return its handle.
    pub fn register_op(&mut self, name: impl Into<String>, op: OpFn) -> OpHandle {
        self.ops.push((name.into(), op));
        OpHandle(self.ops.len() - 1)
    }

    /// Name of a registered op.
    pub fn op_name(&self, op: OpHandle) -> Option<&str> {
        self.ops.get(op.0).map(|(name, _)| name.as_str())
    }

    /// Deliver a gradient for a parameter, running its hooks first.
    pub fn backward(&mut self, handle: ParamHandle, mut grad: ArrayD<f32>) -> Result<()> {
        let shape = self.store.slot(handle)?.values.shape().to_vec();
        if grad.shape() != shape.as_slice() {
            return Err(PruneError::engine(format!(
                "gradient shape {:?} does not match parameter shape {:?}",
                grad.shape(),
                shape
            )));
        }
        for (_, target, hook) in self.hooks.iter_mut() {
            if *target == handle {
                hook(&mut grad);
            }
        }
        self.store.slot_mut(handle)?.grad = Some(grad);
        Ok(())
    }

    /// Plain gradient descent over every parameter holding a gradient.
    pub fn sgd_step(&mut self, lr: f32) {
        for slot in &mut self.store.params {
            if let Some(grad) = &slot.grad {
                slot.values.scaled_add(-lr, grad);
            }
        }
    }

    /// Drop all stored gradients.
    pub fn zero_grad(&mut self) {
        for slot in &mut self.store.params {
            slot.grad = None;
        }
    }

    /// Borrow a parameter's values by name.
    pub fn values(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.store.get(name)
    }

    /// Read-only view of the parameter store.
    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Number of live gradient hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Number of completed `run` calls.
    pub fn run_count(&self) -> usize {
        self.run_count
    }
}

impl fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("parameters", &self.store.params.len())
            .field("layers", &self.store.layers.len())
            .field("hooks", &self.hooks.len())
            .field("ops", &self.ops.len())
            .field("run_count", &self.run_count)
            .finish()
    }
}

impl TensorEngine for InMemoryEngine {
    fn parameters(&self) -> Vec<ParameterInfo> {
        self.store
            .params
            .iter()
            .map(|p| ParameterInfo {
                name: p.name.clone(),
                shape: p.values.shape().to_vec(),
                prunable: p.prunable,
            })
            .collect()
    }

    fn layers(&self) -> Vec<LayerInfo> {
        self.store
            .layers
            .iter()
            .map(|l| LayerInfo { name: l.name.clone(), prunable: l.prunable })
            .collect()
    }

    fn resolve_parameter(&self, name: &str) -> Result<ParamHandle> {
        self.store
            .params
            .iter()
            .position(|p| p.name == name)
            .map(ParamHandle)
            .ok_or_else(|| PruneError::parameter_not_found(name))
    }

    fn get_values(&self, handle: ParamHandle) -> Result<ArrayD<f32>> {
        Ok(self.store.slot(handle)?.values.clone())
    }

    fn set_values(&mut self, handle: ParamHandle, values: ArrayD<f32>) -> Result<()> {
        let slot = self.store.slot_mut(handle)?;
        if slot.values.shape() != values.shape() {
            return Err(PruneError::engine(format!(
                "cannot assign shape {:?} to '{}' with shape {:?}",
                values.shape(),
                slot.name,
                slot.values.shape()
            )));
        }
        slot.values = values;
        Ok(())
    }

    fn get_gradient(&self, handle: ParamHandle) -> Result<Option<ArrayD<f32>>> {
        Ok(self.store.slot(handle)?.grad.clone())
    }

    fn register_gradient_hook(
        &mut self,
        handle: ParamHandle,
        hook: GradientHook,
    ) -> Result<HookHandle> {
        self.store.slot(handle)?;
        let id = HookHandle(self.next_hook);
        self.next_hook += 1;
        self.hooks.push((id, handle, hook));
        Ok(id)
    }

    fn remove_gradient_hook(&mut self, hook: HookHandle) -> Result<()> {
        let before = self.hooks.len();
        self.hooks.retain(|(id, _, _)| *id != hook);
        if self.hooks.len() == before {
            return Err(PruneError::engine(format!("unknown gradient hook {}", hook.0)));
        }
        Ok(())
    }

    fn run(&mut self, ops: &[OpHandle], feed: &Feed) -> Result<Vec<ArrayD<f32>>> {
        let mut outputs = Vec::with_capacity(ops.len());
        for op in ops {
            let (_, f) = self
                .ops
                .get(op.0)
                .ok_or_else(|| PruneError::engine(format!("invalid op handle {}", op.0)))?;
            outputs.push(f(&self.store, feed)?);
        }
        self.run_count += 1;
        Ok(outputs)
    }

    fn ablate_layer(&mut self, name: &str) -> Result<()> {
        self.store.layer_mut(name)?.ablated = true;
        Ok(())
    }

    fn restore_layer(&mut self, name: &str) -> Result<()> {
        self.store.layer_mut(name)?.ablated = false;
        Ok(())
    }

    fn is_layer_ablated(&self, name: &str) -> Result<bool> {
        self.store
            .layers
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.ablated)
            .ok_or_else(|| PruneError::engine(format!("unknown layer '{name}'")))
    }
}
