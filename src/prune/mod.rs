//! Training-time weight pruning and sensitivity analysis
//!
//! This module implements scheduled kernel-sparsity pruning on top of the
//! [`TensorEngine`](crate::engine::TensorEngine) interface:
//!
//! - **Mask creation**: unstructured, channel, filter, and block masks that
//!   zero the lowest-scoring values or groups
//! - **Mask application**: per-parameter masks written into live tensors,
//!   with gradient hooks keeping pruned entries at zero
//! - **Scheduling**: start/periodic/end updates over an epoch window with
//!   linear, cubic, or inverse-cubic sparsity ramps
//! - **Modifiers**: constant, gradual magnitude, global magnitude, movement,
//!   second-order (M-FAC), and layer pruning, loadable from YAML recipes
//! - **Sensitivity analysis**: approximate (weight magnitude) and one-shot
//!   (measured loss) sweeps over sparsity levels
//!
//! # Example
//!
//! ```
//! use ndarray::{ArrayD, IxDyn};
//! use podar::engine::InMemoryEngine;
//! use podar::prune::ScheduledModifierManager;
//!
//! let recipe = r#"
//! modifiers:
//!   - !GMPruningModifier
//!     init_sparsity: 0.25
//!     final_sparsity: 0.75
//!     start_epoch: 0.0
//!     end_epoch: 2.0
//!     params: ["re:.*weight"]
//! "#;
//! let mut manager = ScheduledModifierManager::from_yaml(recipe).unwrap();
//!
//! let mut engine = InMemoryEngine::new();
//! let values = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.4, -0.1, 0.3, -0.2]).unwrap();
//! engine.add_parameter("fc.weight", values, true);
//!
//! manager.initialize(&mut engine).unwrap();
//! for epoch in 0..=2 {
//!     manager.scheduled_update(&mut engine, epoch as f64, 0).unwrap();
//! }
//! assert_eq!(engine.values("fc.weight").unwrap().as_slice().unwrap(), &[0.4, 0.0, 0.0, 0.0]);
//! ```
//!
//! # References
//!
//! - Zhu, M., & Gupta, S. (2017). To prune, or not to prune. arXiv:1710.01878.
//! - Sanh, V., et al. (2020). Movement pruning. arXiv:2005.07683.
//! - Frantar, E., et al. (2021). M-FAC: Efficient matrix-free approximations
//!   of second-order information. arXiv:2107.03356.

pub mod applier;
pub mod checkpoint;
pub mod manager;
pub mod mask;
pub mod modifier;
pub mod params;
pub mod schedule;
pub mod scorer;
pub mod sensitivity;

pub use applier::{mask_key, MaskApplier, MASK_KEY_SUFFIX};
pub use checkpoint::{load_mask_state, save_mask_state};
pub use manager::ScheduledModifierManager;
pub use mask::{load_mask_creator, mask_sparsity, MaskCreator};
pub use modifier::{
    ConstantPruningArgs, GmPruningArgs, GradualPruningArgs, LayerPruningArgs, MfacPruningArgs,
    ModifierConfig, PruningModifier,
};
pub use params::ParamSelector;
pub use schedule::{
    fractional_epoch, interpolate, EpochWindow, InterpolationFunction, ScheduleState, Scheduler,
    UpdateKind, MAX_DRY_RUN_STEPS,
};
pub use scorer::{MfacOptions, Scorer};
pub use sensitivity::{
    approx_ks_loss_sensitivity, default_check_sparsities_loss, ks_loss_sensitivity_op_vars,
    one_shot_ks_loss_sensitivity, KsLossSensitivityAnalysis, OneShotOptions, SparsePruningOpVars,
};
