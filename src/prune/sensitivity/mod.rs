//! Kernel-sparsity loss sensitivity
//!
//! Two ways to estimate how much each prunable parameter suffers from
//! pruning:
//!
//! | Procedure | Engine access | Cost |
//! |-----------|---------------|------|
//! | [`approx_ks_loss_sensitivity`] | read only | one sort per parameter |
//! | [`one_shot_ks_loss_sensitivity`] | masks values, runs the loss op | params x levels x steps runs |
//!
//! Both produce a [`KsLossSensitivityAnalysis`]; its per-parameter
//! [`KsLossSensitivityResult::sparse_integral`] ranks parameters from most
//! to least sensitive.

mod analysis;
mod approx;
mod one_shot;
mod op_vars;


pub use analysis::{
    default_check_sparsities_loss, KsLossSensitivityAnalysis, KsLossSensitivityResult,
    SensitivityRecord,
};
pub use approx::{approx_ks_loss_sensitivity, BASELINE_SPARSITY};
pub use one_shot::{
    one_shot_ks_loss_sensitivity, one_shot_ks_loss_sensitivity_into, AddOpsFn, FeedFn,
    OneShotOptions, ProgressFn,
};
pub use op_vars::{ks_loss_sensitivity_op_vars, SparsePruningOpVars};
