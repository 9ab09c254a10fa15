//! Pruning schedules
//!
//! Decides, from a monotonic fractional epoch, when a modifier must act
//! and which sparsity it targets:
//! - [`EpochWindow`]: `start_epoch`, `end_epoch`, `update_frequency`
//! - [`Scheduler`]: remembers which boundaries already fired
//! - [`InterpolationFunction`]: linear, cubic, or inverse-cubic ramps
//!
//! # References
//! - Zhu, M., & Gupta, S. (2017). To prune, or not to prune: exploring the
//!   efficacy of pruning for model compression. arXiv:1710.01878.

mod interpolation;
mod scheduler;

#[cfg(test)]
mod proptests;

pub use interpolation::{interpolate, InterpolationFunction};
pub use scheduler::{EpochWindow, ScheduleState, Scheduler, UpdateKind, MAX_DRY_RUN_STEPS};

/// Fractional epoch for a loop that counts whole epochs and steps.
///
/// `steps_per_epoch == 0` ignores the step counter.
pub fn fractional_epoch(epoch: usize, step: usize, steps_per_epoch: usize) -> f64 {
    if steps_per_epoch == 0 {
        return epoch as f64;
    }
    epoch as f64 + step as f64 / steps_per_epoch as f64
}
