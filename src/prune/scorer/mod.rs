//! Importance scoring
//!
//! Ranks the elements of a group of parameters before a mask is built.
//! Higher scores are kept; the mask creator prunes the lowest ones.
//!
//! # References
//! - Sanh, V., Wolf, T., & Rush, A. (2020). Movement pruning: adaptive
//!   sparsity by fine-tuning. arXiv:2005.07683.
//! - Frantar, E., Kurtic, E., & Alistarh, D. (2021). M-FAC: efficient
//!   matrix-free approximations of second-order information. arXiv:2107.03356.

mod mfac;
mod movement;

#[cfg(test)]
mod tests;

pub use mfac::{MfacOptions, MfacScorer};
pub use movement::MovementScorer;

use log::warn;
use ndarray::ArrayD;

/// Source of element importance.
#[derive(Debug, Clone, Default)]
pub enum Scorer {
    /// `|w|`
    #[default]
    Magnitude,
    /// Accumulated `-w * grad`.
    Movement(MovementScorer),
    /// `w^2 / (2 * diag(F^-1))` over a rolling gradient window.
    Mfac(MfacScorer),
}

impl Scorer {
    /// Movement scorer with no history.
    pub fn movement() -> Self {
        Scorer::Movement(MovementScorer::new())
    }

    /// Second-order scorer with the given options.
    pub fn mfac(options: MfacOptions) -> Self {
        Scorer::Mfac(MfacScorer::new(options))
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Scorer::Magnitude => "magnitude",
            Scorer::Movement(_) => "movement",
            Scorer::Mfac(_) => "mfac",
        }
    }

    /// Whether the scorer consumes gradients.
    pub fn needs_gradients(&self) -> bool {
        !matches!(self, Scorer::Magnitude)
    }

    /// Feed one optimizer step's weights and gradients.
    pub fn observe(&mut self, weights: &[ArrayD<f32>], grads: &[Option<ArrayD<f32>>]) {
        match self {
            Scorer::Magnitude => {}
            Scorer::Movement(scorer) => scorer.observe(weights, grads),
            Scorer::Mfac(scorer) => scorer.observe(weights, grads),
        }
    }

    /// Scores for each tensor, same shapes as `weights`.
    ///
    /// Gradient-based scorers fall back to magnitude until they have history.
    pub fn scores(&self, weights: &[ArrayD<f32>]) -> Vec<ArrayD<f32>> {
        let history = match self {
            Scorer::Magnitude => return magnitude(weights),
            Scorer::Movement(scorer) => scorer.scores(weights),
            Scorer::Mfac(scorer) => scorer.scores(weights),
        };
        history.unwrap_or_else(|| {
            warn!("{} scorer has no gradient history yet, ranking by magnitude", self.name());
            magnitude(weights)
        })
    }

    /// Forget any gradient history.
    pub fn reset(&mut self) {
        match self {
            Scorer::Magnitude => {}
            Scorer::Movement(scorer) => scorer.reset(),
            Scorer::Mfac(scorer) => scorer.reset(),
        }
    }
}

fn magnitude(weights: &[ArrayD<f32>]) -> Vec<ArrayD<f32>> {
    weights.iter().map(|w| w.mapv(f32::abs)).collect()
}
