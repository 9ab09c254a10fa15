//! Movement importance: accumulated `-w * grad`.

use ndarray::ArrayD;

/// Running movement scores, one tensor per parameter.
#[derive(Debug, Clone, Default)]
pub struct MovementScorer {
    scores: Vec<Option<ArrayD<f32>>>,
    steps: usize,
}

impl MovementScorer {
    /// Create an empty scorer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of optimizer steps observed.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Add `-w * grad` for every parameter that has a gradient.
    pub fn observe(&mut self, weights: &[ArrayD<f32>], grads: &[Option<ArrayD<f32>>]) {
        if self.scores.len() != weights.len() {
            self.scores = vec![None; weights.len()];
        }
        let mut any = false;
        for ((slot, weight), grad) in self.scores.iter_mut().zip(weights).zip(grads) {
            let Some(grad) = grad else { continue };
            if grad.shape() != weight.shape() {
                continue;
            }
            let movement = -(weight * grad);
            match slot {
                Some(acc) => *acc += &movement,
                None => *slot = Some(movement),
            }
            any = true;
        }
        if any {
            self.steps += 1;
        }
    }

    /// Accumulated scores, `None` until a gradient has been observed.
    pub fn scores(&self, weights: &[ArrayD<f32>]) -> Option<Vec<ArrayD<f32>>> {
        if self.steps == 0 {
            return None;
        }
        Some(
            weights
                .iter()
                .enumerate()
                .map(|(i, w)| match self.scores.get(i).and_then(Option::as_ref) {
                    Some(score) if score.shape() == w.shape() => score.clone(),
                    _ => ArrayD::zeros(w.raw_dim()),
                })
                .collect(),
        )
    }

    /// Forget all accumulated movement.
    pub fn reset(&mut self) {
        self.scores.clear();
        self.steps = 0;
    }
}
