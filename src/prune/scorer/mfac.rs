//! Second-order importance from a matrix-free inverse-Fisher estimate.
//!
//! Keeps the last `num_grads` flattened gradients `G` (`m x d`) and uses
//! the damped empirical Fisher `F = damp * I + G^T G / m`. The diagonal of
//! `F^-1` comes from the Woodbury identity, which only needs an `m x m`
//! inverse per block:
//!
//! `diag(F^-1)_i = 1/damp - (G^T A^-1 G)_ii / (damp^2 * m)`,
//! `A = I + G G^T / (m * damp)`.
//!
//! The saliency of a weight is `w^2 / (2 * diag(F^-1))`.

use std::collections::VecDeque;

use ndarray::{Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};

/// Options of the second-order scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfacOptions {
    /// Size of the rolling gradient window.
    #[serde(default = "default_num_grads")]
    pub num_grads: usize,
    /// Dampening added to the Fisher diagonal.
    #[serde(default = "default_damp")]
    pub damp: f64,
    /// Split the flattened parameters into independent Fisher blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fisher_block_size: Option<usize>,
    /// Devices the engine may spread gradient work over.
    #[serde(default)]
    pub available_gpus: Vec<String>,
}

fn default_num_grads() -> usize {
    64
}

fn default_damp() -> f64 {
    1e-5
}

impl Default for MfacOptions {
    fn default() -> Self {
        Self {
            num_grads: default_num_grads(),
            damp: default_damp(),
            fisher_block_size: None,
            available_gpus: Vec::new(),
        }
    }
}

impl MfacOptions {
    /// Validate the options.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_grads == 0 {
            return Err("mfac_options.num_grads must be at least 1".to_string());
        }
        if self.damp.is_nan() || self.damp <= 0.0 {
            return Err(format!("mfac_options.damp ({}) must be positive", self.damp));
        }
        if self.fisher_block_size == Some(0) {
            return Err("mfac_options.fisher_block_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Rolling gradient window and saliency computation.
#[derive(Debug, Clone)]
pub struct MfacScorer {
    options: MfacOptions,
    grads: VecDeque<Vec<f64>>,
}

impl MfacScorer {
    /// Create a scorer with an empty window.
    pub fn new(options: MfacOptions) -> Self {
        Self { options, grads: VecDeque::new() }
    }

    /// Options in use.
    pub fn options(&self) -> &MfacOptions {
        &self.options
    }

    /// Number of gradients currently in the window.
    pub fn window_len(&self) -> usize {
        self.grads.len()
    }

    /// Push one step's gradients; skipped unless every parameter has one.
    pub fn observe(&mut self, weights: &[ArrayD<f32>], grads: &[Option<ArrayD<f32>>]) {
        let mut flat = Vec::with_capacity(weights.iter().map(ArrayD::len).sum());
        for (weight, grad) in weights.iter().zip(grads) {
            match grad {
                Some(g) if g.shape() == weight.shape() => {
                    flat.extend(g.iter().map(|&v| f64::from(v)));
                }
                _ => return,
            }
        }
        self.grads.push_back(flat);
        while self.grads.len() > self.options.num_grads {
            self.grads.pop_front();
        }
    }

    /// Saliency per parameter, `None` while the window is empty or degenerate.
    pub fn scores(&self, weights: &[ArrayD<f32>]) -> Option<Vec<ArrayD<f32>>> {
        let total: usize = weights.iter().map(ArrayD::len).sum();
        if self.grads.is_empty() || self.grads.iter().any(|g| g.len() != total) {
            return None;
        }

        let diag = self.inverse_fisher_diagonal(total)?;
        let mut offset = 0;
        let scores = weights
            .iter()
            .map(|w| {
                let mut score = ArrayD::<f32>::zeros(w.raw_dim());
                for (i, (slot, &value)) in score.iter_mut().zip(w.iter()).enumerate() {
                    let value = f64::from(value);
                    *slot = (value * value / (2.0 * diag[offset + i])) as f32;
                }
                offset += w.len();
                score
            })
            .collect();
        Some(scores)
    }

    /// Forget every stored gradient.
    pub fn reset(&mut self) {
        self.grads.clear();
    }

    fn inverse_fisher_diagonal(&self, total: usize) -> Option<Vec<f64>> {
        let block = self.options.fisher_block_size.unwrap_or(total).max(1);
        let damp = self.options.damp;
        let m = self.grads.len();
        let mut diag = Vec::with_capacity(total);

        let mut start = 0;
        while start < total {
            let end = (start + block).min(total);
            let width = end - start;

            let mut g = Array2::<f64>::zeros((m, width));
            for (row, grad) in self.grads.iter().enumerate() {
                for (col, &v) in grad[start..end].iter().enumerate() {
                    g[[row, col]] = v;
                }
            }

            let mut a = g.dot(&g.t()) / (m as f64 * damp);
            for i in 0..m {
                a[[i, i]] += 1.0;
            }
            let a_inv = invert(a)?;
            let h = a_inv.dot(&g);
            let quad = (&g * &h).sum_axis(Axis(0));
            for q in quad.iter() {
                let d = 1.0 / damp - q / (damp * damp * m as f64);
                diag.push(d.max(f64::MIN_POSITIVE));
            }
            start = end;
        }
        Some(diag)
    }
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert(mut a: Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut inv = Array2::<f64>::eye(n);
    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| a[[x, col]].abs().total_cmp(&a[[y, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
                inv.swap([pivot, k], [col, k]);
            }
        }
        let p = a[[col, col]];
        for k in 0..n {
            a[[col, k]] /= p;
            inv[[col, k]] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Some(inv)
}
