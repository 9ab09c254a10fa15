//! Tests for importance scoring.

use ndarray::{ArrayD, IxDyn};

use super::*;
use crate::prune::mask::MaskCreator;

fn tensor(data: Vec<f32>) -> ArrayD<f32> {
    let n = data.len();
    ArrayD::from_shape_vec(IxDyn(&[n]), data).unwrap()
}

#[test]
fn test_magnitude_scores_are_absolute_values() {
    // TEST_ID: SCORE-001
    let scores = Scorer::Magnitude.scores(&[tensor(vec![-2.0, 0.5, 0.0])]);
    assert_eq!(
        scores[0].as_slice().unwrap(),
        &[2.0, 0.5, 0.0],
        "SCORE-001 FALSIFIED: magnitude score must be |w|"
    );
    assert!(!Scorer::Magnitude.needs_gradients());
}

#[test]
fn test_movement_accumulates_negative_weight_gradient() {
    // TEST_ID: SCORE-010
    let mut scorer = Scorer::movement();
    let w = vec![tensor(vec![1.0, 1.0, -1.0])];
    // gradient pushing w[0] toward zero, w[1] away from zero
    let g = vec![Some(tensor(vec![0.5, -0.5, 0.0]))];
    scorer.observe(&w, &g);
    scorer.observe(&w, &g);
    let scores = scorer.scores(&w);
    assert_eq!(
        scores[0].as_slice().unwrap(),
        &[-1.0, 1.0, 0.0],
        "SCORE-010 FALSIFIED: movement must sum -w * grad over steps"
    );

    // weights shrinking toward zero are pruned first, regardless of magnitude
    let mask = MaskCreator::Unstructured.create_mask_from_scores(&scores[0], 1.0 / 3.0);
    assert_eq!(mask.as_slice().unwrap(), &[0.0, 1.0, 1.0]);
}

#[test]
fn test_movement_without_history_falls_back_to_magnitude() {
    let mut scorer = Scorer::movement();
    let w = vec![tensor(vec![-3.0, 1.0])];
    scorer.observe(&w, &[None]);
    assert_eq!(scorer.scores(&w)[0].as_slice().unwrap(), &[3.0, 1.0]);
    if let Scorer::Movement(inner) = &scorer {
        assert_eq!(inner.steps(), 0);
    }
}

#[test]
fn test_movement_reset_clears_history() {
    let mut scorer = Scorer::movement();
    let w = vec![tensor(vec![2.0])];
    scorer.observe(&w, &[Some(tensor(vec![1.0]))]);
    assert_eq!(scorer.scores(&w)[0].as_slice().unwrap(), &[-2.0]);
    scorer.reset();
    assert_eq!(scorer.scores(&w)[0].as_slice().unwrap(), &[2.0]);
}

#[test]
fn test_mfac_prefers_low_curvature_weights() {
    // TEST_ID: SCORE-020
    // Equal weights; element 0 sees large gradients (high Fisher, small
    // inverse diagonal) so removing it costs more than removing element 1.
    let options = MfacOptions { num_grads: 4, damp: 1e-3, ..MfacOptions::default() };
    let mut scorer = Scorer::mfac(options);
    let w = vec![tensor(vec![1.0, 1.0])];
    for sign in [1.0f32, -1.0, 1.0, -1.0] {
        scorer.observe(&w, &[Some(tensor(vec![sign * 2.0, sign * 0.01]))]);
    }
    let scores = scorer.scores(&w);
    let s = scores[0].as_slice().unwrap();
    assert!(
        s[0] > s[1],
        "SCORE-020 FALSIFIED: high-curvature weight must score higher, got {s:?}"
    );
    assert!(s.iter().all(|v| v.is_finite() && *v >= 0.0));
}

#[test]
fn test_mfac_blocks_cover_every_parameter() {
    let options = MfacOptions { num_grads: 2, fisher_block_size: Some(2), ..MfacOptions::default() };
    let mut scorer = Scorer::mfac(options);
    let w = vec![tensor(vec![1.0, 2.0, 3.0]), tensor(vec![4.0, 5.0])];
    let g = vec![Some(tensor(vec![0.1, 0.2, 0.3])), Some(tensor(vec![0.4, 0.5]))];
    scorer.observe(&w, &g);
    let scores = scorer.scores(&w);
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].shape(), &[3]);
    assert_eq!(scores[1].shape(), &[2]);
    assert!(scores.iter().flat_map(|s| s.iter()).all(|v| v.is_finite() && *v > 0.0));
}

#[test]
fn test_mfac_without_history_falls_back_to_magnitude() {
    let scorer = Scorer::mfac(MfacOptions::default());
    let w = vec![tensor(vec![-1.5, 0.5])];
    assert_eq!(scorer.scores(&w)[0].as_slice().unwrap(), &[1.5, 0.5]);
    assert!(scorer.needs_gradients());
    assert_eq!(scorer.name(), "mfac");
}
