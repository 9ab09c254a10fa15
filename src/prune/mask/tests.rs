//! Tests for mask creation.

use ndarray::{ArrayD, IxDyn};

use super::*;
use crate::error::PruneError;

fn tensor(shape: &[usize], data: Vec<f32>) -> ArrayD<f32> {
    ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
}

fn zeros(mask: &ArrayD<f32>) -> usize {
    mask.iter().filter(|&&v| v == 0.0).count()
}

// =============================================================================
// Unstructured
// =============================================================================

#[test]
fn test_unstructured_prunes_smallest_magnitudes() {
    // TEST_ID: MASK-001
    let values = tensor(&[2, 3], vec![0.5, -0.1, 2.0, -3.0, 0.05, 1.0]);
    let mask = MaskCreator::Unstructured.create_mask(&values, 0.5);
    assert_eq!(
        mask.as_slice().unwrap(),
        &[0.0, 0.0, 1.0, 1.0, 0.0, 1.0],
        "MASK-001 FALSIFIED: lowest |w| must be pruned first"
    );
}

#[test]
fn test_unstructured_zero_and_full_sparsity() {
    // TEST_ID: MASK-002
    let values = tensor(&[4], vec![1.0, 2.0, 3.0, 4.0]);
    let dense = MaskCreator::Unstructured.create_mask(&values, 0.0);
    assert!(dense.iter().all(|&v| v == 1.0));
    let negative = MaskCreator::Unstructured.create_mask(&values, -0.3);
    assert!(negative.iter().all(|&v| v == 1.0));
    let empty = MaskCreator::Unstructured.create_mask(&values, 1.0);
    assert!(
        empty.iter().all(|&v| v == 0.0),
        "MASK-002 FALSIFIED: sparsity 1.0 must empty the tensor"
    );
}

#[test]
fn test_unstructured_ties_break_by_flat_index() {
    // TEST_ID: MASK-003
    let values = tensor(&[6], vec![1.0, -1.0, 1.0, 1.0, -1.0, 1.0]);
    let mask = MaskCreator::Unstructured.create_mask(&values, 0.5);
    assert_eq!(
        mask.as_slice().unwrap(),
        &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        "MASK-003 FALSIFIED: equal magnitudes must be pruned in flat index order"
    );
}

#[test]
fn test_unstructured_rounds_half_up() {
    let values = tensor(&[5], vec![5.0, 4.0, 3.0, 2.0, 1.0]);
    // 0.5 * 5 = 2.5 -> 3 elements
    let mask = MaskCreator::Unstructured.create_mask(&values, 0.5);
    assert_eq!(zeros(&mask), 3);
    assert_eq!(mask.as_slice().unwrap(), &[1.0, 1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_scores_are_ranked_signed() {
    let scores = tensor(&[4], vec![-5.0, 0.5, 2.0, -0.1]);
    let mask = MaskCreator::Unstructured.create_mask_from_scores(&scores, 0.5);
    assert_eq!(mask.as_slice().unwrap(), &[0.0, 1.0, 1.0, 0.0]);
}

// =============================================================================
// Structured
// =============================================================================

#[test]
fn test_filter_prunes_whole_rows() {
    // TEST_ID: MASK-010
    let values = tensor(&[3, 2], vec![0.1, 0.1, 5.0, 5.0, 1.0, -1.0]);
    let mask = MaskCreator::Filter.create_mask(&values, 0.34);
    assert_eq!(
        mask.as_slice().unwrap(),
        &[0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
        "MASK-010 FALSIFIED: the weakest filter must be pruned as a whole"
    );
}

#[test]
fn test_channel_prunes_whole_columns() {
    // TEST_ID: MASK-011
    // shape [out=2, in=3, k=2]
    let values = tensor(
        &[2, 3, 2],
        vec![
            1.0, 1.0, 0.0, 0.1, 2.0, 2.0, //
            1.0, 1.0, 0.1, 0.0, 2.0, 2.0,
        ],
    );
    let mask = MaskCreator::Channel.create_mask(&values, 0.3);
    assert_eq!(
        mask.as_slice().unwrap(),
        &[1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0],
        "MASK-011 FALSIFIED: input channel 1 must be pruned across all filters"
    );
}

#[test]
fn test_block_prunes_tiles() {
    // TEST_ID: MASK-012
    let values = tensor(
        &[2, 4],
        vec![
            0.1, 0.2, 3.0, 3.0, //
            0.1, 0.1, 3.0, 3.0,
        ],
    );
    let creator = MaskCreator::block(2, 2).unwrap();
    let mask = creator.create_mask(&values, 0.5);
    assert_eq!(mask.as_slice().unwrap(), &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn test_block_handles_ragged_edges() {
    let values = tensor(&[1, 5], vec![0.1, 0.1, 0.1, 0.1, 9.0]);
    let creator = MaskCreator::block(1, 4).unwrap();
    // groups: 4 elements (mean 0.1) and 1 element (9.0); 0.8 * 5 = 4
    let mask = creator.create_mask(&values, 0.8);
    assert_eq!(mask.as_slice().unwrap(), &[0.0, 0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_structured_on_vector_falls_back_to_elements() {
    let values = tensor(&[4], vec![4.0, 3.0, 2.0, 1.0]);
    let mask = MaskCreator::Filter.create_mask(&values, 0.5);
    assert_eq!(mask.as_slice().unwrap(), &[1.0, 1.0, 0.0, 0.0]);
}

// =============================================================================
// Global
// =============================================================================

#[test]
fn test_global_masks_share_one_threshold() {
    // TEST_ID: MASK-020
    let small = tensor(&[4], vec![0.1, 0.2, 0.3, 0.4]);
    let large = tensor(&[4], vec![10.0, 20.0, 30.0, 0.05]);
    let masks = MaskCreator::Unstructured.create_global_masks(&[small, large], 0.5);
    assert_eq!(masks[0].as_slice().unwrap(), &[0.0, 0.0, 0.0, 1.0]);
    assert_eq!(masks[1].as_slice().unwrap(), &[1.0, 1.0, 1.0, 0.0]);
    assert!(
        (mask_sparsity(&masks[0]) - mask_sparsity(&masks[1])).abs() > 0.1,
        "MASK-020 FALSIFIED: global pruning should give per-tensor sparsities"
    );
}

#[test]
fn test_global_total_matches_rounded_target() {
    let a = tensor(&[3], vec![1.0, 2.0, 3.0]);
    let b = tensor(&[2, 2], vec![0.5, 4.0, 0.7, 6.0]);
    let masks = MaskCreator::Unstructured.create_global_masks(&[a, b], 0.6);
    let total_zeros: usize = masks.iter().map(zeros).sum();
    assert_eq!(total_zeros, (0.6f64 * 7.0).round() as usize);
}

// =============================================================================
// Descriptors
// =============================================================================

#[test]
fn test_load_mask_creator_names() {
    // TEST_ID: MASK-030
    assert_eq!(load_mask_creator("unstructured").unwrap(), MaskCreator::Unstructured);
    assert_eq!(load_mask_creator("channel").unwrap(), MaskCreator::Channel);
    assert_eq!(load_mask_creator("filter").unwrap(), MaskCreator::Filter);
    assert_eq!(load_mask_creator("block").unwrap(), MaskCreator::Block { shape: [1, 4] });
    assert_eq!(load_mask_creator("[2, 8]").unwrap(), MaskCreator::Block { shape: [2, 8] });
}

#[test]
fn test_load_mask_creator_rejects_unknown() {
    // TEST_ID: MASK-031
    let err = load_mask_creator("diagonal").unwrap_err();
    assert!(
        matches!(err, PruneError::Config(_)),
        "MASK-031 FALSIFIED: unknown mask type must be a config error"
    );
    assert!(load_mask_creator("[1, 2, 3]").is_err());
    assert!(load_mask_creator("[0, 4]").is_err());
    assert!(load_mask_creator("[a, 4]").is_err());
}

#[test]
fn test_mask_creator_yaml_forms() {
    let filter: MaskCreator = serde_yaml::from_str("filter").unwrap();
    assert_eq!(filter, MaskCreator::Filter);
    let block: MaskCreator = serde_yaml::from_str("[1, 4]").unwrap();
    assert_eq!(block, MaskCreator::Block { shape: [1, 4] });
    assert!(serde_yaml::from_str::<MaskCreator>("bogus").is_err());

    let yaml = serde_yaml::to_string(&MaskCreator::Block { shape: [2, 2] }).unwrap();
    let back: MaskCreator = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(back, MaskCreator::Block { shape: [2, 2] });
    assert_eq!(serde_json::to_string(&MaskCreator::Channel).unwrap(), "\"channel\"");
}

#[test]
fn test_mask_from_nonzero_and_sparsity() {
    let values = tensor(&[4], vec![0.0, 1.0, 0.0, -2.0]);
    let mask = MaskCreator::mask_from_nonzero(&values);
    assert_eq!(mask.as_slice().unwrap(), &[0.0, 1.0, 0.0, 1.0]);
    assert_eq!(mask_sparsity(&mask), 0.5);
    assert_eq!(mask_sparsity(&ArrayD::zeros(IxDyn(&[0]))), 0.0);
}
