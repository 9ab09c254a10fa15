//! Property-based tests for mask creation.

use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;

use super::*;

proptest! {
    /// Unstructured masks zero exactly round(s * N) elements
    #[test]
    fn unstructured_zero_count_is_rounded_target(
        data in proptest::collection::vec(-10.0f32..10.0, 1..200),
        sparsity in 0.0f64..=1.0,
    ) {
        let n = data.len();
        let values = ArrayD::from_shape_vec(IxDyn(&[n]), data).unwrap();
        let mask = MaskCreator::Unstructured.create_mask(&values, sparsity);
        let zeros = mask.iter().filter(|&&v| v == 0.0).count();
        prop_assert_eq!(zeros, (sparsity * n as f64).round() as usize);
    }

    /// Every pruned magnitude is <= every kept magnitude
    #[test]
    fn unstructured_prunes_globally_smallest(
        data in proptest::collection::vec(-10.0f32..10.0, 2..200),
        sparsity in 0.05f64..0.95,
    ) {
        let n = data.len();
        let values = ArrayD::from_shape_vec(IxDyn(&[n]), data).unwrap();
        let mask = MaskCreator::Unstructured.create_mask(&values, sparsity);
        let max_pruned = values
            .iter()
            .zip(mask.iter())
            .filter(|(_, &m)| m == 0.0)
            .map(|(v, _)| v.abs())
            .fold(f32::NEG_INFINITY, f32::max);
        let min_kept = values
            .iter()
            .zip(mask.iter())
            .filter(|(_, &m)| m == 1.0)
            .map(|(v, _)| v.abs())
            .fold(f32::INFINITY, f32::min);
        prop_assert!(max_pruned <= min_kept);
    }

    /// Masks are binary and shaped like their input
    #[test]
    fn structured_masks_are_binary(
        rows in 1usize..8,
        cols in 1usize..8,
        sparsity in 0.0f64..=1.0,
        seed in 0u64..1000,
    ) {
        let data: Vec<f32> = (0..rows * cols)
            .map(|i| (((i as u64 + seed) * 2654435761) % 1000) as f32 / 100.0 - 5.0)
            .collect();
        let values = ArrayD::from_shape_vec(IxDyn(&[rows, cols]), data).unwrap();
        for creator in [
            MaskCreator::Unstructured,
            MaskCreator::Filter,
            MaskCreator::Channel,
            MaskCreator::Block { shape: [2, 2] },
        ] {
            let mask = creator.create_mask(&values, sparsity);
            prop_assert_eq!(mask.shape(), values.shape());
            prop_assert!(mask.iter().all(|&v| v == 0.0 || v == 1.0));
        }
    }

    /// Filter masks never split a row
    #[test]
    fn filter_masks_keep_rows_whole(
        rows in 1usize..10,
        cols in 1usize..10,
        sparsity in 0.0f64..=1.0,
    ) {
        let data: Vec<f32> = (0..rows * cols).map(|i| (i % 7) as f32 - 3.0).collect();
        let values = ArrayD::from_shape_vec(IxDyn(&[rows, cols]), data).unwrap();
        let mask = MaskCreator::Filter.create_mask(&values, sparsity);
        for r in 0..rows {
            let first = mask[IxDyn(&[r, 0])];
            for c in 0..cols {
                prop_assert_eq!(mask[IxDyn(&[r, c])], first);
            }
        }
    }
}
