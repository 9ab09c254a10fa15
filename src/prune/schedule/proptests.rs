//! Property-based tests for pruning schedules.

use proptest::prelude::*;

use super::*;

proptest! {
    /// Interpolated sparsity is monotonic and bounded by init and final
    #[test]
    fn interpolation_monotonic_and_bounded(
        start in 0.0f64..50.0,
        duration in 0.5f64..50.0,
        init in 0.0f64..0.5,
        final_val in 0.5f64..1.0,
        func in prop_oneof![
            Just(InterpolationFunction::Linear),
            Just(InterpolationFunction::Cubic),
            Just(InterpolationFunction::InverseCubic),
        ],
    ) {
        let end = start + duration;
        let mut prev = init;
        for i in 0..=40 {
            let epoch = start - 1.0 + i as f64 * (duration + 2.0) / 40.0;
            let s = interpolate(epoch, start, end, init, final_val, func);
            prop_assert!(s >= prev - 1e-12);
            prop_assert!(s >= init - 1e-12 && s <= final_val + 1e-12);
            prev = s;
        }
    }

    /// Nothing fires before start; start always fires; nothing fires after end
    #[test]
    fn readiness_respects_window(
        start in 0u32..20,
        duration in 1u32..20,
        freq in prop_oneof![Just(-1.0f64), Just(0.0), 0.25f64..3.0],
        spe in 1usize..8,
    ) {
        let start = f64::from(start);
        let end = start + f64::from(duration);
        let window = EpochWindow::new(start, end, freq).unwrap();
        let fired = window.update_epochs(end + 3.0, spe);

        prop_assert!(!fired.is_empty());
        prop_assert_eq!(fired[0], (start, UpdateKind::Start));
        prop_assert_eq!(fired.last().copied(), Some((end, UpdateKind::End)));
        prop_assert!(fired.iter().all(|(e, _)| *e >= start && *e <= end));
        prop_assert!(fired.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
