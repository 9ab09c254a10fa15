//! Modifier Lifecycle Integration Tests
//!
//! Drives recipes through a simulated training loop on the in-memory
//! engine: step-granular updates, gradient masking through SGD, checkpoint
//! resume, and the recipe files shipped under `recipes/`.

use std::path::Path;

use approx::assert_relative_eq;
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use podar::engine::{InMemoryEngine, TensorEngine};
use podar::prune::{
    fractional_epoch, load_mask_state, mask_sparsity, save_mask_state, ScheduleState,
    ScheduledModifierManager,
};

const STEPS_PER_EPOCH: usize = 4;
const WEIGHTS: [&str; 2] = ["seq.fc1.weight", "seq.fc2.weight"];

fn random_tensor(rng: &mut StdRng, shape: &[usize]) -> ArrayD<f32> {
    let len = shape.iter().product();
    let data = (0..len).map(|_| rng.random_range(-1.0f32..1.0)).collect();
    ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
}

fn model(seed: u64) -> InMemoryEngine {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut engine = InMemoryEngine::new();
    engine.add_parameter(WEIGHTS[0], random_tensor(&mut rng, &[8, 4]), true);
    engine.add_parameter("seq.fc1.bias", random_tensor(&mut rng, &[8]), false);
    engine.add_parameter(WEIGHTS[1], random_tensor(&mut rng, &[4, 8]), true);
    engine.add_parameter("seq.fc2.bias", random_tensor(&mut rng, &[4]), false);
    engine.add_layer("seq.fc1", true);
    engine.add_layer("seq.act1", false);
    engine.add_layer("seq.fc2", true);
    engine
}

fn zeros(engine: &InMemoryEngine, name: &str) -> usize {
    engine.values(name).unwrap().iter().filter(|&&v| v == 0.0).count()
}

/// One optimizer step with random gradients on every parameter.
fn train_step(engine: &mut InMemoryEngine, manager: &mut ScheduledModifierManager, rng: &mut StdRng) {
    engine.zero_grad();
    for info in engine.parameters() {
        let handle = engine.resolve_parameter(&info.name).unwrap();
        let grad = random_tensor(rng, &info.shape);
        engine.backward(handle, grad).unwrap();
    }
    manager.optimizer_pre_step(engine).unwrap();
    engine.sgd_step(0.05);
    manager.optimizer_post_step(engine).unwrap();
}

/// Run `epochs` epochs, returning the applied sparsity of the first
/// modifier after every update it made.
fn train(
    engine: &mut InMemoryEngine,
    manager: &mut ScheduledModifierManager,
    epochs: std::ops::Range<usize>,
    seed: u64,
) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut applied = Vec::new();
    for epoch in epochs {
        for step in 0..STEPS_PER_EPOCH {
            let e = fractional_epoch(epoch, step, STEPS_PER_EPOCH);
            if manager.update_ready(e, STEPS_PER_EPOCH) {
                manager.scheduled_update(engine, e, STEPS_PER_EPOCH).unwrap();
                if let Some(s) = manager.modifiers()[0].applied_sparsity() {
                    applied.push((e, s));
                }
                for name in WEIGHTS {
                    let state = manager.state_dict();
                    let mask = &state[&format!("{name}.sparsity_mask")];
                    assert_eq!(
                        zeros(engine, name),
                        mask.iter().filter(|&&v| v == 0.0).count(),
                        "{name} zeros must match its mask right after the update at {e}"
                    );
                }
            }
            train_step(engine, manager, &mut rng);
        }
    }
    applied
}

const GRADUAL: &str = r#"
modifiers:
  - !GMPruningModifier
    init_sparsity: 0.0
    final_sparsity: 0.75
    start_epoch: 0.0
    end_epoch: 2.0
    update_frequency: 0.5
    params: ["re:seq\\..*\\.weight"]
    inter_func: linear
"#;

#[test]
fn gradual_recipe_reaches_final_sparsity_at_step_granularity() {
    let mut engine = model(7);
    let mut manager = ScheduledModifierManager::from_yaml(GRADUAL).unwrap();
    manager.initialize(&mut engine).unwrap();

    let applied = train(&mut engine, &mut manager, 0..3, 11);
    let epochs: Vec<f64> = applied.iter().map(|(e, _)| *e).collect();
    assert_eq!(epochs, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    let expected = [0.0, 0.1875, 0.375, 0.5625, 0.75];
    for ((_, got), want) in applied.iter().zip(expected) {
        assert_relative_eq!(*got, want, epsilon = 1e-12);
    }

    // masked weights stayed at zero through every later SGD step
    for name in WEIGHTS {
        assert_eq!(zeros(&engine, name), 24, "{name} must end at 24 of 32 zeros");
    }
    // biases are not prunable and were never masked
    assert_eq!(zeros(&engine, "seq.fc1.bias"), 0);
    assert_eq!(manager.modifiers()[0].state(), ScheduleState::Completed);

    manager.finalize(&mut engine).unwrap();
    assert_eq!(engine.hook_count(), 0);
    assert_eq!(manager.modifiers()[0].state(), ScheduleState::Finalized);
}

#[test]
fn resume_from_checkpoint_continues_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("epoch1.safetensors");

    let mut engine = model(3);
    let mut manager = ScheduledModifierManager::from_yaml(GRADUAL).unwrap();
    manager.initialize(&mut engine).unwrap();
    train(&mut engine, &mut manager, 0..1, 5);
    save_mask_state(&path, &manager.state_dict()).unwrap();
    let zeros_at_save: Vec<usize> = WEIGHTS.iter().map(|n| zeros(&engine, n)).collect();

    // a fresh process: same weights, masks restored from disk
    let mut resumed_engine = InMemoryEngine::new();
    for info in engine.parameters() {
        resumed_engine.add_parameter(
            info.name.clone(),
            engine.values(&info.name).unwrap().clone(),
            info.prunable,
        );
    }
    let mut resumed = ScheduledModifierManager::from_yaml(GRADUAL).unwrap();
    resumed.initialize(&mut resumed_engine).unwrap();
    resumed.load_state_dict(&mut resumed_engine, &load_mask_state(&path).unwrap()).unwrap();
    for (name, expected) in WEIGHTS.iter().zip(&zeros_at_save) {
        assert_eq!(zeros(&resumed_engine, name), *expected);
    }

    // catching up at epoch 1 fires the start update, then the schedule continues
    let applied = train(&mut resumed_engine, &mut resumed, 1..3, 9);
    assert_eq!(applied.last().map(|(e, s)| (*e, *s)), Some((2.0, 0.75)));
    for name in WEIGHTS {
        let state = resumed.state_dict();
        assert_eq!(mask_sparsity(&state[&format!("{name}.sparsity_mask")]), 0.75);
    }
}

#[test]
fn mixed_recipe_runs_every_modifier_in_one_loop() {
    let recipe = r#"
modifiers:
  - !MovementPruningModifier
    init_sparsity: 0.25
    final_sparsity: 0.5
    start_epoch: 0.0
    end_epoch: 2.0
    update_frequency: 1.0
    params: seq.fc1.weight
  - !MFACPruningModifier
    init_sparsity: 0.25
    final_sparsity: 0.5
    start_epoch: 0.5
    end_epoch: 1.5
    params: seq.fc2.weight
    mfac_options:
      num_grads: 4
  - !LayerPruningModifier
    layers: seq.act1
    start_epoch: 1.0
    end_epoch: 2.0
"#;
    let mut engine = model(21);
    let mut manager = ScheduledModifierManager::from_yaml(recipe).unwrap();
    assert_eq!(manager.len(), 3);
    manager.initialize(&mut engine).unwrap();

    let mut rng = StdRng::seed_from_u64(4);
    let mut ablated_at = Vec::new();
    for epoch in 0..3 {
        for step in 0..STEPS_PER_EPOCH {
            let e = fractional_epoch(epoch, step, STEPS_PER_EPOCH);
            manager.scheduled_update(&mut engine, e, STEPS_PER_EPOCH).unwrap();
            if engine.is_layer_ablated("seq.act1").unwrap() {
                ablated_at.push(e);
            }
            train_step(&mut engine, &mut manager, &mut rng);
        }
    }

    assert_eq!(zeros(&engine, WEIGHTS[0]), 16);
    assert_eq!(zeros(&engine, WEIGHTS[1]), 16);
    assert_eq!(ablated_at, vec![1.0, 1.25, 1.5, 1.75]);
    assert_eq!(manager.state_dict().len(), 2);

    manager.finalize(&mut engine).unwrap();
    assert!(!engine.is_layer_ablated("seq.act1").unwrap());
    assert_eq!(engine.hook_count(), 0);
}

#[test]
fn shipped_recipes_are_valid() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("recipes");
    let mut count = 0;
    for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let manager = ScheduledModifierManager::from_path(&path)
            .unwrap_or_else(|e| panic!("Failed to load {}: {e}", path.display()));
        assert!(!manager.is_empty(), "{}: recipe must list modifiers", path.display());
        let yaml = manager.to_yaml().unwrap();
        let again = ScheduledModifierManager::from_yaml(&yaml).unwrap();
        assert_eq!(again.to_yaml().unwrap(), yaml, "{} must round-trip", path.display());
        count += 1;
    }
    assert!(count >= 3, "expected the bundled recipes under {}", dir.display());
}
