//! Schedule command implementation
//!
//! Dry-runs every modifier's epoch window without an engine.

use super::validate::format_window;
use crate::cli::logging::log;
use crate::cli::{LogLevel, ScheduleArgs};
use crate::prune::{ModifierConfig, ScheduledModifierManager, UpdateKind, MAX_DRY_RUN_STEPS};

fn kind_label(kind: UpdateKind) -> String {
    match kind {
        UpdateKind::Start => "start".to_string(),
        UpdateKind::Periodic { interval } => format!("interval {interval}"),
        UpdateKind::End => "end".to_string(),
    }
}

/// What an update of `kind` at `epoch` does for this modifier
pub fn describe_update(config: &ModifierConfig, kind: UpdateKind, epoch: f64) -> String {
    match config {
        ModifierConfig::LayerPruning(_) => match kind {
            UpdateKind::End => "restore layers".to_string(),
            _ => "remove layers".to_string(),
        },
        ModifierConfig::ConstantPruning(_) => match kind {
            UpdateKind::Start => "freeze zero pattern".to_string(),
            UpdateKind::Periodic { .. } => "hold masks".to_string(),
            UpdateKind::End => "release masks".to_string(),
        },
        _ => match config.gradual() {
            Some(gradual) => format!("sparsity {:.4}", gradual.sparsity_for(kind, epoch)),
            None => String::new(),
        },
    }
}

/// One line per update a modifier fires within `epochs`
pub fn schedule_lines(config: &ModifierConfig, epochs: f64, steps_per_epoch: usize) -> Vec<String> {
    config
        .window()
        .update_epochs(epochs, steps_per_epoch)
        .into_iter()
        .map(|(epoch, kind)| {
            format!(
                "    epoch {epoch:>8.3}  {:<12} {}",
                kind_label(kind),
                describe_update(config, kind, epoch)
            )
        })
        .collect()
}

pub fn run_schedule(args: ScheduleArgs, level: LogLevel) -> Result<(), String> {
    let manager = ScheduledModifierManager::from_path(&args.recipe)
        .map_err(|e| format!("Recipe error: {e}"))?;
    let epochs = args.epochs.unwrap_or_else(|| manager.max_epoch());
    if epochs.is_nan() || epochs < 0.0 {
        return Err(format!("--epochs must be non-negative, got {epochs}"));
    }
    let steps = epochs * args.steps_per_epoch.max(1) as f64;
    if steps > MAX_DRY_RUN_STEPS as f64 {
        return Err(format!(
            "--epochs {epochs} at {} step(s) per epoch exceeds the {MAX_DRY_RUN_STEPS} step dry-run limit",
            args.steps_per_epoch
        ));
    }

    log(
        level,
        LogLevel::Normal,
        &format!(
            "Schedule for {} over {epochs} epoch(s), {} step(s) per epoch",
            args.recipe.display(),
            args.steps_per_epoch
        ),
    );
    for modifier in manager.modifiers() {
        let lines = schedule_lines(modifier.config(), epochs, args.steps_per_epoch);
        log(level, LogLevel::Normal, &format!("  {} ({} update(s))", modifier.name(), lines.len()));
        log(level, LogLevel::Verbose, &format!("  {}", format_window(modifier.config())));
        for line in lines {
            log(level, LogLevel::Normal, &line);
        }
    }
    Ok(())
}
