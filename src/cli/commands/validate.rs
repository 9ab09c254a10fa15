//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::{LogLevel, ValidateArgs};
use crate::prune::{ModifierConfig, ScheduledModifierManager};

fn format_epoch(epoch: f64) -> String {
    if epoch < 0.0 {
        "-".to_string()
    } else {
        format!("{epoch}")
    }
}

/// Format the epoch window of a modifier as a string
pub fn format_window(config: &ModifierConfig) -> String {
    let window = config.window();
    let cadence = if window.update_frequency == 0.0 {
        "every step".to_string()
    } else if window.is_periodic() {
        format!("every {}", window.update_frequency)
    } else {
        "at boundaries".to_string()
    };
    format!(
        "epochs {} .. {} ({cadence})",
        format_epoch(window.start_epoch),
        format_epoch(window.end_epoch)
    )
}

/// Format one modifier as a summary line
pub fn format_modifier(config: &ModifierConfig) -> String {
    let mut line = format!("  {}: {}", config.name(), format_window(config));
    if let Some(gradual) = config.gradual() {
        line.push_str(&format!(
            ", sparsity {} -> {} ({}, {})",
            gradual.init_sparsity,
            gradual.final_sparsity,
            gradual.inter_func,
            gradual.mask_type.descriptor()
        ));
        if gradual.phased {
            line.push_str(", phased");
        }
    }
    if config.is_global() {
        line.push_str(", global");
    }
    match config {
        ModifierConfig::LayerPruning(args) => line.push_str(&format!(", layers {}", args.layers)),
        _ => {
            if let Some(params) = config.params() {
                line.push_str(&format!(", params {params}"));
            }
        }
    }
    line
}

/// Format the whole recipe as a summary
pub fn format_recipe(manager: &ScheduledModifierManager) -> String {
    let mut lines = vec![format!("Recipe with {} modifier(s):", manager.len())];
    lines.extend(manager.modifiers().iter().map(|m| format_modifier(m.config())));
    lines.push(format!("  Last epoch: {}", manager.max_epoch()));
    lines.join("\n")
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Validating recipe: {}", args.recipe.display()),
    );

    let manager = ScheduledModifierManager::from_path(&args.recipe)
        .map_err(|e| format!("Validation failed: {e}"))?;

    log(level, LogLevel::Normal, "Recipe is valid");
    log(level, LogLevel::Normal, &format_recipe(&manager));

    if level == LogLevel::Verbose {
        let normalized = manager.to_yaml().map_err(|e| format!("Serialization failed: {e}"))?;
        log(level, LogLevel::Verbose, "Normalized recipe (defaults filled in):");
        log(level, LogLevel::Verbose, &normalized);
    }
    Ok(())
}
