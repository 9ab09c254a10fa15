//! Epoch-window bookkeeping shared by every modifier variant.

use std::fmt;

use crate::error::{PruneError, Result};

/// Slack used when comparing fractional epochs.
const EPOCH_TOLERANCE: f64 = 1e-6;

/// Most steps [`EpochWindow::update_epochs`] walks.
pub const MAX_DRY_RUN_STEPS: u64 = 1_000_000;

/// Lifecycle state of a scheduled modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    /// Not yet bound to an engine.
    Uninitialized,
    /// Bound, waiting for `start_epoch`.
    Pending,
    /// Between `start_epoch` and `end_epoch`.
    Active,
    /// Past `end_epoch`.
    Completed,
    /// Started with no `end_epoch`.
    ActiveIndefinite,
    /// Hooks released; no further calls allowed.
    Finalized,
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScheduleState::Uninitialized => "uninitialized",
            ScheduleState::Pending => "pending",
            ScheduleState::Active => "active",
            ScheduleState::Completed => "completed",
            ScheduleState::ActiveIndefinite => "active (no end)",
            ScheduleState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Why an update is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// First update, at or after `start_epoch`.
    Start,
    /// A new `update_frequency` interval began inside the window.
    Periodic {
        /// Zero-based interval index counted from `start_epoch`.
        interval: u64,
    },
    /// `end_epoch` was reached.
    End,
}

/// When a modifier runs: `[start_epoch, end_epoch]` plus an update cadence.
///
/// - `end_epoch < 0` means the window never closes
/// - `update_frequency > 0` updates at every `start + k * freq` inside the window
/// - `update_frequency == 0` updates at every new epoch value inside the window
/// - `update_frequency <= -1` updates only at the window boundaries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochWindow {
    /// First epoch the modifier acts at.
    pub start_epoch: f64,
    /// Last epoch the modifier acts at, negative for never.
    pub end_epoch: f64,
    /// Cadence of updates inside the window.
    pub update_frequency: f64,
}

impl EpochWindow {
    /// Build a validated window.
    pub fn new(start_epoch: f64, end_epoch: f64, update_frequency: f64) -> Result<Self> {
        let window = Self { start_epoch, end_epoch, update_frequency };
        window.validate()?;
        Ok(window)
    }

    /// Check the window for contradictions.
    ///
    /// # Errors
    ///
    /// Returns `Config` for non-finite values, `start_epoch > end_epoch`
    /// with a closing end, or an `update_frequency` in `(-1, 0)`.
    pub fn validate(&self) -> Result<()> {
        if !self.start_epoch.is_finite()
            || !self.end_epoch.is_finite()
            || !self.update_frequency.is_finite()
        {
            return Err(PruneError::config(format!(
                "epochs must be finite (start_epoch={}, end_epoch={}, update_frequency={})",
                self.start_epoch, self.end_epoch, self.update_frequency
            )));
        }
        if self.has_end() && self.start_epoch > self.end_epoch {
            return Err(PruneError::config(format!(
                "start_epoch ({}) must not be after end_epoch ({})",
                self.start_epoch, self.end_epoch
            )));
        }
        if self.update_frequency > -1.0 && self.update_frequency < 0.0 {
            return Err(PruneError::config(format!(
                "update_frequency ({}) must be >= 0, or <= -1 to update only at start and end",
                self.update_frequency
            )));
        }
        Ok(())
    }

    /// Whether the window closes.
    pub fn has_end(&self) -> bool {
        self.end_epoch >= 0.0
    }

    /// Whether updates happen between the boundaries.
    pub fn is_periodic(&self) -> bool {
        self.update_frequency >= 0.0
    }

    /// Interval index of `epoch`, counted in `update_frequency` units from the start.
    pub fn interval_index(&self, epoch: f64, steps_per_epoch: usize) -> u64 {
        if self.update_frequency <= 0.0 || epoch < self.start_epoch {
            return 0;
        }
        let raw = (epoch - self.start_epoch + tolerance(steps_per_epoch)) / self.update_frequency;
        raw.floor() as u64
    }

    /// Epochs at which updates fire, for a loop running `epochs` epochs.
    ///
    /// Walks the schedule one step at a time (`steps_per_epoch = 0` walks
    /// whole epochs), which is what a training loop would see. The walk
    /// stops after [`MAX_DRY_RUN_STEPS`] steps.
    pub fn update_epochs(&self, epochs: f64, steps_per_epoch: usize) -> Vec<(f64, UpdateKind)> {
        let mut scheduler = Scheduler::new(*self);
        let per_epoch = steps_per_epoch.max(1);
        let requested = epochs.max(0.0) * per_epoch as f64;
        let total_steps = if requested.is_finite() {
            (requested.ceil() as u64).min(MAX_DRY_RUN_STEPS)
        } else {
            0
        };
        let mut fired = Vec::new();
        for step in 0..=total_steps {
            let epoch = step as f64 / per_epoch as f64;
            if let Some(kind) = scheduler.pending(epoch, steps_per_epoch) {
                scheduler.record(kind, epoch, steps_per_epoch);
                fired.push((epoch, kind));
            }
        }
        fired
    }
}

fn tolerance(steps_per_epoch: usize) -> f64 {
    if steps_per_epoch > 0 {
        (0.5 / steps_per_epoch as f64).min(EPOCH_TOLERANCE)
    } else {
        EPOCH_TOLERANCE
    }
}

/// Tracks which updates of an [`EpochWindow`] already happened.
///
/// Asking [`Scheduler::pending`] is free of side effects; only
/// [`Scheduler::record`] advances the state, so repeated calls at a
/// non-boundary epoch never produce duplicate updates.
#[derive(Debug, Clone)]
pub struct Scheduler {
    window: EpochWindow,
    started: bool,
    ended: bool,
    last_interval: u64,
    last_epoch: Option<f64>,
}

impl Scheduler {
    /// Fresh scheduler, nothing applied yet.
    pub fn new(window: EpochWindow) -> Self {
        Self { window, started: false, ended: false, last_interval: 0, last_epoch: None }
    }

    /// The window being tracked.
    pub fn window(&self) -> &EpochWindow {
        &self.window
    }

    /// Whether the start update happened.
    pub fn started(&self) -> bool {
        self.started
    }

    /// Whether the end update happened.
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Epoch of the most recent recorded update.
    pub fn last_epoch(&self) -> Option<f64> {
        self.last_epoch
    }

    /// State implied by the recorded updates.
    pub fn state(&self) -> ScheduleState {
        match (self.started, self.ended) {
            (false, _) => ScheduleState::Pending,
            (true, true) => ScheduleState::Completed,
            (true, false) if !self.window.has_end() => ScheduleState::ActiveIndefinite,
            (true, false) => ScheduleState::Active,
        }
    }

    /// The update due at `epoch`, if any.
    ///
    /// When the first call already lies past `end_epoch`, only `End` is
    /// reported; callers treat it as start and end at once.
    pub fn pending(&self, epoch: f64, steps_per_epoch: usize) -> Option<UpdateKind> {
        if self.ended {
            return None;
        }
        let tol = tolerance(steps_per_epoch);
        let reached_end = self.window.has_end() && epoch + tol >= self.window.end_epoch;

        if !self.started {
            if epoch + tol < self.window.start_epoch {
                return None;
            }
            return Some(if reached_end { UpdateKind::End } else { UpdateKind::Start });
        }
        if reached_end {
            return Some(UpdateKind::End);
        }

        let freq = self.window.update_frequency;
        if freq > 0.0 {
            let interval = self.window.interval_index(epoch, steps_per_epoch);
            (interval > self.last_interval).then_some(UpdateKind::Periodic { interval })
        } else if freq == 0.0 {
            let fresh = self.last_epoch.map_or(true, |last| epoch > last + tol);
            fresh.then_some(UpdateKind::Periodic { interval: 0 })
        } else {
            None
        }
    }

    /// Mark an update as applied.
    pub fn record(&mut self, kind: UpdateKind, epoch: f64, steps_per_epoch: usize) {
        match kind {
            UpdateKind::Start => {
                self.started = true;
                self.last_interval = self.window.interval_index(epoch, steps_per_epoch);
            }
            UpdateKind::Periodic { interval } => self.last_interval = interval,
            UpdateKind::End => {
                self.started = true;
                self.ended = true;
            }
        }
        self.last_epoch = Some(epoch);
    }
}
