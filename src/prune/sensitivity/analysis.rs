//! Sensitivity records and their per-parameter summaries.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PruneError, Result};

const SPARSITY_MATCH_TOLERANCE: f64 = 1e-9;

/// Sparsity levels swept when the caller does not choose any.
///
/// The short sweep suits one-shot runs, where every level costs several
/// forward passes per parameter. The extended sweep is cheap enough for the
/// magnitude approximation.
pub fn default_check_sparsities_loss(extended: bool) -> Vec<f64> {
    if !extended {
        return vec![0.0, 0.2, 0.4, 0.6, 0.7, 0.8, 0.85, 0.9, 0.95, 0.99];
    }
    let mut levels = vec![0.0];
    levels.extend((1..20).map(|i| f64::from(i) * 0.05));
    levels.extend([0.975, 0.99]);
    levels
}

/// One measurement of one parameter at one sparsity level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRecord {
    /// Optional caller-assigned identifier (e.g. a layer id).
    pub id: Option<String>,
    /// Parameter name.
    pub name: String,
    /// Position of the parameter in the sweep.
    pub index: usize,
    /// Sparsity the value was measured at.
    pub sparsity: f64,
    /// Loss, or mean pruned magnitude for the approximation.
    pub value: f64,
    /// Whether this is a dense (sparsity ~ 0) reference point.
    pub baseline: bool,
}

/// Append-only list of sensitivity records in measurement order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KsLossSensitivityAnalysis {
    records: Vec<SensitivityRecord>,
}

impl KsLossSensitivityAnalysis {
    /// Empty analysis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record.
    pub fn add_result(
        &mut self,
        id: Option<String>,
        name: impl Into<String>,
        index: usize,
        sparsity: f64,
        value: f64,
        baseline: bool,
    ) {
        self.records.push(SensitivityRecord {
            id,
            name: name.into(),
            index,
            sparsity,
            value,
            baseline,
        });
    }

    /// Every record in the order it was added.
    pub fn records(&self) -> &[SensitivityRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records grouped per parameter, in first-seen order.
    pub fn results(&self) -> Vec<KsLossSensitivityResult> {
        let mut results: Vec<KsLossSensitivityResult> = Vec::new();
        for record in &self.records {
            let position = results
                .iter()
                .position(|r| r.index == record.index && r.name == record.name);
            let result = match position {
                Some(position) => &mut results[position],
                None => {
                    results.push(KsLossSensitivityResult::new(record));
                    let last = results.len() - 1;
                    &mut results[last]
                }
            };
            result.push(record);
        }
        results
    }

    /// Summary for one parameter.
    pub fn result(&self, name: &str) -> Option<KsLossSensitivityResult> {
        self.results().into_iter().find(|r| r.name == name)
    }

    /// Per-parameter summaries, most sensitive (largest integral) first.
    pub fn ranked(&self) -> Vec<KsLossSensitivityResult> {
        let mut results = self.results();
        results.sort_by(|a, b| b.sparse_integral().total_cmp(&a.sparse_integral()));
        results
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PruneError::Serialization { path: None, message: e.to_string() })
    }

    /// Parse JSON produced by [`KsLossSensitivityAnalysis::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PruneError::Serialization { path: None, message: e.to_string() })
    }

    /// Write the analysis as JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| PruneError::Io {
            context: format!("writing {}", path.display()),
            source,
        })
    }

    /// Read an analysis written by [`KsLossSensitivityAnalysis::save_json`].
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PruneError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?;
        serde_json::from_str(&json).map_err(|e| PruneError::Serialization {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })
    }
}

/// Everything measured for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct KsLossSensitivityResult {
    /// Caller-assigned identifier of the first record.
    pub id: Option<String>,
    /// Parameter name.
    pub name: String,
    /// Position of the parameter in the sweep.
    pub index: usize,
    /// Values per sparsity level, levels in first-seen order.
    pub measurements: Vec<(f64, Vec<f64>)>,
    baseline_values: Vec<f64>,
}

impl KsLossSensitivityResult {
    fn new(record: &SensitivityRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            index: record.index,
            measurements: Vec::new(),
            baseline_values: Vec::new(),
        }
    }

    fn push(&mut self, record: &SensitivityRecord) {
        if record.baseline {
            self.baseline_values.push(record.value);
        }
        let level = self
            .measurements
            .iter_mut()
            .find(|(sparsity, _)| (sparsity - record.sparsity).abs() < SPARSITY_MATCH_TOLERANCE);
        match level {
            Some((_, values)) => values.push(record.value),
            None => self.measurements.push((record.sparsity, vec![record.value])),
        }
    }

    /// Mean of the baseline records, if any were taken.
    pub fn baseline(&self) -> Option<f64> {
        mean(&self.baseline_values)
    }

    /// `(sparsity, mean value)` pairs sorted by sparsity.
    pub fn averages(&self) -> Vec<(f64, f64)> {
        let mut averages: Vec<(f64, f64)> = self
            .measurements
            .iter()
            .filter_map(|(sparsity, values)| mean(values).map(|m| (*sparsity, m)))
            .collect();
        averages.sort_by(|a, b| a.0.total_cmp(&b.0));
        averages
    }

    /// Trapezoid area under the averaged curve over sparsity.
    pub fn sparse_integral(&self) -> f64 {
        self.averages()
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0) * (pair[0].1 + pair[1].1) / 2.0)
            .sum()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
