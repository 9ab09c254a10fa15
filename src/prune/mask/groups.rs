//! Group layouts and lowest-score selection shared by every mask creator.

use super::MaskCreator;

/// Assignment of each flattened element to a pruning group.
#[derive(Debug, Clone)]
pub(crate) struct GroupLayout {
    /// Group index per element, in row-major order.
    pub group_of: Vec<usize>,
    /// Number of distinct groups.
    pub num_groups: usize,
}

impl GroupLayout {
    /// Build the layout a creator uses for a tensor shape.
    ///
    /// Group indices increase with the flat index of each group's first
    /// element, so ordering by group index is ordering by flat index.
    pub fn new(creator: &MaskCreator, shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        if numel == 0 {
            return Self { group_of: Vec::new(), num_groups: 0 };
        }

        match creator {
            MaskCreator::Filter if shape.len() >= 2 => {
                let inner = numel / shape[0];
                Self { group_of: (0..numel).map(|i| i / inner).collect(), num_groups: shape[0] }
            }
            MaskCreator::Channel if shape.len() >= 2 => {
                let inner: usize = shape[2..].iter().product();
                Self {
                    group_of: (0..numel).map(|i| (i / inner) % shape[1]).collect(),
                    num_groups: shape[1],
                }
            }
            MaskCreator::Block { shape: [bh, bw] } => {
                let rows = if shape.len() >= 2 { shape[0] } else { 1 };
                let cols = numel / rows;
                let col_blocks = cols.div_ceil(*bw);
                let row_blocks = rows.div_ceil(*bh);
                let group_of = (0..numel)
                    .map(|i| {
                        let (r, c) = (i / cols, i % cols);
                        (r / bh) * col_blocks + c / bw
                    })
                    .collect();
                Self { group_of, num_groups: row_blocks * col_blocks }
            }
            _ => Self { group_of: (0..numel).collect(), num_groups: numel },
        }
    }

    /// Mean score and element count per group.
    pub fn reduce(&self, scores: impl Iterator<Item = f32>) -> Vec<(f64, usize)> {
        let mut acc = vec![(0.0f64, 0usize); self.num_groups];
        for (score, &group) in scores.zip(&self.group_of) {
            acc[group].0 += f64::from(score);
            acc[group].1 += 1;
        }
        acc.into_iter()
            .map(|(sum, count)| if count == 0 { (0.0, 0) } else { (sum / count as f64, count) })
            .collect()
    }
}

/// One rankable group across one or more tensors.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub score: f64,
    pub tensor: usize,
    pub group: usize,
    pub size: usize,
}

/// Pick the lowest-scoring groups whose sizes sum closest to `sparsity * total`.
///
/// Groups are ranked by score ascending, ties broken by (tensor, group)
/// index. For single-element groups this prunes exactly
/// `round(sparsity * total)` elements.
pub(crate) fn select_lowest(mut candidates: Vec<Candidate>, sparsity: f64) -> Vec<Candidate> {
    if sparsity <= 0.0 || candidates.is_empty() {
        return Vec::new();
    }
    if sparsity >= 1.0 {
        return candidates;
    }

    let total: usize = candidates.iter().map(|c| c.size).sum();
    let target = sparsity * total as f64;

    candidates.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.tensor.cmp(&b.tensor))
            .then_with(|| a.group.cmp(&b.group))
    });

    let mut pruned = 0usize;
    let mut selected = Vec::new();
    for candidate in candidates {
        // keep adding while the running total stays within half a group of the target
        if (pruned as f64) + (candidate.size as f64) / 2.0 <= target {
            pruned += candidate.size;
            selected.push(candidate);
        } else {
            break;
        }
    }
    selected
}
