//! Output transforms: raw margins to class probabilities.

use serde::Deserialize;

/// How raw forest margins map to class probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Softmax across K groups.
    Multiclass,
    /// Independent sigmoid per group (one-vs-all).
    MulticlassOva,
    /// One group; probabilities are `[1 - p, p]`.
    Binary,
}

impl Objective {
    /// Number of raw output groups the forest needs for `n_classes` classes.
    pub fn n_groups(&self, n_classes: usize) -> usize {
        match self {
            Objective::Binary => 1,
            Objective::Multiclass | Objective::MulticlassOva => n_classes,
        }
    }

    /// Number of classes a forest with `n_groups` groups produces.
    pub fn n_classes(&self, n_groups: usize) -> usize {
        match self {
            Objective::Binary => 2,
            Objective::Multiclass | Objective::MulticlassOva => n_groups,
        }
    }

    /// Transform raw margins into per-class probabilities.
    pub fn transform(&self, raw: &[f64]) -> Vec<f64> {
        match self {
            Objective::Multiclass => {
                let mut values = raw.to_vec();
                softmax_inplace(&mut values);
                values
            }
            Objective::MulticlassOva => raw.iter().map(|&x| sigmoid(x)).collect(),
            Objective::Binary => {
                let p = raw.first().copied().map(sigmoid).unwrap_or(0.5);
                vec![1.0 - p, p]
            }
        }
    }
}

/// Sigmoid function: 1 / (1 + exp(-x))
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax in-place over a slice.
pub fn softmax_inplace(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }

    // Subtract the max so exp() cannot overflow
    let max_val = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0;
    for val in values.iter_mut() {
        *val = (*val - max_val).exp();
        sum += *val;
    }

    if sum > 0.0 {
        for val in values.iter_mut() {
            *val /= sum;
        }
    }
}

/// Index of the maximum value; first index wins on ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = idx;
        }
    }
    best
}
