//! Stochastic policies over a finite action set.
//!
//! A policy is an `(n_states, n_actions)` matrix whose row `s` is the
//! probability distribution over actions taken in state `s`.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};

/// Slack allowed when checking that a probability row adds up to 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-8;

/// Action-values within this distance of the maximum count as tied.
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Returns `Some(sum)` when `row` is not a probability distribution: a
/// negative or non-finite entry, or a sum further than
/// [`PROBABILITY_TOLERANCE`] from 1.
pub(crate) fn distribution_defect(row: ArrayView1<f64>) -> Option<f64> {
    let sum = row.sum();
    let valid = row.iter().all(|&p| p.is_finite() && p >= 0.0)
        && (sum - 1.0).abs() <= PROBABILITY_TOLERANCE;
    if valid {
        None
    } else {
        Some(sum)
    }
}

/// The uniform-random policy: every action has probability `1 / n_actions`.
pub fn uniform(n_states: usize, n_actions: usize) -> Array2<f64> {
    Array2::from_elem((n_states, n_actions), 1.0 / n_actions as f64)
}

/// Checks the shape of `policy` and that each state's row adds up to 1.
pub fn validate(policy: &Array2<f64>, n_states: usize, n_actions: usize) -> Result<()> {
    if policy.nrows() != n_states {
        return Err(Error::DimensionMismatch {
            what: "policy states",
            expected: n_states,
            found: policy.nrows(),
        });
    }
    if policy.ncols() != n_actions {
        return Err(Error::DimensionMismatch {
            what: "policy actions",
            expected: n_actions,
            found: policy.ncols(),
        });
    }
    for (state, row) in policy.rows().into_iter().enumerate() {
        if let Some(sum) = distribution_defect(row) {
            return Err(Error::MalformedPolicy { state, sum });
        }
    }
    Ok(())
}

/// All actions whose value ties with the maximum of `values`, in index order.
///
/// Works on action-values as well as on policy rows, where it recovers the
/// set of actions a greedy policy shares its mass between.
pub fn best_actions(values: ArrayView1<f64>) -> Vec<usize> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values
        .iter()
        .enumerate()
        .filter(|&(_, &q)| max - q <= TIE_TOLERANCE)
        .map(|(a, _)| a)
        .collect()
}

/// Spreads probability evenly across the actions that maximise `q`.
///
/// Ties are shared, never broken by index: two tied actions get 0.5 each.
pub fn greedy_row(q: ArrayView1<f64>) -> Array1<f64> {
    let mut row = Array1::zeros(q.len());
    let best = best_actions(q);
    let share = 1.0 / best.len() as f64;
    for a in best {
        row[a] = share;
    }
    row
}
