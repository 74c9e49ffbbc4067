//! Policy evaluation: the value function of a fixed policy, either by solving
//! the Bellman expectation equations directly or by repeated backups.

use super::engine::Mdp;
use super::policy;
use crate::error::{Error, Result};
use crate::math::linear_system;
use log::{debug, trace};
use ndarray::{Array1, Array2};
use std::fmt;
use std::str::FromStr;

/// Below this many states the direct solve is chosen by default.
pub const DIRECT_SOLVE_MAX_STATES: usize = 30;

/// How [`Mdp::evaluate_policy`] computes the value function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMethod {
    /// Solve `(I - gamma * P_pi) v = R_pi` exactly. O(n^3).
    Solve,
    /// Apply `v <- R_pi + gamma * P_pi * v` until the caller stops pulling.
    Iter,
}

impl EvaluationMethod {
    /// Direct solve for small state spaces, iteration otherwise.
    pub fn for_states(n_states: usize) -> Self {
        if n_states < DIRECT_SOLVE_MAX_STATES {
            EvaluationMethod::Solve
        } else {
            EvaluationMethod::Iter
        }
    }
}

impl FromStr for EvaluationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "solve" => Ok(EvaluationMethod::Solve),
            "iter" => Ok(EvaluationMethod::Iter),
            other => Err(Error::InvalidMethod(other.to_string())),
        }
    }
}

impl fmt::Display for EvaluationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMethod::Solve => write!(f, "solve"),
            EvaluationMethod::Iter => write!(f, "iter"),
        }
    }
}

/// Synchronous Bellman expectation backups over a snapshot of `P_pi` and `R_pi`.
#[derive(Debug, Clone)]
pub(crate) struct ExpectationBackup {
    p_pi: Array2<f64>,
    r_pi: Array1<f64>,
    gamma: f64,
    v: Array1<f64>,
}

impl ExpectationBackup {
    pub(crate) fn new(p_pi: Array2<f64>, r_pi: Array1<f64>, gamma: f64) -> Self {
        let v = Array1::zeros(r_pi.len());
        Self {
            p_pi,
            r_pi,
            gamma,
            v,
        }
    }

    /// `v <- R_pi + gamma * P_pi * v`, returning the new `v` and its L1 change.
    pub(crate) fn step(&mut self) -> (Array1<f64>, f64) {
        let next = &self.r_pi + &(self.p_pi.dot(&self.v) * self.gamma);
        let epsilon = l1_distance(&next, &self.v);
        self.v = next;
        (self.v.clone(), epsilon)
    }
}

pub(crate) fn l1_distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    (a - b).mapv(f64::abs).sum()
}

#[derive(Debug, Clone)]
enum Stage {
    /// Direct solve not attempted yet.
    Pending(ExpectationBackup),
    /// Exact fixed point, repeated on every pull.
    Solved(Array1<f64>),
    Iterating(ExpectationBackup),
}

/// An endless sequence of `(value_function, epsilon)` pairs for a fixed policy.
///
/// Created by [`Mdp::evaluate_policy`]. The sequence owns a snapshot of the
/// policy-induced model, so it never observes later changes to the MDP.
///
/// With [`EvaluationMethod::Solve`] the exact solution is yielded with
/// `epsilon = 0` forever. If `I - gamma * P_pi` is singular the sequence
/// switches permanently to iterative backups instead of failing; the solve
/// is never retried.
#[derive(Debug, Clone)]
pub struct PolicyEvaluation {
    stage: Stage,
}

impl PolicyEvaluation {
    /// The method actually in use, after any fallback from a singular solve.
    pub fn method(&self) -> EvaluationMethod {
        match self.stage {
            Stage::Pending(_) | Stage::Solved(_) => EvaluationMethod::Solve,
            Stage::Iterating(_) => EvaluationMethod::Iter,
        }
    }
}

impl Iterator for PolicyEvaluation {
    type Item = (Array1<f64>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let stage = match &mut self.stage {
            Stage::Solved(v) => return Some((v.clone(), 0.0)),
            Stage::Iterating(backup) => return Some(backup.step()),
            Stage::Pending(backup) => {
                let n = backup.r_pi.len();
                let a = Array2::<f64>::eye(n) - &(&backup.p_pi * backup.gamma);
                match linear_system::solve(&a, &backup.r_pi) {
                    Some(v) => Stage::Solved(v),
                    None => {
                        debug!("I - gamma * P_pi is singular, falling back to iterative evaluation");
                        Stage::Iterating(backup.clone())
                    }
                }
            }
        };
        self.stage = stage;
        self.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

impl Mdp {
    /// Evaluates `policy` (the uniform-random policy when `None`).
    ///
    /// When `method` is `None`, [`EvaluationMethod::for_states`] picks one.
    /// To select a method by name, parse it: `"iter".parse::<EvaluationMethod>()`
    /// fails with [`Error::InvalidMethod`] for anything but `"solve"` or `"iter"`.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedPolicy`] or [`Error::DimensionMismatch`] if the policy
    /// is invalid. Nothing is computed in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use tabular_mdp::{EvaluationMethod, Mdp};
    ///
    /// // One state that pays 1 forever
    /// let mdp = Mdp::new(array![[[1.0]]], array![[1.0]], 0.5).unwrap();
    ///
    /// let (v, epsilon) = mdp
    ///     .evaluate_policy(None, Some(EvaluationMethod::Solve))
    ///     .unwrap()
    ///     .next()
    ///     .unwrap();
    /// assert!((v[0] - 2.0).abs() < 1e-12);
    /// assert_eq!(epsilon, 0.0);
    ///
    /// let (v, _) = mdp
    ///     .evaluate_policy(None, Some("iter".parse().unwrap()))
    ///     .unwrap()
    ///     .take_while(|&(_, epsilon)| epsilon > 1e-10)
    ///     .last()
    ///     .unwrap();
    /// assert!((v[0] - 2.0).abs() < 1e-9);
    /// ```
    pub fn evaluate_policy(
        &self,
        policy: Option<Array2<f64>>,
        method: Option<EvaluationMethod>,
    ) -> Result<PolicyEvaluation> {
        let policy = policy.unwrap_or_else(|| self.random_policy());
        policy::validate(&policy, self.n_states(), self.n_actions())?;
        let method = method.unwrap_or_else(|| EvaluationMethod::for_states(self.n_states()));
        debug!("evaluating policy with method {}", method);

        let backup = ExpectationBackup::new(
            self.policy_transitions(&policy),
            self.policy_rewards(&policy),
            self.gamma(),
        );
        let stage = match method {
            EvaluationMethod::Solve => Stage::Pending(backup),
            EvaluationMethod::Iter => Stage::Iterating(backup),
        };
        trace!("policy evaluation ready over {} states", self.n_states());
        Ok(PolicyEvaluation { stage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Two states, two actions, no absorbing state.
    fn cycle() -> Mdp {
        let p = array![[[0.0, 1.0], [1.0, 0.0]], [[1.0, 0.0], [0.0, 1.0]]];
        let r = array![[1.0, 0.0], [2.0, -1.0]];
        Mdp::new(p, r, 0.9).unwrap()
    }

    /// State 0 is terminal, state 1 steps into it for -1.
    fn absorbing() -> Mdp {
        let p = array![[[1.0, 0.0], [1.0, 0.0]]];
        let r = array![[0.0], [-1.0]];
        Mdp::new(p, r, 1.0).unwrap()
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("solve".parse::<EvaluationMethod>(), Ok(EvaluationMethod::Solve));
        assert_eq!("iter".parse::<EvaluationMethod>(), Ok(EvaluationMethod::Iter));
        assert_eq!(
            "".parse::<EvaluationMethod>(),
            Err(Error::InvalidMethod(String::new()))
        );
        assert_eq!(EvaluationMethod::Iter.to_string(), "iter");
    }

    #[test]
    fn test_default_method_by_size() {
        assert_eq!(EvaluationMethod::for_states(29), EvaluationMethod::Solve);
        assert_eq!(EvaluationMethod::for_states(30), EvaluationMethod::Iter);

        let eval = cycle().evaluate_policy(None, None).unwrap();
        assert_eq!(eval.method(), EvaluationMethod::Solve);
    }

    #[test]
    fn test_malformed_policy_is_rejected_up_front() {
        let policy = array![[0.5, 0.5], [0.25, 0.25]];
        assert!(matches!(
            cycle().evaluate_policy(Some(policy), None),
            Err(Error::MalformedPolicy { state: 1, .. })
        ));
    }

    #[test]
    fn test_solve_repeats_exact_answer() {
        let mdp = cycle();
        // Always action 0: the two states alternate, paying 1 then 2.
        let policy = array![[1.0, 0.0], [1.0, 0.0]];
        let mut eval = mdp
            .evaluate_policy(Some(policy), Some(EvaluationMethod::Solve))
            .unwrap();

        // v0 = 1 + 0.9 v1, v1 = 2 + 0.9 v0
        let v0 = (1.0 + 0.9 * 2.0) / (1.0 - 0.81);
        let v1 = 2.0 + 0.9 * v0;
        for _ in 0..3 {
            let (v, epsilon) = eval.next().unwrap();
            assert_abs_diff_eq!(v, array![v0, v1], epsilon = 1e-9);
            assert_eq!(epsilon, 0.0);
        }
    }

    #[test]
    fn test_iter_reports_l1_change() {
        let mdp = cycle();
        let policy = array![[1.0, 0.0], [1.0, 0.0]];
        let mut eval = mdp
            .evaluate_policy(Some(policy), Some(EvaluationMethod::Iter))
            .unwrap();

        let (v, epsilon) = eval.next().unwrap();
        assert_abs_diff_eq!(v, array![1.0, 2.0], epsilon = 1e-12);
        assert_abs_diff_eq!(epsilon, 3.0, epsilon = 1e-12);

        let (v, epsilon) = eval.next().unwrap();
        assert_abs_diff_eq!(v, array![2.8, 2.9], epsilon = 1e-12);
        assert_abs_diff_eq!(epsilon, 1.8 + 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_solve_falls_back_to_iteration() {
        let mdp = absorbing();
        let mut eval = mdp
            .evaluate_policy(None, Some(EvaluationMethod::Solve))
            .unwrap();

        let (v, epsilon) = eval.next().unwrap();
        assert_eq!(eval.method(), EvaluationMethod::Iter);
        assert_abs_diff_eq!(v, array![0.0, -1.0], epsilon = 1e-12);
        assert_abs_diff_eq!(epsilon, 1.0, epsilon = 1e-12);

        let (v, epsilon) = eval.next().unwrap();
        assert_abs_diff_eq!(v, array![0.0, -1.0], epsilon = 1e-12);
        assert_eq!(epsilon, 0.0);
        assert_eq!(eval.method(), EvaluationMethod::Iter);
    }

    #[test]
    fn test_snapshot_ignores_later_changes() {
        let mut mdp = cycle();
        let mut eval = mdp
            .evaluate_policy(None, Some(EvaluationMethod::Iter))
            .unwrap();
        mdp.set_reward(0, 100.0, None).unwrap();

        let (v, _) = eval.next().unwrap();
        assert_abs_diff_eq!(v, array![0.5, 0.5], epsilon = 1e-12);
    }

    #[test]
    fn test_never_runs_dry() {
        let eval = cycle()
            .evaluate_policy(None, Some(EvaluationMethod::Iter))
            .unwrap();
        assert_eq!(eval.size_hint(), (usize::MAX, None));
        assert_eq!(eval.skip(500).take(5).count(), 5);
    }
}
