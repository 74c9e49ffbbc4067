//! This module holds a finite Markov Decision Process in tensor form and the
//! helpers shared by every solver: validation, terminal-state detection and
//! one-step lookahead.

use super::policy::{self, distribution_defect};
use crate::error::{Error, Result};
use log::debug;
use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};

/// A finite, discrete-state Markov Decision Process.
///
/// - `P[[a, s, s']]` is the probability of moving from `s` to `s'` under action `a`.
/// - `R[[s, a]]` is the expected immediate reward of taking `a` in `s`.
/// - `gamma` is the discount factor, fixed for the lifetime of the process.
///
/// A state is terminal when every action leaves it in place with probability 1.
/// This is always derived from `P`, never stored, so it follows any validated
/// change made through [`Mdp::set_transition_probs`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mdp {
    p: Array3<f64>,
    r: Array2<f64>,
    gamma: f64,
}

impl Mdp {
    /// Builds an MDP from a transition tensor `p` of shape
    /// `(n_actions, n_states, n_states)`, a reward matrix `r` of shape
    /// `(n_states, n_actions)` and a discount factor `gamma` in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedTransition`] if any `p[a][s]` row does not add up to 1.
    /// - [`Error::DimensionMismatch`] if `p` is not square over states or `r`
    ///   disagrees with `p` on the number of states or actions.
    /// - [`Error::InvalidDiscount`] if `gamma` is outside `[0, 1]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use tabular_mdp::{Error, Mdp};
    ///
    /// // Two states, one action: state 1 always moves to the terminal state 0.
    /// let p = array![[[1.0, 0.0], [1.0, 0.0]]];
    /// let r = array![[0.0], [-1.0]];
    /// let mdp = Mdp::new(p, r, 1.0).unwrap();
    /// assert!(mdp.is_terminal_state(0));
    /// assert!(!mdp.is_terminal_state(1));
    ///
    /// let leaky = array![[[0.99, 0.0], [1.0, 0.0]]];
    /// assert!(matches!(
    ///     Mdp::new(leaky, array![[0.0], [-1.0]], 1.0),
    ///     Err(Error::MalformedTransition { action: 0, state: 0, .. })
    /// ));
    /// ```
    pub fn new(p: Array3<f64>, r: Array2<f64>, gamma: f64) -> Result<Self> {
        let (n_actions, n_states, n_next) = p.dim();
        if n_next != n_states {
            return Err(Error::DimensionMismatch {
                what: "next states in P",
                expected: n_states,
                found: n_next,
            });
        }
        if r.nrows() != n_states {
            return Err(Error::DimensionMismatch {
                what: "states in R",
                expected: n_states,
                found: r.nrows(),
            });
        }
        if r.ncols() != n_actions {
            return Err(Error::DimensionMismatch {
                what: "actions in R",
                expected: n_actions,
                found: r.ncols(),
            });
        }
        if !(0.0..=1.0).contains(&gamma) {
            return Err(Error::InvalidDiscount(gamma));
        }

        for (action, p_a) in p.outer_iter().enumerate() {
            for (state, row) in p_a.rows().into_iter().enumerate() {
                if let Some(sum) = distribution_defect(row) {
                    return Err(Error::MalformedTransition { action, state, sum });
                }
            }
        }

        debug!(
            "built MDP with {} states, {} actions, gamma {}",
            n_states, n_actions, gamma
        );
        Ok(Self { p, r, gamma })
    }

    pub fn n_states(&self) -> usize {
        self.p.len_of(Axis(1))
    }

    pub fn n_actions(&self) -> usize {
        self.p.len_of(Axis(0))
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// The transition tensor, indexed `[[action, state, next_state]]`.
    pub fn transitions(&self) -> &Array3<f64> {
        &self.p
    }

    /// The reward matrix, indexed `[[state, action]]`.
    pub fn rewards(&self) -> &Array2<f64> {
        &self.r
    }

    /// The policy choosing every action with probability `1 / n_actions`.
    pub fn random_policy(&self) -> Array2<f64> {
        policy::uniform(self.n_states(), self.n_actions())
    }

    /// Whether `state` transitions to itself with certainty under every action.
    pub fn is_terminal_state(&self, state: usize) -> bool {
        (0..self.n_actions()).all(|a| self.p[[a, state, state]] == 1.0)
    }

    pub fn terminal_states(&self) -> Vec<usize> {
        (0..self.n_states())
            .filter(|&s| self.is_terminal_state(s))
            .collect()
    }

    /// One-step lookahead `q[a] = R[s][a] + gamma * sum_s' P[a][s][s'] * v[s']`.
    pub fn q_values(&self, state: usize, v: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter((0..self.n_actions()).map(|a| {
            let next = self.p.index_axis(Axis(0), a);
            self.r[[state, a]] + self.gamma * next.row(state).dot(v)
        }))
    }

    /// The greedy policy with respect to `v`.
    ///
    /// Non-terminal rows share their mass equally between every action with
    /// maximal action-value. Terminal rows keep the uniform distribution.
    pub fn greedy_policy(&self, v: &Array1<f64>) -> Array2<f64> {
        let mut policy = self.random_policy();
        for s in 0..self.n_states() {
            if self.is_terminal_state(s) {
                continue;
            }
            let q = self.q_values(s, v);
            policy.row_mut(s).assign(&policy::greedy_row(q.view()));
        }
        policy
    }

    /// `R_pi[s] = sum_a policy[s][a] * R[s][a]`.
    pub(crate) fn policy_rewards(&self, policy: &Array2<f64>) -> Array1<f64> {
        (policy * &self.r).sum_axis(Axis(1))
    }

    /// `P_pi[s][s'] = sum_a policy[s][a] * P[a][s][s']`.
    pub(crate) fn policy_transitions(&self, policy: &Array2<f64>) -> Array2<f64> {
        let n = self.n_states();
        let mut p_pi = Array2::<f64>::zeros((n, n));
        for (a, p_a) in self.p.outer_iter().enumerate() {
            let weights = policy.column(a).insert_axis(Axis(1));
            p_pi += &(&p_a * &weights);
        }
        p_pi
    }

    pub(crate) fn check_state(&self, state: usize) -> Result<()> {
        if state < self.n_states() {
            Ok(())
        } else {
            Err(Error::InvalidState {
                state,
                n_states: self.n_states(),
            })
        }
    }

    pub(crate) fn check_action(&self, action: usize) -> Result<()> {
        if action < self.n_actions() {
            Ok(())
        } else {
            Err(Error::InvalidAction {
                action,
                n_actions: self.n_actions(),
            })
        }
    }

    /// Installs `probs` as the next-state distribution of `state`, for
    /// `action` only or for every action when `action` is `None`.
    ///
    /// Nothing is modified when validation fails.
    pub fn set_transition_probs(
        &mut self,
        state: usize,
        probs: ArrayView1<f64>,
        action: Option<usize>,
    ) -> Result<()> {
        self.check_state(state)?;
        if probs.len() != self.n_states() {
            return Err(Error::DimensionMismatch {
                what: "transition probabilities",
                expected: self.n_states(),
                found: probs.len(),
            });
        }
        let actions = match action {
            Some(a) => {
                self.check_action(a)?;
                a..a + 1
            }
            None => 0..self.n_actions(),
        };
        if let Some(sum) = distribution_defect(probs) {
            return Err(Error::MalformedTransition {
                action: actions.start,
                state,
                sum,
            });
        }

        for a in actions {
            self.p
                .index_axis_mut(Axis(0), a)
                .row_mut(state)
                .assign(&probs);
        }
        Ok(())
    }

    /// Sets the reward of `state`, for `action` only or for every action when
    /// `action` is `None`.
    pub fn set_reward(&mut self, state: usize, reward: f64, action: Option<usize>) -> Result<()> {
        self.check_state(state)?;
        match action {
            Some(a) => {
                self.check_action(a)?;
                self.r[[state, a]] = reward;
            }
            None => self.r.row_mut(state).fill(reward),
        }
        Ok(())
    }
}
