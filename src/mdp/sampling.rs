//! Monte Carlo episodes drawn from an MDP under a stochastic policy.

use super::engine::Mdp;
use super::policy;
use crate::error::{Error, Result};
use log::trace;
use ndarray::{Array2, ArrayView1, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// One recorded step of an episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: usize,
    pub action: usize,
    pub reward: f64,
    pub next_state: usize,
}

/// A single sampled episode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Episode {
    /// State the episode started in.
    pub start_state: usize,
    /// Sum of every reward collected, including the one drawn in the terminal state.
    pub total_reward: f64,
    /// Steps taken, in order. The terminal state's self-transition is not recorded.
    pub transitions: Vec<Transition>,
}

impl Episode {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Visited states, starting state first and terminal state last.
    pub fn states(&self) -> Vec<usize> {
        std::iter::once(self.start_state)
            .chain(self.transitions.iter().map(|t| t.next_state))
            .collect()
    }
}

/// Categorical draw of an index weighted by `weights`.
fn draw<R: Rng + ?Sized>(rng: &mut R, weights: ArrayView1<f64>) -> Option<usize> {
    WeightedIndex::new(weights.iter())
        .ok()
        .map(|dist| dist.sample(rng))
}

impl Mdp {
    /// Samples one episode with a freshly seeded ChaCha generator.
    ///
    /// See [`Mdp::sample_with_rng`].
    pub fn sample(&self, policy: Option<&Array2<f64>>, state: Option<usize>) -> Result<Episode> {
        let mut rng = ChaCha20Rng::from_entropy();
        self.sample_with_rng(&mut rng, policy, state)
    }

    /// Samples one episode under `policy` (uniform-random when `None`) starting
    /// from `state` (a uniformly drawn non-terminal state when `None`).
    ///
    /// In each state an action is drawn from the policy and its reward is added
    /// to the total. If the state is terminal the episode ends there; otherwise
    /// the next state is drawn from `P[action][state]` and the step recorded.
    /// The episode only ends when a terminal state is reached. If no terminal
    /// state is reachable from the start under `policy`, this never returns;
    /// making sure one is reachable is up to the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedPolicy`] or [`Error::DimensionMismatch`] for an invalid policy.
    /// - [`Error::InvalidState`] if `state` is out of range.
    /// - [`Error::NoStartState`] if no start state is given and every state is terminal.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use rand::SeedableRng;
    /// use rand_chacha::ChaCha20Rng;
    /// use tabular_mdp::Mdp;
    ///
    /// // 2 -> 1 -> 0, state 0 terminal
    /// let p = array![[[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]];
    /// let r = array![[0.0], [-1.0], [-2.0]];
    /// let mdp = Mdp::new(p, r, 1.0).unwrap();
    ///
    /// let mut rng = ChaCha20Rng::seed_from_u64(7);
    /// let episode = mdp.sample_with_rng(&mut rng, None, Some(2)).unwrap();
    /// assert_eq!(episode.states(), vec![2, 1, 0]);
    /// assert_eq!(episode.total_reward, -3.0);
    /// ```
    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        policy: Option<&Array2<f64>>,
        state: Option<usize>,
    ) -> Result<Episode> {
        let random_policy;
        let policy = match policy {
            Some(policy) => policy,
            None => {
                random_policy = self.random_policy();
                &random_policy
            }
        };
        policy::validate(policy, self.n_states(), self.n_actions())?;

        let mut state = match state {
            Some(state) => {
                self.check_state(state)?;
                state
            }
            None => self.start_state(rng)?,
        };

        let mut episode = Episode {
            start_state: state,
            ..Episode::default()
        };
        loop {
            let action = draw(rng, policy.row(state)).ok_or_else(|| Error::MalformedPolicy {
                state,
                sum: policy.row(state).sum(),
            })?;
            let reward = self.rewards()[[state, action]];
            episode.total_reward += reward;
            if self.is_terminal_state(state) {
                break;
            }

            let row = self.transitions().index_axis(Axis(0), action);
            let next_state = draw(rng, row.row(state)).ok_or_else(|| Error::MalformedTransition {
                action,
                state,
                sum: row.row(state).sum(),
            })?;
            episode.transitions.push(Transition {
                state,
                action,
                reward,
                next_state,
            });
            state = next_state;
        }

        trace!(
            "sampled episode of {} steps, total reward {}",
            episode.len(),
            episode.total_reward
        );
        Ok(episode)
    }

    /// Uniform draw among non-terminal states.
    fn start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize> {
        let candidates: Vec<usize> = (0..self.n_states())
            .filter(|&s| !self.is_terminal_state(s))
            .collect();
        candidates.choose(rng).copied().ok_or(Error::NoStartState)
    }
}
