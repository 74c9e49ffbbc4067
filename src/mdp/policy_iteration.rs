use super::engine::Mdp;
use super::evaluation::l1_distance;
use super::policy;
use crate::error::Result;
use log::{debug, trace};
use ndarray::{Array1, Array2};

/// An endless sequence of `(value_function, policy, epsilon)` triples.
///
/// Each step first applies one Bellman expectation backup under the current
/// policy, with `P_pi` and `R_pi` rebuilt from that policy, then makes the
/// policy greedy with respect to the new values in every non-terminal state.
/// Tied actions share probability equally. Terminal rows are left as they
/// were. `epsilon` is the L1 change of the value function, not of the policy.
#[derive(Debug, Clone)]
pub struct PolicyIteration<'a> {
    mdp: &'a Mdp,
    policy: Array2<f64>,
    v: Array1<f64>,
    iteration: usize,
}

impl PolicyIteration<'_> {
    /// Number of steps taken so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// The policy after the latest improvement step.
    pub fn policy(&self) -> &Array2<f64> {
        &self.policy
    }
}

impl Iterator for PolicyIteration<'_> {
    type Item = (Array1<f64>, Array2<f64>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let mdp = self.mdp;

        // Evaluation
        let p_pi = mdp.policy_transitions(&self.policy);
        let r_pi = mdp.policy_rewards(&self.policy);
        let v = &r_pi + &(p_pi.dot(&self.v) * mdp.gamma());

        // Improvement
        for s in 0..mdp.n_states() {
            if mdp.is_terminal_state(s) {
                continue;
            }
            let q = mdp.q_values(s, &v);
            self.policy
                .row_mut(s)
                .assign(&policy::greedy_row(q.view()));
        }

        let epsilon = l1_distance(&v, &self.v);
        self.v = v;
        self.iteration += 1;
        trace!("policy iteration step {}: epsilon {}", self.iteration, epsilon);
        Some((self.v.clone(), self.policy.clone(), epsilon))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

impl Mdp {
    /// Runs policy iteration from `v = 0` and `policy` (uniform-random when `None`).
    ///
    /// # Errors
    ///
    /// [`crate::Error::MalformedPolicy`] or [`crate::Error::DimensionMismatch`]
    /// if the starting policy is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use tabular_mdp::Mdp;
    ///
    /// // State 1 pays 1 for staying (action 0) and 0 for leaving (action 1).
    /// let p = array![[[1.0, 0.0], [0.0, 1.0]], [[1.0, 0.0], [1.0, 0.0]]];
    /// let r = array![[0.0, 0.0], [1.0, 0.0]];
    /// let mdp = Mdp::new(p, r, 0.5).unwrap();
    ///
    /// let (_, policy, _) = mdp.policy_iteration(None).unwrap().nth(3).unwrap();
    /// assert_eq!(policy.row(1).to_vec(), vec![1.0, 0.0]);
    /// ```
    pub fn policy_iteration(&self, policy: Option<Array2<f64>>) -> Result<PolicyIteration<'_>> {
        let policy = policy.unwrap_or_else(|| self.random_policy());
        policy::validate(&policy, self.n_states(), self.n_actions())?;
        debug!("starting policy iteration over {} states", self.n_states());

        Ok(PolicyIteration {
            mdp: self,
            policy,
            v: Array1::zeros(self.n_states()),
            iteration: 0,
        })
    }
}
