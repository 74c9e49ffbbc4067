use super::engine::Mdp;
use super::evaluation::l1_distance;
use log::{debug, trace};
use ndarray::Array1;

/// An endless sequence of `(value_function, epsilon)` pairs converging to the
/// optimal value function.
///
/// Each step applies the Bellman optimality backup to every non-terminal state,
/// computing all action-values from the same snapshot of `v` before committing
/// the batch. Terminal states keep their value (zero). `epsilon` is the L1
/// change of `v` over the step; stopping is left to the caller.
#[derive(Debug, Clone)]
pub struct ValueIteration<'a> {
    mdp: &'a Mdp,
    v: Array1<f64>,
    iteration: usize,
}

impl<'a> ValueIteration<'a> {
    pub(crate) fn new(mdp: &'a Mdp) -> Self {
        debug!("starting value iteration over {} states", mdp.n_states());
        Self {
            mdp,
            v: Array1::zeros(mdp.n_states()),
            iteration: 0,
        }
    }

    /// Number of steps taken so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

impl Iterator for ValueIteration<'_> {
    type Item = (Array1<f64>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let mut next = self.v.clone();
        for s in 0..self.mdp.n_states() {
            if self.mdp.is_terminal_state(s) {
                continue;
            }
            let q = self.mdp.q_values(s, &self.v);
            next[s] = q.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        }

        let epsilon = l1_distance(&next, &self.v);
        self.v = next;
        self.iteration += 1;
        trace!("value iteration step {}: epsilon {}", self.iteration, epsilon);
        Some((self.v.clone(), epsilon))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

impl Mdp {
    /// Runs value iteration from `v = 0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use tabular_mdp::Mdp;
    ///
    /// // Corridor 0 <- 1 <- 2 with state 0 terminal; action 0 moves left, action 1 right.
    /// let p = array![
    ///     [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    ///     [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
    /// ];
    /// let r = array![[0.0, 0.0], [-1.0, -1.0], [-1.0, -1.0]];
    /// let mdp = Mdp::new(p, r, 1.0).unwrap();
    ///
    /// let (v, _) = mdp
    ///     .value_iteration()
    ///     .find(|&(_, epsilon)| epsilon == 0.0)
    ///     .unwrap();
    /// assert_eq!(v.to_vec(), vec![0.0, -1.0, -2.0]);
    /// ```
    pub fn value_iteration(&self) -> ValueIteration<'_> {
        ValueIteration::new(self)
    }
}
