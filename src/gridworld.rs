//! A rectangular grid world producing a [`Mdp`] for the solvers.
//!
//! States are numbered row-major, `i * width + j`. Every non-terminal cell
//! costs -1 per move; moves are deterministic and bumping into the edge leaves
//! the agent where it was. Terminal cells absorb with reward 0.

use crate::error::{Error, Result};
use crate::mdp::{best_actions, Mdp};
use log::debug;
use ndarray::{Array1, Array2, Array3, ArrayView1};
use std::fmt::Write;

/// Grid worlds are undiscounted.
pub const GRIDWORLD_DISCOUNT: f64 = 1.0;

/// Reward of every move out of a non-terminal cell.
pub const STEP_REWARD: f64 = -1.0;

/// The four moves, in action-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Left,
    Right,
    Up,
    Down,
}

impl Move {
    pub const ALL: [Move; 4] = [Move::Left, Move::Right, Move::Up, Move::Down];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-character label used when rendering a policy.
    pub fn symbol(self) -> char {
        match self {
            Move::Left => 'l',
            Move::Right => 'r',
            Move::Up => 'u',
            Move::Down => 'd',
        }
    }
}

/// Terminal cells are read from the underlying [`Mdp`], so a cell made
/// absorbing through [`GridWorld::set_transition_probs`] is terminal too.
#[derive(Debug, Clone)]
pub struct GridWorld {
    width: usize,
    height: usize,
    mdp: Mdp,
}

impl GridWorld {
    /// Builds a `width` x `height` grid with the given terminal cells.
    ///
    /// # Examples
    ///
    /// ```
    /// use tabular_mdp::GridWorld;
    ///
    /// let gw = GridWorld::new(4, 4, &[0, 15]).unwrap();
    /// let (v, _) = gw
    ///     .mdp()
    ///     .value_iteration()
    ///     .find(|&(_, epsilon)| epsilon == 0.0)
    ///     .unwrap();
    /// // Cell 3 is three moves away from either exit
    /// assert_eq!(v[3], -3.0);
    /// assert_eq!(v[1], -1.0);
    /// ```
    pub fn new(width: usize, height: usize, terminal_states: &[usize]) -> Result<Self> {
        check_size(width, height)?;
        if terminal_states.is_empty() {
            return Err(Error::NoTerminalState);
        }
        let n_states = width * height;
        if let Some(&state) = terminal_states.iter().find(|&&s| s >= n_states) {
            return Err(Error::InvalidState { state, n_states });
        }

        let mut terminal: Vec<usize> = terminal_states.to_vec();
        terminal.sort_unstable();
        terminal.dedup();
        let mdp = build(width, height, &terminal)?;
        Ok(Self { width, height, mdp })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn n_states(&self) -> usize {
        self.width * self.height
    }

    pub fn terminal_states(&self) -> Vec<usize> {
        self.mdp.terminal_states()
    }

    pub fn mdp(&self) -> &Mdp {
        &self.mdp
    }

    /// Resizes the grid and rebuilds every state with default dynamics.
    ///
    /// Terminal cells outside the new grid are dropped; cell 0 becomes
    /// terminal if none remain.
    pub fn set_size(&mut self, width: usize, height: usize) -> Result<()> {
        check_size(width, height)?;
        let n_states = width * height;
        let mut terminal: Vec<usize> = self
            .terminal_states()
            .into_iter()
            .filter(|&s| s < n_states)
            .collect();
        if terminal.is_empty() {
            terminal.push(0);
        }

        self.mdp = build(width, height, &terminal)?;
        self.width = width;
        self.height = height;
        debug!("resized grid world to {}x{}", width, height);
        Ok(())
    }

    pub fn set_width(&mut self, width: usize) -> Result<()> {
        self.set_size(width, self.height)
    }

    pub fn set_height(&mut self, height: usize) -> Result<()> {
        self.set_size(self.width, height)
    }

    /// Sets the reward of `state` for `action`, or for every action when `None`.
    pub fn set_reward(&mut self, state: usize, reward: f64, action: Option<usize>) -> Result<()> {
        self.check_mutable(state)?;
        self.mdp.set_reward(state, reward, action)
    }

    /// Sets `reward` for every listed state and action (every action when
    /// `actions` is `None`). All indices are checked before anything changes.
    pub fn set_rewards(
        &mut self,
        states: &[usize],
        reward: f64,
        actions: Option<&[usize]>,
    ) -> Result<()> {
        for &s in states {
            self.check_mutable(s)?;
        }
        if let Some(actions) = actions {
            let n_actions = Move::ALL.len();
            if let Some(&action) = actions.iter().find(|&&a| a >= n_actions) {
                return Err(Error::InvalidAction { action, n_actions });
            }
        }

        for &s in states {
            match actions {
                Some(actions) => {
                    for &a in actions {
                        self.mdp.set_reward(s, reward, Some(a))?;
                    }
                }
                None => self.mdp.set_reward(s, reward, None)?,
            }
        }
        Ok(())
    }

    /// Installs next-state probabilities for `state`, for `action` or for
    /// every action when `None`.
    pub fn set_transition_probs(
        &mut self,
        state: usize,
        probs: ArrayView1<f64>,
        action: Option<usize>,
    ) -> Result<()> {
        self.check_mutable(state)?;
        self.mdp.set_transition_probs(state, probs, action)
    }

    /// Makes `state` terminal, or turns a terminal state back into an ordinary
    /// cell with default dynamics. The last terminal state cannot be removed.
    pub fn toggle_terminal_state(&mut self, state: usize) -> Result<()> {
        self.mdp.check_state(state)?;
        let n_states = self.n_states();

        if self.mdp.is_terminal_state(state) {
            if self.terminal_states().len() == 1 {
                return Err(Error::NoTerminalState);
            }
            for m in Move::ALL {
                let mut row = Array1::zeros(n_states);
                row[self.next_state(state, m)] = 1.0;
                self.mdp
                    .set_transition_probs(state, row.view(), Some(m.index()))?;
            }
            self.mdp.set_reward(state, STEP_REWARD, None)?;
        } else {
            let mut row = Array1::zeros(n_states);
            row[state] = 1.0;
            self.mdp.set_transition_probs(state, row.view(), None)?;
            self.mdp.set_reward(state, 0.0, None)?;
        }
        debug!("terminal states now {:?}", self.terminal_states());
        Ok(())
    }

    /// The cell reached from `state` by `m`, bumping into the edge.
    pub fn next_state(&self, state: usize, m: Move) -> usize {
        next_state(self.width, self.height, state, m)
    }

    /// Values laid out as the grid, two decimals per cell.
    pub fn render_values(&self, v: &Array1<f64>) -> String {
        self.render(|s| format!("{:<7}", format!("{:.2}", v[s])))
    }

    /// Best actions of each cell as `l`/`r`/`u`/`d` letters, `T` for terminal cells.
    pub fn render_policy(&self, policy: &Array2<f64>) -> String {
        self.render(|s| {
            let cell: String = if self.mdp.is_terminal_state(s) {
                "T".to_string()
            } else {
                best_actions(policy.row(s))
                    .into_iter()
                    .map(|a| Move::ALL[a].symbol())
                    .collect()
            };
            format!("{:<4}", cell)
        })
    }

    /// Rewards of each cell, as the reward of its first action.
    pub fn render_rewards(&self) -> String {
        let r = self.mdp.rewards();
        self.render(|s| format!("{:<7}", format!("{:.2}", r[[s, 0]])))
    }

    fn render<F: Fn(usize) -> String>(&self, cell: F) -> String {
        let mut out = String::new();
        for i in 0..self.height {
            let line: Vec<String> = (0..self.width).map(|j| cell(i * self.width + j)).collect();
            let _ = writeln!(out, "{}", line.join(" ").trim_end());
        }
        out
    }

    fn check_mutable(&self, state: usize) -> Result<()> {
        self.mdp.check_state(state)?;
        if self.mdp.is_terminal_state(state) {
            Err(Error::TerminalState(state))
        } else {
            Ok(())
        }
    }
}

fn check_size(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        Err(Error::EmptyGrid { width, height })
    } else {
        Ok(())
    }
}

fn next_state(width: usize, height: usize, s: usize, m: Move) -> usize {
    let blocked = match m {
        Move::Left => s % width == 0,
        Move::Right => s % width == width - 1,
        Move::Up => s < width,
        Move::Down => s >= width * (height - 1),
    };
    if blocked {
        return s;
    }
    match m {
        Move::Left => s - 1,
        Move::Right => s + 1,
        Move::Up => s - width,
        Move::Down => s + width,
    }
}

fn build(width: usize, height: usize, terminal_states: &[usize]) -> Result<Mdp> {
    let n_states = width * height;
    let n_actions = Move::ALL.len();
    let mut p = Array3::<f64>::zeros((n_actions, n_states, n_states));
    let mut r = Array2::<f64>::from_elem((n_states, n_actions), STEP_REWARD);

    for s in 0..n_states {
        if terminal_states.contains(&s) {
            for a in 0..n_actions {
                p[[a, s, s]] = 1.0;
            }
            r.row_mut(s).fill(0.0);
        } else {
            for m in Move::ALL {
                p[[m.index(), s, next_state(width, height, s, m)]] = 1.0;
            }
        }
    }

    Mdp::new(p, r, GRIDWORLD_DISCOUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_edges_bump() {
        let gw = GridWorld::new(3, 2, &[0]).unwrap();
        // 0 1 2
        // 3 4 5
        assert_eq!(gw.next_state(0, Move::Left), 0);
        assert_eq!(gw.next_state(0, Move::Up), 0);
        assert_eq!(gw.next_state(2, Move::Right), 2);
        assert_eq!(gw.next_state(4, Move::Down), 4);
        assert_eq!(gw.next_state(4, Move::Up), 1);
        assert_eq!(gw.next_state(4, Move::Left), 3);
        assert_eq!(gw.next_state(3, Move::Right), 4);
    }

    #[test]
    fn test_builds_valid_mdp() {
        let gw = GridWorld::new(4, 3, &[0, 11]).unwrap();
        let mdp = gw.mdp();
        assert_eq!(mdp.n_states(), 12);
        assert_eq!(mdp.n_actions(), 4);
        assert_eq!(mdp.gamma(), GRIDWORLD_DISCOUNT);
        assert_eq!(mdp.terminal_states(), vec![0, 11]);
        assert_eq!(mdp.rewards().row(5), array![-1.0, -1.0, -1.0, -1.0]);
        assert_eq!(mdp.rewards().row(11), array![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_constructor_errors() {
        assert_eq!(
            GridWorld::new(0, 3, &[0]).unwrap_err(),
            Error::EmptyGrid {
                width: 0,
                height: 3,
            }
        );
        assert_eq!(
            GridWorld::new(2, 2, &[]).unwrap_err(),
            Error::NoTerminalState
        );
        assert_eq!(
            GridWorld::new(2, 2, &[4]).unwrap_err(),
            Error::InvalidState {
                state: 4,
                n_states: 4,
            }
        );
    }

    #[test]
    fn test_toggle_terminal_state() {
        let mut gw = GridWorld::new(2, 2, &[0]).unwrap();
        gw.toggle_terminal_state(3).unwrap();
        assert_eq!(gw.terminal_states(), vec![0, 3]);
        assert_eq!(gw.mdp().terminal_states(), vec![0, 3]);

        gw.toggle_terminal_state(0).unwrap();
        assert_eq!(gw.terminal_states(), vec![3]);
        assert!(!gw.mdp().is_terminal_state(0));
        assert_eq!(gw.mdp().rewards().row(0), array![-1.0, -1.0, -1.0, -1.0]);
        assert_eq!(gw.mdp().transitions()[[Move::Right.index(), 0, 1]], 1.0);

        assert_eq!(gw.toggle_terminal_state(3), Err(Error::NoTerminalState));
        assert_eq!(gw.terminal_states(), vec![3]);
    }

    #[test]
    fn test_terminal_cells_are_locked() {
        let mut gw = GridWorld::new(2, 2, &[0]).unwrap();
        assert_eq!(gw.set_reward(0, 5.0, None), Err(Error::TerminalState(0)));
        assert_eq!(
            gw.set_transition_probs(0, array![0.0, 1.0, 0.0, 0.0].view(), None),
            Err(Error::TerminalState(0))
        );

        gw.set_reward(3, -10.0, Some(Move::Up.index())).unwrap();
        assert_eq!(gw.mdp().rewards()[[3, Move::Up.index()]], -10.0);

        gw.set_transition_probs(3, array![0.5, 0.0, 0.0, 0.5].view(), None)
            .unwrap();
        assert_eq!(gw.mdp().transitions()[[Move::Left.index(), 3, 0]], 0.5);
    }

    #[test]
    fn test_absorbing_row_makes_cell_terminal() {
        let mut gw = GridWorld::new(2, 2, &[0]).unwrap();
        gw.set_transition_probs(3, array![0.0, 0.0, 0.0, 1.0].view(), None)
            .unwrap();
        assert_eq!(gw.terminal_states(), vec![0, 3]);
        assert_eq!(gw.set_reward(3, 50.0, None), Err(Error::TerminalState(3)));

        let (_, policy, _) = gw.mdp().policy_iteration(None).unwrap().nth(5).unwrap();
        assert_eq!(gw.render_policy(&policy), "T    l\nu    T\n");

        // Toggling turns it back into an ordinary cell
        gw.toggle_terminal_state(3).unwrap();
        assert_eq!(gw.terminal_states(), vec![0]);
        assert_eq!(gw.mdp().rewards().row(3), array![-1.0, -1.0, -1.0, -1.0]);
        assert_eq!(gw.mdp().transitions()[[Move::Left.index(), 3, 2]], 1.0);
    }

    #[test]
    fn test_set_rewards_checks_every_state_first() {
        let mut gw = GridWorld::new(2, 2, &[0]).unwrap();
        assert_eq!(
            gw.set_rewards(&[1, 0], 5.0, None),
            Err(Error::TerminalState(0))
        );
        assert_eq!(gw.mdp().rewards().row(1), array![-1.0, -1.0, -1.0, -1.0]);

        assert_eq!(
            gw.set_rewards(&[1, 2], 5.0, Some(&[0, 4])),
            Err(Error::InvalidAction {
                action: 4,
                n_actions: 4,
            })
        );
        assert_eq!(gw.mdp().rewards().row(1), array![-1.0, -1.0, -1.0, -1.0]);

        gw.set_rewards(&[1, 2], 5.0, Some(&[Move::Up.index()])).unwrap();
        assert_eq!(gw.mdp().rewards().row(1), array![-1.0, -1.0, 5.0, -1.0]);
        assert_eq!(gw.mdp().rewards().row(2), array![-1.0, -1.0, 5.0, -1.0]);
    }

    #[test]
    fn test_resize_keeps_terminals_in_range() {
        let mut gw = GridWorld::new(3, 3, &[0, 8]).unwrap();
        gw.set_width(2).unwrap();
        assert_eq!(gw.n_states(), 6);
        assert_eq!(gw.terminal_states(), vec![0]);

        let mut gw = GridWorld::new(3, 3, &[8]).unwrap();
        gw.set_height(1).unwrap();
        assert_eq!(gw.terminal_states(), vec![0]);
        assert_eq!(gw.mdp().terminal_states(), vec![0]);

        assert!(gw.set_size(0, 1).is_err());
        assert_eq!(gw.n_states(), 3);
    }

    #[test]
    fn test_render_values() {
        let gw = GridWorld::new(2, 2, &[0]).unwrap();
        let v = array![0.0, -1.0, -1.0, -2.0];
        assert_eq!(gw.render_values(&v), "0.00    -1.00\n-1.00   -2.00\n");
    }

    #[test]
    fn test_render_policy_lists_ties() {
        let gw = GridWorld::new(2, 2, &[0]).unwrap();
        let (_, policy, _) = gw.mdp().policy_iteration(None).unwrap().nth(5).unwrap();
        assert_eq!(gw.render_policy(&policy), "T    l\nu    lu\n");
    }
}
