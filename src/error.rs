//! Error type shared by the MDP engine and the grid world builder.

use thiserror::Error;

/// Validation failures raised synchronously by the engine, before any
/// iteration state is created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A `P[a][s]` row is not a probability distribution.
    #[error("transition probabilities for action {action} in state {state} must add up to 1, got {sum}")]
    MalformedTransition { action: usize, state: usize, sum: f64 },

    /// Two arrays disagree on the number of states or actions.
    #[error("{what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A policy row is not a probability distribution.
    #[error("policy probabilities for state {state} must add up to 1, got {sum}")]
    MalformedPolicy { state: usize, sum: f64 },

    /// Unrecognised policy evaluation method name.
    #[error("method must be one of \"solve\", \"iter\", got {0:?}")]
    InvalidMethod(String),

    #[error("discount factor must be within [0, 1], got {0}")]
    InvalidDiscount(f64),

    #[error("state {state} is out of range for {n_states} states")]
    InvalidState { state: usize, n_states: usize },

    #[error("action {action} is out of range for {n_actions} actions")]
    InvalidAction { action: usize, n_actions: usize },

    /// Every state is terminal, so there is nowhere to start an episode.
    #[error("no non-terminal state to start sampling from")]
    NoStartState,

    #[error("not allowed to modify terminal state {0}")]
    TerminalState(usize),

    #[error("there must be at least 1 terminal state")]
    NoTerminalState,

    #[error("grid dimensions must be positive, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
