pub mod error;
pub mod gridworld;
pub mod math;
pub mod mdp;

pub use error::{Error, Result};
pub use gridworld::{GridWorld, Move};
pub use mdp::{
    EvaluationMethod, Episode, Mdp, PolicyEvaluation, PolicyIteration, Transition,
    ValueIteration,
};
