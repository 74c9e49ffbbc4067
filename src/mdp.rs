pub mod engine;
pub mod evaluation;
pub mod policy;
pub mod policy_iteration;
pub mod sampling;
pub mod value_iteration;


// Re-export the engine and its iteration sequences
pub use engine::Mdp;
pub use evaluation::{EvaluationMethod, PolicyEvaluation, DIRECT_SOLVE_MAX_STATES};
pub use policy::{best_actions, PROBABILITY_TOLERANCE, TIE_TOLERANCE};
pub use policy_iteration::PolicyIteration;
pub use sampling::{Episode, Transition};
pub use value_iteration::ValueIteration;
