//! Evaluation runtime - evaluator contract, combinators, dependency ordering
//! and the fixpoint engine.

#![warn(missing_docs)]

pub mod evaluator;
pub mod predicates;
pub mod combinators;
pub mod dependency;
pub mod engine;

pub use evaluator::{EvalResult, EvaluationError, Evaluator};
pub use predicates::Predicate;
pub use combinators::{DispatchByTaskType, FilteringEvaluator, SequenceEvaluator};
pub use dependency::DepGraph;
pub use engine::{EngineConfig, Evaluation, ExecutionEngine, PassResult, ASSERTION_ERROR};
