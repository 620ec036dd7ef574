//! Domain types: bars and the immutable evaluation records built from them.

pub mod bar;
pub mod evaluation;

pub use bar::Bar;
pub use evaluation::{
    is_near_miss, ComponentResult, EvaluationRecord, InvariantViolation, SignalEvaluation,
    DEFAULT_NEAR_MISS_THRESHOLD, MAX_REASON_LEN,
};
