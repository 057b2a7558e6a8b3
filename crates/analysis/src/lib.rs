//! Statistical analysis for bisection - sample comparison and speculative
//! midpoint selection.

#![warn(missing_docs)]

pub mod stats;
mod compare;
mod exploration;

pub use compare::{
    compare, high_threshold_functional, high_threshold_performance, CompareMode, LOW_THRESHOLD,
    MIN_IQR,
};
pub use exploration::speculate;
