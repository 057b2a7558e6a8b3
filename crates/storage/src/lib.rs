//! Storage abstraction and implementations for the culprit finder.
//!
//! This crate provides a trait-based graph store with an in-memory and a
//! JSON file implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{GraphStore, StoreError, Result};
pub use memory::InMemoryStore;
pub use json_storage::JsonStore;
