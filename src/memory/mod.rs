//! Agent Memory System
//!
//! Ordered history of executed steps plus per-run scratch state, fed back
//! into every prompt as context

pub mod store;

pub use store::{render_value, MemoryEntry, MemoryState, LAST_ERROR_KEY, LAST_FAILED_CALL_KEY};
