//! Behavioural step helpers for batch scenarios.

mod assertions;
mod state;
mod steps;

pub use state::{BatchState, batch_state};
