//! Behavioural step helpers for change-monitor scenarios.

mod assertions;
mod state;
mod steps;

pub use state::{MonitorState, monitor_state};
