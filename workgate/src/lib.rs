// Workgate library: greedy constraint-gated work scheduling

pub mod config;
pub mod constraints;
pub mod errors;
pub mod execution;
pub mod models;
pub mod scheduler;
pub mod telemetry;
