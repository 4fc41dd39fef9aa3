// Execution engine seams and the in-process processor

pub mod engine;
pub mod processor;

pub use engine::{ExecutionEngine, ExecutionListener, WorkOutcome, WorkRunner};
pub use processor::Processor;
