// Constraint tracking: tracker seams, device signals, in-process tracker

pub mod device;
pub mod in_process;
pub mod tracker;

pub use device::{DeviceState, NetworkState};
pub use in_process::WorkConstraintsTracker;
pub use tracker::{ConstraintTracker, HostCapabilities, WorkConstraintsCallback};
