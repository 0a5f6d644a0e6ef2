//! Probe-then-sleep loops and the task group that runs them.

pub mod engine;
pub mod supervisor;

pub use self::engine::{
    log_connection_status, log_speed_test, run_connectivity_loop, run_speed_loop,
};
pub use self::supervisor::{LoopExit, LoopKind, Supervisor};
