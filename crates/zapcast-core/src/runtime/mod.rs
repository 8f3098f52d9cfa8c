//! Supervised background task lifecycle

mod supervisor;

pub use supervisor::{TaskKey, TaskSupervisor};
