//! # Engine Module
//!
//! The stateful execution layer: everything between a rendered deck on disk
//! and a merged cross-section library.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Run-scoped pipeline settings and their validation
//! - **Tasks** ([`task`]) - Solver invocations, their files and lifecycle states
//! - **Output Cache** ([`cache`]) - Content-addressed store of solver outputs
//! - **Execution** ([`executor`]) - Isolated, scratch-directory solver runs
//! - **Dispatch** ([`dispatcher`]) - Fan-out of tasks over a worker pool and result gathering
//! - **Merging** ([`merge`]) - Combination of per-task libraries and aggregate values
//! - **Pipeline** ([`pipeline`]) - The concrete implementation chosen for each role
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - The engine error taxonomy
//!
//! ## Key Capabilities
//!
//! - **At most one solver run** per unique executable and input contents
//! - **Collision-free concurrency** for a solver that writes fixed scratch file names
//! - **Independent task outcomes** with every failure reported once all tasks finish
//! - **Deterministic merging** regardless of task completion order

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod task;
