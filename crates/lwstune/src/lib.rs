//! Empirical local-work-size auto-tuning for OpenCL-style kernel dispatch.
//!
//! The [`ClTuner`] searches candidate work-group shapes for each kernel
//! configuration it has not seen before, keeps the winners in a
//! [`TuningTable`] keyed by configuration id, GPU target and compute-unit
//! count, and persists that table across runs. The [`ClScheduler`] wires
//! the tuner into the dispatch path so tuning stays transparent to callers.
//!
//! Kernel, window, queue and device abstractions live in `lwstune-core`,
//! re-exported here as [`core`].

pub mod error;
pub mod scheduler;
pub mod search_space;
pub mod table;
pub mod tuner;

pub use lwstune_core as core;

pub use error::TunerError;
pub use scheduler::ClScheduler;
pub use search_space::{search_space_for, ExhaustiveSpace, LwsSearchSpace, NormalSpace, RapidSpace, TunerMode};
pub use table::TuningTable;
pub use tuner::ClTuner;
