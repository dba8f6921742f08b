//! Error types for device queries and dispatch.
//!
//! Only runtime conditions are modelled as errors. Internal-consistency
//! violations (unconfigured kernels, argument-count mismatches, missing
//! required tensors) are bugs in the calling code and panic immediately
//! with a descriptive message instead of surfacing as values.

use thiserror::Error;

/// Errors arising from device queries and command-queue dispatch.
#[derive(Debug, Error)]
pub enum ClError {
    /// The device or platform could not be queried.
    #[error("device query failed: {0}")]
    DeviceQuery(String),

    /// A dispatch was rejected by the driver.
    #[error("dispatch of kernel '{kernel}' failed with code {code}")]
    Dispatch { kernel: String, code: i32 },

    /// Profiling timestamps were requested from a queue that cannot provide them.
    #[error("profiling unavailable: {0}")]
    ProfilingUnavailable(String),
}
