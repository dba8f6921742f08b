//! Core abstractions for OpenCL kernel scheduling and LWS auto-tuning.
//!
//! This crate provides:
//! - [`window`]: per-dimension execution windows and 3-D slice iteration
//! - [`tensor`]: tensor layout metadata and slot-indexed tensor packs
//! - [`device`]: GPU target identification and capability queries
//! - [`queue`]: the command-queue/profiling-event abstraction, including a
//!   simulated [`HostQueue`](queue::HostQueue) and the measuring decorator
//!   used during tuning
//! - [`kernel`]: the kernel invocation contract — argument marshalling,
//!   global-work-size derivation and the enqueue path
//! - [`tuning_params`]: local-work-size and secondary-modifier value types
//!
//! The `opencl` feature adds an `opencl3`-backed queue and device query;
//! everything else runs without a GPU.

pub mod device;
pub mod error;
pub mod kernel;
pub mod queue;
pub mod tensor;
pub mod tuning_params;
pub mod window;

pub use device::{DeviceInfo, GpuTarget};
pub use error::ClError;
pub use kernel::{
    enqueue, enqueue_with, gws_from_window, num_arguments_per_tensor, ClKernel, CompiledKernel,
    KernelArg, KernelCore, UNTUNABLE_CONFIG_ID,
};
pub use queue::{CommandQueue, DispatchEvent, DispatchRecord, HostQueue, MeasuringQueue, NdRangeDispatch, ProfilingSample};
pub use tensor::{slots, BufferHandle, Tensor, TensorInfo, TensorPack};
pub use tuning_params::{LocalWorkSize, TuningParams};
pub use window::{Dimension, Window, MAX_DIMS};
