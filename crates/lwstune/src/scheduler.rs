//! Kernel scheduler: the single entry point through which kernels reach
//! the device queue, with tuning applied transparently on the way.

use log::debug;
use lwstune_core::error::ClError;
use lwstune_core::kernel::ClKernel;
use lwstune_core::queue::CommandQueue;
use lwstune_core::tensor::TensorPack;

use crate::tuner::ClTuner;

/// Owns the device queue and an optional tuner.
///
/// Without a tuner every kernel runs with its configure-time hints; with
/// one, each kernel is tuned (or served from the tuner's table) before its
/// first dispatch.
pub struct ClScheduler {
    queue: Box<dyn CommandQueue>,
    tuner: Option<ClTuner>,
}

impl ClScheduler {
    pub fn new(queue: Box<dyn CommandQueue>) -> Self {
        Self { queue, tuner: None }
    }

    pub fn with_tuner(queue: Box<dyn CommandQueue>, tuner: ClTuner) -> Self {
        Self { queue, tuner: Some(tuner) }
    }

    pub fn tuner(&self) -> Option<&ClTuner> {
        self.tuner.as_ref()
    }

    pub fn tuner_mut(&mut self) -> Option<&mut ClTuner> {
        self.tuner.as_mut()
    }

    pub fn queue(&self) -> &dyn CommandQueue {
        self.queue.as_ref()
    }

    /// Tune (when a tuner is installed) and enqueue `kernel` over its
    /// configured window.
    pub fn enqueue(&mut self, kernel: &mut dyn ClKernel) -> Result<(), ClError> {
        if let Some(tuner) = self.tuner.as_mut() {
            tuner.tune(kernel, self.queue.as_mut())?;
        }
        let window = kernel.window();
        debug!("enqueuing '{}' with {}", kernel.config_id(), kernel.lws_hint());
        kernel.run(&window, self.queue.as_mut())
    }

    /// [`enqueue`](Self::enqueue) for operator-style kernels with an
    /// explicit tensor pack.
    pub fn enqueue_op(&mut self, kernel: &mut dyn ClKernel, tensors: &TensorPack<'_>) -> Result<(), ClError> {
        if let Some(tuner) = self.tuner.as_mut() {
            tuner.tune_op(kernel, tensors, self.queue.as_mut())?;
        }
        let window = kernel.window();
        kernel.run_op(tensors, &window, self.queue.as_mut())
    }

    /// Block until every enqueued dispatch has completed.
    pub fn sync(&mut self) {
        self.queue.finish();
    }
}
