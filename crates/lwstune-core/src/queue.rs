//! Command-queue and profiling-event abstraction.
//!
//! The tuner measures kernels through a [`CommandQueue`] object rather than
//! by patching a process-wide enqueue entry point: [`MeasuringQueue`] is a
//! decorator installed locally for one tuning round, so concurrent tuners
//! cannot corrupt each other and the real dispatch path is restored by
//! construction when the decorator goes out of scope.
//!
//! [`HostQueue`] is a simulated queue with a virtual nanosecond clock so
//! the whole scheduling/tuning protocol is testable without an OpenCL
//! runtime; the `opencl` feature adds [`ClQueue`] backed by `opencl3`.

use crate::error::ClError;
use crate::kernel::CompiledKernel;
use log::debug;
use std::sync::{Arc, Mutex};

/// Start/end device timestamps for exactly one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilingSample {
    start_ns: u64,
    end_ns: u64,
}

impl ProfilingSample {
    /// # Panics
    ///
    /// Panics if `end_ns < start_ns`.
    pub fn new(start_ns: u64, end_ns: u64) -> Self {
        assert!(end_ns >= start_ns, "profiling sample ends ({end_ns}) before it starts ({start_ns})");
        Self { start_ns, end_ns }
    }

    pub fn start_ns(&self) -> u64 {
        self.start_ns
    }

    pub fn end_ns(&self) -> u64 {
        self.end_ns
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.end_ns - self.start_ns
    }
}

/// One ND-range dispatch as seen by a command queue.
#[derive(Debug)]
pub struct NdRangeDispatch<'a> {
    pub kernel: &'a CompiledKernel,
    pub gws: [usize; 3],
    pub lws: Option<[usize; 3]>,
}

/// Owned record of a dispatch, kept by simulated queues for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub kernel: String,
    pub gws: [usize; 3],
    pub lws: Option<[usize; 3]>,
}

impl DispatchRecord {
    fn from_dispatch(d: &NdRangeDispatch<'_>) -> Self {
        Self { kernel: d.kernel.name().to_owned(), gws: d.gws, lws: d.lws }
    }
}

#[derive(Debug, Default)]
struct EventState {
    complete: bool,
    sample: Option<ProfilingSample>,
}

/// Completion handle for one dispatch.
///
/// The profiling sample is available only once the event is complete (after
/// the owning queue's `finish`) and only if the queue had profiling enabled.
#[derive(Debug, Clone, Default)]
pub struct DispatchEvent {
    state: Arc<Mutex<EventState>>,
}

impl DispatchEvent {
    /// A pending event, completed later by the queue.
    pub fn pending() -> Self {
        Self::default()
    }

    /// An already-complete event carrying `sample` (if profiled).
    pub fn completed(sample: Option<ProfilingSample>) -> Self {
        let ev = Self::default();
        ev.complete_with(sample);
        ev
    }

    /// Mark the event complete, attaching the sample when available.
    pub fn complete_with(&self, sample: Option<ProfilingSample>) {
        let mut state = self.state.lock().unwrap();
        state.complete = true;
        state.sample = sample;
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap().complete
    }

    pub fn profiling_sample(&self) -> Option<ProfilingSample> {
        self.state.lock().unwrap().sample
    }
}

/// The dispatch surface the scheduling and tuning core runs against.
pub trait CommandQueue {
    /// Issue one ND-range dispatch and return its completion event.
    ///
    /// The queue is not flushed; the dispatch may still be queued or running
    /// when this returns. Call [`finish`](Self::finish) before reading
    /// profiling samples.
    fn enqueue_nd_range(&mut self, dispatch: &NdRangeDispatch<'_>) -> Result<DispatchEvent, ClError>;

    /// Block until every enqueued dispatch has completed.
    fn finish(&mut self);

    /// Whether events from this queue carry profiling timestamps.
    fn profiling_enabled(&self) -> bool;

    /// A queue on the same context/device with profiling enabled.
    ///
    /// Precondition of the tuning engine: profiling must be obtainable.
    /// Implementations panic with a descriptive message when the
    /// environment cannot provide a profiling queue at all.
    fn fork_with_profiling(&self) -> Box<dyn CommandQueue>;
}

/// Cost model mapping a dispatch to its simulated duration in nanoseconds.
pub type CostModel = Arc<dyn Fn(&DispatchRecord) -> u64 + Send + Sync>;

/// In-process simulated command queue.
///
/// Dispatches execute synchronously against a virtual clock driven by a
/// pluggable cost model, and every dispatch is recorded for inspection.
/// Forks share the clock, model and dispatch log with their parent.
#[derive(Clone)]
pub struct HostQueue {
    profiling: bool,
    clock_ns: Arc<Mutex<u64>>,
    cost_model: CostModel,
    log: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl HostQueue {
    /// Queue without profiling, with a size-proportional default cost model.
    pub fn new() -> Self {
        Self::with_cost_model(Arc::new(|d: &DispatchRecord| {
            (d.gws[0] * d.gws[1] * d.gws[2]).max(1) as u64
        }))
    }

    pub fn with_cost_model(cost_model: CostModel) -> Self {
        Self {
            profiling: false,
            clock_ns: Arc::new(Mutex::new(0)),
            cost_model,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enable profiling on this queue in place.
    pub fn enable_profiling(mut self) -> Self {
        self.profiling = true;
        self
    }

    /// Snapshot of every dispatch issued so far (including via forks).
    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        self.log.lock().unwrap().clone()
    }

    /// Number of dispatches issued so far (including via forks).
    pub fn dispatch_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue for HostQueue {
    fn enqueue_nd_range(&mut self, dispatch: &NdRangeDispatch<'_>) -> Result<DispatchEvent, ClError> {
        let record = DispatchRecord::from_dispatch(dispatch);
        let cost = (self.cost_model)(&record);
        let (start, end) = {
            let mut clock = self.clock_ns.lock().unwrap();
            let start = *clock;
            *clock += cost;
            (start, *clock)
        };
        debug!("host dispatch '{}' gws={:?} lws={:?} ({} ns)", record.kernel, record.gws, record.lws, cost);
        self.log.lock().unwrap().push(record);

        let sample = self.profiling.then(|| ProfilingSample::new(start, end));
        Ok(DispatchEvent::completed(sample))
    }

    fn finish(&mut self) {
        // The host model executes synchronously; kept for contract parity.
    }

    fn profiling_enabled(&self) -> bool {
        self.profiling
    }

    fn fork_with_profiling(&self) -> Box<dyn CommandQueue> {
        Box::new(self.clone().enable_profiling())
    }
}

/// Measuring decorator installed for one tuning round.
///
/// Captures the completion event of the first dispatch and short-circuits
/// every further dispatch while that sample is pending: kernels that slice
/// a logical run into several hardware dispatches are timed on their first
/// slice only, and the remaining slices are skipped to save measurement
/// time.
pub struct MeasuringQueue<'q> {
    inner: &'q mut dyn CommandQueue,
    pending: Option<DispatchEvent>,
    skipped: usize,
}

impl<'q> MeasuringQueue<'q> {
    /// # Panics
    ///
    /// Panics if `inner` has no profiling: measurement through an
    /// unprofiled queue would silently yield no samples.
    pub fn new(inner: &'q mut dyn CommandQueue) -> Self {
        assert!(inner.profiling_enabled(), "MeasuringQueue requires a profiling-enabled queue");
        Self { inner, pending: None, skipped: 0 }
    }

    /// Finish the inner queue and drain the round's sample, if any.
    pub fn take_sample(&mut self) -> Option<ProfilingSample> {
        self.inner.finish();
        self.skipped = 0;
        self.pending.take().and_then(|ev| ev.profiling_sample())
    }

    /// Dispatches short-circuited in the current round.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl CommandQueue for MeasuringQueue<'_> {
    fn enqueue_nd_range(&mut self, dispatch: &NdRangeDispatch<'_>) -> Result<DispatchEvent, ClError> {
        if self.pending.is_some() {
            self.skipped += 1;
            debug!("skipping sliced dispatch of '{}' (sample already pending)", dispatch.kernel.name());
            return Ok(DispatchEvent::completed(None));
        }
        let event = self.inner.enqueue_nd_range(dispatch)?;
        self.pending = Some(event.clone());
        Ok(event)
    }

    fn finish(&mut self) {
        self.inner.finish();
    }

    fn profiling_enabled(&self) -> bool {
        true
    }

    fn fork_with_profiling(&self) -> Box<dyn CommandQueue> {
        self.inner.fork_with_profiling()
    }
}

/// OpenCL-backed queue.
#[cfg(feature = "opencl")]
pub use cl_queue::ClQueue;

#[cfg(feature = "opencl")]
mod cl_queue {
    use super::*;
    use opencl3::command_queue::{CommandQueue as RawQueue, CL_QUEUE_PROFILING_ENABLE};
    use opencl3::context::Context;
    use opencl3::event::Event;
    use opencl3::types::cl_device_id;
    use std::ptr;

    /// Command queue backed by a real OpenCL device.
    pub struct ClQueue {
        context: Arc<Context>,
        device_id: cl_device_id,
        queue: RawQueue,
        profiling: bool,
        in_flight: Vec<(Event, DispatchEvent)>,
    }

    impl ClQueue {
        pub fn new(context: Arc<Context>, device_id: cl_device_id, profiling: bool) -> Result<Self, ClError> {
            let properties = if profiling { CL_QUEUE_PROFILING_ENABLE } else { 0 };
            let queue = RawQueue::create(&context, device_id, properties)
                .map_err(|e| ClError::DeviceQuery(format!("queue creation failed: {e}")))?;
            Ok(Self { context, device_id, queue, profiling, in_flight: Vec::new() })
        }
    }

    impl CommandQueue for ClQueue {
        fn enqueue_nd_range(&mut self, dispatch: &NdRangeDispatch<'_>) -> Result<DispatchEvent, ClError> {
            let raw_kernel = match dispatch.kernel.raw() {
                Some(k) => k,
                // No compiled program: nothing to enqueue.
                None => return Ok(DispatchEvent::completed(None)),
            };
            let lws_ptr = dispatch.lws.as_ref().map_or(ptr::null(), |l| l.as_ptr());
            let raw_event = self
                .queue
                .enqueue_nd_range_kernel(raw_kernel.get(), 3, ptr::null(), dispatch.gws.as_ptr(), lws_ptr, &[])
                .map_err(|e| ClError::Dispatch { kernel: dispatch.kernel.name().to_owned(), code: e.0 })?;
            let event = DispatchEvent::pending();
            self.in_flight.push((raw_event, event.clone()));
            Ok(event)
        }

        fn finish(&mut self) {
            let _ = self.queue.finish();
            for (raw, event) in self.in_flight.drain(..) {
                let sample = if self.profiling {
                    match (raw.profiling_command_start(), raw.profiling_command_end()) {
                        (Ok(start), Ok(end)) => Some(ProfilingSample::new(start, end)),
                        _ => None,
                    }
                } else {
                    None
                };
                event.complete_with(sample);
            }
        }

        fn profiling_enabled(&self) -> bool {
            self.profiling
        }

        fn fork_with_profiling(&self) -> Box<dyn CommandQueue> {
            match ClQueue::new(Arc::clone(&self.context), self.device_id, true) {
                Ok(q) => Box::new(q),
                Err(e) => panic!("cannot create profiling queue on this device: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::CompiledKernel;

    fn dispatch<'a>(kernel: &'a CompiledKernel, gws: [usize; 3]) -> NdRangeDispatch<'a> {
        NdRangeDispatch { kernel, gws, lws: None }
    }

    #[test]
    fn sample_elapsed() {
        let s = ProfilingSample::new(100, 350);
        assert_eq!(s.elapsed_ns(), 250);
    }

    #[test]
    #[should_panic(expected = "ends")]
    fn sample_rejects_negative_elapsed() {
        let _ = ProfilingSample::new(10, 5);
    }

    #[test]
    fn host_queue_without_profiling_yields_no_samples() {
        let k = CompiledKernel::host("k");
        let mut q = HostQueue::new();
        let ev = q.enqueue_nd_range(&dispatch(&k, [8, 8, 1])).unwrap();
        q.finish();
        assert!(ev.is_complete());
        assert_eq!(ev.profiling_sample(), None);
        assert_eq!(q.dispatch_count(), 1);
    }

    #[test]
    fn host_queue_profiling_advances_virtual_clock() {
        let k = CompiledKernel::host("k");
        let mut q = HostQueue::new().enable_profiling();
        let e1 = q.enqueue_nd_range(&dispatch(&k, [4, 1, 1])).unwrap();
        let e2 = q.enqueue_nd_range(&dispatch(&k, [8, 1, 1])).unwrap();
        q.finish();

        let s1 = e1.profiling_sample().unwrap();
        let s2 = e2.profiling_sample().unwrap();
        assert_eq!(s1.elapsed_ns(), 4);
        assert_eq!(s2.elapsed_ns(), 8);
        // Back-to-back on the shared clock.
        assert_eq!(s2.start_ns(), s1.end_ns());
    }

    #[test]
    fn fork_shares_log_and_clock() {
        let k = CompiledKernel::host("k");
        let mut q = HostQueue::new();
        let mut forked = q.fork_with_profiling();
        assert!(forked.profiling_enabled());
        assert!(!q.profiling_enabled());

        forked.enqueue_nd_range(&dispatch(&k, [2, 1, 1])).unwrap();
        q.enqueue_nd_range(&dispatch(&k, [2, 1, 1])).unwrap();
        assert_eq!(q.dispatch_count(), 2);
    }

    #[test]
    fn measuring_queue_times_first_slice_only() {
        let k = CompiledKernel::host("sliced");
        let mut q = HostQueue::new().enable_profiling();
        let mut mq = MeasuringQueue::new(&mut q);

        // A sliced run: three hardware dispatches for one logical run.
        for _ in 0..3 {
            mq.enqueue_nd_range(&dispatch(&k, [16, 1, 1])).unwrap();
        }
        assert_eq!(mq.skipped(), 2);
        let sample = mq.take_sample().expect("first slice must be sampled");
        assert_eq!(sample.elapsed_ns(), 16);

        // Only the first slice reached the real queue.
        drop(mq);
        assert_eq!(q.dispatch_count(), 1);
    }

    #[test]
    fn measuring_queue_round_resets_after_take() {
        let k = CompiledKernel::host("k");
        let mut q = HostQueue::new().enable_profiling();
        let mut mq = MeasuringQueue::new(&mut q);

        mq.enqueue_nd_range(&dispatch(&k, [4, 1, 1])).unwrap();
        assert!(mq.take_sample().is_some());

        // Next round measures again.
        mq.enqueue_nd_range(&dispatch(&k, [8, 1, 1])).unwrap();
        let s = mq.take_sample().unwrap();
        assert_eq!(s.elapsed_ns(), 8);
        assert_eq!(mq.skipped(), 0);
    }

    #[test]
    #[should_panic(expected = "profiling-enabled")]
    fn measuring_queue_rejects_unprofiled_inner() {
        let mut q = HostQueue::new();
        let _ = MeasuringQueue::new(&mut q);
    }

    #[test]
    fn dispatches_after_decorator_drop_bypass_it() {
        let k = CompiledKernel::host("k");
        let mut q = HostQueue::new().enable_profiling();
        {
            let mut mq = MeasuringQueue::new(&mut q);
            mq.enqueue_nd_range(&dispatch(&k, [4, 1, 1])).unwrap();
            let _ = mq.take_sample();
        }
        // The real queue sees the follow-up dispatch directly.
        let before = q.dispatch_count();
        q.enqueue_nd_range(&dispatch(&k, [4, 1, 1])).unwrap();
        assert_eq!(q.dispatch_count(), before + 1);
    }
}
