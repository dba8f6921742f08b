//! The kernel invocation contract: the surface the scheduler and tuner
//! need from a concrete kernel without knowing what it computes.
//!
//! Concrete kernels embed a [`KernelCore`] (composition in place of a base
//! class), configure it with their execution [`Window`], bind tensor
//! arguments through it, and implement [`ClKernel::run`] by calling
//! [`enqueue_with`]. The tuner only ever sees the [`ClKernel`] trait.

use crate::device::{DeviceInfo, GpuTarget};
use crate::error::ClError;
use crate::queue::{CommandQueue, NdRangeDispatch};
use crate::tensor::{BufferHandle, Tensor, TensorPack};
use crate::tuning_params::{LocalWorkSize, TuningParams};
use crate::window::Window;
use log::debug;

/// Configuration id of kernels whose behavior does not depend on the LWS.
/// Such kernels are never tuned and never appear in a tuning table.
pub const UNTUNABLE_CONFIG_ID: &str = "no_config_id";

/// Number of kernel argument slots one tensor of the given rank occupies:
/// buffer, per-dimension (stride, stride * window step), byte offset.
pub const fn num_arguments_per_tensor<const RANK: usize>() -> usize {
    2 + 2 * RANK
}

/// Argument slots occupied by the NHW 3-D layout helper.
pub const NUM_ARGUMENTS_PER_3D_TENSOR_NHW: usize = 7;

/// Argument slots occupied by the NHWC 4-D layout helper.
pub const NUM_ARGUMENTS_PER_4D_TENSOR_NHWC: usize = 9;

/// One bound kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg {
    Buffer(BufferHandle),
    Scalar(u32),
}

/// Handle to a compiled device program for one kernel entry point.
#[derive(Debug)]
pub enum CompiledKernel {
    /// Named stub used by the simulated backend.
    Host { name: String },
    #[cfg(feature = "opencl")]
    Cl { name: String, kernel: opencl3::kernel::Kernel },
}

impl CompiledKernel {
    pub fn host(name: impl Into<String>) -> Self {
        Self::Host { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Host { name } => name,
            #[cfg(feature = "opencl")]
            Self::Cl { name, .. } => name,
        }
    }

    #[cfg(feature = "opencl")]
    pub fn raw(&self) -> Option<&opencl3::kernel::Kernel> {
        match self {
            Self::Cl { kernel, .. } => Some(kernel),
            _ => None,
        }
    }
}

/// State shared by every concrete kernel: compiled handle, configured
/// window, tuning hints and the currently bound argument list.
///
/// Hint mutation is a configure-phase operation: setting a hint on a
/// kernel that has no window yet is a programmer error and panics.
#[derive(Debug)]
pub struct KernelCore {
    compiled: Option<CompiledKernel>,
    device: DeviceInfo,
    config_id: String,
    window: Option<Window>,
    tuning_hint: TuningParams,
    max_workgroup_size: Option<usize>,
    cached_gws: Option<[usize; 3]>,
    args: Vec<KernelArg>,
}

impl KernelCore {
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            compiled: None,
            device,
            config_id: UNTUNABLE_CONFIG_ID.to_owned(),
            window: None,
            tuning_hint: TuningParams::null(),
            max_workgroup_size: None,
            cached_gws: None,
            args: Vec::new(),
        }
    }

    /// Attach the compiled program. Without one, `enqueue` is a no-op.
    pub fn set_compiled(&mut self, kernel: CompiledKernel) {
        self.compiled = Some(kernel);
    }

    pub fn compiled(&self) -> Option<&CompiledKernel> {
        self.compiled.as_ref()
    }

    /// Configure with the device's default grid as the initial LWS hint.
    pub fn configure(&mut self, window: Window) {
        let [x, y, z] = self.device.default_grid();
        self.configure_with_hint(window, TuningParams::new(LocalWorkSize::xyz(x, y, z), 0));
    }

    /// Configure with an explicit tuning hint (kernel-type heuristics).
    pub fn configure_with_hint(&mut self, window: Window, hint: TuningParams) {
        self.window = Some(window);
        self.tuning_hint = hint;
    }

    pub fn is_configured(&self) -> bool {
        self.window.is_some()
    }

    /// The configured execution window.
    ///
    /// # Panics
    ///
    /// Panics when called before `configure`.
    pub fn window(&self) -> &Window {
        match &self.window {
            Some(w) => w,
            None => panic!("kernel '{}' used before configure()", self.name()),
        }
    }

    fn name(&self) -> &str {
        self.compiled.as_ref().map_or("<uncompiled>", |k| k.name())
    }

    fn assert_configured(&self, what: &str) {
        assert!(self.window.is_some(), "{what} called on unconfigured kernel '{}'", self.name());
    }

    pub fn set_lws_hint(&mut self, lws: LocalWorkSize) {
        self.assert_configured("set_lws_hint");
        self.tuning_hint.lws = lws;
    }

    pub fn lws_hint(&self) -> LocalWorkSize {
        self.tuning_hint.lws
    }

    pub fn set_wbsm_hint(&mut self, wbsm: i32) {
        self.assert_configured("set_wbsm_hint");
        self.tuning_hint.wbsm = wbsm;
    }

    pub fn wbsm_hint(&self) -> i32 {
        self.tuning_hint.wbsm
    }

    pub fn tuning_hint(&self) -> TuningParams {
        self.tuning_hint
    }

    /// Stable identity of this kernel's shape/parameter configuration.
    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn set_config_id(&mut self, id: impl Into<String>) {
        self.config_id = id.into();
    }

    pub fn is_tunable(&self) -> bool {
        self.config_id != UNTUNABLE_CONFIG_ID
    }

    pub fn target(&self) -> GpuTarget {
        self.device.target()
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Device ceiling on work-group size, queried once and cached.
    pub fn max_workgroup_size(&mut self) -> usize {
        match self.max_workgroup_size {
            Some(n) => n,
            None => {
                let n = self.device.max_work_group_size();
                self.max_workgroup_size = Some(n);
                n
            }
        }
    }

    pub fn cache_gws(&mut self, gws: [usize; 3]) {
        self.cached_gws = Some(gws);
    }

    pub fn cached_gws(&self) -> Option<[usize; 3]> {
        self.cached_gws
    }

    // ----- argument binding ------------------------------------------------

    /// Drop all bound arguments (start of a per-slice rebind).
    pub fn clear_args(&mut self) {
        self.args.clear();
    }

    pub fn args(&self) -> &[KernelArg] {
        &self.args
    }

    /// Bind a single scalar argument at `idx`, advancing it.
    pub fn add_argument(&mut self, idx: &mut usize, value: u32) {
        debug_assert_eq!(*idx, self.args.len(), "argument bound out of order at slot {idx}");
        self.args.push(KernelArg::Scalar(value));
        *idx += 1;
    }

    fn push_buffer(&mut self, idx: &mut usize, buffer: BufferHandle) {
        debug_assert_eq!(*idx, self.args.len(), "argument bound out of order at slot {idx}");
        self.args.push(KernelArg::Buffer(buffer));
        *idx += 1;
    }

    /// Bind a rank-`RANK` tensor's arguments starting at `idx`:
    /// buffer, then per dimension the byte stride and the stride scaled by
    /// the window step, then the byte offset of the first touched element.
    ///
    /// # Panics
    ///
    /// Panics if the binding does not occupy exactly `2 + 2*RANK` slots.
    pub fn add_tensor_argument<const RANK: usize>(&mut self, idx: &mut usize, tensor: &Tensor, window: &Window) {
        let idx_start = *idx;
        let info = *tensor.info();

        let mut offset_first_element: i64 = 0;
        for n in 0..info.num_dims() {
            offset_first_element += i64::from(window.dim(n).start()) * info.stride(n) as i64;
        }
        assert!(offset_first_element >= 0, "window starts before tensor origin (offset {offset_first_element})");

        self.push_buffer(idx, tensor.buffer());
        for dim in 0..RANK {
            self.add_argument(idx, info.stride(dim) as u32);
            self.add_argument(idx, (info.stride(dim) as i64 * i64::from(window.dim(dim).step())) as u32);
        }
        self.add_argument(idx, offset_first_element as u32);

        assert_eq!(
            *idx - idx_start,
            num_arguments_per_tensor::<RANK>(),
            "add_tensor_argument::<{RANK}>() must bind exactly {} arguments",
            num_arguments_per_tensor::<RANK>()
        );
    }

    /// Bind an NHW 3-D tensor: buffer, row/slice strides, base offset and
    /// the three extents. Always 7 slots.
    pub fn add_3d_tensor_nhw_argument(&mut self, idx: &mut usize, tensor: &Tensor) {
        let idx_start = *idx;
        let info = *tensor.info();
        self.push_buffer(idx, tensor.buffer());
        self.add_argument(idx, info.stride(1) as u32);
        self.add_argument(idx, info.stride(2) as u32);
        self.add_argument(idx, 0); // offset to first element
        self.add_argument(idx, info.dim(0) as u32);
        self.add_argument(idx, info.dim(1) as u32);
        self.add_argument(idx, info.dim(2) as u32);
        assert_eq!(
            *idx - idx_start,
            NUM_ARGUMENTS_PER_3D_TENSOR_NHW,
            "add_3d_tensor_nhw_argument() must bind exactly {NUM_ARGUMENTS_PER_3D_TENSOR_NHW} arguments"
        );
    }

    /// Bind an NHWC 4-D tensor: buffer, three outer strides, base offset
    /// and the four extents. Always 9 slots.
    pub fn add_4d_tensor_nhwc_argument(&mut self, idx: &mut usize, tensor: &Tensor) {
        let idx_start = *idx;
        let info = *tensor.info();
        self.push_buffer(idx, tensor.buffer());
        self.add_argument(idx, info.stride(1) as u32);
        self.add_argument(idx, info.stride(2) as u32);
        self.add_argument(idx, info.stride(3) as u32);
        self.add_argument(idx, 0); // offset to first element
        self.add_argument(idx, info.dim(0) as u32);
        self.add_argument(idx, info.dim(1) as u32);
        self.add_argument(idx, info.dim(2) as u32);
        self.add_argument(idx, info.dim(3) as u32);
        assert_eq!(
            *idx - idx_start,
            NUM_ARGUMENTS_PER_4D_TENSOR_NHWC,
            "add_4d_tensor_nhwc_argument() must bind exactly {NUM_ARGUMENTS_PER_4D_TENSOR_NHWC} arguments"
        );
    }
}

/// Global work size for `window`: iterations along X/Y/Z.
///
/// Returns `None` for a degenerate window (zero extent in X or Y) — such a
/// dispatch covers nothing and is skipped. With `use_dummy_work_items`, X
/// and Y are rounded up to the next power of two; the kernel is
/// responsible for bounds-checking the excess work items.
pub fn gws_from_window(window: &Window, use_dummy_work_items: bool) -> Option<[usize; 3]> {
    if window.x().extent() == 0 || window.y().extent() == 0 {
        return None;
    }
    let mut gws = [
        window.num_iterations(Window::DIM_X).max(1),
        window.num_iterations(Window::DIM_Y).max(1),
        window.num_iterations(Window::DIM_Z).max(1),
    ];
    if use_dummy_work_items {
        gws[0] = gws[0].next_power_of_two();
        gws[1] = gws[1].next_power_of_two();
    }
    Some(gws)
}

/// Enqueue `kernel` over `window`, splitting it into 3-D sub-dispatches
/// when it has extent in dimensions beyond Z. `bind` is invoked once per
/// sub-dispatch to (re)bind arguments for that slice.
///
/// The LWS hint is dropped entirely — the driver picks — when its product
/// exceeds the kernel's max workgroup size or any of its dimensions
/// exceeds the corresponding global dimension. No-op without a compiled
/// program or for a degenerate window.
pub fn enqueue_with<F>(
    queue: &mut dyn CommandQueue,
    kernel: &mut KernelCore,
    window: &Window,
    lws_hint: LocalWorkSize,
    use_dummy_work_items: bool,
    mut bind: F,
) -> Result<(), ClError>
where
    F: FnMut(&mut KernelCore, &Window),
{
    if kernel.compiled.is_none() {
        debug!("skipping enqueue: kernel has no compiled program");
        return Ok(());
    }
    let Some(gws) = gws_from_window(window, use_dummy_work_items) else {
        debug!("skipping enqueue of '{}': degenerate window", kernel.name());
        return Ok(());
    };
    kernel.cache_gws(gws);

    let lws = match lws_hint.get() {
        Some([x, y, z])
            if x * y * z <= kernel.max_workgroup_size() && x <= gws[0] && y <= gws[1] && z <= gws[2] =>
        {
            Some([x, y, z])
        }
        _ => None,
    };

    let mut slice = window.first_slice_3d();
    loop {
        bind(kernel, &slice);
        // The borrow of the compiled handle must not overlap the binder.
        let compiled = kernel.compiled.as_ref().unwrap();
        queue.enqueue_nd_range(&NdRangeDispatch { kernel: compiled, gws, lws })?;
        if !window.slide_slice_3d(&mut slice) {
            break;
        }
    }
    Ok(())
}

/// [`enqueue_with`] for kernels whose arguments are already bound.
pub fn enqueue(
    queue: &mut dyn CommandQueue,
    kernel: &mut KernelCore,
    window: &Window,
    lws_hint: LocalWorkSize,
    use_dummy_work_items: bool,
) -> Result<(), ClError> {
    enqueue_with(queue, kernel, window, lws_hint, use_dummy_work_items, |_, _| {})
}

/// The narrow kernel surface consumed by the scheduler and tuner.
pub trait ClKernel {
    fn core(&self) -> &KernelCore;
    fn core_mut(&mut self) -> &mut KernelCore;

    /// Enqueue this kernel over `window` using the current hints.
    fn run(&mut self, window: &Window, queue: &mut dyn CommandQueue) -> Result<(), ClError>;

    /// Enqueue with an explicit tensor pack (operator-style kernels).
    ///
    /// Defaults to ignoring the pack for kernels that bound their tensors
    /// at configure time.
    fn run_op(&mut self, tensors: &TensorPack<'_>, window: &Window, queue: &mut dyn CommandQueue) -> Result<(), ClError> {
        let _ = tensors;
        self.run(window, queue)
    }

    fn window(&self) -> Window {
        *self.core().window()
    }

    fn config_id(&self) -> &str {
        self.core().config_id()
    }

    fn target(&self) -> GpuTarget {
        self.core().target()
    }

    fn max_workgroup_size(&mut self) -> usize {
        self.core_mut().max_workgroup_size()
    }

    fn lws_hint(&self) -> LocalWorkSize {
        self.core().lws_hint()
    }

    fn set_lws_hint(&mut self, lws: LocalWorkSize) {
        self.core_mut().set_lws_hint(lws);
    }

    fn wbsm_hint(&self) -> i32 {
        self.core().wbsm_hint()
    }

    fn set_wbsm_hint(&mut self, wbsm: i32) {
        self.core_mut().set_wbsm_hint(wbsm);
    }
}
