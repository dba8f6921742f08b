//! The empirical LWS tuner.
//!
//! For every tunable kernel the tuner keeps one table entry keyed by the
//! kernel's configuration id, the GPU target and its compute-unit count.
//! On a cache hit the stored parameters are applied without touching the
//! device; on a miss (and with tuning enabled) the kernel is dispatched
//! once per candidate work-group shape through a profiling queue and the
//! strictly fastest shape wins.
//!
//! Measurement happens through a [`MeasuringQueue`] decorator installed on
//! a local profiling queue for the duration of one search, so the caller's
//! queue and any concurrent tuner are never affected.

use crate::error::TunerError;
use crate::search_space::{search_space_for, LwsSearchSpace, TunerMode};
use crate::table::TuningTable;
use log::{debug, info, warn};
use lwstune_core::device::DeviceInfo;
use lwstune_core::error::ClError;
use lwstune_core::kernel::ClKernel;
use lwstune_core::queue::{CommandQueue, MeasuringQueue};
use lwstune_core::tensor::TensorPack;
use lwstune_core::tuning_params::TuningParams;
use lwstune_core::window::Window;
use std::collections::HashMap;
use std::path::Path;

/// Workgroup-batch-size modifier values swept after the LWS search.
const WBSM_CANDIDATES: [i32; 4] = [1, 2, 4, 8];

type Runner<'a> = dyn FnMut(&mut dyn ClKernel, &Window, &mut dyn CommandQueue) -> Result<(), ClError> + 'a;

/// Empirical tuner with a persistent parameter table.
pub struct ClTuner {
    device: DeviceInfo,
    table: TuningTable,
    tune_new_kernels: bool,
    tune_wbsm: bool,
    mode: TunerMode,
    space: Box<dyn LwsSearchSpace + Send + Sync>,
}

impl ClTuner {
    /// Tuner in [`TunerMode::Normal`] that searches unseen kernels.
    pub fn new(device: DeviceInfo) -> Self {
        Self::with_mode(device, TunerMode::default())
    }

    pub fn with_mode(device: DeviceInfo, mode: TunerMode) -> Self {
        Self {
            device,
            table: TuningTable::new(),
            tune_new_kernels: true,
            tune_wbsm: false,
            mode,
            space: search_space_for(mode),
        }
    }

    pub fn mode(&self) -> TunerMode {
        self.mode
    }

    /// Change the search mode; the candidate space follows it.
    pub fn set_mode(&mut self, mode: TunerMode) {
        self.mode = mode;
        self.space = search_space_for(mode);
    }

    /// Install a custom candidate space, overriding the mode's default.
    pub fn set_search_space(&mut self, space: Box<dyn LwsSearchSpace + Send + Sync>) {
        self.space = space;
    }

    pub fn tune_new_kernels(&self) -> bool {
        self.tune_new_kernels
    }

    /// When disabled, kernels missing from the table keep their configure-time
    /// hints and the table is never grown.
    pub fn set_tune_new_kernels(&mut self, enable: bool) {
        self.tune_new_kernels = enable;
    }

    pub fn tune_wbsm(&self) -> bool {
        self.tune_wbsm
    }

    /// Also sweep the workgroup-batch-size modifier on the winning LWS.
    pub fn set_tune_wbsm(&mut self, enable: bool) {
        self.tune_wbsm = enable;
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Table key for `kernel` on this tuner's device.
    pub fn key_for(&self, kernel: &dyn ClKernel) -> String {
        format!(
            "{}_{}_MP{}",
            kernel.config_id(),
            self.device.target().name(),
            self.device.compute_units()
        )
    }

    /// Tune `kernel` and apply the resulting hints.
    ///
    /// Untunable kernels are left alone. A cache hit applies the stored
    /// parameters without any dispatch; a miss runs the search when
    /// [`tune_new_kernels`](Self::tune_new_kernels) allows it and stores the
    /// winner.
    pub fn tune(&mut self, kernel: &mut dyn ClKernel, queue: &mut dyn CommandQueue) -> Result<(), ClError> {
        self.tune_with(kernel, queue, &mut |k, w, q| k.run(w, q))
    }

    /// [`tune`](Self::tune) for operator-style kernels run against a tensor
    /// pack: the measured dispatches use the caller's real tensor bindings.
    pub fn tune_op(
        &mut self,
        kernel: &mut dyn ClKernel,
        tensors: &TensorPack<'_>,
        queue: &mut dyn CommandQueue,
    ) -> Result<(), ClError> {
        self.tune_with(kernel, queue, &mut |k, w, q| k.run_op(tensors, w, q))
    }

    fn tune_with(
        &mut self,
        kernel: &mut dyn ClKernel,
        queue: &mut dyn CommandQueue,
        run: &mut Runner<'_>,
    ) -> Result<(), ClError> {
        if !kernel.core().is_tunable() {
            debug!("kernel has no configuration id, skipping tuning");
            return Ok(());
        }
        let key = self.key_for(kernel);
        if let Some(params) = self.table.get(&key) {
            debug!("cache hit for '{key}': {params}");
            kernel.set_lws_hint(params.lws);
            kernel.set_wbsm_hint(params.wbsm);
            return Ok(());
        }
        if !self.tune_new_kernels {
            debug!("'{key}' not in table and tuning of new kernels is off");
            return Ok(());
        }

        let Some(params) = self.find_optimal(kernel, queue, run)? else {
            debug!("'{key}' produced no measurable dispatch, leaving hints as configured");
            return Ok(());
        };
        info!("tuned '{key}': {params}");
        self.table.put(key, params);
        Ok(())
    }

    /// Search for the fastest parameters of an already-configured kernel.
    ///
    /// The baseline dispatch runs with the kernel's current hints; a
    /// candidate replaces the incumbent only when strictly faster, so on a
    /// tie the stored LWS stays unset and the driver keeps choosing.
    ///
    /// `Ok(None)` when the kernel dispatches nothing to measure (no compiled
    /// program, degenerate window): such runs are no-ops everywhere else and
    /// stay no-ops under tuning.
    fn find_optimal(
        &self,
        kernel: &mut dyn ClKernel,
        queue: &mut dyn CommandQueue,
        run: &mut Runner<'_>,
    ) -> Result<Option<TuningParams>, ClError> {
        let window = kernel.window();
        let max_wg = kernel.max_workgroup_size();

        // Measure on a local profiling queue; the caller's queue is used
        // directly only when it profiles already.
        let mut side: Option<Box<dyn CommandQueue>> = None;
        let profiling: &mut dyn CommandQueue = if queue.profiling_enabled() {
            queue
        } else {
            &mut **side.insert(queue.fork_with_profiling())
        };
        let mut measuring = MeasuringQueue::new(profiling);

        // Baseline with the configure-time hints.
        run(kernel, &window, &mut measuring)?;
        let Some(baseline) = measuring.take_sample() else {
            debug!("kernel '{}' dispatched nothing, skipping search", kernel.config_id());
            return Ok(None);
        };
        let Some(gws) = kernel.core().cached_gws() else {
            debug!("kernel '{}' cached no global work size, skipping search", kernel.config_id());
            return Ok(None);
        };
        let mut best = TuningParams::null();
        let mut best_ns = baseline.elapsed_ns();
        debug!("baseline for gws {gws:?}: {best_ns} ns with {}", kernel.lws_hint());

        for lws in self.space.candidates(gws, max_wg) {
            let Some([x, y, z]) = lws.get() else { continue };
            // Guards repeated here so a custom space cannot violate them.
            if (x, y, z) == (1, 1, 1) || x * y * z > max_wg {
                continue;
            }
            kernel.set_lws_hint(lws);
            run(kernel, &window, &mut measuring)?;
            match measuring.take_sample() {
                Some(sample) if sample.elapsed_ns() < best_ns => {
                    best_ns = sample.elapsed_ns();
                    best.lws = lws;
                    debug!("new best {lws}: {best_ns} ns");
                }
                Some(_) => {}
                None => warn!("no profiling sample for candidate {lws}, skipping"),
            }
        }

        if self.tune_wbsm {
            kernel.set_lws_hint(best.lws);
            for wbsm in WBSM_CANDIDATES {
                kernel.set_wbsm_hint(wbsm);
                run(kernel, &window, &mut measuring)?;
                if let Some(sample) = measuring.take_sample() {
                    if sample.elapsed_ns() < best_ns {
                        best_ns = sample.elapsed_ns();
                        best.wbsm = wbsm;
                        debug!("new best wbsm {wbsm}: {best_ns} ns");
                    }
                }
            }
        }

        kernel.set_lws_hint(best.lws);
        kernel.set_wbsm_hint(best.wbsm);
        Ok(Some(best))
    }

    // ----- table access and persistence ------------------------------------

    pub fn table(&self) -> &TuningTable {
        &self.table
    }

    /// Replace the whole table (e.g. with parameters tuned offline).
    pub fn import_table(&mut self, entries: HashMap<String, TuningParams>) {
        self.table.import(entries);
    }

    pub fn export_table(&self) -> HashMap<String, TuningParams> {
        self.table.export()
    }

    /// Load the table from the `key;x;y;z` text format, replacing current
    /// contents.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), TunerError> {
        self.table.load_from_text(path)
    }

    /// Persist the table. Returns `Ok(false)` without writing when there is
    /// nothing to persist: an empty table, tuning of new kernels disabled,
    /// or an empty path.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<bool, TunerError> {
        let path = path.as_ref();
        if !self.tune_new_kernels || self.table.is_empty() || path.as_os_str().is_empty() {
            return Ok(false);
        }
        self.table.save_to_text(path)?;
        Ok(true)
    }
}
