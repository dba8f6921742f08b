//! Device capability queries: GPU target identification, compute-unit
//! count, workgroup limits and the default execution-grid granularity.
//!
//! The tuner never reaches into ambient global state for these; a
//! [`DeviceInfo`] is built once (from an OpenCL device under the `opencl`
//! feature, or explicitly in tests/embedders) and passed in.

use crate::error::ClError;
use std::fmt;
use tracing::debug;

/// Targeted GPU architecture, used as part of tuning-table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuTarget {
    /// Unknown or non-Mali device; tuning still works, keys just share a bucket.
    Unknown,
    Midgard,
    Bifrost,
    Valhall,
    G31,
    G51,
    G52,
    G71,
    G72,
    G76,
    G77,
    G78,
    G710,
}

impl GpuTarget {
    /// Stable name used in tuning-table keys.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Midgard => "MIDGARD",
            Self::Bifrost => "BIFROST",
            Self::Valhall => "VALHALL",
            Self::G31 => "G31",
            Self::G51 => "G51",
            Self::G52 => "G52",
            Self::G71 => "G71",
            Self::G72 => "G72",
            Self::G76 => "G76",
            Self::G77 => "G77",
            Self::G78 => "G78",
            Self::G710 => "G710",
        }
    }

    /// Best-effort parse of a device name string (e.g. "Mali-G72").
    pub fn from_device_name(name: &str) -> GpuTarget {
        let upper = name.to_uppercase();
        let known = [
            ("G710", Self::G710),
            ("G78", Self::G78),
            ("G77", Self::G77),
            ("G76", Self::G76),
            ("G72", Self::G72),
            ("G71", Self::G71),
            ("G52", Self::G52),
            ("G51", Self::G51),
            ("G31", Self::G31),
        ];
        for (pat, target) in known {
            if upper.contains(pat) {
                return target;
            }
        }
        if upper.contains("MALI-T") {
            return Self::Midgard;
        }
        debug!("unrecognised GPU device name '{}', using UNKNOWN target", name);
        Self::Unknown
    }

    /// Architecture family of a concrete part.
    pub fn family(&self) -> GpuTarget {
        match self {
            Self::G31 | Self::G51 | Self::G52 | Self::G71 | Self::G72 | Self::G76 => Self::Bifrost,
            Self::G77 | Self::G78 | Self::G710 => Self::Valhall,
            other => *other,
        }
    }
}

impl fmt::Display for GpuTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities of the active device, queried once and passed around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    target: GpuTarget,
    compute_units: u32,
    max_work_group_size: usize,
}

impl DeviceInfo {
    pub fn new(target: GpuTarget, compute_units: u32, max_work_group_size: usize) -> Self {
        assert!(compute_units > 0, "device reports zero compute units");
        assert!(max_work_group_size > 0, "device reports zero max workgroup size");
        Self { target, compute_units, max_work_group_size }
    }

    pub fn target(&self) -> GpuTarget {
        self.target
    }

    pub fn compute_units(&self) -> u32 {
        self.compute_units
    }

    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    /// Default execution-grid granularity for this target.
    ///
    /// Used as the LWS fallback shape when a kernel carries no hint at all.
    pub fn default_grid(&self) -> [usize; 3] {
        match self.target.family() {
            GpuTarget::Bifrost | GpuTarget::Valhall => [128, 1, 1],
            _ => [64, 1, 1],
        }
    }
}

/// Query the first OpenCL GPU device and build its [`DeviceInfo`].
#[cfg(feature = "opencl")]
pub fn query_first_gpu() -> Result<DeviceInfo, ClError> {
    use opencl3::device::{Device, CL_DEVICE_TYPE_GPU};
    use opencl3::platform::get_platforms;
    use tracing::info;

    let platforms = get_platforms().map_err(|e| ClError::DeviceQuery(format!("no OpenCL platforms: {e}")))?;
    for platform in platforms {
        let ids = platform.get_devices(CL_DEVICE_TYPE_GPU).unwrap_or_default();
        if let Some(&id) = ids.first() {
            let device = Device::new(id);
            let name = device.name().unwrap_or_default();
            let compute_units = device
                .max_compute_units()
                .map_err(|e| ClError::DeviceQuery(format!("CL_DEVICE_MAX_COMPUTE_UNITS: {e}")))?;
            let max_wg = device
                .max_work_group_size()
                .map_err(|e| ClError::DeviceQuery(format!("CL_DEVICE_MAX_WORK_GROUP_SIZE: {e}")))?;
            let target = GpuTarget::from_device_name(&name);
            info!("Selected GPU '{}' -> target {} ({} CUs)", name, target, compute_units);
            return Ok(DeviceInfo::new(target, compute_units, max_wg));
        }
    }
    Err(ClError::DeviceQuery("no GPU device found on any platform".into()))
}
