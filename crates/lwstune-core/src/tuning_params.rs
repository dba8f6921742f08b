//! Tuning parameter value types: local-work-size triples and the secondary
//! workgroup-batch-size modifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A local-work-size hint.
///
/// Either unset (the driver picks the work-group shape) or an explicit
/// `(x, y, z)` triple with every component at least 1. The persisted text
/// format writes the unset state as `0;0;0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalWorkSize(Option<[usize; 3]>);

impl LocalWorkSize {
    /// The unset sentinel: no LWS is passed to the driver.
    pub const NULL: LocalWorkSize = LocalWorkSize(None);

    /// An explicit triple.
    ///
    /// # Panics
    ///
    /// Panics if any component is zero; use [`NULL`](Self::NULL) for "let
    /// the driver choose".
    pub fn xyz(x: usize, y: usize, z: usize) -> Self {
        assert!(x > 0 && y > 0 && z > 0, "explicit LWS components must be positive, got ({x}, {y}, {z})");
        Self(Some([x, y, z]))
    }

    /// Reconstruct from raw components where `(0, 0, 0)` means unset.
    ///
    /// Any other combination containing a zero is rejected as malformed.
    pub fn from_raw(x: usize, y: usize, z: usize) -> Option<Self> {
        match (x, y, z) {
            (0, 0, 0) => Some(Self::NULL),
            _ if x == 0 || y == 0 || z == 0 => None,
            _ => Some(Self(Some([x, y, z]))),
        }
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<[usize; 3]> {
        self.0
    }

    /// Work items per work group; 0 when unset.
    pub fn product(&self) -> usize {
        self.0.map(|[x, y, z]| x * y * z).unwrap_or(0)
    }

    /// Raw components for serialization: unset becomes `[0, 0, 0]`.
    pub fn raw(&self) -> [usize; 3] {
        self.0.unwrap_or([0, 0, 0])
    }
}

impl Default for LocalWorkSize {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for LocalWorkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some([x, y, z]) => write!(f, "({x}, {y}, {z})"),
            None => write!(f, "(null)"),
        }
    }
}

/// A full tuning parameter set for one kernel configuration.
///
/// `wbsm` is the workgroup-batch-size modifier, a device-specific secondary
/// tuning axis; 0 is neutral and devices that do not honor it ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningParams {
    pub lws: LocalWorkSize,
    pub wbsm: i32,
}

impl TuningParams {
    pub fn new(lws: LocalWorkSize, wbsm: i32) -> Self {
        Self { lws, wbsm }
    }

    /// Parameters meaning "no override at all".
    pub fn null() -> Self {
        Self::default()
    }
}

impl fmt::Display for TuningParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lws={} wbsm={}", self.lws, self.wbsm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_has_no_components() {
        let lws = LocalWorkSize::NULL;
        assert!(lws.is_null());
        assert_eq!(lws.get(), None);
        assert_eq!(lws.product(), 0);
        assert_eq!(lws.raw(), [0, 0, 0]);
    }

    #[test]
    fn explicit_triple_product() {
        let lws = LocalWorkSize::xyz(4, 4, 2);
        assert!(!lws.is_null());
        assert_eq!(lws.product(), 32);
        assert_eq!(lws.raw(), [4, 4, 2]);
    }

    #[test]
    #[should_panic(expected = "positive")]
    fn xyz_rejects_zero_component() {
        let _ = LocalWorkSize::xyz(4, 0, 1);
    }

    #[test]
    fn from_raw_zero_triple_is_null() {
        assert_eq!(LocalWorkSize::from_raw(0, 0, 0), Some(LocalWorkSize::NULL));
    }

    #[test]
    fn from_raw_partial_zero_is_malformed() {
        assert_eq!(LocalWorkSize::from_raw(4, 0, 1), None);
        assert_eq!(LocalWorkSize::from_raw(0, 1, 1), None);
    }

    #[test]
    fn default_params_are_null() {
        let p = TuningParams::null();
        assert!(p.lws.is_null());
        assert_eq!(p.wbsm, 0);
    }

    #[test]
    fn display_forms() {
        assert_eq!(LocalWorkSize::NULL.to_string(), "(null)");
        assert_eq!(LocalWorkSize::xyz(8, 2, 1).to_string(), "(8, 2, 1)");
        assert_eq!(TuningParams::new(LocalWorkSize::xyz(8, 2, 1), 4).to_string(), "lws=(8, 2, 1) wbsm=4");
    }
}
