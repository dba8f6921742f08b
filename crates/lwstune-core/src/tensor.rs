//! Minimal tensor metadata consumed by kernel argument binding.
//!
//! The numeric content of tensors is out of scope here: argument
//! marshalling only needs byte strides, rank and an opaque device buffer
//! handle. [`TensorPack`] maps well-known argument slots to live tensors so
//! a tuning pass can measure a kernel against the caller's real bindings.

use crate::window::MAX_DIMS;
use std::collections::HashMap;

/// Opaque handle to a device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Layout metadata for a tensor: shape and byte strides per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorInfo {
    num_dims: usize,
    shape: [usize; MAX_DIMS],
    strides_in_bytes: [usize; MAX_DIMS],
}

impl TensorInfo {
    /// Build metadata from matching `shape` and `strides` (bytes per
    /// dimension) slices.
    pub fn new(shape: &[usize], strides: &[usize]) -> Self {
        assert!(shape.len() <= MAX_DIMS, "tensor rank {} exceeds {MAX_DIMS}", shape.len());
        assert_eq!(shape.len(), strides.len(), "shape rank {} != stride rank {}", shape.len(), strides.len());
        let mut s = [0usize; MAX_DIMS];
        s[..shape.len()].copy_from_slice(shape);
        let mut strides_in_bytes = [0usize; MAX_DIMS];
        strides_in_bytes[..strides.len()].copy_from_slice(strides);
        Self { num_dims: shape.len(), shape: s, strides_in_bytes }
    }

    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    /// Extent of dimension `dim` (1 for dimensions past the rank).
    pub fn dim(&self, dim: usize) -> usize {
        if dim < self.num_dims {
            self.shape[dim]
        } else {
            1
        }
    }

    /// Byte stride of dimension `dim` (0 for dimensions past the rank).
    pub fn stride(&self, dim: usize) -> usize {
        self.strides_in_bytes[dim]
    }
}

/// A device tensor: layout metadata plus its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tensor {
    info: TensorInfo,
    buffer: BufferHandle,
}

impl Tensor {
    pub fn new(info: TensorInfo, buffer: BufferHandle) -> Self {
        Self { info, buffer }
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }
}

/// Well-known argument slots shared between layers and kernels.
pub mod slots {
    pub const SRC_0: usize = 0;
    pub const SRC_1: usize = 1;
    pub const SRC_2: usize = 2;
    pub const DST_0: usize = 30;
    pub const DST_1: usize = 31;
}

/// Slot-indexed set of tensors passed to a kernel run.
#[derive(Debug, Default, Clone)]
pub struct TensorPack<'a> {
    tensors: HashMap<usize, &'a Tensor>,
}

impl<'a> TensorPack<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tensor` to `slot`, replacing any previous binding.
    pub fn add_tensor(&mut self, slot: usize, tensor: &'a Tensor) {
        self.tensors.insert(slot, tensor);
    }

    pub fn tensor(&self, slot: usize) -> Option<&'a Tensor> {
        self.tensors.get(&slot).copied()
    }

    /// Fetch a tensor a kernel cannot run without.
    ///
    /// # Panics
    ///
    /// Panics when the slot is unbound. A missing required tensor is a bug
    /// in the calling layer, caught at configure/bind time rather than
    /// surfacing as a driver error mid-dispatch.
    pub fn expect_tensor(&self, slot: usize) -> &'a Tensor {
        match self.tensor(slot) {
            Some(t) => t,
            None => panic!("required tensor missing from pack at slot {slot}"),
        }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_2d() -> Tensor {
        // 32x16 f32 tensor: 4 bytes per element, row stride 128.
        Tensor::new(TensorInfo::new(&[32, 16], &[4, 128]), BufferHandle(7))
    }

    #[test]
    fn info_reports_rank_shape_and_strides() {
        let t = tensor_2d();
        assert_eq!(t.info().num_dims(), 2);
        assert_eq!(t.info().dim(0), 32);
        assert_eq!(t.info().dim(1), 16);
        assert_eq!(t.info().dim(2), 1);
        assert_eq!(t.info().stride(0), 4);
        assert_eq!(t.info().stride(1), 128);
        assert_eq!(t.info().stride(2), 0);
    }

    #[test]
    fn pack_lookup_by_slot() {
        let src = tensor_2d();
        let dst = tensor_2d();
        let mut pack = TensorPack::new();
        pack.add_tensor(slots::SRC_0, &src);
        pack.add_tensor(slots::DST_0, &dst);

        assert_eq!(pack.len(), 2);
        assert!(pack.tensor(slots::SRC_0).is_some());
        assert!(pack.tensor(slots::SRC_1).is_none());
        assert_eq!(pack.expect_tensor(slots::DST_0).buffer(), BufferHandle(7));
    }

    #[test]
    #[should_panic(expected = "required tensor missing")]
    fn expect_tensor_panics_on_missing_slot() {
        let pack = TensorPack::new();
        let _ = pack.expect_tensor(slots::SRC_1);
    }

    #[test]
    #[should_panic(expected = "rank")]
    fn info_rejects_over_rank() {
        let _ = TensorInfo::new(&[1, 2, 3, 4, 5, 6, 7], &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    #[should_panic(expected = "rank")]
    fn info_rejects_mismatched_shape_and_strides() {
        let _ = TensorInfo::new(&[8, 8], &[4]);
    }
}
