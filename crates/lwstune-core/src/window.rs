//! Execution windows: the iteration space a kernel processes.
//!
//! A [`Window`] describes, per dimension, the `(start, end, step)` of the
//! region a dispatch covers. Windows are built once at kernel-configure time
//! and are immutable afterwards; the global work size and the per-tensor
//! argument offsets are both derived from them.

use std::fmt;

/// Maximum number of window/tensor dimensions supported.
pub const MAX_DIMS: usize = 6;

/// One dimension of an execution window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    start: i32,
    end: i32,
    step: i32,
}

impl Dimension {
    /// Create a dimension covering `[start, end)` with the given step.
    ///
    /// # Panics
    ///
    /// Panics if `end < start`.
    pub fn new(start: i32, end: i32, step: i32) -> Self {
        assert!(end >= start, "window dimension end ({end}) < start ({start})");
        Self { start, end, step }
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Extent of the dimension (`end - start`).
    pub fn extent(&self) -> i32 {
        self.end - self.start
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Self { start: 0, end: 0, step: 1 }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}):{}", self.start, self.end, self.step)
    }
}

/// An execution window over up to [`MAX_DIMS`] dimensions.
///
/// Dimensions not explicitly set are empty (`start == end`) with step 1, so
/// they contribute a single iteration to sliced dispatch and a zero offset
/// to argument binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    dims: [Dimension; MAX_DIMS],
}

impl Window {
    pub const DIM_X: usize = 0;
    pub const DIM_Y: usize = 1;
    pub const DIM_Z: usize = 2;

    /// An empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one dimension of the window.
    pub fn set(&mut self, dim: usize, d: Dimension) {
        assert!(dim < MAX_DIMS, "window dimension {dim} out of range (max {MAX_DIMS})");
        self.dims[dim] = d;
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with_dim(mut self, dim: usize, d: Dimension) -> Self {
        self.set(dim, d);
        self
    }

    pub fn dim(&self, dim: usize) -> Dimension {
        assert!(dim < MAX_DIMS, "window dimension {dim} out of range (max {MAX_DIMS})");
        self.dims[dim]
    }

    pub fn x(&self) -> Dimension {
        self.dims[Self::DIM_X]
    }

    pub fn y(&self) -> Dimension {
        self.dims[Self::DIM_Y]
    }

    pub fn z(&self) -> Dimension {
        self.dims[Self::DIM_Z]
    }

    /// Number of iterations the window performs along `dim`.
    ///
    /// Zero-extent dimensions report 0 iterations; a non-empty dimension
    /// with step 0 is a configuration bug and panics.
    pub fn num_iterations(&self, dim: usize) -> usize {
        let d = self.dim(dim);
        if d.extent() == 0 {
            return 0;
        }
        assert!(d.step() > 0, "window dimension {dim} has extent {} but step {}", d.extent(), d.step());
        (d.extent() / d.step()) as usize
    }

    /// Total iterations across dimensions 3 and above, i.e. how many 3-D
    /// slices a sliced dispatch of this window produces.
    pub fn num_slices_3d(&self) -> usize {
        let mut n = 1usize;
        for dim in 3..MAX_DIMS {
            n *= self.num_iterations(dim).max(1);
        }
        n
    }

    /// First 3-D slice of this window: dimensions 3+ collapsed to a single
    /// step starting at their current start.
    pub fn first_slice_3d(&self) -> Window {
        let mut slice = *self;
        for dim in 3..MAX_DIMS {
            let d = self.dims[dim];
            if d.extent() != 0 {
                slice.dims[dim] = Dimension::new(d.start(), d.start() + d.step(), d.step());
            }
        }
        slice
    }

    /// Advance `slice` to the next 3-D slice of this window.
    ///
    /// Returns `false` once the slices are exhausted. Iteration order is
    /// innermost-first over dimensions 3+.
    pub fn slide_slice_3d(&self, slice: &mut Window) -> bool {
        for dim in 3..MAX_DIMS {
            let full = self.dims[dim];
            if full.extent() == 0 {
                continue;
            }
            let cur = slice.dims[dim];
            let next_start = cur.start() + full.step();
            if next_start < full.end() {
                slice.dims[dim] = Dimension::new(next_start, next_start + full.step(), full.step());
                return true;
            }
            // Wrap this dimension and carry into the next one.
            slice.dims[dim] = Dimension::new(full.start(), full.start() + full.step(), full.step());
        }
        false
    }
}
