//! Candidate local-work-size generation.
//!
//! The search grid is built from the global work size of the dispatch being
//! tuned: power-of-two values along each axis, capped per tuning mode so the
//! exhaustive mode trades tuning time for coverage and the rapid mode keeps
//! first-run latency low.

use lwstune_core::tuning_params::LocalWorkSize;

/// How aggressively the tuner searches for a new kernel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunerMode {
    /// Every power-of-two shape that fits the dispatch.
    Exhaustive,
    /// A reduced grid biased towards common work-group shapes.
    #[default]
    Normal,
    /// A handful of candidates for latency-sensitive first runs.
    Rapid,
}

/// A source of candidate LWS values for one dispatch shape.
///
/// Candidates are pre-filtered: no zero components, never `(1, 1, 1)`, and
/// the work-group size never exceeds `max_workgroup_size`. The tuner still
/// re-checks these bounds so a custom space cannot break its invariants.
pub trait LwsSearchSpace {
    fn candidates(&self, gws: [usize; 3], max_workgroup_size: usize) -> Vec<LocalWorkSize>;
}

/// Powers of two from 1 up to `cap`, also bounded by `limit`.
fn pow2_axis(limit: usize, cap: usize) -> Vec<usize> {
    let top = limit.min(cap).max(1);
    let mut v = Vec::new();
    let mut n = 1usize;
    while n <= top {
        v.push(n);
        n *= 2;
    }
    v
}

fn grid(
    gws: [usize; 3],
    max_workgroup_size: usize,
    caps: [usize; 3],
) -> Vec<LocalWorkSize> {
    let xs = pow2_axis(gws[0], caps[0]);
    let ys = pow2_axis(gws[1], caps[1]);
    let zs = pow2_axis(gws[2], caps[2]);
    let mut out = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for &x in &xs {
        for &y in &ys {
            for &z in &zs {
                if x * y * z > max_workgroup_size || (x, y, z) == (1, 1, 1) {
                    continue;
                }
                out.push(LocalWorkSize::xyz(x, y, z));
            }
        }
    }
    out
}

/// The full power-of-two grid up to the device work-group limit.
#[derive(Debug, Default)]
pub struct ExhaustiveSpace;

impl LwsSearchSpace for ExhaustiveSpace {
    fn candidates(&self, gws: [usize; 3], max_workgroup_size: usize) -> Vec<LocalWorkSize> {
        let cap = max_workgroup_size;
        grid(gws, max_workgroup_size, [cap, cap, cap])
    }
}

/// X/Y capped at 64, Z at 8. Work-group shapes beyond that are almost never
/// optimal on the targeted GPUs and triple the search time.
#[derive(Debug, Default)]
pub struct NormalSpace;

impl LwsSearchSpace for NormalSpace {
    fn candidates(&self, gws: [usize; 3], max_workgroup_size: usize) -> Vec<LocalWorkSize> {
        grid(gws, max_workgroup_size, [64, 64, 8])
    }
}

/// X/Y capped at 16, Z fixed at 1.
#[derive(Debug, Default)]
pub struct RapidSpace;

impl LwsSearchSpace for RapidSpace {
    fn candidates(&self, gws: [usize; 3], max_workgroup_size: usize) -> Vec<LocalWorkSize> {
        grid(gws, max_workgroup_size, [16, 16, 1])
    }
}

/// The search space a tuning mode uses.
pub fn search_space_for(mode: TunerMode) -> Box<dyn LwsSearchSpace + Send + Sync> {
    match mode {
        TunerMode::Exhaustive => Box::new(ExhaustiveSpace),
        TunerMode::Normal => Box::new(NormalSpace),
        TunerMode::Rapid => Box::new(RapidSpace),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_are_powers_of_two_within_gws() {
        let cands = NormalSpace.candidates([16, 8, 2], 256);
        assert!(!cands.is_empty());
        for c in &cands {
            let [x, y, z] = c.get().unwrap();
            assert!(x.is_power_of_two() && x <= 16);
            assert!(y.is_power_of_two() && y <= 8);
            assert!(z.is_power_of_two() && z <= 2);
        }
    }

    #[test]
    fn trivial_shape_is_excluded() {
        for space in [
            search_space_for(TunerMode::Exhaustive),
            search_space_for(TunerMode::Normal),
            search_space_for(TunerMode::Rapid),
        ] {
            let cands = space.candidates([64, 64, 4], 256);
            assert!(cands.iter().all(|c| c.get() != Some([1, 1, 1])));
        }
    }

    #[test]
    fn workgroup_limit_is_respected() {
        let cands = ExhaustiveSpace.candidates([256, 256, 8], 128);
        assert!(cands.iter().all(|c| c.product() <= 128));
    }

    #[test]
    fn rapid_is_flat_and_small() {
        let rapid = RapidSpace.candidates([128, 128, 8], 256);
        let normal = NormalSpace.candidates([128, 128, 8], 256);
        assert!(rapid.len() < normal.len());
        assert!(rapid.iter().all(|c| c.get().unwrap()[2] == 1));
    }

    #[test]
    fn degenerate_axis_still_yields_candidates() {
        // gws y/z of 1 pin those axes to 1.
        let cands = NormalSpace.candidates([32, 1, 1], 256);
        assert!(!cands.is_empty());
        assert!(cands.iter().all(|c| {
            let [_, y, z] = c.get().unwrap();
            y == 1 && z == 1
        }));
    }

    #[test]
    fn default_mode_is_normal() {
        assert_eq!(TunerMode::default(), TunerMode::Normal);
    }
}
