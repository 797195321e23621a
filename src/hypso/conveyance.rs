//! Conveyance-depth reduction for one flux-face pixel window.
//!
//! The window spans both sides of the face; the first half of the sample
//! vector is one side, the second half the other. `zmin` takes the max of
//! the two half-minimums so the table reflects the constraining (shallower)
//! side. This asymmetric choice is what the downstream solver expects; do
//! not average.

/// Result of [`conveyance_table`] for one flux face.
#[derive(Clone, Debug)]
pub struct ConveyanceTable {
    /// Max of the two half-window minimum elevations.
    pub zmin: f64,
    /// Max of the two half-window maximum elevations, forced at least
    /// 0.01 above `zmin`.
    pub zmax: f64,
    /// Conveyance depth per bin, `(q * navg)^(3/5)`. Not monotonic.
    pub hrep: Vec<f64>,
    /// Mean Manning roughness of pixels at or below each bin level.
    pub navg: Vec<f64>,
}

/// Reduce one face window to conveyance-depth and roughness tables.
///
/// `elevation` and `manning` are flattened window samples of equal length,
/// ordered so each half belongs to one side of the face. NaN roughness
/// propagates into `hrep`/`navg` untouched; a face with no roughness
/// coverage yields NaN bins (known limitation of the source data path).
pub fn conveyance_table(elevation: &[f64], manning: &[f64], nbins: usize) -> ConveyanceTable {
    debug_assert_eq!(elevation.len(), manning.len());
    debug_assert!(elevation.len() >= 2);
    debug_assert!(nbins >= 1);

    let n = elevation.len();
    let half = n / 2;
    let (side_a, side_b) = elevation.split_at(half);

    let min_of = |s: &[f64]| s.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_of = |s: &[f64]| s.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let zmin = min_of(side_a).max(min_of(side_b));
    let mut zmax = max_of(side_a).max(max_of(side_b));
    if zmax < zmin + 0.01 {
        zmax += 0.01;
    }

    let dbin = (zmax - zmin) / nbins as f64;
    let mut hrep = Vec::with_capacity(nbins);
    let mut navg = Vec::with_capacity(nbins);

    for ibin in 0..nbins {
        let zbin = zmin + (ibin + 1) as f64 * dbin;

        // Cell-average unit discharge at this level. Depth is measured from
        // the constraining-side minimum, never negative.
        let mut q_sum = 0.0;
        for (&z, &rough) in elevation.iter().zip(manning.iter()) {
            let depth = (zbin - z.max(zmin)).max(0.0);
            q_sum += depth.powf(5.0 / 3.0) / rough;
        }
        let q = q_sum / n as f64;

        // Mean roughness of wetted pixels. zbin >= zmin + dbin and some
        // pixel sits at or below zmin, so the set is never empty.
        let mut n_sum = 0.0;
        let mut n_cnt = 0usize;
        for (&z, &rough) in elevation.iter().zip(manning.iter()) {
            if z <= zbin {
                n_sum += rough;
                n_cnt += 1;
            }
        }
        let navg_bin = n_sum / n_cnt as f64;

        navg.push(navg_bin);
        hrep.push((q * navg_bin).powf(3.0 / 5.0));
    }

    ConveyanceTable {
        zmin,
        zmax,
        hrep,
        navg,
    }
}
