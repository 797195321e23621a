//! Volume-depth reduction for one grid cell.
//!
//! Collapses an unordered pixel elevation population into a discretized,
//! monotonically non-decreasing elevation-vs-cumulative-volume curve:
//! clamp to a volume floor, sort, nudge duplicates so the curve has a
//! well-defined inverse, accumulate volume with a one-sample lag, resample
//! onto equal volume steps and bound the elevation gradient per step.

use super::is_close;

/// Result of [`volume_table`] for one cell.
#[derive(Clone, Debug)]
pub struct VolumeTable {
    /// Elevation at each of `nbins + 1` equal volume steps; entry 0 is the
    /// cell minimum. Strictly increasing for `max_gradient > 0`.
    pub z: Vec<f64>,
    /// Minimum elevation (first table entry).
    pub zmin: f64,
    /// Maximum elevation (last table entry, after gradient repair).
    pub zmax: f64,
    /// Mean of the clamped sample population.
    pub zmean: f64,
    /// Total wet volume at the highest level.
    pub volmax: f64,
    /// True when the gradient repair loop hit its iteration bound without
    /// converging; the table is the best-effort partially repaired one.
    pub gradient_exhausted: bool,
}

impl VolumeTable {
    /// The stored per-cell depth plane: the elevation table with its first
    /// entry dropped (index 0 is implicit, always `zmin`).
    pub fn depth_plane(&self) -> &[f64] {
        &self.z[1..]
    }
}

/// Reduce one cell's pixel elevations to a volume-depth table.
///
/// - `samples`: pixel elevations; NaN pixels (no source coverage) are
///   treated as the volume floor.
/// - `dx`, `dy`: pixel size in metres.
/// - `nbins`: number of table bins; the curve has `nbins + 1` entries.
/// - `z_volume_floor`: minimum elevation admitted to the volume integral.
/// - `max_gradient`: upper bound on elevation change per unit of
///   volume-per-area between consecutive bins.
pub fn volume_table(
    samples: &[f64],
    dx: f64,
    dy: f64,
    nbins: usize,
    z_volume_floor: f64,
    max_gradient: f64,
) -> VolumeTable {
    debug_assert!(!samples.is_empty());
    debug_assert!(nbins >= 1);

    let pixel_area = dx * dy;
    let area = samples.len() as f64 * pixel_area;

    let mut sorted: Vec<f64> = samples
        .iter()
        .map(|&v| if v.is_nan() { z_volume_floor } else { v.max(z_volume_floor) })
        .collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("no NaN after clamp"));

    // Nudge duplicates so the elevation sequence is strictly increasing and
    // volume -> elevation is invertible.
    for j in 1..sorted.len() {
        if sorted[j] <= sorted[j - 1] {
            sorted[j] = sorted[j - 1] + 1.0e-6;
        }
    }

    let zmean = sorted.iter().sum::<f64>() / sorted.len() as f64;

    // Cumulative volume with a one-sample lag: the entry for level i counts
    // only the i samples already below it. Zero-prefixed.
    let mut volume = Vec::with_capacity(sorted.len());
    volume.push(0.0);
    for i in 1..sorted.len() {
        let dv = (sorted[i] - sorted[i - 1]) * pixel_area * i as f64;
        volume.push(volume[i - 1] + dv);
    }
    let volmax = *volume.last().expect("non-empty volume series");

    // Resample elevation onto nbins + 1 equally spaced volume steps by
    // inverse linear interpolation of the (volume, elevation) curve.
    let dvol = volmax / nbins as f64;
    let mut z = Vec::with_capacity(nbins + 1);
    for k in 0..=nbins {
        let target = volmax * k as f64 / nbins as f64;
        z.push(interp_monotonic(&volume, &sorted, target));
    }

    // Bound the per-bin gradient dz / (dV/area). Every pass caps the worst
    // bin and propagates forward; the pass count is hard-bounded at nbins so
    // degenerate input cannot loop forever.
    let mut gradient_exhausted = false;
    let mut passes = 0usize;
    loop {
        let grads: Vec<f64> = (0..nbins).map(|i| gradient_at(&z, dvol, area, i)).collect();
        let worst = grads.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        if worst <= max_gradient || is_close(worst, max_gradient) {
            break;
        }
        if passes >= nbins {
            gradient_exhausted = true;
            break;
        }
        // Cap every bin at the worst gradient simultaneously: tied bins are
        // rebased on the pass-start table, not on each other's new values.
        let snapshot = z.clone();
        for i in 0..nbins {
            if grads[i] == worst {
                z[i + 1] = snapshot[i] + max_gradient * (dvol / area);
            }
        }
        passes += 1;
    }

    let zmin = z[0];
    let zmax = *z.last().expect("table has nbins + 1 entries");

    VolumeTable {
        z,
        zmin,
        zmax,
        zmean,
        volmax,
        gradient_exhausted,
    }
}

#[inline]
fn gradient_at(z: &[f64], dvol: f64, area: f64, i: usize) -> f64 {
    let dh = (dvol / area).max(0.001);
    (z[i + 1] - z[i]) / dh
}

/// Linear interpolation of `ys` at `target` over the non-decreasing `xs`.
/// `target` is always within `[xs[0], xs[last]]` by construction.
fn interp_monotonic(xs: &[f64], ys: &[f64], target: f64) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.len() == 1 || target <= xs[0] {
        return ys[0];
    }
    let last = xs.len() - 1;
    if target >= xs[last] {
        return ys[last];
    }
    let hi = xs.partition_point(|&x| x < target).max(1);
    let (x0, x1) = (xs[hi - 1], xs[hi]);
    let (y0, y1) = (ys[hi - 1], ys[hi]);
    if x1 == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (target - x0) / (x1 - x0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_cell_yields_strictly_increasing_table() {
        let samples = vec![5.0; 100];
        let t = volume_table(&samples, 1.0, 1.0, 4, -20.0, 5.0);
        assert_eq!(t.z.len(), 5);
        for w in t.z.windows(2) {
            assert!(w[1] > w[0], "table must be strictly increasing: {:?}", t.z);
        }
        assert!(t.volmax < 1.0e-2);
        assert_relative_eq!(t.zmin, 5.0, epsilon = 1e-9);
        assert!(t.zmax <= 5.0 + 100.0 * 1.0e-6 + 1e-9);
        assert!(!t.gradient_exhausted);
    }

    #[test]
    fn depth_plane_drops_first_entry() {
        let samples: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let t = volume_table(&samples, 2.0, 2.0, 4, -20.0, 999.0);
        assert_eq!(t.depth_plane().len(), 4);
        assert_relative_eq!(t.depth_plane()[3], t.zmax);
    }

    #[test]
    fn monotonic_and_order_invariant() {
        let samples = vec![3.0, -1.0, 7.5, 0.25, 2.0, 2.0, -4.0, 9.0, 1.5];
        let mut shuffled = samples.clone();
        shuffled.reverse();
        shuffled.swap(0, 4);

        let a = volume_table(&samples, 0.5, 0.5, 6, -20.0, 999.0);
        let b = volume_table(&shuffled, 0.5, 0.5, 6, -20.0, 999.0);
        assert_eq!(a.z, b.z);
        assert_eq!(a.volmax, b.volmax);
        assert_eq!(a.zmean, b.zmean);
        for w in a.z.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn reduction_is_idempotent() {
        let samples = vec![1.0, 4.0, -2.5, 0.0, 3.25, 6.0];
        let a = volume_table(&samples, 1.0, 2.0, 5, -20.0, 5.0);
        let b = volume_table(&samples, 1.0, 2.0, 5, -20.0, 5.0);
        assert_eq!(a.z, b.z);
        assert_eq!(a.volmax, b.volmax);
    }

    #[test]
    fn linear_ramp_matches_closed_form() {
        // z = x over [0, 1) with unit pixel area: the wetted volume below
        // level z is a triangle, V(z) = n * z^2 / 2 with n samples per unit.
        let n = 400usize;
        let samples: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let t = volume_table(&samples, 1.0, 1.0, 10, -20.0, 999.0);
        let zspan = t.z.last().unwrap() - t.z[0];
        for (k, &zk) in t.z.iter().enumerate() {
            let v_target = t.volmax * k as f64 / 10.0;
            let v_closed = n as f64 * (zk - t.z[0]).powi(2) / (2.0 * zspan);
            assert_relative_eq!(v_closed, v_target, epsilon = t.volmax * 0.02 + 1e-9);
        }
    }

    #[test]
    fn gradient_cap_limits_steps() {
        // A cliff: most pixels at 0, a few at 100. Without repair the last
        // bins jump by tens of metres per small volume step.
        let mut samples = vec![0.0; 90];
        samples.extend(vec![100.0; 10]);
        let max_gradient = 2.0;
        let t = volume_table(&samples, 1.0, 1.0, 8, -20.0, max_gradient);
        let area = 100.0;
        let dvol = t.volmax / 8.0;
        let dh = (dvol / area).max(0.001);
        for w in t.z.windows(2) {
            let g = (w[1] - w[0]) / dh;
            assert!(
                g <= max_gradient * (1.0 + 1e-5) + 1e-8 || t.gradient_exhausted,
                "gradient {g} exceeds bound"
            );
        }
    }

    #[test]
    fn tied_worst_bins_are_capped_together() {
        // Two pixels at 0 and 20: the resampled table [0, 10, 20] ties both
        // bins at the worst gradient. Each must end exactly one capped step
        // above its predecessor, rebased on the pass-start values.
        let t = volume_table(&[0.0, 20.0], 1.0, 1.0, 2, -20.0, 0.5);
        assert!(!t.gradient_exhausted);
        let step = 0.5 * (t.volmax / 2.0) / 2.0;
        assert_relative_eq!(t.z[1] - t.z[0], step, epsilon = 1e-9);
        assert_relative_eq!(t.z[2] - t.z[1], step, epsilon = 1e-9);
        assert_relative_eq!(t.zmax, t.z[0] + 2.0 * step, epsilon = 1e-9);
    }

    #[test]
    fn zero_gradient_terminates_within_bound() {
        // Repair either flattens the table completely or gives up at the
        // pass bound; both outcomes must return finite values, not loop.
        let samples = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let t = volume_table(&samples, 1.0, 1.0, 4, -20.0, 0.0);
        assert_eq!(t.z.len(), 5);
        for v in &t.z {
            assert!(v.is_finite());
        }
        let dh = (t.volmax / 4.0 / 8.0).max(0.001);
        if !t.gradient_exhausted {
            for w in t.z.windows(2) {
                assert!((w[1] - w[0]) / dh <= 1e-8);
            }
        }
    }

    #[test]
    fn nan_samples_fall_to_volume_floor() {
        let samples = vec![f64::NAN, f64::NAN, 1.0, 2.0];
        let t = volume_table(&samples, 1.0, 1.0, 2, -20.0, 999.0);
        assert_relative_eq!(t.zmin, -20.0, epsilon = 1e-9);
        assert!(t.volmax > 0.0);
    }
}
