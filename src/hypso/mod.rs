//! Hypsometric reduction of sub-grid pixel populations.
//!
//! Two pure routines, no I/O and no grid awareness:
//! - [`volume_table`]: elevation samples of one cell → monotonic
//!   volume-depth lookup table.
//! - [`conveyance_table`]: elevation + roughness samples of one flux-face
//!   window → conveyance-depth and average-roughness tables.
//!
//! Both never fail; pathological input produces a flat-but-valid table.

mod conveyance;
mod volume;

pub use conveyance::{conveyance_table, ConveyanceTable};
pub use volume::{volume_table, VolumeTable};

/// NumPy-style closeness test (rtol = 1e-5, atol = 1e-8), used by the
/// max-gradient repair loop termination check.
#[inline]
pub(crate) fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1.0e-8 + 1.0e-5 * b.abs()
}
