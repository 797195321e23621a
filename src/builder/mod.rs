//! Build orchestration: turn a grid plus bathymetry/roughness layers into
//! subgrid lookup tables.
//!
//! One shared engine, two indexing variants:
//! - [`build_quadtree`]: per refinement level, including split flux faces at
//!   refinement transitions.
//! - [`build_regular`]: dense (row, col) indexing over the active-cell mask,
//!   one u and one v face per active cell.
//!
//! Stages per block: rasterize elevation and roughness
//! ([`crate::rasterize`]), then walk the block's cells, window out each
//! cell/face pixel population and reduce it ([`crate::hypso`]). Output
//! arrays are preallocated from a counting pass, so every block writes into
//! disjoint index ranges.

mod quadtree;
mod regular;

pub use quadtree::build_quadtree;
pub use regular::build_regular;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::hypso::{ConveyanceTable, VolumeTable};
use crate::raster::RasterF64;
use crate::source::{BathymetryLayer, Reprojector, RoughnessKind, RoughnessLayer};

/// Knobs shared by both build variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildParams {
    /// Number of lookup-table bins. Must match any previously written file.
    pub nbins: usize,
    /// Sub-grid refinement: pixels per coarse cell side.
    pub pixels_per_cell: usize,
    /// Upper bound on elevation change per unit of volume-per-area between
    /// consecutive volume-table bins.
    pub max_gradient: f64,
    /// Uniform scale applied to sampled elevations before the floor clamp.
    pub depth_factor: f64,
    /// Minimum elevation; uncovered pixels resolve here.
    pub z_floor: f64,
    /// Floor admitted to the volume integral (single-precision headroom).
    pub z_volume_floor: f64,
    /// Scratch raster budget: maximum pixel count per block side.
    pub nrmax: usize,
    /// Format version written to the quadtree table header.
    pub version: i32,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            nbins: 10,
            pixels_per_cell: 20,
            max_gradient: 5.0,
            depth_factor: 1.0,
            z_floor: -99999.0,
            z_volume_floor: -20.0,
            nrmax: 2000,
            version: 0,
        }
    }
}

impl BuildParams {
    /// Validate before any block is processed (fail fast).
    pub fn validate(&self, needs_split_faces: bool) -> Result<()> {
        if self.nbins < 1 {
            return Err(BuildError::Config("nbins must be >= 1".into()));
        }
        if self.pixels_per_cell < 2 || self.pixels_per_cell % 2 != 0 {
            return Err(BuildError::Config(format!(
                "pixels_per_cell must be even and >= 2, got {}",
                self.pixels_per_cell
            )));
        }
        if needs_split_faces && self.pixels_per_cell % 4 != 0 {
            return Err(BuildError::Config(format!(
                "quadtree split faces need pixels_per_cell divisible by 4, got {}",
                self.pixels_per_cell
            )));
        }
        if self.max_gradient.is_nan() || self.max_gradient < 0.0 {
            return Err(BuildError::Config(format!(
                "max_gradient must be >= 0, got {}",
                self.max_gradient
            )));
        }
        if self.nrmax < self.pixels_per_cell {
            return Err(BuildError::Config(format!(
                "nrmax ({}) below one cell of {} pixels",
                self.nrmax, self.pixels_per_cell
            )));
        }
        Ok(())
    }
}

/// Probe every configured reference-system pair once so a bad layer fails
/// the build before the first block.
pub(crate) fn validate_layer_crs(
    reprojector: &dyn Reprojector,
    grid_crs: &str,
    bathymetry: &[BathymetryLayer],
    roughness: &[RoughnessLayer],
) -> Result<()> {
    for layer in bathymetry {
        reprojector.transform(grid_crs, &layer.crs, &[], &[])?;
    }
    for layer in roughness {
        if let RoughnessKind::Source { crs, .. } = &layer.kind {
            reprojector.transform(grid_crs, crs, &[], &[])?;
        }
    }
    Ok(())
}

/// Which directional face is being windowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FaceDir {
    /// Right side (u point): flux axis is the column direction, so the
    /// window is transposed before the half-split.
    U,
    /// Upper side (v point).
    V,
}

/// Which part of the face the window covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FacePart {
    /// Neighbour at the same or a coarser level: one full-resolution window
    /// straddling the shared edge.
    Full,
    /// Finer neighbour, first half of the split face.
    SplitFirst,
    /// Finer neighbour, second half of the split face.
    SplitSecond,
}

/// Extract the flattened elevation and roughness populations of one face
/// window. `pn`, `pm` are the cell's pixel origin inside the block raster.
pub(crate) fn face_windows(
    elevation: &RasterF64,
    roughness: &RasterF64,
    pn: usize,
    pm: usize,
    refi: usize,
    dir: FaceDir,
    part: FacePart,
) -> (Vec<f64>, Vec<f64>) {
    let half = refi / 2;
    let quarter3 = 3 * refi / 4;
    let (r0, c0, nrows, ncols, transpose) = match (dir, part) {
        (FaceDir::U, FacePart::Full) => (pn, pm + half, refi, refi, true),
        (FaceDir::U, FacePart::SplitFirst) => (pn, pm + quarter3, half, half, true),
        (FaceDir::U, FacePart::SplitSecond) => (pn + half, pm + quarter3, half, half, true),
        (FaceDir::V, FacePart::Full) => (pn + half, pm, refi, refi, false),
        (FaceDir::V, FacePart::SplitFirst) => (pn + quarter3, pm, half, half, false),
        (FaceDir::V, FacePart::SplitSecond) => (pn + quarter3, pm + half, half, half, false),
    };
    (
        elevation.window(r0, c0, nrows, ncols, transpose),
        roughness.window(r0, c0, nrows, ncols, transpose),
    )
}

/// Copy one cell's volume table into f32 output planes.
pub(crate) fn store_cell(
    zmin: &mut [f32],
    zmax: &mut [f32],
    zmean: &mut [f32],
    volmax: &mut [f32],
    depth: &mut [f32],
    plane_len: usize,
    idx: usize,
    t: &VolumeTable,
) {
    zmin[idx] = t.zmin as f32;
    zmax[idx] = t.zmax as f32;
    zmean[idx] = t.zmean as f32;
    volmax[idx] = t.volmax as f32;
    for (bin, &z) in t.depth_plane().iter().enumerate() {
        depth[bin * plane_len + idx] = z as f32;
    }
}

/// Copy one face's conveyance table into f32 output planes.
pub(crate) fn store_face(
    zmin: &mut [f32],
    zmax: &mut [f32],
    hrep: &mut [f32],
    navg: &mut [f32],
    plane_len: usize,
    idx: usize,
    t: &ConveyanceTable,
) {
    zmin[idx] = t.zmin as f32;
    zmax[idx] = t.zmax as f32;
    for bin in 0..t.hrep.len() {
        hrep[bin * plane_len + idx] = t.hrep[bin] as f32;
        navg[bin * plane_len + idx] = t.navg[bin] as f32;
    }
}
