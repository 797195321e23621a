//! External data-source and reprojection seams.
//!
//! The builder consumes bathymetry/roughness rasters through [`DataSource`]
//! and moves between reference systems through [`Reprojector`]. Both are
//! narrow traits implemented by the host application; this crate only ships
//! identity/synthetic implementations for tests and demos.
//!
//! A query that covers none of the requested extent returns `Ok(None)`
//! ("this layer contributes nothing") — only genuine backend failures are
//! errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raster::RasterF64;

/// Errors raised by data-source queries and reprojection.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    #[error("unsupported reference system pair: {from} -> {to}")]
    UnsupportedCrs { from: String, to: String },

    #[error("source query failed: {0}")]
    Backend(String),
}

/// A regular raster tile returned by a source query: ascending coordinate
/// axes plus a row-major value grid of shape `(y.len(), x.len())`.
#[derive(Clone, Debug)]
pub struct SourceTile {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: RasterF64,
}

impl SourceTile {
    /// Bilinear sample at (x, y). Outside the tile, or when any of the four
    /// surrounding nodes is NaN, the result is NaN.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let (Some(ix), Some(iy)) = (cell_index(&self.x, x), cell_index(&self.y, y)) else {
            return f64::NAN;
        };
        let (x0, x1) = (self.x[ix], self.x[ix + 1]);
        let (y0, y1) = (self.y[iy], self.y[iy + 1]);
        let tx = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
        let ty = if y1 > y0 { (y - y0) / (y1 - y0) } else { 0.0 };

        let z00 = self.z.get(ix, iy);
        let z10 = self.z.get(ix + 1, iy);
        let z01 = self.z.get(ix, iy + 1);
        let z11 = self.z.get(ix + 1, iy + 1);

        let top = z00 * (1.0 - tx) + z10 * tx;
        let bot = z01 * (1.0 - tx) + z11 * tx;
        top * (1.0 - ty) + bot * ty
    }

    /// True if every value in the tile is NaN.
    pub fn all_nan(&self) -> bool {
        self.z.data.iter().all(|v| v.is_nan())
    }
}

/// Index of the interval `[axis[i], axis[i+1]]` containing `v`, if any.
fn cell_index(axis: &[f64], v: f64) -> Option<usize> {
    if axis.len() < 2 || v < axis[0] || v > axis[axis.len() - 1] {
        return None;
    }
    let i = axis.partition_point(|&a| a <= v);
    Some(i.clamp(1, axis.len() - 1) - 1)
}

/// Sampling contract over named source rasters.
pub trait DataSource {
    /// Fetch data for `name` covering `x_extent × y_extent` at a resolution
    /// no coarser than `max_cell_size`. `Ok(None)` means the extent is
    /// entirely outside the source's coverage.
    fn get_data(
        &self,
        name: &str,
        x_extent: (f64, f64),
        y_extent: (f64, f64),
        max_cell_size: f64,
    ) -> Result<Option<SourceTile>, QueryError>;
}

/// Coordinate reprojection between named reference systems.
pub trait Reprojector {
    /// Transform coordinate arrays from `from` to `to`. Called once with
    /// empty arrays per configured layer before the build starts, so an
    /// unsupported pair fails fast.
    fn transform(
        &self,
        from: &str,
        to: &str,
        x: &[f64],
        y: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), QueryError>;
}

/// Pass-through reprojector for single-CRS models and tests.
pub struct IdentityReprojector;

impl Reprojector for IdentityReprojector {
    fn transform(
        &self,
        _from: &str,
        _to: &str,
        x: &[f64],
        y: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>), QueryError> {
        Ok((x.to_vec(), y.to_vec()))
    }
}

/// One bathymetry layer, visited in configured order (first-writer-wins).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BathymetryLayer {
    /// Source raster name passed to [`DataSource::get_data`].
    pub name: String,
    /// Reference system of the source raster.
    pub crs: String,
    /// Samples below this elevation are treated as missing.
    pub zmin: f64,
    /// Samples above this elevation are treated as missing.
    pub zmax: f64,
}

impl BathymetryLayer {
    pub fn new(name: impl Into<String>, crs: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            crs: crs.into(),
            zmin: f64::NEG_INFINITY,
            zmax: f64::INFINITY,
        }
    }
}

/// One roughness layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoughnessLayer {
    pub kind: RoughnessKind,
}

/// How a roughness layer produces Manning values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RoughnessKind {
    /// Sample a source raster, like bathymetry.
    Source { name: String, crs: String },
    /// Two fixed Manning values keyed on the resolved pixel elevation:
    /// `below` where elevation <= `level`, `above` otherwise.
    ConstantByLevel { level: f64, below: f64, above: f64 },
}
