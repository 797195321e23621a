//! Per-block pixel rasterization of bathymetry and roughness layers.
//!
//! For one block: build the sub-pixel center mesh in grid-local coordinates,
//! rotate/translate into world coordinates, then fold over the configured
//! layers in priority order. Each layer reprojects the mesh into its own
//! reference system, queries the data source over the padded bounding
//! extent, and writes samples only where the raster is still NaN
//! (first-writer-wins). A layer whose query returns no data contributes
//! nothing; only backend failures abort the build.

use log::debug;
use nalgebra::{Rotation2, Vector2};

use crate::grid::GridGeometry;
use crate::partition::Block;
use crate::raster::RasterF64;
use crate::source::{BathymetryLayer, DataSource, QueryError, Reprojector, RoughnessKind, RoughnessLayer};

/// World-coordinate pixel center mesh of one block.
pub struct BlockMesh {
    pub nrows: usize,
    pub ncols: usize,
    /// Row-major world x per pixel center.
    pub x: Vec<f64>,
    /// Row-major world y per pixel center.
    pub y: Vec<f64>,
}

impl BlockMesh {
    /// Mean world y over a pixel window; used for the geographic
    /// metres-per-degree correction.
    pub fn mean_y(&self, row0: usize, col0: usize, nrows: usize, ncols: usize) -> f64 {
        let mut sum = 0.0;
        for r in row0..row0 + nrows {
            let base = r * self.ncols;
            for c in col0..col0 + ncols {
                sum += self.y[base + c];
            }
        }
        sum / (nrows * ncols) as f64
    }
}

/// Build the pixel-center mesh of `block` at `refi` pixels per coarse cell
/// of size `(dx, dy)`, rotated and translated into world coordinates.
pub fn block_mesh(geometry: &GridGeometry, block: &Block, refi: usize, dx: f64, dy: f64) -> BlockMesh {
    let (nrows, ncols) = block.pixel_shape(refi);
    let dxp = dx / refi as f64;
    let dyp = dy / refi as f64;

    let rot = Rotation2::new(geometry.rotation_deg.to_radians());
    let origin = Vector2::new(geometry.x0, geometry.y0);

    let mut x = Vec::with_capacity(nrows * ncols);
    let mut y = Vec::with_capacity(nrows * ncols);
    for r in 0..nrows {
        let yl = 0.5 * dyp + (block.bn0 * refi as i64) as f64 * dyp + r as f64 * dyp;
        for c in 0..ncols {
            let xl = 0.5 * dxp + (block.bm0 * refi as i64) as f64 * dxp + c as f64 * dxp;
            let world = origin + rot * Vector2::new(xl, yl);
            x.push(world.x);
            y.push(world.y);
        }
    }
    BlockMesh { nrows, ncols, x, y }
}

/// Outcome of rasterizing one variable over one block.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterFill {
    /// Pixels filled by any layer.
    pub filled: usize,
    /// Pixels left NaN after all layers were consulted.
    pub gaps: usize,
}

/// Fill the elevation raster from ordered bathymetry layers, then apply the
/// depth scale factor and the minimum-floor clamp. NaN pixels (coverage
/// gaps) resolve to the floor; their count is reported.
#[allow(clippy::too_many_arguments)]
pub fn fill_elevation(
    raster: &mut RasterF64,
    mesh: &BlockMesh,
    source: &dyn DataSource,
    reprojector: &dyn Reprojector,
    grid_crs: &str,
    layers: &[BathymetryLayer],
    max_cell_size: f64,
    depth_factor: f64,
    z_floor: f64,
) -> Result<RasterFill, QueryError> {
    for layer in layers {
        if raster.nan_count() == 0 {
            break;
        }
        let Some(tile) = query_layer(
            source,
            reprojector,
            grid_crs,
            &layer.crs,
            &layer.name,
            mesh,
            max_cell_size,
        )?
        else {
            continue;
        };
        let mut tile = tile;
        // Clip samples outside the layer's valid elevation range.
        for v in tile.z.data.iter_mut() {
            if *v < layer.zmin || *v > layer.zmax {
                *v = f64::NAN;
            }
        }
        if tile.all_nan() {
            continue;
        }
        let (xb, yb) = reprojector.transform(grid_crs, &layer.crs, &mesh.x, &mesh.y)?;
        write_where_nan(raster, &tile, &xb, &yb);
    }

    let mut fill = RasterFill::default();
    for v in raster.data.iter_mut() {
        let scaled = *v * depth_factor;
        if scaled.is_nan() {
            fill.gaps += 1;
            *v = z_floor;
        } else {
            fill.filled += 1;
            *v = scaled.max(z_floor);
        }
    }
    debug!(
        "elevation raster: {} filled, {} gap pixels clamped to floor",
        fill.filled, fill.gaps
    );
    Ok(fill)
}

/// Fill the roughness raster from ordered roughness layers. Constant-by-level
/// layers key on the already-resolved elevation raster. Remaining NaN pixels
/// are counted but not resolved; their NaN propagates into the conveyance
/// tables.
pub fn fill_roughness(
    raster: &mut RasterF64,
    elevation: &RasterF64,
    mesh: &BlockMesh,
    source: &dyn DataSource,
    reprojector: &dyn Reprojector,
    grid_crs: &str,
    layers: &[RoughnessLayer],
    max_cell_size: f64,
) -> Result<RasterFill, QueryError> {
    for layer in layers {
        if raster.nan_count() == 0 {
            break;
        }
        match &layer.kind {
            RoughnessKind::Source { name, crs } => {
                let Some(tile) =
                    query_layer(source, reprojector, grid_crs, crs, name, mesh, max_cell_size)?
                else {
                    continue;
                };
                if tile.all_nan() {
                    continue;
                }
                let (xb, yb) = reprojector.transform(grid_crs, crs, &mesh.x, &mesh.y)?;
                write_where_nan(raster, &tile, &xb, &yb);
            }
            RoughnessKind::ConstantByLevel { level, below, above } => {
                for (v, &z) in raster.data.iter_mut().zip(elevation.data.iter()) {
                    if v.is_nan() {
                        *v = if z <= *level { *below } else { *above };
                    }
                }
            }
        }
    }

    let gaps = raster.nan_count();
    let fill = RasterFill {
        filled: raster.data.len() - gaps,
        gaps,
    };
    if fill.gaps > 0 {
        debug!("roughness raster: {} pixels left uncovered (NaN)", fill.gaps);
    }
    Ok(fill)
}

/// Reproject the mesh into the layer frame and query the padded bounding
/// extent at pixel resolution.
fn query_layer(
    source: &dyn DataSource,
    reprojector: &dyn Reprojector,
    grid_crs: &str,
    layer_crs: &str,
    name: &str,
    mesh: &BlockMesh,
    max_cell_size: f64,
) -> Result<Option<crate::source::SourceTile>, QueryError> {
    let (xb, yb) = reprojector.transform(grid_crs, layer_crs, &mesh.x, &mesh.y)?;
    let (mut xmin, mut xmax) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut ymin, mut ymax) = (f64::INFINITY, f64::NEG_INFINITY);
    for (&x, &y) in xb.iter().zip(yb.iter()) {
        xmin = xmin.min(x);
        xmax = xmax.max(x);
        ymin = ymin.min(y);
        ymax = ymax.max(y);
    }
    // 5% padding on each side.
    let ddx = 0.05 * (xmax - xmin);
    let ddy = 0.05 * (ymax - ymin);
    source.get_data(
        name,
        (xmin - ddx, xmax + ddx),
        (ymin - ddy, ymax + ddy),
        max_cell_size,
    )
}

/// Bilinear-sample `tile` at the reprojected pixel positions and write into
/// `raster` wherever it is still NaN.
fn write_where_nan(raster: &mut RasterF64, tile: &crate::source::SourceTile, xb: &[f64], yb: &[f64]) {
    for (i, v) in raster.data.iter_mut().enumerate() {
        if v.is_nan() {
            let s = tile.sample(xb[i], yb[i]);
            if !s.is_nan() {
                *v = s;
            }
        }
    }
}
