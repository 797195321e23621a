//! Synthetic data sources and grids for end-to-end builder tests.

use subgrid_tables::raster::RasterF64;
use subgrid_tables::{DataSource, GridGeometry, QueryError, RegularGrid, SourceTile};

/// Regular tile sampling `f(x, y)` over the requested extent at the
/// requested resolution.
pub fn tile_over(
    x_extent: (f64, f64),
    y_extent: (f64, f64),
    max_cell_size: f64,
    f: impl Fn(f64, f64) -> f64,
) -> SourceTile {
    let nx = ((x_extent.1 - x_extent.0) / max_cell_size).ceil() as usize + 2;
    let ny = ((y_extent.1 - y_extent.0) / max_cell_size).ceil() as usize + 2;
    let xs: Vec<f64> = (0..nx)
        .map(|i| x_extent.0 + (x_extent.1 - x_extent.0) * i as f64 / (nx - 1) as f64)
        .collect();
    let ys: Vec<f64> = (0..ny)
        .map(|i| y_extent.0 + (y_extent.1 - y_extent.0) * i as f64 / (ny - 1) as f64)
        .collect();
    let mut z = RasterF64::filled(nx, ny, 0.0);
    for iy in 0..ny {
        for ix in 0..nx {
            z.set(ix, iy, f(xs[ix], ys[iy]));
        }
    }
    SourceTile { x: xs, y: ys, z }
}

/// Unbounded planar bathymetry, `z = gx * x + gy * y + offset`.
pub struct PlaneSource {
    pub gx: f64,
    pub gy: f64,
    pub offset: f64,
}

impl PlaneSource {
    pub fn flat(z: f64) -> Self {
        Self {
            gx: 0.0,
            gy: 0.0,
            offset: z,
        }
    }
}

impl DataSource for PlaneSource {
    fn get_data(
        &self,
        _name: &str,
        x_extent: (f64, f64),
        y_extent: (f64, f64),
        max_cell_size: f64,
    ) -> Result<Option<SourceTile>, QueryError> {
        Ok(Some(tile_over(x_extent, y_extent, max_cell_size, |x, y| {
            self.gx * x + self.gy * y + self.offset
        })))
    }
}

/// Two named flat layers: "west" covers only `x < split`, "fallback" covers
/// everything. Any other layer name is an error.
pub struct TwoLayerSource {
    pub split: f64,
    pub west_z: f64,
    pub fallback_z: f64,
}

impl DataSource for TwoLayerSource {
    fn get_data(
        &self,
        name: &str,
        x_extent: (f64, f64),
        y_extent: (f64, f64),
        max_cell_size: f64,
    ) -> Result<Option<SourceTile>, QueryError> {
        match name {
            "west" => {
                let x1 = x_extent.1.min(self.split);
                if x_extent.0 >= x1 {
                    return Ok(None);
                }
                Ok(Some(tile_over(
                    (x_extent.0, x1),
                    y_extent,
                    max_cell_size,
                    |_, _| self.west_z,
                )))
            }
            "fallback" => Ok(Some(tile_over(x_extent, y_extent, max_cell_size, |_, _| {
                self.fallback_z
            }))),
            other => Err(QueryError::UnknownLayer(other.to_string())),
        }
    }
}

pub fn local_geometry(dx: f64, dy: f64) -> GridGeometry {
    GridGeometry {
        x0: 0.0,
        y0: 0.0,
        dx,
        dy,
        rotation_deg: 0.0,
        crs: "local".to_string(),
        geographic: false,
    }
}

/// Fully active regular grid with the local geometry.
pub fn open_regular_grid(nmax: usize, mmax: usize, dx: f64) -> RegularGrid {
    RegularGrid {
        geometry: local_geometry(dx, dx),
        nmax,
        mmax,
        mask: vec![1; nmax * mmax],
    }
}
