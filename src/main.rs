use subgrid_tables::{
    build_regular, BathymetryLayer, BuildParams, DataSource, GridGeometry, IdentityReprojector,
    QueryError, RegularGrid, RoughnessKind, RoughnessLayer, SourceTile,
};

use subgrid_tables::raster::RasterF64;

/// Synthetic bathymetry: a plane sloping down towards negative x.
struct RampSource;

impl DataSource for RampSource {
    fn get_data(
        &self,
        _name: &str,
        x_extent: (f64, f64),
        y_extent: (f64, f64),
        max_cell_size: f64,
    ) -> Result<Option<SourceTile>, QueryError> {
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
                z.set(ix, iy, 0.02 * xs[ix] - 10.0);
            }
        }
        Ok(Some(SourceTile { x: xs, y: ys, z }))
    }
}

fn main() {
    // Demo stub: builds tables for a small unrotated regular grid over a
    // synthetic sloping bathymetry and writes them next to the binary.
    let grid = RegularGrid {
        geometry: GridGeometry {
            x0: 0.0,
            y0: 0.0,
            dx: 50.0,
            dy: 50.0,
            rotation_deg: 0.0,
            crs: "local".to_string(),
            geographic: false,
        },
        nmax: 20,
        mmax: 20,
        mask: vec![1; 400],
    };
    let bathymetry = vec![BathymetryLayer::new("ramp", "local")];
    let roughness = vec![RoughnessLayer {
        kind: RoughnessKind::ConstantByLevel {
            level: 0.0,
            below: 0.025,
            above: 0.06,
        },
    }];

    let params = BuildParams::default();
    let built = build_regular(
        &grid,
        &RampSource,
        &IdentityReprojector,
        &bathymetry,
        &roughness,
        &params,
        None,
    );
    let (tables, report) = match built {
        Ok(out) => out,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    let path = std::path::Path::new("demo_subgrid.sbg");
    if let Err(err) = tables.save(&grid, path) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }

    println!(
        "cells={} gap_pixels={} total_ms={:.1} -> {}",
        report.cells_processed(),
        report.elevation_gap_pixels(),
        report.timing.total_ms,
        path.display()
    );
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("Error: failed to serialize report: {err}"),
    }
}
