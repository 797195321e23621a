//! Regular build variant: dense (row, col) indexing over the active-cell
//! mask, one full u and one full v face per active cell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};

use super::{
    face_windows, store_cell, store_face, validate_layer_crs, BuildParams, FaceDir, FacePart,
};
use crate::error::{BuildError, Result};
use crate::grid::{pixel_size_in_meters, RegularGrid};
use crate::hypso::{conveyance_table, volume_table};
use crate::partition::blocks;
use crate::raster::RasterF64;
use crate::rasterize::{block_mesh, fill_elevation, fill_roughness};
use crate::report::{BuildReport, LevelReport};
use crate::source::{BathymetryLayer, DataSource, Reprojector, RoughnessLayer};
use crate::store::RegularTables;

/// Build subgrid tables for a regular grid.
///
/// Inactive cells keep zeroed table entries; the on-disk form drops them
/// through [`RegularTables::save`]. The report carries a single pseudo-level.
pub fn build_regular(
    grid: &RegularGrid,
    source: &dyn DataSource,
    reprojector: &dyn Reprojector,
    bathymetry: &[BathymetryLayer],
    roughness: &[RoughnessLayer],
    params: &BuildParams,
    cancel: Option<&AtomicBool>,
) -> Result<(RegularTables, BuildReport)> {
    params.validate(false)?;
    validate_layer_crs(reprojector, &grid.geometry.crs, bathymetry, roughness)?;

    let total_start = Instant::now();
    let refi = params.pixels_per_cell;
    let nbins = params.nbins;
    let nc = grid.nmax * grid.mmax;

    let (dx, dy) = (grid.geometry.dx, grid.geometry.dy);
    let dxp = dx / refi as f64;
    let dyp = dy / refi as f64;

    let mut tables = RegularTables::zeroed(grid.nmax, grid.mmax, nbins);
    let mut report = BuildReport::default();
    let mut level_report = LevelReport::default();
    let mut rasterize_ms = 0.0;
    let mut reduce_ms = 0.0;

    let blks = blocks(
        0,
        grid.nmax as i64 - 1,
        0,
        grid.mmax as i64 - 1,
        refi,
        params.nrmax,
    );
    info!(
        "regular grid {}x{}: {} active cells in {} blocks",
        grid.nmax,
        grid.mmax,
        grid.nr_active(),
        blks.len()
    );

    for (ib, block) in blks.iter().enumerate() {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(BuildError::Cancelled);
        }
        let block_start = Instant::now();

        let mesh = block_mesh(&grid.geometry, block, refi, dx, dy);
        let mut elevation = RasterF64::nan(mesh.ncols, mesh.nrows);
        let elev_fill = fill_elevation(
            &mut elevation,
            &mesh,
            source,
            reprojector,
            &grid.geometry.crs,
            bathymetry,
            dxp,
            params.depth_factor,
            params.z_floor,
        )?;
        let mut manning = RasterF64::nan(mesh.ncols, mesh.nrows);
        let rough_fill = fill_roughness(
            &mut manning,
            &elevation,
            &mesh,
            source,
            reprojector,
            &grid.geometry.crs,
            roughness,
            dxp,
        )?;
        level_report.elevation_gap_pixels += elev_fill.gaps;
        level_report.roughness_gap_pixels += rough_fill.gaps;
        rasterize_ms += block_start.elapsed().as_secs_f64() * 1000.0;
        let reduce_start = Instant::now();

        let mut cells_in_block = 0usize;
        for n in block.bn0..block.bn1 {
            for m in block.bm0..block.bm1 {
                if grid.mask_at(n as usize, m as usize) == 0 {
                    continue;
                }
                cells_in_block += 1;
                let idx = tables.cell_idx(n as usize, m as usize);
                let pn = ((n - block.bn0) as usize) * refi;
                let pm = ((m - block.bm0) as usize) * refi;

                let mean_lat = mesh.mean_y(pn, pm, refi, refi).abs();
                let (dxpm, dypm) = pixel_size_in_meters(&grid.geometry, dxp, dyp, mean_lat);

                let zv = elevation.window(pn, pm, refi, refi, false);
                let vt = volume_table(
                    &zv,
                    dxpm,
                    dypm,
                    nbins,
                    params.z_volume_floor,
                    params.max_gradient,
                );
                if vt.gradient_exhausted {
                    report.gradient_exhausted_cells += 1;
                }
                store_cell(
                    &mut tables.z_zmin,
                    &mut tables.z_zmax,
                    &mut tables.z_zmean,
                    &mut tables.z_volmax,
                    &mut tables.z_depth,
                    nc,
                    idx,
                    &vt,
                );

                let (zu, nu) =
                    face_windows(&elevation, &manning, pn, pm, refi, FaceDir::U, FacePart::Full);
                let cu = conveyance_table(&zu, &nu, nbins);
                store_face(
                    &mut tables.u_zmin,
                    &mut tables.u_zmax,
                    &mut tables.u_hrep,
                    &mut tables.u_navg,
                    nc,
                    idx,
                    &cu,
                );

                let (zv_face, nv) =
                    face_windows(&elevation, &manning, pn, pm, refi, FaceDir::V, FacePart::Full);
                let cv = conveyance_table(&zv_face, &nv, nbins);
                store_face(
                    &mut tables.v_zmin,
                    &mut tables.v_zmax,
                    &mut tables.v_hrep,
                    &mut tables.v_navg,
                    nc,
                    idx,
                    &cv,
                );
                level_report.face_points += 2;
            }
        }

        level_report.cells_processed += cells_in_block;
        level_report.blocks += 1;
        reduce_ms += reduce_start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "block {}/{}: {} cells, {:.1} ms",
            ib + 1,
            blks.len(),
            cells_in_block,
            block_start.elapsed().as_secs_f64() * 1000.0
        );
    }

    report.levels.push(level_report);
    report.timing.total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
    report.timing.push("rasterize", rasterize_ms);
    report.timing.push("reduce", reduce_ms);
    Ok((tables, report))
}
