//! Quadtree build variant: per-refinement-level block processing with split
//! flux faces at refinement transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};

use super::{
    face_windows, store_cell, store_face, validate_layer_crs, BuildParams, FaceDir, FacePart,
};
use crate::error::{BuildError, Result};
use crate::grid::{pixel_size_in_meters, NeighborRef, QuadtreeGrid};
use crate::hypso::{conveyance_table, volume_table};
use crate::partition::blocks;
use crate::raster::RasterF64;
use crate::rasterize::{block_mesh, fill_elevation, fill_roughness};
use crate::report::{BuildReport, LevelReport};
use crate::source::{BathymetryLayer, DataSource, Reprojector, RoughnessLayer};
use crate::store::QuadtreeTables;

/// Face-point offsets per cell and direction, assigned in a counting pass so
/// the output arrays can be preallocated and written at disjoint indices.
struct FaceIndex {
    right1: Vec<i64>,
    right2: Vec<i64>,
    above1: Vec<i64>,
    above2: Vec<i64>,
    count: usize,
}

fn index_faces(grid: &QuadtreeGrid) -> FaceIndex {
    let nc = grid.nr_cells();
    let mut fi = FaceIndex {
        right1: vec![-1; nc],
        right2: vec![-1; nc],
        above1: vec![-1; nc],
        above2: vec![-1; nc],
        count: 0,
    };
    let mut next = 0i64;
    let mut take = |slot: &mut i64| {
        *slot = next;
        next += 1;
    };
    for ip in 0..nc {
        match grid.right[ip] {
            NeighborRef::None => {}
            NeighborRef::Single(_) => take(&mut fi.right1[ip]),
            NeighborRef::Split(a, b) => {
                if a.is_some() {
                    take(&mut fi.right1[ip]);
                }
                if b.is_some() {
                    take(&mut fi.right2[ip]);
                }
            }
        }
        match grid.above[ip] {
            NeighborRef::None => {}
            NeighborRef::Single(_) => take(&mut fi.above1[ip]),
            NeighborRef::Split(a, b) => {
                if a.is_some() {
                    take(&mut fi.above1[ip]);
                }
                if b.is_some() {
                    take(&mut fi.above2[ip]);
                }
            }
        }
    }
    fi.count = next as usize;
    fi
}

/// Build subgrid tables for a quadtree grid.
///
/// Blocks are processed sequentially; `cancel` is checked between blocks and
/// aborts the build with [`BuildError::Cancelled`].
pub fn build_quadtree(
    grid: &QuadtreeGrid,
    source: &dyn DataSource,
    reprojector: &dyn Reprojector,
    bathymetry: &[BathymetryLayer],
    roughness: &[RoughnessLayer],
    params: &BuildParams,
    cancel: Option<&AtomicBool>,
) -> Result<(QuadtreeTables, BuildReport)> {
    params.validate(true)?;
    validate_layer_crs(reprojector, &grid.geometry.crs, bathymetry, roughness)?;

    let total_start = Instant::now();
    let refi = params.pixels_per_cell;
    let nbins = params.nbins;

    let fi = index_faces(grid);
    let mut tables = QuadtreeTables::zeroed(params.version, grid.nr_cells(), fi.count, nbins);
    let mut report = BuildReport::default();
    let mut rasterize_ms = 0.0;
    let mut reduce_ms = 0.0;

    for run in grid.level_runs() {
        let Some((n0, n1, m0, m1)) = grid.run_extent(&run) else {
            continue;
        };
        let (dx, dy) = grid.cell_size(run.level);
        let dxp = dx / refi as f64;
        let dyp = dy / refi as f64;
        let blks = blocks(n0, n1, m0, m1, refi, params.nrmax);
        info!(
            "level {}/{}: {} cells in {} blocks (dx={dx}, dy={dy})",
            run.level + 1,
            grid.nr_refinement_levels,
            run.last - run.first,
            blks.len()
        );

        let mut level_report = LevelReport {
            level: run.level,
            ..Default::default()
        };

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

            let in_block = (run.first..run.last).filter(|&ic| {
                grid.n[ic] >= block.bn0
                    && grid.n[ic] < block.bn1
                    && grid.m[ic] >= block.bm0
                    && grid.m[ic] < block.bm1
            });

            let mut cells_in_block = 0usize;
            for ic in in_block {
                cells_in_block += 1;
                let pn = ((grid.n[ic] - block.bn0) as usize) * refi;
                let pm = ((grid.m[ic] - block.bm0) as usize) * refi;

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
                    grid.nr_cells(),
                    ic,
                    &vt,
                );

                let mut reduce_face = |iuv: i64, dir: FaceDir, part: FacePart| {
                    if iuv < 0 {
                        return 0usize;
                    }
                    let (zf, nf) = face_windows(&elevation, &manning, pn, pm, refi, dir, part);
                    let ct = conveyance_table(&zf, &nf, nbins);
                    store_face(
                        &mut tables.uv_zmin,
                        &mut tables.uv_zmax,
                        &mut tables.uv_hrep,
                        &mut tables.uv_navg,
                        fi.count,
                        iuv as usize,
                        &ct,
                    );
                    1
                };

                let mut faces = 0usize;
                match grid.right[ic] {
                    NeighborRef::None => {}
                    NeighborRef::Single(_) => {
                        faces += reduce_face(fi.right1[ic], FaceDir::U, FacePart::Full);
                    }
                    NeighborRef::Split(_, _) => {
                        faces += reduce_face(fi.right1[ic], FaceDir::U, FacePart::SplitFirst);
                        faces += reduce_face(fi.right2[ic], FaceDir::U, FacePart::SplitSecond);
                    }
                }
                match grid.above[ic] {
                    NeighborRef::None => {}
                    NeighborRef::Single(_) => {
                        faces += reduce_face(fi.above1[ic], FaceDir::V, FacePart::Full);
                    }
                    NeighborRef::Split(_, _) => {
                        faces += reduce_face(fi.above1[ic], FaceDir::V, FacePart::SplitFirst);
                        faces += reduce_face(fi.above2[ic], FaceDir::V, FacePart::SplitSecond);
                    }
                }
                level_report.face_points += faces;
            }

            level_report.cells_processed += cells_in_block;
            level_report.blocks += 1;
            reduce_ms += reduce_start.elapsed().as_secs_f64() * 1000.0;
            debug!(
                "level {} block {}/{}: {} cells, {:.1} ms",
                run.level + 1,
                ib + 1,
                blks.len(),
                cells_in_block,
                block_start.elapsed().as_secs_f64() * 1000.0
            );
        }

        report.levels.push(level_report);
    }

    report.timing.total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
    report.timing.push("rasterize", rasterize_ms);
    report.timing.push("reduce", reduce_ms);
    Ok((tables, report))
}
