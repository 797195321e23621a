//! Binary persistence of the assembled subgrid tables.
//!
//! Layout convention: little-endian, packed, no padding, no checksums. The
//! header's declared counts are trusted on read. All floats are stored as
//! `f32`, planes in bin-major order (all cells of bin 0, then bin 1, ...).
//!
//! Quadtree file:
//! `i32 version, nr_cells, nr_uv_points, nbins`, then f32 planes
//! `z_zmin, z_zmax, z_zmean, z_volmax, depth×nbins,
//!  uv_zmin, uv_zmax, hrep×nbins, navg×nbins`.
//!
//! Regular file: `i32 nr_active, 1, nbins`, then the mask-compacted
//! (column-major ravel) f32 planes `z_zmin, z_zmax, z_volmax, depth×nbins`,
//! a u block `zmin, zmax, dhdz (constant 1.0, ignored by readers),
//! hrep×nbins, navg×nbins` and an identical v block. `z_zmean` is computed
//! but not persisted for the regular variant.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{BuildError, Result};
use crate::grid::RegularGrid;

/// Per-cell and per-face tables of a quadtree build, indexed by cell id and
/// by face-point offset.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadtreeTables {
    pub version: i32,
    pub nbins: usize,
    pub nr_cells: usize,
    pub nr_uv_points: usize,
    pub z_zmin: Vec<f32>,
    pub z_zmax: Vec<f32>,
    pub z_zmean: Vec<f32>,
    pub z_volmax: Vec<f32>,
    /// `nbins` planes of `nr_cells` entries each.
    pub z_depth: Vec<f32>,
    pub uv_zmin: Vec<f32>,
    pub uv_zmax: Vec<f32>,
    /// `nbins` planes of `nr_uv_points` entries each.
    pub uv_hrep: Vec<f32>,
    pub uv_navg: Vec<f32>,
}

impl QuadtreeTables {
    /// Zero-filled tables for `nr_cells` cells and `nr_uv_points` faces.
    pub fn zeroed(version: i32, nr_cells: usize, nr_uv_points: usize, nbins: usize) -> Self {
        Self {
            version,
            nbins,
            nr_cells,
            nr_uv_points,
            z_zmin: vec![0.0; nr_cells],
            z_zmax: vec![0.0; nr_cells],
            z_zmean: vec![0.0; nr_cells],
            z_volmax: vec![0.0; nr_cells],
            z_depth: vec![0.0; nbins * nr_cells],
            uv_zmin: vec![0.0; nr_uv_points],
            uv_zmax: vec![0.0; nr_uv_points],
            uv_hrep: vec![0.0; nbins * nr_uv_points],
            uv_navg: vec![0.0; nbins * nr_uv_points],
        }
    }

    /// Index into a cell plane stack for (bin, cell).
    #[inline]
    pub fn cell_plane_idx(&self, bin: usize, cell: usize) -> usize {
        bin * self.nr_cells + cell
    }

    /// Index into a face plane stack for (bin, face point).
    #[inline]
    pub fn face_plane_idx(&self, bin: usize, iuv: usize) -> usize {
        bin * self.nr_uv_points + iuv
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        write_i32(&mut w, self.version)?;
        write_i32(&mut w, self.nr_cells as i32)?;
        write_i32(&mut w, self.nr_uv_points as i32)?;
        write_i32(&mut w, self.nbins as i32)?;
        write_f32s(&mut w, &self.z_zmin)?;
        write_f32s(&mut w, &self.z_zmax)?;
        write_f32s(&mut w, &self.z_zmean)?;
        write_f32s(&mut w, &self.z_volmax)?;
        write_f32s(&mut w, &self.z_depth)?;
        write_f32s(&mut w, &self.uv_zmin)?;
        write_f32s(&mut w, &self.uv_zmax)?;
        write_f32s(&mut w, &self.uv_hrep)?;
        write_f32s(&mut w, &self.uv_navg)?;
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        let version = read_i32(&mut r)?;
        let nr_cells = read_count(&mut r, "nr_cells")?;
        let nr_uv_points = read_count(&mut r, "nr_uv_points")?;
        let nbins = read_count(&mut r, "nbins")?;
        Ok(Self {
            version,
            nbins,
            nr_cells,
            nr_uv_points,
            z_zmin: read_f32s(&mut r, nr_cells)?,
            z_zmax: read_f32s(&mut r, nr_cells)?,
            z_zmean: read_f32s(&mut r, nr_cells)?,
            z_volmax: read_f32s(&mut r, nr_cells)?,
            z_depth: read_f32s(&mut r, nbins * nr_cells)?,
            uv_zmin: read_f32s(&mut r, nr_uv_points)?,
            uv_zmax: read_f32s(&mut r, nr_uv_points)?,
            uv_hrep: read_f32s(&mut r, nbins * nr_uv_points)?,
            uv_navg: read_f32s(&mut r, nbins * nr_uv_points)?,
        })
    }

    /// Fail fast when an existing file disagrees with the configured bin
    /// count.
    pub fn ensure_nbins(&self, expected: usize) -> Result<()> {
        if self.nbins != expected {
            return Err(BuildError::Config(format!(
                "table file has nbins = {}, build configured nbins = {expected}",
                self.nbins
            )));
        }
        Ok(())
    }
}

/// Dense per-cell and per-face tables of a regular build, row-major over
/// `(nmax, mmax)`. Persisted through [`CompactRegularTables`].
#[derive(Clone, Debug, PartialEq)]
pub struct RegularTables {
    pub nbins: usize,
    pub nmax: usize,
    pub mmax: usize,
    pub z_zmin: Vec<f32>,
    pub z_zmax: Vec<f32>,
    pub z_zmean: Vec<f32>,
    pub z_volmax: Vec<f32>,
    pub z_depth: Vec<f32>,
    pub u_zmin: Vec<f32>,
    pub u_zmax: Vec<f32>,
    pub u_hrep: Vec<f32>,
    pub u_navg: Vec<f32>,
    pub v_zmin: Vec<f32>,
    pub v_zmax: Vec<f32>,
    pub v_hrep: Vec<f32>,
    pub v_navg: Vec<f32>,
}

impl RegularTables {
    pub fn zeroed(nmax: usize, mmax: usize, nbins: usize) -> Self {
        let nc = nmax * mmax;
        Self {
            nbins,
            nmax,
            mmax,
            z_zmin: vec![0.0; nc],
            z_zmax: vec![0.0; nc],
            z_zmean: vec![0.0; nc],
            z_volmax: vec![0.0; nc],
            z_depth: vec![0.0; nbins * nc],
            u_zmin: vec![0.0; nc],
            u_zmax: vec![0.0; nc],
            u_hrep: vec![0.0; nbins * nc],
            u_navg: vec![0.0; nbins * nc],
            v_zmin: vec![0.0; nc],
            v_zmax: vec![0.0; nc],
            v_hrep: vec![0.0; nbins * nc],
            v_navg: vec![0.0; nbins * nc],
        }
    }

    #[inline]
    pub fn cell_idx(&self, n: usize, m: usize) -> usize {
        n * self.mmax + m
    }

    #[inline]
    pub fn plane_idx(&self, bin: usize, n: usize, m: usize) -> usize {
        bin * self.nmax * self.mmax + n * self.mmax + m
    }

    /// Reorder the dense planes into the compacted active-cells-only form
    /// used on disk: column-major (Fortran ravel) traversal of the mask.
    pub fn compact(&self, grid: &RegularGrid) -> CompactRegularTables {
        assert_eq!((grid.nmax, grid.mmax), (self.nmax, self.mmax));
        let order = compaction_order(grid);
        let nc = self.nmax * self.mmax;
        let gather = |src: &[f32]| -> Vec<f32> { order.iter().map(|&i| src[i]).collect() };
        let gather_planes = |src: &[f32]| -> Vec<f32> {
            let mut out = Vec::with_capacity(self.nbins * order.len());
            for bin in 0..self.nbins {
                let plane = &src[bin * nc..(bin + 1) * nc];
                out.extend(order.iter().map(|&i| plane[i]));
            }
            out
        };
        CompactRegularTables {
            nbins: self.nbins,
            nr_active: order.len(),
            z_zmin: gather(&self.z_zmin),
            z_zmax: gather(&self.z_zmax),
            z_volmax: gather(&self.z_volmax),
            z_depth: gather_planes(&self.z_depth),
            u_zmin: gather(&self.u_zmin),
            u_zmax: gather(&self.u_zmax),
            u_hrep: gather_planes(&self.u_hrep),
            u_navg: gather_planes(&self.u_navg),
            v_zmin: gather(&self.v_zmin),
            v_zmax: gather(&self.v_zmax),
            v_hrep: gather_planes(&self.v_hrep),
            v_navg: gather_planes(&self.v_navg),
        }
    }

    /// Compact and persist in the regular-grid file layout.
    pub fn save(&self, grid: &RegularGrid, path: &Path) -> Result<()> {
        self.compact(grid).save(path)
    }
}

/// Row-major linear indices of active cells in column-major visit order.
fn compaction_order(grid: &RegularGrid) -> Vec<usize> {
    let mut order = Vec::with_capacity(grid.nr_active());
    for m in 0..grid.mmax {
        for n in 0..grid.nmax {
            if grid.mask_at(n, m) > 0 {
                order.push(n * grid.mmax + m);
            }
        }
    }
    order
}

/// Mask-compacted regular tables, matching the on-disk record order.
#[derive(Clone, Debug, PartialEq)]
pub struct CompactRegularTables {
    pub nbins: usize,
    pub nr_active: usize,
    pub z_zmin: Vec<f32>,
    pub z_zmax: Vec<f32>,
    pub z_volmax: Vec<f32>,
    pub z_depth: Vec<f32>,
    pub u_zmin: Vec<f32>,
    pub u_zmax: Vec<f32>,
    pub u_hrep: Vec<f32>,
    pub u_navg: Vec<f32>,
    pub v_zmin: Vec<f32>,
    pub v_zmax: Vec<f32>,
    pub v_hrep: Vec<f32>,
    pub v_navg: Vec<f32>,
}

impl CompactRegularTables {
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        write_i32(&mut w, self.nr_active as i32)?;
        write_i32(&mut w, 1)?;
        write_i32(&mut w, self.nbins as i32)?;

        write_f32s(&mut w, &self.z_zmin)?;
        write_f32s(&mut w, &self.z_zmax)?;
        write_f32s(&mut w, &self.z_volmax)?;
        write_f32s(&mut w, &self.z_depth)?;

        // Legacy dhdz plane, constant 1.0, skipped by current readers.
        let dhdz = vec![1.0f32; self.nr_active];
        write_f32s(&mut w, &self.u_zmin)?;
        write_f32s(&mut w, &self.u_zmax)?;
        write_f32s(&mut w, &dhdz)?;
        write_f32s(&mut w, &self.u_hrep)?;
        write_f32s(&mut w, &self.u_navg)?;

        write_f32s(&mut w, &self.v_zmin)?;
        write_f32s(&mut w, &self.v_zmax)?;
        write_f32s(&mut w, &dhdz)?;
        write_f32s(&mut w, &self.v_hrep)?;
        write_f32s(&mut w, &self.v_navg)?;
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        let nr_active = read_count(&mut r, "nr_active")?;
        let _min = read_i32(&mut r)?;
        let nbins = read_count(&mut r, "nbins")?;

        let z_zmin = read_f32s(&mut r, nr_active)?;
        let z_zmax = read_f32s(&mut r, nr_active)?;
        let z_volmax = read_f32s(&mut r, nr_active)?;
        let z_depth = read_f32s(&mut r, nbins * nr_active)?;

        let u_zmin = read_f32s(&mut r, nr_active)?;
        let u_zmax = read_f32s(&mut r, nr_active)?;
        let _dhdz = read_f32s(&mut r, nr_active)?;
        let u_hrep = read_f32s(&mut r, nbins * nr_active)?;
        let u_navg = read_f32s(&mut r, nbins * nr_active)?;

        let v_zmin = read_f32s(&mut r, nr_active)?;
        let v_zmax = read_f32s(&mut r, nr_active)?;
        let _dhdz = read_f32s(&mut r, nr_active)?;
        let v_hrep = read_f32s(&mut r, nbins * nr_active)?;
        let v_navg = read_f32s(&mut r, nbins * nr_active)?;

        Ok(Self {
            nbins,
            nr_active,
            z_zmin,
            z_zmax,
            z_volmax,
            z_depth,
            u_zmin,
            u_zmax,
            u_hrep,
            u_navg,
            v_zmin,
            v_zmax,
            v_hrep,
            v_navg,
        })
    }

    /// Scatter back onto the dense grid; inactive cells get 0.0 and an
    /// empty `z_zmean` plane (not persisted in this layout).
    pub fn scatter(&self, grid: &RegularGrid) -> RegularTables {
        let order = compaction_order(grid);
        assert_eq!(order.len(), self.nr_active, "mask does not match file");
        let mut dense = RegularTables::zeroed(grid.nmax, grid.mmax, self.nbins);
        let nc = grid.nmax * grid.mmax;
        let scatter1 = |dst: &mut [f32], src: &[f32]| {
            for (k, &i) in order.iter().enumerate() {
                dst[i] = src[k];
            }
        };
        let scatter_planes = |dst: &mut [f32], src: &[f32]| {
            for bin in 0..self.nbins {
                for (k, &i) in order.iter().enumerate() {
                    dst[bin * nc + i] = src[bin * self.nr_active + k];
                }
            }
        };
        scatter1(&mut dense.z_zmin, &self.z_zmin);
        scatter1(&mut dense.z_zmax, &self.z_zmax);
        scatter1(&mut dense.z_volmax, &self.z_volmax);
        scatter_planes(&mut dense.z_depth, &self.z_depth);
        scatter1(&mut dense.u_zmin, &self.u_zmin);
        scatter1(&mut dense.u_zmax, &self.u_zmax);
        scatter_planes(&mut dense.u_hrep, &self.u_hrep);
        scatter_planes(&mut dense.u_navg, &self.u_navg);
        scatter1(&mut dense.v_zmin, &self.v_zmin);
        scatter1(&mut dense.v_zmax, &self.v_zmax);
        scatter_planes(&mut dense.v_hrep, &self.v_hrep);
        scatter_planes(&mut dense.v_navg, &self.v_navg);
        dense
    }

    pub fn ensure_nbins(&self, expected: usize) -> Result<()> {
        if self.nbins != expected {
            return Err(BuildError::Config(format!(
                "table file has nbins = {}, build configured nbins = {expected}",
                self.nbins
            )));
        }
        Ok(())
    }
}

fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f32s<W: Write>(w: &mut W, vals: &[f32]) -> io::Result<()> {
    for &v in vals {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_count<R: Read>(r: &mut R, field: &str) -> Result<usize> {
    let v = read_i32(r)?;
    usize::try_from(v)
        .map_err(|_| BuildError::Config(format!("negative {field} in table header: {v}")))
}

fn read_f32s<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<f32>> {
    let mut out = Vec::with_capacity(count);
    let mut buf = [0u8; 4];
    for _ in 0..count {
        r.read_exact(&mut buf)?;
        out.push(f32::from_le_bytes(buf));
    }
    Ok(out)
}
