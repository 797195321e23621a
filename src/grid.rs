//! Read-only computational grid inputs.
//!
//! Two topologies share the same geometry header ([`GridGeometry`]):
//! - [`QuadtreeGrid`]: cells ordered by refinement level, struct-of-arrays
//!   (row, col, level) plus directional neighbour links. A link can resolve
//!   to none, one same/coarser neighbour, or two finer sub-neighbours (a
//!   split face).
//! - [`RegularGrid`]: a dense `nmax × mmax` layout with an active-cell mask.

/// Grid placement shared by both topologies: origin, rotation, cell size
/// and reference system.
#[derive(Clone, Debug)]
pub struct GridGeometry {
    pub x0: f64,
    pub y0: f64,
    pub dx: f64,
    pub dy: f64,
    /// Counter-clockwise grid rotation in degrees.
    pub rotation_deg: f64,
    /// Named reference system of the grid.
    pub crs: String,
    /// True when `crs` is geographic (degrees); pixel sizes are then
    /// converted to metres per latitude before volume integration.
    pub geographic: bool,
}

/// Directional neighbour reference for one side of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborRef {
    /// Grid boundary: no face is produced.
    None,
    /// Neighbour at the same or a coarser level: one full face.
    Single(usize),
    /// Neighbour side is at a finer level: the face splits in two halves in
    /// (first, second) order along the shared edge. A half with no neighbour
    /// cell (domain edge at the transition) is `None` and produces no record.
    Split(Option<usize>, Option<usize>),
}

impl NeighborRef {
    /// Number of face records this link produces.
    pub fn face_count(&self) -> usize {
        match self {
            NeighborRef::None => 0,
            NeighborRef::Single(_) => 1,
            NeighborRef::Split(a, b) => a.is_some() as usize + b.is_some() as usize,
        }
    }
}

/// Adaptive quadtree grid, cells sorted by refinement level (coarsest
/// first). Cell (row, col) coordinates are expressed in that cell's own
/// level resolution.
#[derive(Clone, Debug)]
pub struct QuadtreeGrid {
    pub geometry: GridGeometry,
    pub nr_refinement_levels: usize,
    /// Per-cell row index at the cell's level.
    pub n: Vec<i64>,
    /// Per-cell column index at the cell's level.
    pub m: Vec<i64>,
    /// Per-cell refinement level, 0 = coarsest.
    pub level: Vec<usize>,
    /// Right-side (u) neighbour link per cell.
    pub right: Vec<NeighborRef>,
    /// Upper-side (v) neighbour link per cell.
    pub above: Vec<NeighborRef>,
}

/// Contiguous run of cells sharing one refinement level.
#[derive(Clone, Copy, Debug)]
pub struct LevelRun {
    pub level: usize,
    /// First cell index of the run.
    pub first: usize,
    /// One past the last cell index of the run.
    pub last: usize,
}

impl QuadtreeGrid {
    pub fn nr_cells(&self) -> usize {
        self.n.len()
    }

    /// Cell size at `level` (halves per refinement step).
    pub fn cell_size(&self, level: usize) -> (f64, f64) {
        let f = (1u64 << level) as f64;
        (self.geometry.dx / f, self.geometry.dy / f)
    }

    /// Contiguous per-level cell runs, relying on the level-sorted cell
    /// order. Levels with no cells yield empty runs.
    pub fn level_runs(&self) -> Vec<LevelRun> {
        let mut runs = Vec::with_capacity(self.nr_refinement_levels);
        let mut start = 0usize;
        for lev in 0..self.nr_refinement_levels {
            let mut end = start;
            while end < self.level.len() && self.level[end] == lev {
                end += 1;
            }
            runs.push(LevelRun {
                level: lev,
                first: start,
                last: end,
            });
            start = end;
        }
        debug_assert_eq!(start, self.level.len(), "cells must be level-sorted");
        runs
    }

    /// (row, col) bounding box (inclusive) of one level run.
    pub fn run_extent(&self, run: &LevelRun) -> Option<(i64, i64, i64, i64)> {
        if run.first == run.last {
            return None;
        }
        let rows = &self.n[run.first..run.last];
        let cols = &self.m[run.first..run.last];
        let n0 = *rows.iter().min().expect("non-empty run");
        let n1 = *rows.iter().max().expect("non-empty run");
        let m0 = *cols.iter().min().expect("non-empty run");
        let m1 = *cols.iter().max().expect("non-empty run");
        Some((n0, n1, m0, m1))
    }
}

/// Uniform structured grid with a dense activity mask.
#[derive(Clone, Debug)]
pub struct RegularGrid {
    pub geometry: GridGeometry,
    /// Number of rows.
    pub nmax: usize,
    /// Number of columns.
    pub mmax: usize,
    /// Row-major activity mask, `> 0` = active cell.
    pub mask: Vec<u8>,
}

impl RegularGrid {
    #[inline]
    pub fn mask_at(&self, n: usize, m: usize) -> u8 {
        self.mask[n * self.mmax + m]
    }

    /// Number of active cells.
    pub fn nr_active(&self) -> usize {
        self.mask.iter().filter(|&&v| v > 0).count()
    }
}

/// Metres per degree of latitude used for geographic pixel sizing.
pub(crate) const METERS_PER_DEGREE: f64 = 111_111.0;

/// Pixel size in metres for a cell, correcting geographic coordinates by
/// the cosine of the mean latitude of the cell's pixel window.
pub(crate) fn pixel_size_in_meters(
    geometry: &GridGeometry,
    dxp: f64,
    dyp: f64,
    mean_lat: f64,
) -> (f64, f64) {
    if geometry.geographic {
        let dxpm = dxp * METERS_PER_DEGREE * (std::f64::consts::PI * mean_lat / 180.0).cos();
        (dxpm, dyp * METERS_PER_DEGREE)
    } else {
        (dxp, dyp)
    }
}
