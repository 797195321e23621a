//! Memory-bounded block decomposition of the coarse grid.
//!
//! The scratch pixel raster for one block must stay under a fixed element
//! budget, so the (row, col) extent of a refinement level (quadtree) or of
//! the whole grid (regular) is tiled into square-ish blocks of at most
//! `floor(nrmax / refi)` coarse cells per side. Each block's pixel extent is
//! expanded by one coarse cell on the high-row/high-col side so flux faces
//! reaching into the next block's first row/column can be windowed without
//! leaving the rasterized area.

/// One rectangular block of coarse cells.
///
/// Cells with `bn0 <= row < bn1` and `bm0 <= col < bm1` belong to the
/// block; the pixel raster covers one extra cell beyond `bn1`/`bm1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub bn0: i64,
    pub bn1: i64,
    pub bm0: i64,
    pub bm1: i64,
}

impl Block {
    /// Pixel raster shape (rows, cols) at `refi` pixels per cell,
    /// including the one-cell expansion.
    pub fn pixel_shape(&self, refi: usize) -> (usize, usize) {
        let cell_rows = (self.bn1 - self.bn0 + 1) as usize;
        let cell_cols = (self.bm1 - self.bm0 + 1) as usize;
        (cell_rows * refi, cell_cols * refi)
    }
}

/// Tile the inclusive cell extent `[n0, n1] × [m0, m1]` into blocks whose
/// expanded pixel rasters stay under `nrmax × nrmax` elements at `refi`
/// pixels per cell. Blocks are emitted column-of-blocks first, matching the
/// deterministic visit order of the original builder.
pub fn blocks(n0: i64, n1: i64, m0: i64, m1: i64, refi: usize, nrmax: usize) -> Vec<Block> {
    assert!(refi >= 1 && nrmax >= refi, "block budget below one cell");
    let nrcb = (nrmax / refi) as i64; // coarse cells per block side
    let nrbn = div_ceil(n1 - n0 + 1, nrcb); // blocks in row direction
    let nrbm = div_ceil(m1 - m0 + 1, nrcb); // blocks in col direction

    let mut out = Vec::with_capacity((nrbn * nrbm) as usize);
    for ii in 0..nrbm {
        for jj in 0..nrbn {
            let bn0 = n0 + jj * nrcb;
            let bn1 = (bn0 + nrcb - 1).min(n1) + 1;
            let bm0 = m0 + ii * nrcb;
            let bm1 = (bm0 + nrcb - 1).min(m1) + 1;
            out.push(Block { bn0, bn1, bm0, bm1 });
        }
    }
    out
}

#[inline]
fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_covers_small_extent() {
        let bs = blocks(0, 9, 0, 9, 20, 2000);
        assert_eq!(bs.len(), 1);
        let b = bs[0];
        assert_eq!(b, Block { bn0: 0, bn1: 10, bm0: 0, bm1: 10 });
        // 10 cells + 1 expansion cell, 20 px each
        assert_eq!(b.pixel_shape(20), (220, 220));
    }

    #[test]
    fn extent_splits_at_the_cell_budget() {
        // nrcb = 2000 / 20 = 100 cells per side; 250 cells -> 3 blocks
        let bs = blocks(0, 249, 0, 99, 20, 2000);
        assert_eq!(bs.len(), 3);
        assert_eq!(bs[0].bn0, 0);
        assert_eq!(bs[0].bn1, 100);
        assert_eq!(bs[1].bn0, 100);
        assert_eq!(bs[1].bn1, 200);
        assert_eq!(bs[2].bn0, 200);
        assert_eq!(bs[2].bn1, 250);
    }

    #[test]
    fn every_cell_lands_in_exactly_one_block() {
        let bs = blocks(3, 47, -5, 61, 10, 200);
        for n in 3..=47i64 {
            for m in -5..=61i64 {
                let owners = bs
                    .iter()
                    .filter(|b| n >= b.bn0 && n < b.bn1 && m >= b.bm0 && m < b.bm1)
                    .count();
                assert_eq!(owners, 1, "cell ({n}, {m}) owned by {owners} blocks");
            }
        }
    }

    #[test]
    fn pixel_budget_is_respected() {
        let bs = blocks(0, 999, 0, 999, 20, 2000);
        for b in bs {
            let (rows, cols) = b.pixel_shape(20);
            // one-cell expansion may exceed nrmax by exactly refi
            assert!(rows <= 2000 + 20 && cols <= 2000 + 20);
        }
    }
}
