//! Owned single-channel f64 raster in row-major layout (stride == width).
//!
//! Scratch storage for the per-block elevation and roughness grids. Provides
//! row access and a contiguous slice when `stride == width`.

/// Dense 2-D raster of f64 samples.
#[derive(Clone, Debug)]
pub struct RasterF64 {
    /// Raster width in pixels
    pub w: usize,
    /// Raster height in pixels
    pub h: usize,
    /// Number of f64 elements between consecutive rows (equals `w`)
    pub stride: usize,
    /// Backing storage in row-major order
    pub data: Vec<f64>,
}

impl RasterF64 {
    /// Construct a buffer of size `w × h` filled with `fill`.
    pub fn filled(w: usize, h: usize, fill: f64) -> Self {
        Self {
            w,
            h,
            stride: w,
            data: vec![fill; w * h],
        }
    }

    /// Construct a NaN-initialized buffer, the pre-rasterization state.
    pub fn nan(w: usize, h: usize) -> Self {
        Self::filled(w, h, f64::NAN)
    }

    #[inline]
    /// Convert (col, row) to a linear index into `data`.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.stride + x
    }

    #[inline]
    /// Get the sample value at (col, row).
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[self.idx(x, y)]
    }

    #[inline]
    /// Set the sample value at (col, row).
    pub fn set(&mut self, x: usize, y: usize, v: f64) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f64] {
        let start = y * self.stride;
        &self.data[start..start + self.w]
    }

    /// Number of NaN samples left in the raster.
    pub fn nan_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    /// Copy a rectangular sub-window into a flat vector, row by row.
    ///
    /// With `transpose` the window is read column by column instead, so the
    /// first half of the output holds the first `ncols / 2` columns. Panics
    /// if the window exceeds the raster extent; callers must size blocks so
    /// that every addressed window is inside the rasterized area.
    pub fn window(
        &self,
        row0: usize,
        col0: usize,
        nrows: usize,
        ncols: usize,
        transpose: bool,
    ) -> Vec<f64> {
        assert!(
            row0 + nrows <= self.h && col0 + ncols <= self.w,
            "window [{row0}+{nrows}, {col0}+{ncols}] outside raster {}x{}",
            self.h,
            self.w,
        );
        let mut out = Vec::with_capacity(nrows * ncols);
        if transpose {
            for c in col0..col0 + ncols {
                for r in row0..row0 + nrows {
                    out.push(self.get(c, r));
                }
            }
        } else {
            for r in row0..row0 + nrows {
                out.extend_from_slice(&self.row(r)[col0..col0 + ncols]);
            }
        }
        out
    }
}
