#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod builder;
pub mod error;
pub mod grid;
pub mod report;
pub mod source;
pub mod store;

// Lower-level modules: public, but considered unstable internals.
pub mod hypso;
pub mod partition;
pub mod raster;
pub mod rasterize;

// --- High-level re-exports -------------------------------------------------

// Main entry points: the two build variants plus their knobs.
pub use crate::builder::{build_quadtree, build_regular, BuildParams};
pub use crate::error::{BuildError, Result};

// Grid inputs and layer configuration.
pub use crate::grid::{GridGeometry, NeighborRef, QuadtreeGrid, RegularGrid};
pub use crate::source::{
    BathymetryLayer, DataSource, IdentityReprojector, QueryError, Reprojector, RoughnessKind,
    RoughnessLayer, SourceTile,
};

// Assembled tables and build diagnostics.
pub use crate::report::{BuildReport, LevelReport, StageTiming, TimingBreakdown};
pub use crate::store::{CompactRegularTables, QuadtreeTables, RegularTables};

/// Small prelude for quick experiments.
pub mod prelude {
    pub use crate::{
        build_quadtree, build_regular, BathymetryLayer, BuildParams, BuildReport, GridGeometry,
        QuadtreeGrid, RegularGrid, RoughnessKind, RoughnessLayer,
    };
}
