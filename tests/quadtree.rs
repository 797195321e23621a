mod common;

use std::sync::atomic::AtomicBool;

use approx::assert_relative_eq;
use common::synthetic_source::{local_geometry, PlaneSource};
use subgrid_tables::{
    build_quadtree, BathymetryLayer, BuildError, BuildParams, NeighborRef, QuadtreeGrid,
    QuadtreeTables, QueryError, Reprojector, RoughnessKind, RoughnessLayer,
};

/// One coarse cell with a refined column to its right:
///
/// cell 0 (level 0) | cell 1 (level 1, lower half)
///                  | cell 2 (level 1, upper half)
///
/// The coarse right face splits in two; cells 1 and 2 share one full v face.
fn two_level_grid() -> QuadtreeGrid {
    QuadtreeGrid {
        geometry: local_geometry(8.0, 8.0),
        nr_refinement_levels: 2,
        n: vec![0, 0, 1],
        m: vec![0, 2, 2],
        level: vec![0, 1, 1],
        right: vec![
            NeighborRef::Split(Some(1), Some(2)),
            NeighborRef::None,
            NeighborRef::None,
        ],
        above: vec![NeighborRef::None, NeighborRef::Single(2), NeighborRef::None],
    }
}

fn quadtree_params() -> BuildParams {
    BuildParams {
        nbins: 5,
        pixels_per_cell: 8,
        ..Default::default()
    }
}

fn constant_roughness(n: f64) -> Vec<RoughnessLayer> {
    vec![RoughnessLayer {
        kind: RoughnessKind::ConstantByLevel {
            level: 0.0,
            below: n,
            above: n,
        },
    }]
}

#[test]
fn split_faces_produce_one_record_per_present_half() {
    let _ = env_logger::builder().is_test(true).try_init();
    let grid = two_level_grid();
    let expected_faces: usize = grid
        .right
        .iter()
        .chain(grid.above.iter())
        .map(|r| r.face_count())
        .sum();
    assert_eq!(expected_faces, 3);

    let layers = vec![BathymetryLayer::new("bed", "local")];
    let (tables, report) = build_quadtree(
        &grid,
        &PlaneSource::flat(5.0),
        &subgrid_tables::IdentityReprojector,
        &layers,
        &constant_roughness(0.03),
        &quadtree_params(),
        None,
    )
    .unwrap();

    assert_eq!(tables.nr_cells, 3);
    assert_eq!(tables.nr_uv_points, expected_faces);
    assert_eq!(report.cells_processed(), 3);
    assert_eq!(
        report.levels.iter().map(|l| l.face_points).sum::<usize>(),
        expected_faces
    );
    assert_eq!(report.levels.len(), 2);
    assert_eq!(report.levels[0].cells_processed, 1);
    assert_eq!(report.levels[1].cells_processed, 2);

    // every face record was written, none left at its zeroed default
    for iuv in 0..expected_faces {
        assert_relative_eq!(tables.uv_zmin[iuv], 5.0, epsilon = 1e-5);
        assert_relative_eq!(tables.uv_zmax[iuv], 5.01, epsilon = 1e-5);
        for bin in 0..tables.nbins {
            let h = tables.uv_hrep[tables.face_plane_idx(bin, iuv)];
            assert!(h > 0.0 && h.is_finite());
            assert_relative_eq!(
                tables.uv_navg[tables.face_plane_idx(bin, iuv)],
                0.03,
                epsilon = 1e-6
            );
        }
    }
    for ic in 0..3 {
        assert_relative_eq!(tables.z_zmin[ic], 5.0, epsilon = 1e-3);
        assert_relative_eq!(tables.z_zmean[ic], 5.0, epsilon = 1e-3);
    }
}

#[test]
fn split_face_records_reduce_their_own_quarter_windows() {
    // z = x + 0.1 y: every pixel is distinct, so a wrong window offset
    // shifts the recorded extrema. Coarse block pixels are 1 m, centered at
    // half-metre offsets; the split u windows cover cols 6..10 of the
    // coarse raster, rows 0..4 (first half) and 4..8 (second half).
    let grid = two_level_grid();
    let layers = vec![BathymetryLayer::new("bed", "local")];
    let (tables, _) = build_quadtree(
        &grid,
        &PlaneSource {
            gx: 1.0,
            gy: 0.1,
            offset: 0.0,
        },
        &subgrid_tables::IdentityReprojector,
        &layers,
        &constant_roughness(0.03),
        &quadtree_params(),
        None,
    )
    .unwrap();

    // first half: x in 6.5..9.5, y in 0.5..3.5; the constraining side is
    // the neighbour half (x >= 8.5), so zmin = 8.5 + 0.1 * 0.5
    assert_relative_eq!(tables.uv_zmin[0], 8.55, epsilon = 1e-4);
    assert_relative_eq!(tables.uv_zmax[0], 9.85, epsilon = 1e-4);
    // second half: same cols, y in 4.5..7.5
    assert_relative_eq!(tables.uv_zmin[1], 8.95, epsilon = 1e-4);
    assert_relative_eq!(tables.uv_zmax[1], 10.25, epsilon = 1e-4);
    // full v face between the fine cells: 0.5 m pixels, x in 8.25..11.75,
    // rows span y 2.25..5.75 with the upper half constraining
    assert_relative_eq!(tables.uv_zmin[2], 8.675, epsilon = 1e-4);
    assert_relative_eq!(tables.uv_zmax[2], 12.325, epsilon = 1e-4);
}

#[test]
fn quadtree_tables_survive_the_file_round_trip() {
    let grid = two_level_grid();
    let layers = vec![BathymetryLayer::new("bed", "local")];
    let (tables, _) = build_quadtree(
        &grid,
        &PlaneSource {
            gx: 0.05,
            gy: -0.01,
            offset: -2.0,
        },
        &subgrid_tables::IdentityReprojector,
        &layers,
        &constant_roughness(0.025),
        &quadtree_params(),
        None,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quadtree.sbg");
    tables.save(&path).unwrap();
    let back = QuadtreeTables::load(&path).unwrap();
    back.ensure_nbins(5).unwrap();
    assert_eq!(back, tables);
}

#[test]
fn preset_cancel_flag_aborts_the_build() {
    let grid = two_level_grid();
    let layers = vec![BathymetryLayer::new("bed", "local")];
    let cancel = AtomicBool::new(true);
    let err = build_quadtree(
        &grid,
        &PlaneSource::flat(0.0),
        &subgrid_tables::IdentityReprojector,
        &layers,
        &[],
        &quadtree_params(),
        Some(&cancel),
    )
    .unwrap_err();
    assert!(matches!(err, BuildError::Cancelled));
}

#[test]
fn unsupported_layer_crs_fails_before_rasterizing() {
    struct LocalOnly;
    impl Reprojector for LocalOnly {
        fn transform(
            &self,
            from: &str,
            to: &str,
            x: &[f64],
            y: &[f64],
        ) -> Result<(Vec<f64>, Vec<f64>), QueryError> {
            if from != to {
                return Err(QueryError::UnsupportedCrs {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            Ok((x.to_vec(), y.to_vec()))
        }
    }

    let grid = two_level_grid();
    let layers = vec![BathymetryLayer::new("bed", "EPSG:32633")];
    let err = build_quadtree(
        &grid,
        &PlaneSource::flat(0.0),
        &LocalOnly,
        &layers,
        &[],
        &quadtree_params(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, BuildError::Query(QueryError::UnsupportedCrs { .. })));
}
