//! Serializable diagnostics describing one build run.

use serde::{Deserialize, Serialize};

/// Timing entry for one build stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

impl StageTiming {
    pub fn new(label: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
        }
    }
}

/// Aggregated timing trace for the build.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.stages.push(StageTiming::new(label, elapsed_ms));
    }
}

/// Per-refinement-level accounting (the regular variant reports a single
/// pseudo-level 0).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReport {
    pub level: usize,
    pub blocks: usize,
    pub cells_processed: usize,
    pub face_points: usize,
    /// Pixels with no bathymetry coverage, resolved by the floor clamp.
    pub elevation_gap_pixels: usize,
    /// Pixels with no roughness coverage; their NaN propagates into the
    /// conveyance tables.
    pub roughness_gap_pixels: usize,
}

/// Top-level build diagnostics returned next to the assembled tables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub levels: Vec<LevelReport>,
    /// Cells whose max-gradient repair loop hit its iteration bound.
    pub gradient_exhausted_cells: usize,
    pub timing: TimingBreakdown,
}

impl BuildReport {
    pub fn cells_processed(&self) -> usize {
        self.levels.iter().map(|l| l.cells_processed).sum()
    }

    pub fn elevation_gap_pixels(&self) -> usize {
        self.levels.iter().map(|l| l.elevation_gap_pixels).sum()
    }
}
