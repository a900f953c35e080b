//! JSON exporter for offline inspection of harness runs.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use waymark_core::RenderCandidate;

/// One render candidate as recorded in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub object_id: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl From<&RenderCandidate> for CandidateRecord {
    fn from(candidate: &RenderCandidate) -> Self {
        Self {
            object_id: candidate.object_id,
            x: candidate.position.x,
            y: candidate.position.y,
            z: candidate.position.z,
            distance_m: candidate.distance_meters,
        }
    }
}

/// A single frame of harness data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Scripted true heading
    pub true_heading_deg: f64,

    /// Heading recovered by the fusion pipeline
    pub fused_heading_deg: f64,

    /// Wrapped difference between the two
    pub heading_error_deg: f64,

    /// Objects that passed the distance gate this frame
    pub candidates: Vec<CandidateRecord>,
}

/// Complete harness export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final verdict
    pub passed: bool,

    /// Mean absolute heading error after warmup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_abs_heading_error_deg: Option<f64>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            mean_abs_heading_error_deg: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, mean_abs_heading_error_deg: Option<f64>) {
        self.passed = passed;
        self.mean_abs_heading_error_deg = mean_abs_heading_error_deg;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_tracks_duration_from_frames() {
        let mut export = SimExport::new("steady_heading", 42);
        export.add_frame(SimFrame {
            time_sec: 0.5,
            true_heading_deg: 60.0,
            fused_heading_deg: 59.8,
            heading_error_deg: -0.2,
            candidates: vec![],
        });
        export.add_frame(SimFrame {
            time_sec: 1.0,
            true_heading_deg: 60.0,
            fused_heading_deg: 60.1,
            heading_error_deg: 0.1,
            candidates: vec![],
        });
        assert_eq!(export.duration_sec, 1.0);
        assert_eq!(export.frames.len(), 2);
    }
}
