//! Deterministic simulation harness for the Waymark engine.
//!
//! Every run is reproducible from a single seed: the oracle synthesizes
//! raw sensor vectors for a scripted heading, a scripted track feeds
//! geographic fixes, and the runner scores how well the fused heading
//! and the distance gate track ground truth.

pub mod exporter;
pub mod oracle;
pub mod runner;
pub mod scenarios;

pub use exporter::{CandidateRecord, SimExport, SimFrame};
pub use oracle::{DeviceTrack, SensorOracle};
pub use runner::{angle_difference_degrees, ScenarioResult, ScenarioRunner, SimConfig, SimError};
pub use scenarios::ScenarioId;
