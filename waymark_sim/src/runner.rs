//! Scenario runner: wires the engine end-to-end and scores a run.
//!
//! One run is a fixed-rate tick loop: the oracle feeds raw vectors into
//! the dispatcher, the camera tracker absorbs the fused orientation, the
//! world walks its distance gate, and a picking ray is cast at the
//! nearest candidate once per second. The run passes when the fused
//! heading stays close to the scripted truth and at least one pick lands.

use crate::exporter::{CandidateRecord, SimExport, SimFrame};
use crate::oracle::{DeviceTrack, SensorOracle};
use crate::scenarios::ScenarioId;
use nalgebra::{Point3, Vector3};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};
use waymark_core::geodesy::{destination_point, geo_to_local};
use waymark_core::{
    CameraPose, CameraTracker, FusionError, GeoPoint, ModuleKind, ObjectId, Ray, SensorChannel,
    SensorDispatcher, SensorSource, SpatialObject, TextureHandle, World, WorldModule,
};

/// Collection kind for pickable points of interest.
const POI: i32 = 1;

/// Collection kind for decoys planted beyond the view distance.
const DECOYS: i32 = 2;

/// Configuration for a harness run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Scenario to run
    pub scenario: ScenarioId,

    /// Simulated duration in seconds
    pub duration_secs: f64,

    /// Tick rate in Hz
    pub tick_rate_hz: u32,

    /// Gaussian noise standard deviation applied to raw sensor vectors
    pub sensor_noise_std: f64,

    /// World view distance in meters (≤ 0 = unbounded)
    pub view_distance_m: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            scenario: ScenarioId::SteadyHeading,
            duration_secs: 30.0,
            tick_rate_hz: 30,
            sensor_noise_std: 0.3,
            view_distance_m: 250.0,
        }
    }
}

/// Harness-level failures.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("sensor pipeline error: {0}")]
    Fusion(#[from] FusionError),

    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),
}

/// Outcome of one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: String,
    pub ticks: u64,
    pub mean_abs_heading_error_deg: f64,
    pub final_heading_error_deg: f64,
    pub min_candidates: usize,
    pub max_candidates: usize,
    pub pick_hits: u64,
    pub objects_added: usize,
    pub objects_removed: usize,
    pub geo_fixes: usize,
    pub passed: bool,
}

/// Shortest signed difference a - b in degrees, wrapped to [-180, 180].
pub fn angle_difference_degrees(a: f64, b: f64) -> f64 {
    let mut d = (a - b) % 360.0;
    if d > 180.0 {
        d -= 360.0;
    }
    if d < -180.0 {
        d += 360.0;
    }
    d
}

/// Stand-in for the platform sensor service.
struct PlatformStub;

impl SensorSource for PlatformStub {
    fn start(&mut self) {
        debug!("platform sensors attached");
    }
    fn stop(&mut self) {
        debug!("platform sensors released");
    }
}

/// Mutation counters observed through the module broadcasts.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    added: usize,
    removed: usize,
    fixes: usize,
}

struct TallyModule {
    tally: Arc<Mutex<Tally>>,
}

impl TallyModule {
    fn bump(&self, f: impl FnOnce(&mut Tally)) {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tally);
    }
}

impl WorldModule for TallyModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Analytics
    }
    fn on_object_added(&mut self, _object: &SpatialObject) {
        self.bump(|t| t.added += 1);
    }
    fn on_object_removed(&mut self, _object: &SpatialObject) {
        self.bump(|t| t.removed += 1);
    }
    fn on_geo_position_changed(&mut self, _position: &GeoPoint) {
        self.bump(|t| t.fixes += 1);
    }
}

/// Runs one scenario to completion.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Plants the scenario's objects around the track origin. Returns
    /// the anchored ids so the walk scenario can despawn passed markers.
    fn plant_objects(&self, world: &mut World, origin: &GeoPoint) -> Vec<(ObjectId, GeoPoint)> {
        let mut planted = Vec::new();
        match self.config.scenario {
            ScenarioId::CityWalk => {
                // Billboard markers strung out ahead of the walk, 100m apart.
                for step in 1..=8u64 {
                    let anchor = destination_point(origin, 0.0, 100.0 * step as f64, 0.0);
                    let id = world.allocate_object_id();
                    world.add_object(
                        SpatialObject::geo_anchored(
                            id,
                            format!("marker-{step}"),
                            TextureHandle(step),
                            anchor,
                        ),
                        POI,
                    );
                    planted.push((id, anchor));
                }
            }
            _ => {
                // A ring of signs inside view range, each turned to face
                // the device, plus decoys planted well beyond the gate.
                let radius = (self.config.view_distance_m * 0.5).max(10.0);
                for (i, bearing) in [0.0f64, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0]
                    .into_iter()
                    .enumerate()
                {
                    let east = radius * bearing.to_radians().sin();
                    let north = radius * bearing.to_radians().cos();
                    let anchor = destination_point(origin, east, north, 0.0);
                    let id = world.allocate_object_id();
                    let mut sign = SpatialObject::geo_anchored(
                        id,
                        format!("sign-{i}"),
                        TextureHandle(i as u64),
                        anchor,
                    );
                    sign.set_orientation_override(Some(Vector3::new(
                        0.0,
                        (180.0 - bearing) as f32,
                        0.0,
                    )));
                    world.add_object(sign, POI);
                }
                for step in 1..=2u64 {
                    let north = (self.config.view_distance_m * 4.0).max(2000.0) * step as f64;
                    let anchor = destination_point(origin, 0.0, north, 0.0);
                    let id = world.allocate_object_id();
                    world.add_object(
                        SpatialObject::geo_anchored(
                            id,
                            format!("decoy-{step}"),
                            TextureHandle(100 + step),
                            anchor,
                        ),
                        DECOYS,
                    );
                }
            }
        }
        planted
    }

    pub fn run(&self, export_path: Option<&str>) -> Result<ScenarioResult, SimError> {
        let config = &self.config;

        // Derive subsystem seeds so the noise stream is independent of
        // any other seeded component added later.
        let sensor_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut oracle = SensorOracle::new(sensor_seed, config.sensor_noise_std);

        let origin = GeoPoint::new(40.4168, -3.7038, 650.0);
        let track = match config.scenario {
            ScenarioId::CityWalk => DeviceTrack::walking(origin, 0.0, 1.4),
            _ => DeviceTrack::stationary(origin),
        };

        let dispatcher = SensorDispatcher::new(Box::new(PlatformStub));
        let pose = Arc::new(Mutex::new(CameraPose::default()));
        let subscription = dispatcher.subscribe(Box::new(CameraTracker::new(pose.clone())));

        let mut world = World::new(origin);
        world.set_view_distance(config.view_distance_m);
        let tally = Arc::new(Mutex::new(Tally::default()));
        if !world.has_module_kind(ModuleKind::Analytics) {
            world.attach_module(Box::new(TallyModule {
                tally: tally.clone(),
            }));
        }
        let planted = self.plant_objects(&mut world, &origin);

        let dt = 1.0 / f64::from(config.tick_rate_hz);
        let total_ticks = (config.duration_secs * f64::from(config.tick_rate_hz)) as u64;
        let warmup_ticks = u64::from(config.tick_rate_hz) * 2;
        let fix_interval = u64::from(config.tick_rate_hz).max(1);
        let export_interval = 10;

        let mut export = SimExport::new(config.scenario.name(), config.seed);
        let mut abs_error_sum = 0.0;
        let mut error_samples = 0u64;
        let mut last_error = 0.0;
        let mut min_candidates = usize::MAX;
        let mut max_candidates = 0usize;
        let mut pick_hits = 0u64;

        for tick in 0..total_ticks {
            let t = tick as f64 * dt;
            let true_heading = config.scenario.true_heading_at(t);

            dispatcher.dispatch(SensorChannel::Accelerometer, oracle.accelerometer())?;
            dispatcher.dispatch(SensorChannel::Magnetometer, oracle.magnetometer(true_heading))?;

            if tick % fix_interval == 0 {
                world.set_geo_position(track.position_at(t));

                // Despawn markers the walk has left more than 50m behind.
                if matches!(config.scenario, ScenarioId::CityWalk) {
                    let device = world.geo_position();
                    for (id, anchor) in &planted {
                        if geo_to_local(&device, anchor).z > 50.0 {
                            world.remove_object(*id);
                        }
                    }
                }
            }

            let candidates = world.snapshot_candidates();
            min_candidates = min_candidates.min(candidates.len());
            max_candidates = max_candidates.max(candidates.len());

            let fused = {
                let pose = pose.lock().unwrap_or_else(PoisonError::into_inner);
                f64::from(pose.heading_degrees)
            };
            let error = angle_difference_degrees(fused, true_heading);
            last_error = error;
            if tick >= warmup_ticks {
                abs_error_sum += error.abs();
                error_samples += 1;
            }

            // Once per second, cast a picking ray at the nearest candidate.
            if tick % fix_interval == 0 {
                let nearest = candidates
                    .iter()
                    .filter(|c| c.visible)
                    .min_by(|a, b| {
                        let da = a.distance_meters.unwrap_or(f64::MAX);
                        let db = b.distance_meters.unwrap_or(f64::MAX);
                        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                    });
                if let Some(target) = nearest {
                    let ray = Ray::through(Point3::origin(), target.position);
                    if world.pick(&ray).is_some() {
                        pick_hits += 1;
                    }
                }
            }

            if tick % export_interval == 0 {
                export.add_frame(SimFrame {
                    time_sec: t,
                    true_heading_deg: true_heading,
                    fused_heading_deg: fused,
                    heading_error_deg: error,
                    candidates: candidates.iter().map(CandidateRecord::from).collect(),
                });
            }

            if tick % (fix_interval * 10) == 0 {
                debug!(
                    "  t={:.1}s | heading true={:.1} fused={:.1} | candidates={}",
                    t,
                    true_heading,
                    fused,
                    candidates.len()
                );
            }
        }

        dispatcher.unsubscribe(subscription);

        if min_candidates == usize::MAX {
            min_candidates = 0;
        }
        let mean_abs = if error_samples > 0 {
            abs_error_sum / error_samples as f64
        } else {
            0.0
        };
        let passed = mean_abs < 5.0 && pick_hits > 0;

        export.finalize(passed, Some(mean_abs));
        if let Some(path) = export_path {
            export.write_to_file(path)?;
            info!("exported {} frames to {}", export.frames.len(), path);
        }

        let tally = *tally.lock().unwrap_or_else(PoisonError::into_inner);
        info!(
            scenario = config.scenario.name(),
            mean_abs_error_deg = mean_abs,
            pick_hits,
            objects = tally.added,
            fixes = tally.fixes,
            passed,
            "run complete"
        );

        Ok(ScenarioResult {
            scenario: config.scenario.name().to_string(),
            ticks: total_ticks,
            mean_abs_heading_error_deg: mean_abs,
            final_heading_error_deg: last_error,
            min_candidates,
            max_candidates,
            pick_hits,
            objects_added: tally.added,
            objects_removed: tally.removed,
            geo_fixes: tally.fixes,
            passed,
        })
    }
}
