//! The "HEADING" Engine - Sensor Smoothing and Orientation Derivation
//!
//! Raw accelerometer and magnetometer vectors arrive on an arbitrary
//! platform thread, get exponentially smoothed per channel, and - once
//! both channels are live - are combined into a rotation matrix from
//! which azimuth/pitch/roll are extracted. The azimuth in degrees is the
//! device heading consumed by the world model.
//!
//! The [`SensorDispatcher`] multiplexes filtered readings to subscribers
//! and reference-counts platform registration: the injected
//! [`SensorSource`] is started on the first subscriber and stopped when
//! the last one leaves, atomically with respect to concurrent
//! (un)subscription.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Heavy smoothing; favors stability over responsiveness.
pub const ALPHA_STEADY: f32 = 0.03;

/// Light smoothing; tracks quick rotations at the cost of jitter.
pub const ALPHA_RESPONSIVE: f32 = 0.05;

/// Below this cross-product magnitude the field is treated as parallel to
/// gravity (free fall, or a magnetically degenerate pose) and no rotation
/// matrix is produced.
const MIN_FIELD_CROSS_NORM: f32 = 0.1;

// ============================================================================
// ERRORS
// ============================================================================

/// Precondition violations in the filtering pipeline. Geometric and
/// not-found conditions elsewhere in the engine are reported as
/// `Option`/`bool`, never through this type.
#[derive(Debug, Error, PartialEq)]
pub enum FusionError {
    #[error("filter input is empty")]
    EmptyInput,

    #[error("filter buffer length mismatch: input {input}, state {state}")]
    LengthMismatch { input: usize, state: usize },

    #[error("smoothing constant {0} outside (0, 1]")]
    InvalidAlpha(f32),
}

// ============================================================================
// LOW-PASS FILTER
// ============================================================================

/// One exponential smoothing step: `state[i] += alpha * (input[i] - state[i])`.
///
/// With alpha = 1 the state becomes the input; an already converged state
/// is a fixed point for any alpha.
pub fn low_pass(input: &[f32], state: &mut [f32], alpha: f32) -> Result<(), FusionError> {
    if input.is_empty() {
        return Err(FusionError::EmptyInput);
    }
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(FusionError::InvalidAlpha(alpha));
    }
    if input.len() != state.len() {
        return Err(FusionError::LengthMismatch {
            input: input.len(),
            state: state.len(),
        });
    }

    for (s, raw) in state.iter_mut().zip(input) {
        *s += alpha * (raw - *s);
    }
    Ok(())
}

/// Stateful wrapper around [`low_pass`] for one sensor channel.
///
/// The first sample primes the state verbatim; subsequent samples are
/// smoothed against it.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    alpha: f32,
    state: Vec<f32>,
}

impl LowPassFilter {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            state: Vec::new(),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// True once at least one sample has been absorbed.
    pub fn is_primed(&self) -> bool {
        !self.state.is_empty()
    }

    /// Current filtered state, if primed.
    pub fn state(&self) -> Option<&[f32]> {
        if self.state.is_empty() {
            None
        } else {
            Some(&self.state)
        }
    }

    /// Absorbs one raw sample and returns the filtered state.
    pub fn apply(&mut self, input: &[f32]) -> Result<&[f32], FusionError> {
        if input.is_empty() {
            return Err(FusionError::EmptyInput);
        }
        if self.state.is_empty() {
            self.state = input.to_vec();
        } else {
            low_pass(input, &mut self.state, self.alpha)?;
        }
        Ok(&self.state)
    }
}

// ============================================================================
// ORIENTATION
// ============================================================================

/// Azimuth/pitch/roll in radians, extracted from the rotation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Rotation about the vertical axis, clockwise from magnetic north
    pub azimuth: f32,

    /// Rotation about the device's lateral axis
    pub pitch: f32,

    /// Rotation about the device's longitudinal axis
    pub roll: f32,
}

impl Orientation {
    /// The device heading in degrees, in (-180, 180].
    pub fn heading_degrees(&self) -> f32 {
        self.azimuth.to_degrees()
    }
}

/// Builds the device rotation matrix from a gravity vector and a
/// geomagnetic vector (both in device coordinates).
///
/// Standard construction: H = field x gravity gives magnetic east,
/// M = gravity x H completes the basis; the normalized rows [H; M; G]
/// form the matrix. Returns `None` when the cross product degenerates
/// (free fall, or field parallel to gravity).
pub fn rotation_matrix(
    gravity: &Vector3<f32>,
    geomagnetic: &Vector3<f32>,
) -> Option<Matrix3<f32>> {
    let h = geomagnetic.cross(gravity);
    let norm_h = h.norm();
    if norm_h < MIN_FIELD_CROSS_NORM {
        return None;
    }
    let h = h / norm_h;

    let norm_g = gravity.norm();
    if norm_g == 0.0 {
        return None;
    }
    let g = gravity / norm_g;
    let m = g.cross(&h);

    Some(Matrix3::from_rows(&[
        h.transpose(),
        m.transpose(),
        g.transpose(),
    ]))
}

/// Extracts azimuth/pitch/roll from a rotation matrix produced by
/// [`rotation_matrix`].
pub fn orientation_from_matrix(r: &Matrix3<f32>) -> Orientation {
    Orientation {
        azimuth: r[(0, 1)].atan2(r[(1, 1)]),
        pitch: (-r[(2, 1)]).asin(),
        roll: (-r[(2, 0)]).atan2(r[(2, 2)]),
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Which raw channel a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorChannel {
    Accelerometer,
    Magnetometer,
}

/// One fan-out delivery: the channel that just updated, its filtered
/// vector, and the orientation derived from both channels.
///
/// `orientation` is `None` only when the rotation construction
/// degenerated for this sample; subscribers keep their last pose.
#[derive(Debug, Clone, Copy)]
pub struct SensorFrame {
    pub channel: SensorChannel,
    pub filtered: Vector3<f32>,
    pub orientation: Option<Orientation>,
}

/// Injected platform sensor access. Start/stop are invoked under the
/// dispatcher lock; implementations must not call back into the
/// dispatcher from them.
pub trait SensorSource: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Receives filtered readings in subscription order.
pub trait SensorSubscriber: Send {
    fn on_sensor_frame(&mut self, frame: &SensorFrame);
}

/// Handle identifying one subscription.
pub type SubscriberId = Uuid;

struct DispatcherInner {
    source: Box<dyn SensorSource>,
    subscribers: Vec<(SubscriberId, Box<dyn SensorSubscriber>)>,
    accel_filter: LowPassFilter,
    mag_filter: LowPassFilter,
    filtered_accel: Option<Vector3<f32>>,
    filtered_mag: Option<Vector3<f32>>,
}

/// Multiplexes filtered sensor readings to subscribers and reference-
/// counts platform registration.
///
/// A single mutex guards the subscriber list, the activation state and
/// the filter buffers; fan-out iterates under that lock, so a subscriber
/// can never be removed mid-dispatch. All operations are bounded and
/// synchronous.
pub struct SensorDispatcher {
    inner: Mutex<DispatcherInner>,
}

impl SensorDispatcher {
    /// Dispatcher with the default smoothing constants: steady for the
    /// accelerometer, responsive for the magnetometer.
    pub fn new(source: Box<dyn SensorSource>) -> Self {
        Self::with_alphas(source, ALPHA_STEADY, ALPHA_RESPONSIVE)
    }

    pub fn with_alphas(source: Box<dyn SensorSource>, accel_alpha: f32, mag_alpha: f32) -> Self {
        Self {
            inner: Mutex::new(DispatcherInner {
                source,
                subscribers: Vec::new(),
                accel_filter: LowPassFilter::new(accel_alpha),
                mag_filter: LowPassFilter::new(mag_alpha),
                filtered_accel: None,
                filtered_mag: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatcherInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a subscriber. The platform source is started exactly when the
    /// subscriber count goes from zero to one.
    pub fn subscribe(&self, subscriber: Box<dyn SensorSubscriber>) -> SubscriberId {
        let mut inner = self.lock();
        if inner.subscribers.is_empty() {
            inner.source.start();
            debug!("sensor source started");
        }
        let id = Uuid::new_v4();
        inner.subscribers.push((id, subscriber));
        id
    }

    /// Removes a subscription. The platform source is stopped exactly
    /// when the last subscriber leaves. Returns false for an unknown id.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        let removed = inner.subscribers.len() != before;
        if removed && inner.subscribers.is_empty() {
            inner.source.stop();
            debug!("sensor source stopped");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Last filtered vector for a channel, if that channel has seen at
    /// least one sample.
    pub fn filtered(&self, channel: SensorChannel) -> Option<Vector3<f32>> {
        let inner = self.lock();
        match channel {
            SensorChannel::Accelerometer => inner.filtered_accel,
            SensorChannel::Magnetometer => inner.filtered_mag,
        }
    }

    /// Entry point for raw platform samples, callable from any thread.
    ///
    /// Updates the channel's filtered state; once both channels have been
    /// primed, derives the orientation and pushes the frame to every
    /// subscriber in subscription order.
    pub fn dispatch(&self, channel: SensorChannel, raw: [f32; 3]) -> Result<(), FusionError> {
        let mut inner = self.lock();
        let inner = &mut *inner;

        let filter = match channel {
            SensorChannel::Accelerometer => &mut inner.accel_filter,
            SensorChannel::Magnetometer => &mut inner.mag_filter,
        };
        let filtered = {
            let state = filter.apply(&raw)?;
            Vector3::new(state[0], state[1], state[2])
        };
        match channel {
            SensorChannel::Accelerometer => inner.filtered_accel = Some(filtered),
            SensorChannel::Magnetometer => inner.filtered_mag = Some(filtered),
        }

        let (gravity, field) = match (inner.filtered_accel, inner.filtered_mag) {
            (Some(g), Some(f)) => (g, f),
            _ => return Ok(()), // other channel not primed yet
        };

        let orientation = rotation_matrix(&gravity, &field)
            .map(|r| orientation_from_matrix(&r));
        let frame = SensorFrame {
            channel,
            filtered,
            orientation,
        };
        for (_, subscriber) in inner.subscribers.iter_mut() {
            subscriber.on_sensor_frame(&frame);
        }
        Ok(())
    }
}
