//! Waymark Core - Spatial/Geometric Engine for Geo-Referenced Overlays
//!
//! This library turns raw device sensors and a stream of geographic fixes
//! into per-frame render and picking decisions:
//! 1. **Heading**: exponential sensor smoothing + rotation-matrix orientation
//! 2. **Shape**: ray/plane/triangle kernel with sphere and quad colliders
//! 3. **World**: geo-anchored object collections with distance-gated passes

pub mod geodesy;
pub mod registry;
pub mod waymark_fusion;
pub mod waymark_geometry;
pub mod waymark_world;

// Re-export key types for convenience
pub use geodesy::GeoPoint;
pub use registry::{ModuleHandle, ModuleKind, ObjectPlugin, Registry, WorldModule};
pub use waymark_fusion::{
    FusionError, LowPassFilter, Orientation, SensorChannel, SensorDispatcher, SensorFrame,
    SensorSource, SensorSubscriber,
};
pub use waymark_geometry::{Collider, Plane, Ray, SphereCollider, SquareCollider, Triangle};
pub use waymark_world::{
    CameraPose, CameraTracker, ObjectCollection, ObjectId, PickHit, RenderCandidate,
    SpatialObject, TextureHandle, World, WorldProfile, WorldStats,
};
