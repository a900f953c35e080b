//! The "WORLD" Engine - Geo-Anchored Object Collections
//!
//! The world owns kind-keyed, ordered collections of overlay objects,
//! the device's current geographic fix, and a view-distance threshold.
//! Each frame the render pass walks the collections, gates geo-anchored
//! objects by great-circle distance, projects the survivors into the
//! device-local frame and emits transform requests for the external
//! renderer. Picking derives a collider per object on demand - colliders
//! are never cached, so rotation and position updates are always
//! reflected in the next query.

use crate::geodesy::{distance_meters, geo_to_local, GeoPoint};
use crate::registry::{ModuleHandle, ModuleKind, ObjectPlugin, Registry, WorldModule};
use crate::waymark_fusion::{SensorFrame, SensorSubscriber};
use crate::waymark_geometry::{Collider, Ray};
use nalgebra::{Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Default maximum render distance for geo-anchored objects, in meters.
pub const DEFAULT_VIEW_DISTANCE_METERS: f64 = 100.0;

/// Unique object identifier within one world.
pub type ObjectId = u64;

/// Opaque renderable handle; texture binding happens outside this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureHandle(pub u64);

// ============================================================================
// SPATIAL OBJECT
// ============================================================================

/// One overlay object: local render-space state plus an optional
/// geographic anchor.
#[derive(Debug)]
pub struct SpatialObject {
    id: ObjectId,
    name: String,
    position: Point3<f32>,
    angle: Vector3<f32>,
    orientation_override: Option<Vector3<f32>>,
    visible: bool,
    texture: TextureHandle,
    collection_kind: Option<i32>,
    geo_position: Option<GeoPoint>,
    half_extent: f32,
    plugins: Registry<dyn ObjectPlugin>,
}

impl SpatialObject {
    /// A free-floating object placed directly in render space.
    pub fn new(id: ObjectId, name: impl Into<String>, texture: TextureHandle) -> Self {
        Self {
            id,
            name: name.into(),
            position: Point3::origin(),
            angle: Vector3::zeros(),
            orientation_override: None,
            visible: true,
            texture,
            collection_kind: None,
            geo_position: None,
            half_extent: 1.0,
            plugins: Registry::new(),
        }
    }

    /// A geo-anchored object; its render-space position is derived from
    /// the device fix during the render pass.
    pub fn geo_anchored(
        id: ObjectId,
        name: impl Into<String>,
        texture: TextureHandle,
        geo_position: GeoPoint,
    ) -> Self {
        let mut object = Self::new(id, name, texture);
        object.geo_position = Some(geo_position);
        object
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.position = position;
    }

    /// Euler angles in degrees.
    pub fn angle(&self) -> Vector3<f32> {
        self.angle
    }

    pub fn set_angle(&mut self, angle: Vector3<f32>) {
        self.angle = angle;
    }

    /// Fixed orientation in degrees; present means the object keeps this
    /// orientation instead of facing the camera.
    pub fn orientation_override(&self) -> Option<Vector3<f32>> {
        self.orientation_override
    }

    pub fn set_orientation_override(&mut self, orientation: Option<Vector3<f32>>) {
        self.orientation_override = orientation;
    }

    /// True when no fixed orientation is set.
    pub fn faces_camera(&self) -> bool {
        self.orientation_override.is_none()
    }

    /// The angle actually used for collider derivation and rendering.
    pub fn effective_angle(&self) -> Vector3<f32> {
        self.orientation_override.unwrap_or(self.angle)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn set_texture(&mut self, texture: TextureHandle) {
        self.texture = texture;
    }

    /// The collection this object currently belongs to, if any.
    pub fn collection_kind(&self) -> Option<i32> {
        self.collection_kind
    }

    pub(crate) fn set_collection_kind(&mut self, kind: Option<i32>) {
        self.collection_kind = kind;
    }

    pub fn geo_position(&self) -> Option<GeoPoint> {
        self.geo_position
    }

    pub fn set_geo_position(&mut self, geo_position: Option<GeoPoint>) {
        self.geo_position = geo_position;
    }

    /// Half edge length of the base quad the collider is derived from.
    pub fn half_extent(&self) -> f32 {
        self.half_extent
    }

    pub fn set_half_extent(&mut self, half_extent: f32) {
        self.half_extent = half_extent;
    }

    /// Derives the quad collider at an explicit center: the base quad,
    /// rotated by the effective angle, translated to `center`.
    ///
    /// Rebuilt on every call; callers must not cache it across position
    /// or angle mutations.
    pub fn collider_at(&self, center: Point3<f32>) -> Collider {
        let h = self.half_extent;
        let a = self.effective_angle();
        let rotation = Rotation3::from_euler_angles(
            a.x.to_radians(),
            a.y.to_radians(),
            a.z.to_radians(),
        );
        let base = [
            Vector3::new(-h, -h, 0.0),
            Vector3::new(-h, h, 0.0),
            Vector3::new(h, h, 0.0),
            Vector3::new(h, -h, 0.0),
        ];
        let corners = base.map(|corner| center + rotation * corner);
        Collider::square(corners)
    }

    /// Derived quad collider at the stored render-space position.
    pub fn collider(&self) -> Collider {
        self.collider_at(self.position)
    }

    /// Sphere circumscribing the base quad, for broad-phase rejection.
    pub fn bounding_sphere_at(&self, center: Point3<f32>) -> Collider {
        Collider::sphere(center, self.half_extent * std::f32::consts::SQRT_2)
    }

    /// Attaches a plugin and invokes its setup callback.
    pub fn attach_plugin(&mut self, mut plugin: Box<dyn ObjectPlugin>) -> ModuleHandle {
        plugin.on_attached(self.id);
        let kind = plugin.kind();
        self.plugins.attach(kind, plugin)
    }

    /// Invokes the plugin's teardown callback and removes it. Returns
    /// false for a handle that is not attached to this object.
    pub fn detach_plugin(&mut self, handle: ModuleHandle) -> bool {
        match self.plugins.detach(handle) {
            Some(mut plugin) => {
                plugin.on_detached(self.id);
                true
            }
            None => false,
        }
    }

    pub fn plugins(&self) -> &Registry<dyn ObjectPlugin> {
        &self.plugins
    }
}

// ============================================================================
// OBJECT COLLECTION
// ============================================================================

/// Ordered sequence of objects sharing one kind tag.
#[derive(Debug)]
pub struct ObjectCollection {
    kind: i32,
    objects: Vec<SpatialObject>,
}

impl ObjectCollection {
    pub fn new(kind: i32) -> Self {
        Self {
            kind,
            objects: Vec::new(),
        }
    }

    pub fn kind(&self) -> i32 {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.iter().any(|o| o.id == id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SpatialObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SpatialObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpatialObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SpatialObject> {
        self.objects.iter_mut()
    }

    fn push(&mut self, object: SpatialObject) {
        self.objects.push(object);
    }

    fn remove(&mut self, id: ObjectId) -> Option<SpatialObject> {
        let idx = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(idx))
    }
}

// ============================================================================
// RENDER PASS OUTPUT
// ============================================================================

/// Per-object transform request handed to the external renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RenderCandidate {
    pub object_id: ObjectId,
    pub position: Point3<f32>,
    pub angle: Vector3<f32>,
    pub texture: TextureHandle,
    pub visible: bool,
    pub faces_camera: bool,

    /// Great-circle distance from the device fix; `None` for objects
    /// placed directly in render space.
    pub distance_meters: Option<f64>,
}

/// Result of a picking cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub object_id: ObjectId,
    pub point: Point3<f32>,
    pub distance: f32,
}

/// Owner context handed to world modules at attach time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorldProfile {
    pub geo_position: GeoPoint,
    pub view_distance_meters: f64,
}

/// Counters over the current world contents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorldStats {
    pub collections: usize,
    pub objects: usize,
    pub geo_anchored: usize,
    pub last_candidates: usize,
}

// ============================================================================
// WORLD
// ============================================================================

/// The session-wide container: collections, device fix, view distance
/// and the attached module registry.
#[derive(Debug)]
pub struct World {
    collections: BTreeMap<i32, ObjectCollection>,
    geo_position: GeoPoint,
    view_distance: f64,
    modules: Registry<dyn WorldModule>,
    next_object_id: ObjectId,
    last_candidate_count: usize,
}

impl World {
    pub fn new(geo_position: GeoPoint) -> Self {
        Self {
            collections: BTreeMap::new(),
            geo_position,
            view_distance: DEFAULT_VIEW_DISTANCE_METERS,
            modules: Registry::new(),
            next_object_id: 0,
            last_candidate_count: 0,
        }
    }

    /// Hands out the next unique object id.
    pub fn allocate_object_id(&mut self) -> ObjectId {
        self.next_object_id += 1;
        self.next_object_id
    }

    pub fn geo_position(&self) -> GeoPoint {
        self.geo_position
    }

    /// Records a new device fix and broadcasts it to modules. Objects
    /// are not touched; their distances are recomputed on demand during
    /// the next render pass.
    pub fn set_geo_position(&mut self, position: GeoPoint) {
        self.geo_position = position;
        for module in self.modules.iter_mut() {
            module.on_geo_position_changed(&position);
        }
    }

    /// View distance in meters; a value ≤ 0 renders all geo-anchored
    /// objects regardless of distance.
    pub fn view_distance(&self) -> f64 {
        self.view_distance
    }

    pub fn set_view_distance(&mut self, meters: f64) {
        self.view_distance = meters;
    }

    pub fn profile(&self) -> WorldProfile {
        WorldProfile {
            geo_position: self.geo_position,
            view_distance_meters: self.view_distance,
        }
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Appends an object to the collection of the given kind (created on
    /// first use), tags the object, and notifies every attached module
    /// exactly once, in attachment order.
    pub fn add_object(&mut self, mut object: SpatialObject, kind: i32) {
        object.set_collection_kind(Some(kind));
        let collection = self
            .collections
            .entry(kind)
            .or_insert_with(|| ObjectCollection::new(kind));
        collection.push(object);
        if let Some(added) = collection.objects.last() {
            for module in self.modules.iter_mut() {
                module.on_object_added(added);
            }
        }
    }

    /// Removes an object by id. Returns false (and fires nothing) when
    /// the id is not a member of any collection.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        self.take_object(id).is_some()
    }

    /// Removes and returns an object, firing the removed broadcast.
    pub fn take_object(&mut self, id: ObjectId) -> Option<SpatialObject> {
        for collection in self.collections.values_mut() {
            if let Some(mut object) = collection.remove(id) {
                object.set_collection_kind(None);
                for module in self.modules.iter_mut() {
                    module.on_object_removed(&object);
                }
                return Some(object);
            }
        }
        None
    }

    /// Moves an object to another collection as remove-then-add; both
    /// broadcasts fire. Returns false when the id is absent.
    pub fn move_object(&mut self, id: ObjectId, new_kind: i32) -> bool {
        match self.take_object(id) {
            Some(object) => {
                self.add_object(object, new_kind);
                true
            }
            None => false,
        }
    }

    pub fn collection(&self, kind: i32) -> Option<&ObjectCollection> {
        self.collections.get(&kind)
    }

    pub fn collection_mut(&mut self, kind: i32) -> Option<&mut ObjectCollection> {
        self.collections.get_mut(&kind)
    }

    pub fn collections(&self) -> impl Iterator<Item = &ObjectCollection> {
        self.collections.values()
    }

    pub fn object(&self, id: ObjectId) -> Option<&SpatialObject> {
        self.collections.values().find_map(|c| c.get(id))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SpatialObject> {
        self.collections.values_mut().find_map(|c| c.get_mut(id))
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// Stores a module and invokes its setup callback with the owner
    /// context.
    pub fn attach_module(&mut self, mut module: Box<dyn WorldModule>) -> ModuleHandle {
        let profile = self.profile();
        module.on_attached(&profile);
        let kind = module.kind();
        debug!(?kind, "world module attached");
        self.modules.attach(kind, module)
    }

    /// Invokes the module's teardown callback and removes it. Returns
    /// false for a handle that is not attached.
    pub fn detach_module(&mut self, handle: ModuleHandle) -> bool {
        match self.modules.detach(handle) {
            Some(mut module) => {
                module.on_detached();
                debug!("world module detached");
                true
            }
            None => false,
        }
    }

    pub fn first_module(&self, kind: ModuleKind) -> Option<&dyn WorldModule> {
        self.modules.first_of(kind)
    }

    pub fn first_module_mut(&mut self, kind: ModuleKind) -> Option<&mut (dyn WorldModule + 'static)> {
        self.modules.first_of_mut(kind)
    }

    pub fn modules_of(&self, kind: ModuleKind) -> Vec<&dyn WorldModule> {
        self.modules.all_of(kind)
    }

    pub fn has_module_kind(&self, kind: ModuleKind) -> bool {
        self.modules.contains_kind(kind)
    }

    pub fn has_module(&self, handle: ModuleHandle) -> bool {
        self.modules.contains(handle)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Resets modules and collections together: every module sees the
    /// cleared broadcast, then its teardown, then everything is dropped.
    pub fn clear(&mut self) {
        for module in self.modules.iter_mut() {
            module.on_world_cleared();
        }
        for mut module in self.modules.drain() {
            module.on_detached();
        }
        self.collections.clear();
        self.last_candidate_count = 0;
        debug!("world cleared");
    }

    // ------------------------------------------------------------------
    // Render pass & picking
    // ------------------------------------------------------------------

    /// Distance gate shared by the render pass and picking: strict
    /// less-than against the view distance, unbounded when ≤ 0.
    fn passes_distance_gate(&self, distance: f64) -> bool {
        self.view_distance <= 0.0 || distance < self.view_distance
    }

    /// The per-frame visibility pass.
    ///
    /// Walks collections in kind order and objects in insertion order;
    /// geo-anchored objects are gated by great-circle distance and
    /// projected into the device-local frame, objects placed directly in
    /// render space always pass. Returns an owned snapshot - the stable
    /// per-frame view consumers iterate instead of the live collections.
    pub fn snapshot_candidates(&mut self) -> Vec<RenderCandidate> {
        let mut candidates = Vec::new();
        for collection in self.collections.values() {
            for object in collection.iter() {
                let (position, distance) = match object.geo_position() {
                    Some(geo) => {
                        let d = distance_meters(&self.geo_position, &geo);
                        if !self.passes_distance_gate(d) {
                            continue;
                        }
                        (geo_to_local(&self.geo_position, &geo), Some(d))
                    }
                    None => (object.position(), None),
                };
                candidates.push(RenderCandidate {
                    object_id: object.id(),
                    position,
                    angle: object.effective_angle(),
                    texture: object.texture(),
                    visible: object.is_visible(),
                    faces_camera: object.faces_camera(),
                    distance_meters: distance,
                });
            }
        }
        self.last_candidate_count = candidates.len();
        candidates
    }

    /// Casts a picking ray against every visible, distance-passing
    /// object and returns the nearest hit.
    ///
    /// Colliders are derived per query: a circumscribed-sphere broad
    /// phase first, then the quad test, both using the same forward-only
    /// intersection contract as the geometry kernel.
    pub fn pick(&self, ray: &Ray) -> Option<PickHit> {
        let mut best: Option<PickHit> = None;
        for collection in self.collections.values() {
            for object in collection.iter() {
                if !object.is_visible() {
                    continue;
                }
                let center = match object.geo_position() {
                    Some(geo) => {
                        let d = distance_meters(&self.geo_position, &geo);
                        if !self.passes_distance_gate(d) {
                            continue;
                        }
                        geo_to_local(&self.geo_position, &geo)
                    }
                    None => object.position(),
                };
                if !object.bounding_sphere_at(center).intersects(ray) {
                    continue;
                }
                if let Some(point) = object.collider_at(center).intersect(ray) {
                    let distance = (point - ray.origin).norm();
                    if best.map_or(true, |b| distance < b.distance) {
                        best = Some(PickHit {
                            object_id: object.id(),
                            point,
                            distance,
                        });
                    }
                }
            }
        }
        best
    }

    pub fn stats(&self) -> WorldStats {
        let objects: usize = self.collections.values().map(|c| c.len()).sum();
        let geo_anchored = self
            .collections
            .values()
            .flat_map(|c| c.iter())
            .filter(|o| o.geo_position().is_some())
            .count();
        WorldStats {
            collections: self.collections.len(),
            objects,
            geo_anchored,
            last_candidates: self.last_candidate_count,
        }
    }
}

// ============================================================================
// CAMERA
// ============================================================================

/// Device camera pose in the local render frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Point3<f32>,
    pub heading_degrees: f32,
    pub pitch_degrees: f32,
    pub roll_degrees: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            heading_degrees: 0.0,
            pitch_degrees: 0.0,
            roll_degrees: 0.0,
        }
    }
}

/// Sensor subscriber that keeps a shared camera pose current with the
/// fused orientation. Frames without an orientation leave the pose
/// untouched.
pub struct CameraTracker {
    pose: Arc<Mutex<CameraPose>>,
}

impl CameraTracker {
    pub fn new(pose: Arc<Mutex<CameraPose>>) -> Self {
        Self { pose }
    }
}

impl SensorSubscriber for CameraTracker {
    fn on_sensor_frame(&mut self, frame: &SensorFrame) {
        if let Some(orientation) = frame.orientation {
            let mut pose = self.pose.lock().unwrap_or_else(PoisonError::into_inner);
            pose.heading_degrees = orientation.heading_degrees();
            pose.pitch_degrees = orientation.pitch.to_degrees();
            pose.roll_degrees = orientation.roll.to_degrees();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::EARTH_RADIUS_METERS;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const POI: i32 = 1;
    const LANDMARKS: i32 = 2;

    fn tex() -> TextureHandle {
        TextureHandle(7)
    }

    /// A fix exactly `meters` north of the origin fix, so the haversine
    /// distance is exact rather than approximate.
    fn fix_north_of(origin: &GeoPoint, meters: f64) -> GeoPoint {
        let dlat = (meters / EARTH_RADIUS_METERS).to_degrees();
        GeoPoint::at_sea_level(origin.latitude + dlat, origin.longitude)
    }

    #[derive(Default)]
    struct EventLog {
        added: Vec<ObjectId>,
        removed: Vec<ObjectId>,
        fixes: usize,
        cleared: usize,
        attached: usize,
        detached: usize,
    }

    struct LogModule {
        log: Arc<Mutex<EventLog>>,
    }

    impl WorldModule for LogModule {
        fn kind(&self) -> ModuleKind {
            ModuleKind::Analytics
        }
        fn on_attached(&mut self, _world: &WorldProfile) {
            self.log.lock().unwrap().attached += 1;
        }
        fn on_detached(&mut self) {
            self.log.lock().unwrap().detached += 1;
        }
        fn on_object_added(&mut self, object: &SpatialObject) {
            self.log.lock().unwrap().added.push(object.id());
        }
        fn on_object_removed(&mut self, object: &SpatialObject) {
            self.log.lock().unwrap().removed.push(object.id());
        }
        fn on_geo_position_changed(&mut self, _position: &GeoPoint) {
            self.log.lock().unwrap().fixes += 1;
        }
        fn on_world_cleared(&mut self) {
            self.log.lock().unwrap().cleared += 1;
        }
    }

    fn world_with_log() -> (World, Arc<Mutex<EventLog>>) {
        let mut world = World::new(GeoPoint::at_sea_level(40.4168, -3.7038));
        let log = Arc::new(Mutex::new(EventLog::default()));
        world.attach_module(Box::new(LogModule { log: log.clone() }));
        (world, log)
    }

    #[test]
    fn test_add_and_remove_fire_exactly_once() {
        let (mut world, log) = world_with_log();
        let id = world.allocate_object_id();
        world.add_object(SpatialObject::new(id, "marker", tex()), POI);

        assert_eq!(log.lock().unwrap().added, vec![id]);
        assert!(world.remove_object(id));
        assert_eq!(log.lock().unwrap().removed, vec![id]);

        // Removing a non-member reports failure and fires nothing.
        assert!(!world.remove_object(id));
        assert_eq!(log.lock().unwrap().removed, vec![id]);
    }

    #[test]
    fn test_move_object_is_remove_then_add() {
        let (mut world, log) = world_with_log();
        let id = world.allocate_object_id();
        world.add_object(SpatialObject::new(id, "marker", tex()), POI);

        assert!(world.move_object(id, LANDMARKS));
        assert_eq!(world.object(id).unwrap().collection_kind(), Some(LANDMARKS));
        assert!(world.collection(POI).unwrap().is_empty());

        let log = log.lock().unwrap();
        assert_eq!(log.added, vec![id, id]);
        assert_eq!(log.removed, vec![id]);
    }

    #[test]
    fn test_geo_fix_broadcast_does_not_touch_objects() {
        let (mut world, log) = world_with_log();
        let id = world.allocate_object_id();
        let anchor = fix_north_of(&world.geo_position(), 50.0);
        world.add_object(SpatialObject::geo_anchored(id, "cafe", tex(), anchor), POI);

        let before = world.object(id).unwrap().position();
        world.set_geo_position(fix_north_of(&world.geo_position(), 10.0));
        assert_eq!(world.object(id).unwrap().position(), before);
        assert_eq!(log.lock().unwrap().fixes, 1);
    }

    #[test]
    fn test_distance_gate_is_strict() {
        let mut world = World::new(GeoPoint::at_sea_level(0.0, 0.0));
        world.set_view_distance(1000.0);
        let origin = world.geo_position();

        let near = world.allocate_object_id();
        let far = world.allocate_object_id();
        world.add_object(
            SpatialObject::geo_anchored(near, "near", tex(), fix_north_of(&origin, 999.0)),
            POI,
        );
        world.add_object(
            SpatialObject::geo_anchored(far, "far", tex(), fix_north_of(&origin, 1001.0)),
            POI,
        );

        let candidates = world.snapshot_candidates();
        let ids: Vec<_> = candidates.iter().map(|c| c.object_id).collect();
        assert_eq!(ids, vec![near]);

        // Unbounded view distance admits everything.
        world.set_view_distance(0.0);
        assert_eq!(world.snapshot_candidates().len(), 2);
    }

    #[test]
    fn test_non_geo_objects_always_pass() {
        let mut world = World::new(GeoPoint::at_sea_level(0.0, 0.0));
        world.set_view_distance(1.0);
        let id = world.allocate_object_id();
        let mut object = SpatialObject::new(id, "hud", tex());
        object.set_position(Point3::new(0.0, 0.0, -5000.0));
        world.add_object(object, POI);

        let candidates = world.snapshot_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].distance_meters, None);
    }

    #[test]
    fn test_candidate_position_follows_device_fix() {
        let mut world = World::new(GeoPoint::at_sea_level(0.0, 0.0));
        world.set_view_distance(0.0);
        let id = world.allocate_object_id();
        let anchor = fix_north_of(&world.geo_position(), 100.0);
        world.add_object(SpatialObject::geo_anchored(id, "cafe", tex(), anchor), POI);

        let first = world.snapshot_candidates()[0].position;
        assert!(first.z < 0.0, "north of the device maps to -z");

        // Walk halfway toward the anchor; the projected position shrinks.
        world.set_geo_position(fix_north_of(&GeoPoint::at_sea_level(0.0, 0.0), 50.0));
        let second = world.snapshot_candidates()[0].position;
        assert!(second.z.abs() < first.z.abs());
    }

    #[test]
    fn test_pick_returns_nearest_hit() {
        let mut world = World::new(GeoPoint::at_sea_level(0.0, 0.0));
        let near = world.allocate_object_id();
        let far = world.allocate_object_id();

        let mut a = SpatialObject::new(near, "near", tex());
        a.set_position(Point3::new(0.0, 0.0, -10.0));
        let mut b = SpatialObject::new(far, "far", tex());
        b.set_position(Point3::new(0.0, 0.0, -30.0));
        world.add_object(a, POI);
        world.add_object(b, POI);

        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, -1.0));
        let hit = world.pick(&ray).expect("both quads face the cast");
        assert_eq!(hit.object_id, near);
        assert!((hit.distance - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_pick_skips_invisible_objects() {
        let mut world = World::new(GeoPoint::at_sea_level(0.0, 0.0));
        let id = world.allocate_object_id();
        let mut object = SpatialObject::new(id, "hidden", tex());
        object.set_position(Point3::new(0.0, 0.0, -10.0));
        object.set_visible(false);
        world.add_object(object, POI);

        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, -1.0));
        assert!(world.pick(&ray).is_none());
    }

    #[test]
    fn test_rotation_is_reflected_in_next_pick() {
        let mut world = World::new(GeoPoint::at_sea_level(0.0, 0.0));
        let id = world.allocate_object_id();
        let mut object = SpatialObject::new(id, "panel", tex());
        object.set_position(Point3::new(0.0, 0.0, -10.0));
        world.add_object(object, POI);

        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, -1.0));
        assert!(world.pick(&ray).is_some());

        // Turn the quad edge-on; the derived collider must reflect the
        // new angle immediately.
        world
            .object_mut(id)
            .unwrap()
            .set_angle(Vector3::new(0.0, 90.0, 0.0));
        assert!(world.pick(&ray).is_none());
    }

    #[test]
    fn test_clear_resets_modules_and_collections_together() {
        let (mut world, log) = world_with_log();
        let id = world.allocate_object_id();
        world.add_object(SpatialObject::new(id, "marker", tex()), POI);

        world.clear();
        assert_eq!(world.module_count(), 0);
        assert_eq!(world.stats().objects, 0);
        let log = log.lock().unwrap();
        assert_eq!(log.attached, 1);
        assert_eq!(log.cleared, 1);
        assert_eq!(log.detached, 1);
    }

    #[test]
    fn test_stats() {
        let mut world = World::new(GeoPoint::at_sea_level(0.0, 0.0));
        world.set_view_distance(0.0);
        let a = world.allocate_object_id();
        let b = world.allocate_object_id();
        let anchor = fix_north_of(&world.geo_position(), 10.0);
        world.add_object(SpatialObject::new(a, "hud", tex()), POI);
        world.add_object(SpatialObject::geo_anchored(b, "cafe", tex(), anchor), LANDMARKS);

        world.snapshot_candidates();
        let stats = world.stats();
        assert_eq!(stats.collections, 2);
        assert_eq!(stats.objects, 2);
        assert_eq!(stats.geo_anchored, 1);
        assert_eq!(stats.last_candidates, 2);
    }

    struct CountingPlugin {
        attached: Arc<AtomicUsize>,
    }

    impl ObjectPlugin for CountingPlugin {
        fn kind(&self) -> ModuleKind {
            ModuleKind::Custom(3)
        }
        fn on_attached(&mut self, _object: ObjectId) {
            self.attached.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_object_plugin_lifecycle() {
        let attached = Arc::new(AtomicUsize::new(0));
        let mut object = SpatialObject::new(1, "marker", tex());
        let handle = object.attach_plugin(Box::new(CountingPlugin {
            attached: attached.clone(),
        }));

        assert_eq!(attached.load(Ordering::SeqCst), 1);
        assert!(object.plugins().contains_kind(ModuleKind::Custom(3)));
        assert!(object.detach_plugin(handle));
        assert!(!object.detach_plugin(handle));
    }
}
