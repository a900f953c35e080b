//! Capability registry: attachable behavior modules for the world and
//! for individual overlay objects.
//!
//! Modules are identified two ways: by a stable [`ModuleKind`] for typed
//! lookup, and by the [`ModuleHandle`] returned at attach time for
//! exact-instance queries. All lookups are linear scans in attachment
//! order. The registry enforces no kind uniqueness; a module that wants
//! to be singular checks [`Registry::contains_kind`] before attaching.

use crate::geodesy::GeoPoint;
use crate::waymark_world::{ObjectId, SpatialObject, WorldProfile};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable capability tag used for typed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Counters and event sinks observing world mutations
    Analytics,

    /// Radar-style overview consumers
    Radar,

    /// Map overlay mirrors
    MapOverlay,

    /// Application-defined capability
    Custom(u32),
}

/// Identity of one attachment; the exact-instance query key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleHandle(Uuid);

impl ModuleHandle {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Behavior attached to a [`crate::waymark_world::World`]. Each instance
/// belongs to at most one world at a time.
#[allow(unused_variables)]
pub trait WorldModule: Send {
    fn kind(&self) -> ModuleKind;

    /// Invoked once when the module is stored, with the owner context.
    fn on_attached(&mut self, world: &WorldProfile) {}

    /// Invoked once when the module is removed or the world is cleared.
    fn on_detached(&mut self) {}

    fn on_object_added(&mut self, object: &SpatialObject) {}

    fn on_object_removed(&mut self, object: &SpatialObject) {}

    fn on_geo_position_changed(&mut self, position: &GeoPoint) {}

    fn on_world_cleared(&mut self) {}
}

/// Behavior attached to a single [`SpatialObject`].
#[allow(unused_variables)]
pub trait ObjectPlugin: Send {
    fn kind(&self) -> ModuleKind;

    fn on_attached(&mut self, object: ObjectId) {}

    fn on_detached(&mut self, object: ObjectId) {}
}

struct RegistryEntry<M: ?Sized> {
    handle: ModuleHandle,
    kind: ModuleKind,
    module: Box<M>,
}

/// Ordered store of attached capabilities.
///
/// The kind is captured at attach time so lookups never need a trait
/// bound on `M`; the two owner types wrap [`Registry::attach`] with their
/// module trait and pass the kind through.
pub struct Registry<M: ?Sized> {
    entries: Vec<RegistryEntry<M>>,
}

impl<M: ?Sized> Registry<M> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Stores a module under its capability kind, preserving attachment
    /// order, and returns its handle.
    pub fn attach(&mut self, kind: ModuleKind, module: Box<M>) -> ModuleHandle {
        let handle = ModuleHandle::fresh();
        self.entries.push(RegistryEntry {
            handle,
            kind,
            module,
        });
        handle
    }

    /// Removes and returns the module behind a handle, or `None` if it
    /// was never attached here (or already detached).
    pub fn detach(&mut self, handle: ModuleHandle) -> Option<Box<M>> {
        let idx = self.entries.iter().position(|e| e.handle == handle)?;
        Some(self.entries.remove(idx).module)
    }

    /// First attached module of the given kind, in attachment order.
    pub fn first_of(&self, kind: ModuleKind) -> Option<&M> {
        self.entries
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| &*e.module)
    }

    pub fn first_of_mut(&mut self, kind: ModuleKind) -> Option<&mut M> {
        self.entries
            .iter_mut()
            .find(|e| e.kind == kind)
            .map(|e| &mut *e.module)
    }

    /// All attached modules of the given kind, in attachment order.
    pub fn all_of(&self, kind: ModuleKind) -> Vec<&M> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| &*e.module)
            .collect()
    }

    pub fn contains_kind(&self, kind: ModuleKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    /// Exact-instance query by attachment handle.
    pub fn contains(&self, handle: ModuleHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.entries.iter().map(|e| &*e.module)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut M> {
        self.entries.iter_mut().map(|e| &mut *e.module)
    }

    /// Removes every module, yielding them in attachment order.
    pub fn drain(&mut self) -> impl Iterator<Item = Box<M>> + '_ {
        self.entries.drain(..).map(|e| e.module)
    }
}

impl<M: ?Sized> Default for Registry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ?Sized> fmt::Debug for Registry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.entries.iter().map(|e| e.kind).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named {
        fn name(&self) -> &'static str;
    }

    struct Probe(&'static str);

    impl Named for Probe {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn test_first_of_respects_attachment_order() {
        let mut registry: Registry<dyn Named> = Registry::new();
        registry.attach(ModuleKind::Analytics, Box::new(Probe("first")));
        registry.attach(ModuleKind::Analytics, Box::new(Probe("second")));
        registry.attach(ModuleKind::Radar, Box::new(Probe("radar")));

        assert_eq!(registry.first_of(ModuleKind::Analytics).unwrap().name(), "first");
        let all: Vec<_> = registry
            .all_of(ModuleKind::Analytics)
            .iter()
            .map(|m| m.name())
            .collect();
        assert_eq!(all, vec!["first", "second"]);
    }

    #[test]
    fn test_duplicate_kinds_are_permitted() {
        let mut registry: Registry<dyn Named> = Registry::new();
        registry.attach(ModuleKind::Radar, Box::new(Probe("a")));
        registry.attach(ModuleKind::Radar, Box::new(Probe("b")));
        assert_eq!(registry.all_of(ModuleKind::Radar).len(), 2);
    }

    #[test]
    fn test_detach_by_handle() {
        let mut registry: Registry<dyn Named> = Registry::new();
        let handle = registry.attach(ModuleKind::MapOverlay, Box::new(Probe("map")));
        assert!(registry.contains(handle));

        let detached = registry.detach(handle).expect("was attached");
        assert_eq!(detached.name(), "map");
        assert!(!registry.contains(handle));
        assert!(registry.detach(handle).is_none()); // second detach is a miss
    }

    #[test]
    fn test_absent_lookups_are_not_errors() {
        let registry: Registry<dyn Named> = Registry::new();
        assert!(registry.first_of(ModuleKind::Custom(7)).is_none());
        assert!(registry.all_of(ModuleKind::Custom(7)).is_empty());
        assert!(!registry.contains_kind(ModuleKind::Custom(7)));
    }
}
