// SPDX-License-Identifier: CEPL-1.0
use prism_api::ObjectKind;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::error;

/// Live-handle sets, one per tracked object kind.
///
/// Registration is rare next to per-draw traffic, so a reader/writer lock per
/// kind is enough. Double-register and unregister-of-absent are protocol
/// violations in the shim layer: they assert in debug builds and degrade to a
/// logged no-op in release builds.
pub struct HandleRegistry {
    sets: [RwLock<HashSet<u64>>; ObjectKind::COUNT],
}

impl Default for HandleRegistry {
    fn default() -> Self {
        HandleRegistry {
            sets: std::array::from_fn(|_| RwLock::new(HashSet::new())),
        }
    }
}

impl HandleRegistry {
    pub fn register(&self, kind: ObjectKind, handle: u64) {
        if handle == 0 {
            error!("attempted to register null {kind:?} handle");
            debug_assert!(false, "null handle registered");
            return;
        }
        let inserted = self.sets[kind.index()]
            .write()
            .expect("registry lock poisoned")
            .insert(handle);
        if !inserted {
            error!("{kind:?} handle {handle:#x} registered twice");
            debug_assert!(inserted, "handle registered twice");
        }
    }

    pub fn unregister(&self, kind: ObjectKind, handle: u64) {
        let removed = self.sets[kind.index()]
            .write()
            .expect("registry lock poisoned")
            .remove(&handle);
        if !removed {
            error!("{kind:?} handle {handle:#x} unregistered but was never registered");
            debug_assert!(removed, "unknown handle unregistered");
        }
    }

    pub fn is_live(&self, kind: ObjectKind, handle: u64) -> bool {
        handle != 0
            && self.sets[kind.index()]
                .read()
                .expect("registry lock poisoned")
                .contains(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let registry = HandleRegistry::default();
        assert!(!registry.is_live(ObjectKind::Resource, 7));

        registry.register(ObjectKind::Resource, 7);
        assert!(registry.is_live(ObjectKind::Resource, 7));
        // Same handle under a different kind is a different object
        assert!(!registry.is_live(ObjectKind::ResourceView, 7));

        registry.unregister(ObjectKind::Resource, 7);
        assert!(!registry.is_live(ObjectKind::Resource, 7));
    }

    #[test]
    fn null_is_never_live() {
        let registry = HandleRegistry::default();
        assert!(!registry.is_live(ObjectKind::CommandQueue, 0));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "handle registered twice")]
    fn double_register_asserts() {
        let registry = HandleRegistry::default();
        registry.register(ObjectKind::Sampler, 3);
        registry.register(ObjectKind::Sampler, 3);
    }
}
