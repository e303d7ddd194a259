// SPDX-License-Identifier: CEPL-1.0
use prism_api::ObjectKind;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::error;

type Slot = Arc<dyn Any + Send + Sync>;

/// Typed side-tables attached to tracked objects for the object's lifetime.
///
/// A slot exists at most once per `(object, payload type)` and never outlives
/// the owning object; the runtime purges leftover slots when the object's
/// destroy event returns. Payloads are handed out as `Arc`s so several
/// recording threads can read device-level data concurrently; payloads that
/// need mutation carry their own interior lock.
#[derive(Default)]
pub struct ExtensionStore {
    slots: RwLock<HashMap<(ObjectKind, u64, TypeId), Slot>>,
}

impl ExtensionStore {
    /// Creates the `T` slot on the object and returns it. Attaching twice is
    /// a protocol violation and yields `None`.
    pub fn attach<T>(&self, kind: ObjectKind, handle: u64) -> Option<Arc<T>>
    where
        T: Default + Send + Sync + 'static,
    {
        let key = (kind, handle, TypeId::of::<T>());
        let mut slots = self.slots.write().expect("extension lock poisoned");
        if slots.contains_key(&key) {
            error!(
                "extension {} attached twice to {kind:?} {handle:#x}",
                std::any::type_name::<T>()
            );
            debug_assert!(false, "extension attached twice");
            return None;
        }
        let payload = Arc::new(T::default());
        slots.insert(key, payload.clone());
        Some(payload)
    }

    pub fn get<T>(&self, kind: ObjectKind, handle: u64) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let key = (kind, handle, TypeId::of::<T>());
        let slots = self.slots.read().expect("extension lock poisoned");
        let slot = slots.get(&key)?.clone();
        Arc::downcast::<T>(slot).ok()
    }

    /// Removes the `T` slot; symmetric with [`attach`](Self::attach).
    pub fn detach<T>(&self, kind: ObjectKind, handle: u64)
    where
        T: Send + Sync + 'static,
    {
        let key = (kind, handle, TypeId::of::<T>());
        let removed = self
            .slots
            .write()
            .expect("extension lock poisoned")
            .remove(&key)
            .is_some();
        if !removed {
            error!(
                "extension {} detached from {kind:?} {handle:#x} without attach",
                std::any::type_name::<T>()
            );
            debug_assert!(removed, "extension detached without attach");
        }
    }

    /// Drops every slot still attached to the object. Called by the runtime
    /// after the object's destroy event so no slot outlives its owner.
    pub fn purge(&self, kind: ObjectKind, handle: u64) {
        self.slots
            .write()
            .expect("extension lock poisoned")
            .retain(|&(k, h, _), _| k != kind || h != handle);
    }

    pub fn slot_count(&self) -> usize {
        self.slots.read().expect("extension lock poisoned").len()
    }
}
