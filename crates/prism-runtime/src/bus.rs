// SPDX-License-Identifier: CEPL-1.0
use crate::Runtime;
use prism_api::{Event, EventKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

/// Callback signature shared by notification and filter events. The return
/// value is the "handled" flag; it is ignored for notification kinds.
pub type EventCallback = Arc<dyn Fn(&Runtime, &Event<'_>) -> bool + Send + Sync>;

/// Identity of a registered callback, used to unregister it. Closures have no
/// comparable identity of their own, so registration hands one out.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CallbackToken {
    kind: EventKind,
    id: u64,
}

/// Ordered multicast dispatch of the normalized event stream.
///
/// Registration is a startup/shutdown activity; dispatch runs on whatever
/// thread issued the underlying graphics call. Dispatch iterates a snapshot
/// of the registration list, so a callback may unregister itself (or others)
/// mid-dispatch and the change takes effect on the next dispatch.
pub struct EventBus {
    lists: Mutex<Vec<Vec<(u64, EventCallback)>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus {
            lists: Mutex::new(vec![Vec::new(); EventKind::COUNT]),
            next_id: AtomicU64::new(1),
        }
    }
}

impl EventBus {
    pub fn register(&self, kind: EventKind, callback: EventCallback) -> CallbackToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lists.lock().expect("event bus lock poisoned")[kind.index()].push((id, callback));
        CallbackToken { kind, id }
    }

    pub fn unregister(&self, token: CallbackToken) {
        let mut lists = self.lists.lock().expect("event bus lock poisoned");
        let list = &mut lists[token.kind.index()];
        let before = list.len();
        list.retain(|(id, _)| *id != token.id);
        if list.len() == before {
            error!("unregister of unknown {:?} callback {}", token.kind, token.id);
            debug_assert!(false, "unknown callback token");
        }
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        !self.lists.lock().expect("event bus lock poisoned")[kind.index()].is_empty()
    }

    /// Invokes every callback registered for the event's kind, in
    /// registration order. For filter kinds the aggregate is true when any
    /// callback reported the event handled; every callback still runs so
    /// independent listeners all observe the event.
    pub fn dispatch(&self, runtime: &Runtime, event: &Event<'_>) -> bool {
        let kind = event.kind();
        let snapshot: Vec<EventCallback> = {
            let lists = self.lists.lock().expect("event bus lock poisoned");
            lists[kind.index()].iter().map(|(_, cb)| cb.clone()).collect()
        };

        let mut handled = false;
        for callback in &snapshot {
            handled |= callback(runtime, event);
        }
        handled && kind.is_filter()
    }
}
