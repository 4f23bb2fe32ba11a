//! Observer registration and ordered event dispatch
//!
//! # Architecture
//!
//! ```text
//! Connection task ──> Unbounded Channel ──> Dispatch Thread ──> observer 1, observer 2, ...
//! ```
//!
//! A single dispatch thread drains the channel, so observers see events in
//! exactly the order the connection produced them, and a slow observer never
//! stalls socket I/O.

use crate::event::{Event, EventKind};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Callback invoked for each delivered event
pub type Observer = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
///
/// Ids increase monotonically, so ordering ids is ordering registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

struct Registration {
    kind: Option<EventKind>,
    callback: Observer,
}

/// Messages consumed by the dispatch thread
pub(crate) enum Dispatch {
    Event(Event),
    /// Drop every observer registered before the given watermark
    ClearObservers(ObserverId),
}

/// Thread-safe set of observers
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<BTreeMap<ObserverId, Registration>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            observers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register `callback` for one event kind, or for all kinds when `kind` is `None`
    pub fn subscribe(&self, kind: Option<EventKind>, callback: Observer) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::AcqRel));
        self.observers
            .write()
            .insert(id, Registration { kind, callback });
        id
    }

    /// Remove an observer; returns whether it was still registered
    ///
    /// Removing an unknown or already removed id is a no-op.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver `event` to every matching observer in registration order
    ///
    /// Callbacks run outside the lock so they may subscribe or unsubscribe.
    pub fn dispatch(&self, event: &Event) {
        let kind = event.kind();
        let targets: Vec<Observer> = self
            .observers
            .read()
            .values()
            .filter(|r| r.kind.map_or(true, |k| k == kind))
            .map(|r| Arc::clone(&r.callback))
            .collect();

        for callback in targets {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("Observer panicked while handling {:?}", kind);
            }
        }
    }

    /// Id that the next registration will receive
    pub(crate) fn watermark(&self) -> ObserverId {
        ObserverId(self.next_id.load(Ordering::Acquire))
    }

    /// Remove observers registered before `watermark`, keeping later ones
    pub(crate) fn clear_before(&self, watermark: ObserverId) -> usize {
        let mut observers = self.observers.write();
        let kept = observers.split_off(&watermark);
        let removed = observers.len();
        *observers = kept;
        removed
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the dispatch thread; it exits once every sender is dropped
pub(crate) fn spawn_dispatcher(
    registry: Arc<ObserverRegistry>,
    receiver: Receiver<Dispatch>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("pinsockets-dispatch".to_string())
        .spawn(move || {
            for message in receiver.iter() {
                match message {
                    Dispatch::Event(event) => registry.dispatch(&event),
                    Dispatch::ClearObservers(watermark) => {
                        let removed = registry.clear_before(watermark);
                        debug!("Deregistered {} observers after close", removed);
                    }
                }
            }
            debug!("Dispatch channel closed, thread exiting");
        })
}

/// Observer that forwards every event into a crossbeam channel
pub(crate) fn channel_observer() -> (Observer, Receiver<Event>) {
    let (tx, rx): (Sender<Event>, Receiver<Event>) = crossbeam_channel::unbounded();
    let observer: Observer = Arc::new(move |event: &Event| {
        let _ = tx.send(event.clone());
    });
    (observer, rx)
}
