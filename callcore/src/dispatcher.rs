//! Routing of inbound signaling events to registered handlers
//!
//! Handlers are keyed by [`EventKind`] and invoked synchronously, in
//! registration order, on the dispatching thread. A failing or panicking
//! handler is logged and does not prevent later handlers from running.

use callcore_proto::{EventKind, SignalingMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{error, trace};

pub type Handler = Arc<dyn Fn(&SignalingMessage) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Registration>>,
}

impl Registry {
    fn remove(&mut self, kind: EventKind, id: HandlerId) -> bool {
        let Some(registrations) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        before != registrations.len()
    }
}

/// Event dispatcher owned by one call session.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SignalingMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = HandlerId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.entry(kind).or_default().push(Registration {
            id,
            handler: Arc::new(handler),
        });

        Subscription {
            kind,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove one handler; returns whether it was still registered
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.registry.lock().remove(kind, id)
    }

    /// Remove every handler for `kind`, or for all kinds when `None`
    pub fn off_all(&self, kind: Option<EventKind>) {
        let mut registry = self.registry.lock();
        match kind {
            Some(kind) => {
                registry.handlers.remove(&kind);
            }
            None => registry.handlers.clear(),
        }
    }

    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the message's kind.
    ///
    /// Handlers run against a snapshot taken before the first call, so
    /// handlers added or removed during dispatch take effect on the next
    /// message. Returns the number of handlers invoked.
    pub fn dispatch(&self, message: &SignalingMessage) -> usize {
        let kind = message.kind();
        let snapshot: Vec<(HandlerId, Handler)> = {
            let registry = self.registry.lock();
            registry
                .handlers
                .get(&kind)
                .map(|registrations| {
                    registrations
                        .iter()
                        .map(|r| (r.id, Arc::clone(&r.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        if snapshot.is_empty() {
            trace!(event = %kind, "No handlers registered");
            return 0;
        }

        for (id, handler) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(event = %kind, handler = id.0, error = %e, "Event handler failed");
                }
                Err(_) => {
                    error!(event = %kind, handler = id.0, "Event handler panicked");
                }
            }
        }

        snapshot.len()
    }
}

/// Handle returned by [`Dispatcher::on`].
///
/// Dropping it keeps the handler registered.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: HandlerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler; returns whether it was still registered
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.lock().remove(self.kind, self.id))
    }
}
