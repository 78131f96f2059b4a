//! Signal bus
//!
//! Publish/subscribe channel for block lifecycle and narration events. The bus
//! is an explicit handle: the application creates one and hands clones to
//! every flowchart it loads.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::error;

/* ===================== Signals ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationState {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    BlockStarted {
        flowchart: String,
        block: String,
    },
    BlockEnded {
        flowchart: String,
        block: String,
        was_stopped: bool,
    },
    CommandExecuted {
        flowchart: String,
        block: String,
        command: String,
        index: usize,
        max_index: usize,
    },
    Narration {
        state: NarrationState,
        character: Option<String>,
        text: String,
    },
    MessageSent {
        flowchart: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    BlockStarted,
    BlockEnded,
    CommandExecuted,
    Narration,
    MessageSent,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::BlockStarted { .. } => SignalKind::BlockStarted,
            Signal::BlockEnded { .. } => SignalKind::BlockEnded,
            Signal::CommandExecuted { .. } => SignalKind::CommandExecuted,
            Signal::Narration { .. } => SignalKind::Narration,
            Signal::MessageSent { .. } => SignalKind::MessageSent,
        }
    }
}

/* ===================== Bus ===================== */

type Handler = Rc<dyn Fn(&Signal)>;

struct Entry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscribers: HashMap<SignalKind, Vec<Entry>>,
}

impl Inner {
    fn is_live(&self, kind: SignalKind, id: u64) -> bool {
        self.subscribers
            .get(&kind)
            .is_some_and(|list| list.iter().any(|e| e.id == id))
    }

    fn remove(&mut self, kind: SignalKind, id: u64) -> bool {
        let Some(list) = self.subscribers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.id != id);
        before != list.len()
    }
}

/// Cloneable handle to a shared subscriber registry
#[derive(Clone, Default)]
pub struct SignalBus {
    inner: Rc<RefCell<Inner>>,
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        let count: usize = inner.subscribers.values().map(Vec::len).sum();
        f.debug_struct("SignalBus")
            .field("subscribers", &count)
            .finish()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for one signal kind.
    ///
    /// The handler stays registered while the returned [`Subscription`] is
    /// alive. Handlers may subscribe or unsubscribe during delivery.
    pub fn subscribe<F>(&self, kind: SignalKind, handler: F) -> Subscription
    where
        F: Fn(&Signal) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.entry(kind).or_default().push(Entry {
            id,
            handler: Rc::new(handler),
        });
        Subscription {
            bus: Rc::downgrade(&self.inner),
            kind,
            id,
            active: true,
        }
    }

    pub fn subscriber_count(&self, kind: SignalKind) -> usize {
        self.inner
            .borrow()
            .subscribers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `signal` to its subscribers in subscription order
    pub fn emit(&self, signal: &Signal) {
        let kind = signal.kind();
        let snapshot: Vec<(u64, Handler)> = match self.inner.borrow().subscribers.get(&kind) {
            Some(list) => list.iter().map(|e| (e.id, e.handler.clone())).collect(),
            None => return,
        };

        for (id, handler) in snapshot {
            // Skip handlers removed by an earlier handler in this delivery
            if !self.inner.borrow().is_live(kind, id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(signal))).is_err() {
                error!(?kind, subscriber = id, "signal subscriber panicked");
            }
        }
    }
}

/// Registration guard; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<RefCell<Inner>>,
    kind: SignalKind,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the handler registered for the lifetime of the bus
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.bus.upgrade() {
            inner.borrow_mut().remove(self.kind, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn started(block: &str) -> Signal {
        Signal::BlockStarted {
            flowchart: "test".into(),
            block: block.into(),
        }
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus = SignalBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = log.clone();
        let _a = bus.subscribe(SignalKind::BlockStarted, move |_| l1.borrow_mut().push("a"));
        let l2 = log.clone();
        let _b = bus.subscribe(SignalKind::BlockStarted, move |_| l2.borrow_mut().push("b"));
        let l3 = log.clone();
        let _c = bus.subscribe(SignalKind::BlockEnded, move |_| l3.borrow_mut().push("c"));

        bus.emit(&started("Main"));
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = SignalBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = bus.subscribe(SignalKind::BlockStarted, move |_| h.set(h.get() + 1));

        bus.emit(&started("Main"));
        drop(sub);
        bus.emit(&started("Main"));

        assert_eq!(hits.get(), 1);
        assert_eq!(bus.subscriber_count(SignalKind::BlockStarted), 0);
    }

    #[test]
    fn test_subscribe_from_handler() {
        let bus = SignalBus::new();
        let late_hits = Rc::new(Cell::new(0));
        let held: Rc<RefCell<Vec<Subscription>>> = Rc::default();

        let bus2 = bus.clone();
        let late = late_hits.clone();
        let held2 = held.clone();
        let _first = bus.subscribe(SignalKind::BlockStarted, move |_| {
            let late = late.clone();
            let sub = bus2.subscribe(SignalKind::BlockStarted, move |_| late.set(late.get() + 1));
            held2.borrow_mut().push(sub);
        });

        // Added during delivery, so only sees the second emit
        bus.emit(&started("Main"));
        assert_eq!(late_hits.get(), 0);
        bus.emit(&started("Main"));
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn test_unsubscribe_later_handler_during_delivery() {
        let bus = SignalBus::new();
        let hits = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::default();

        let v = victim.clone();
        let _killer = bus.subscribe(SignalKind::BlockStarted, move |_| {
            v.borrow_mut().take();
        });
        let h = hits.clone();
        *victim.borrow_mut() =
            Some(bus.subscribe(SignalKind::BlockStarted, move |_| h.set(h.get() + 1)));

        bus.emit(&started("Main"));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = SignalBus::new();
        let hits = Rc::new(Cell::new(0));
        let _bad = bus.subscribe(SignalKind::BlockStarted, |_| panic!("boom"));
        let h = hits.clone();
        let _good = bus.subscribe(SignalKind::BlockStarted, move |_| h.set(h.get() + 1));

        bus.emit(&started("Main"));
        assert_eq!(hits.get(), 1);
    }
}
