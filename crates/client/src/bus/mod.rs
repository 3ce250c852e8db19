//! Validated, typed two-way channel between the widget and its host frame.
//!
//! Inbound messages are checked against the `WidgetEvent` schema and the
//! expected origin before any handler sees them; everything else is dropped
//! and counted. Handlers run synchronously, in registration order.
//!
//! This module provides the shared dispatch logic and conditionally
//! includes the platform-specific host boundary.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crowdplay_shared::WidgetEvent;

#[cfg(target_arch = "wasm32")]
mod frame_wasm;
#[cfg(target_arch = "wasm32")]
pub use frame_wasm::BusSender;
#[cfg(target_arch = "wasm32")]
use frame_wasm::HostFrame;

#[cfg(not(target_arch = "wasm32"))]
mod frame_native;
#[cfg(not(target_arch = "wasm32"))]
pub use frame_native::BusSender;
#[cfg(not(target_arch = "wasm32"))]
use frame_native::HostFrame;

/// Where an inbound frame message came from, as judged by the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    /// The embedding parent frame.
    Host,
    /// Anything else: sibling frames, extensions, the page itself.
    Unknown,
}

/// Token returned by [`MessageBus::on_message`]; removes exactly that
/// handler when passed to [`MessageBus::off_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

struct Subscriber {
    id: u64,
    callback: Rc<dyn Fn(&WidgetEvent)>,
}

pub(crate) struct BusInner {
    handlers: RefCell<Vec<Subscriber>>,
    next_id: Cell<u64>,
    dropped: Cell<u64>,
}

impl BusInner {
    fn new() -> Self {
        Self {
            handlers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            dropped: Cell::new(0),
        }
    }

    /// Validate and dispatch one raw inbound message.
    pub(crate) fn deliver(&self, raw: serde_json::Value, origin: FrameOrigin) {
        if origin != FrameOrigin::Host {
            self.dropped.set(self.dropped.get() + 1);
            crate::log_warn!("dropped frame message from unexpected origin");
            return;
        }
        let event: WidgetEvent = match serde_json::from_value(raw) {
            Ok(event) => event,
            Err(err) => {
                self.dropped.set(self.dropped.get() + 1);
                crate::log_warn!("dropped non-widget frame message: {}", err);
                return;
            }
        };
        // Snapshot so a handler may subscribe/unsubscribe mid-dispatch.
        let snapshot: Vec<Rc<dyn Fn(&WidgetEvent)>> = self
            .handlers
            .borrow()
            .iter()
            .map(|subscriber| subscriber.callback.clone())
            .collect();
        for callback in snapshot {
            callback(&event);
        }
    }
}

/// The widget side of the cross-frame channel.
///
/// Construction binds exactly one inbound listener to the host boundary
/// (a no-op outside a browser environment). Callers are expected to emit
/// `init` once after mount and a final `closeWidget` via
/// [`MessageBus::close`] before teardown.
pub struct MessageBus {
    inner: Rc<BusInner>,
    frame: HostFrame,
    destroyed: Cell<bool>,
}

impl MessageBus {
    /// Create a bus posting to any origin (`"*"`).
    pub fn new() -> Self {
        Self::with_target_origin("*")
    }

    /// Create a bus restricted to the given host origin.
    pub fn with_target_origin(target_origin: impl Into<String>) -> Self {
        let inner = Rc::new(BusInner::new());
        let frame = HostFrame::bind(target_origin.into(), inner.clone());
        Self {
            inner,
            frame,
            destroyed: Cell::new(false),
        }
    }

    /// Send an event to the host. Fire-and-forget: no acknowledgement.
    pub fn send(&self, event: &WidgetEvent) {
        if self.destroyed.get() {
            crate::log_warn!("send on a destroyed bus ignored: {:?}", event);
            return;
        }
        self.frame.post(event);
    }

    /// A clone-able handle for posting to the host without owning the bus.
    pub fn sender(&self) -> BusSender {
        self.frame.sender()
    }

    /// Register a handler invoked for every valid inbound event, in
    /// registration order, synchronously.
    pub fn on_message(&self, handler: impl Fn(&WidgetEvent) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.handlers.borrow_mut().push(Subscriber {
            id,
            callback: Rc::new(handler),
        });
        Subscription(id)
    }

    /// Remove exactly the handler behind `token`.
    pub fn off_message(&self, token: Subscription) {
        self.inner
            .handlers
            .borrow_mut()
            .retain(|subscriber| subscriber.id != token.0);
    }

    /// Remove every registered handler.
    pub fn clear_handlers(&self) {
        self.inner.handlers.borrow_mut().clear();
    }

    /// Validate and dispatch one raw inbound message. Invoked by the host
    /// boundary; public so embedders with their own frame plumbing (and
    /// tests) can feed the bus directly.
    pub fn deliver(&self, raw: serde_json::Value, origin: FrameOrigin) {
        if self.destroyed.get() {
            return;
        }
        self.inner.deliver(raw, origin);
    }

    /// Messages rejected by validation or origin checks so far.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.get()
    }

    /// Emit the final `closeWidget` and tear the bus down.
    pub fn close(&self) {
        if !self.destroyed.get() {
            self.send(&WidgetEvent::CloseWidget);
        }
        self.destroy();
    }

    /// Unbind the boundary listener and clear all handlers. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.frame.unbind();
        self.clear_handlers();
    }

    /// Outbound events buffered by the inert native boundary, oldest first.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn drain_outbox(&self) -> Vec<WidgetEvent> {
        self.frame.drain()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        self.destroy();
    }
}
