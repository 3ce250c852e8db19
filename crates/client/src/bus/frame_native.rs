//! Host boundary for native builds.
//!
//! Desktop and test builds have no embedding frame, so the boundary binds
//! nothing and buffers outbound events in an outbox for inspection.

use std::rc::Rc;
use std::sync::Arc;

use crowdplay_shared::WidgetEvent;
use parking_lot::Mutex;

use super::BusInner;

pub(super) struct HostFrame {
    outbox: Arc<Mutex<Vec<WidgetEvent>>>,
}

impl HostFrame {
    pub(super) fn bind(_target_origin: String, _inner: Rc<BusInner>) -> Self {
        Self {
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(super) fn post(&self, event: &WidgetEvent) {
        crate::log_debug!("frame post (no host): {:?}", event);
        self.outbox.lock().push(event.clone());
    }

    pub(super) fn sender(&self) -> BusSender {
        BusSender {
            outbox: self.outbox.clone(),
        }
    }

    pub(super) fn unbind(&self) {}

    pub(super) fn drain(&self) -> Vec<WidgetEvent> {
        std::mem::take(&mut *self.outbox.lock())
    }
}

/// Clone-able handle for posting events to the host boundary.
#[derive(Clone)]
pub struct BusSender {
    outbox: Arc<Mutex<Vec<WidgetEvent>>>,
}

impl BusSender {
    /// Fire-and-forget post to the host boundary.
    pub fn send(&self, event: &WidgetEvent) {
        crate::log_debug!("frame post (no host): {:?}", event);
        self.outbox.lock().push(event.clone());
    }
}
