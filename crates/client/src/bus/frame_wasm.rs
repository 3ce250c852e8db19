//! Host boundary for web builds: `postMessage` out, a single `message`
//! listener in. Only messages whose source is the parent frame are
//! forwarded to the bus.

use std::cell::RefCell;
use std::rc::Rc;

use crowdplay_shared::WidgetEvent;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{js_sys, MessageEvent};

use super::{BusInner, FrameOrigin};

pub(super) struct HostFrame {
    target_origin: String,
    listener: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
}

impl HostFrame {
    pub(super) fn bind(target_origin: String, inner: Rc<BusInner>) -> Self {
        let frame = Self {
            target_origin,
            listener: RefCell::new(None),
        };
        let Some(window) = web_sys::window() else {
            // Non-browser environment: nothing to bind.
            return frame;
        };

        let callback = Closure::wrap(Box::new(move |event: MessageEvent| {
            let origin = if is_from_parent(&event) {
                FrameOrigin::Host
            } else {
                FrameOrigin::Unknown
            };
            // Round-trip through JSON so the bus only ever sees plain data.
            let raw = js_sys::JSON::stringify(&event.data())
                .ok()
                .and_then(|text| text.as_string())
                .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
                .unwrap_or(serde_json::Value::Null);
            inner.deliver(raw, origin);
        }) as Box<dyn FnMut(MessageEvent)>);

        if window
            .add_event_listener_with_callback("message", callback.as_ref().unchecked_ref())
            .is_err()
        {
            crate::log_error!("failed to bind frame message listener");
        }
        *frame.listener.borrow_mut() = Some(callback);
        frame
    }

    pub(super) fn post(&self, event: &WidgetEvent) {
        post_to_parent(event, &self.target_origin);
    }

    pub(super) fn sender(&self) -> BusSender {
        BusSender {
            target_origin: self.target_origin.clone(),
        }
    }

    pub(super) fn unbind(&self) {
        let Some(callback) = self.listener.borrow_mut().take() else {
            return;
        };
        if let Some(window) = web_sys::window() {
            let _ = window
                .remove_event_listener_with_callback("message", callback.as_ref().unchecked_ref());
        }
    }
}

/// Clone-able handle for posting events to the host frame.
#[derive(Clone)]
pub struct BusSender {
    target_origin: String,
}

impl BusSender {
    /// Fire-and-forget post to the host frame.
    pub fn send(&self, event: &WidgetEvent) {
        post_to_parent(event, &self.target_origin);
    }
}

fn is_from_parent(event: &MessageEvent) -> bool {
    let Some(window) = web_sys::window() else {
        return false;
    };
    let parent = match window.parent() {
        Ok(Some(parent)) => parent,
        _ => return false,
    };
    match event.source() {
        Some(source) => JsValue::from(source) == JsValue::from(parent),
        None => false,
    }
}

fn post_to_parent(event: &WidgetEvent, target_origin: &str) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let Ok(Some(parent)) = window.parent() else {
        return;
    };
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            crate::log_error!("failed to serialize widget event: {}", err);
            return;
        }
    };
    let data = match js_sys::JSON::parse(&json) {
        Ok(data) => data,
        Err(_) => return,
    };
    if parent.post_message(&data, target_origin).is_err() {
        crate::log_warn!("postMessage to host failed");
    }
}
