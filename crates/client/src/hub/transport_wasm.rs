//! Web hub transport using `web_sys::WebSocket`.
//!
//! Owns the socket lifecycle and the reconnection policy; the manager only
//! sees [`TransportSignal`]s and decoded pushes. An initial connect failure
//! is terminal; retries only cover drops of an established link.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crowdplay_shared::{ClientInvoke, HubEnvelope, ServerPush};
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{js_sys, CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use super::{PushSink, ReconnectConfig, SignalSink, TransportSignal};

type SharedReceiver = Rc<RefCell<UnboundedReceiver<HubEnvelope<ClientInvoke>>>>;

pub(super) struct TransportParams {
    pub url: String,
    pub receiver: UnboundedReceiver<HubEnvelope<ClientInvoke>>,
    pub stopping: Arc<AtomicBool>,
    /// The currently open socket, shared with the manager so `stop()` can
    /// close it from outside the loop.
    pub socket_slot: Rc<RefCell<Option<WebSocket>>>,
    pub on_signal: SignalSink,
    pub on_push: PushSink,
}

pub(super) fn spawn(params: TransportParams) {
    spawn_local(run(params));
}

async fn run(params: TransportParams) {
    let TransportParams {
        url,
        receiver,
        stopping,
        socket_slot,
        on_signal,
        on_push,
    } = params;
    let config = ReconnectConfig::default();
    let receiver: SharedReceiver = Rc::new(RefCell::new(receiver));

    match open_socket(&url, on_push.clone()).await {
        Ok(socket) => {
            on_signal(TransportSignal::Up);
            crate::log_info!("hub connected: {}", url);
            run_session(socket, &receiver, &socket_slot, &stopping).await;
        }
        Err(reason) => {
            crate::log_error!("hub connect failed for {}: {}", url, reason);
            on_signal(TransportSignal::ConnectFailed);
            return;
        }
    }

    'reconnect: loop {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        on_signal(TransportSignal::Lost);

        let mut attempt = 0u32;
        loop {
            if config.max_attempts > 0 && attempt >= config.max_attempts {
                crate::log_error!("hub gave up after {} reconnect attempts", attempt);
                on_signal(TransportSignal::GaveUp);
                break 'reconnect;
            }
            let delay = config.delay_for_attempt(attempt);
            crate::log_info!("reconnecting to hub in {}ms (attempt {})", delay, attempt + 1);
            gloo_timers::future::TimeoutFuture::new(delay).await;
            if stopping.load(Ordering::SeqCst) {
                break 'reconnect;
            }
            match open_socket(&url, on_push.clone()).await {
                Ok(socket) => {
                    on_signal(TransportSignal::Up);
                    crate::log_info!("hub reconnected: {}", url);
                    run_session(socket, &receiver, &socket_slot, &stopping).await;
                    continue 'reconnect;
                }
                Err(reason) => {
                    crate::log_warn!("hub reconnect failed: {}", reason);
                    attempt += 1;
                }
            }
        }
    }
    crate::log_info!("hub transport for {} released", url);
}

/// Pump one open socket until it closes or the manager stops.
async fn run_session(
    socket: WebSocket,
    receiver: &SharedReceiver,
    socket_slot: &Rc<RefCell<Option<WebSocket>>>,
    stopping: &Arc<AtomicBool>,
) {
    *socket_slot.borrow_mut() = Some(socket.clone());

    let (close_tx, mut close_rx) = futures_channel::mpsc::unbounded::<()>();
    let onclose_callback = Closure::wrap(Box::new(move |_: CloseEvent| {
        let _ = close_tx.unbounded_send(());
    }) as Box<dyn FnMut(CloseEvent)>);
    socket.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
    onclose_callback.forget();

    // Send pump: drain queued invokes while the socket stays open
    // (readyState 1 = OPEN).
    let socket_for_send = socket.clone();
    let receiver_for_send = receiver.clone();
    let stopping_for_send = stopping.clone();
    spawn_local(async move {
        loop {
            let envelope = {
                let mut rx = receiver_for_send.borrow_mut();
                rx.next().await
            };
            let Some(envelope) = envelope else {
                break;
            };
            if stopping_for_send.load(Ordering::SeqCst) || socket_for_send.ready_state() != 1 {
                crate::log_info!("hub socket no longer open, stopping send pump");
                break;
            }
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    crate::log_debug!("hub invoke {}: {}", envelope.payload.method(), json);
                    if let Err(err) = socket_for_send.send_with_str(&json) {
                        crate::log_error!("hub send failed: {:?}", err);
                    }
                }
                Err(err) => {
                    crate::log_error!("hub invoke serialize failed: {}", err);
                }
            }
        }
    });

    close_rx.next().await;
    socket_slot.borrow_mut().take();
    crate::log_info!("hub session ended");
}

/// Establish a socket and wire the push decoder. Resolves once the socket
/// opens or errors out.
async fn open_socket(url: &str, on_push: PushSink) -> Result<WebSocket, String> {
    let socket = WebSocket::new(url).map_err(|err| format!("failed to create socket: {err:?}"))?;

    let is_open = Rc::new(RefCell::new(false));
    let error_reason = Rc::new(RefCell::new(None::<String>));

    let is_open_clone = is_open.clone();
    let onopen_callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
        *is_open_clone.borrow_mut() = true;
    }) as Box<dyn FnMut(web_sys::Event)>);
    socket.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
    onopen_callback.forget();

    let error_reason_close = error_reason.clone();
    let onclose_callback = Closure::wrap(Box::new(move |event: CloseEvent| {
        let reason = if event.reason().is_empty() {
            format!("code {}", event.code())
        } else {
            event.reason()
        };
        *error_reason_close.borrow_mut() = Some(reason);
    }) as Box<dyn FnMut(CloseEvent)>);
    socket.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
    onclose_callback.forget();

    let error_reason_err = error_reason.clone();
    let onerror_callback = Closure::wrap(Box::new(move |_: ErrorEvent| {
        *error_reason_err.borrow_mut() = Some("socket error".to_string());
    }) as Box<dyn FnMut(ErrorEvent)>);
    socket.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
    onerror_callback.forget();

    let onmessage_callback = Closure::wrap(Box::new(move |event: MessageEvent| {
        if let Ok(text) = event.data().dyn_into::<js_sys::JsString>() {
            let text: String = text.into();
            match serde_json::from_str::<HubEnvelope<ServerPush>>(&text) {
                Ok(envelope) => on_push(envelope),
                Err(err) => crate::log_error!("undecodable hub push: {}", err),
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    socket.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
    onmessage_callback.forget();

    // Poll for open with a 5 second ceiling, yielding so callbacks fire.
    for _ in 0..500 {
        if *is_open.borrow() {
            return Ok(socket);
        }
        if let Some(reason) = error_reason.borrow().clone() {
            return Err(reason);
        }
        gloo_timers::future::TimeoutFuture::new(10).await;
    }
    Err("connection timeout".to_string())
}
