//! Lifecycle and state machine for the persistent hub connection.
//!
//! The manager owns exactly one push connection, mirrors the transport's
//! state, gates outbound invokes on `Connected`, and dispatches named
//! inbound pushes to a listener registry. Reconnection policy (backoff
//! timing, retry count) belongs to the transport; the manager only mirrors
//! the resulting state and never runs a second retry loop of its own.
//!
//! This module provides the shared types and conditionally includes the
//! platform-specific transport implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crowdplay_shared::{ClientInvoke, HubEnvelope, ServerPush};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use parking_lot::Mutex;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
mod transport_native;
#[cfg(not(target_arch = "wasm32"))]
use transport_native as transport;

#[cfg(target_arch = "wasm32")]
mod transport_wasm;
#[cfg(target_arch = "wasm32")]
use transport_wasm as transport;

/// Handler for a named inbound push.
#[cfg(not(target_arch = "wasm32"))]
pub type PushHandler = Box<dyn Fn(&ServerPush) + Send>;
#[cfg(target_arch = "wasm32")]
pub type PushHandler = Box<dyn Fn(&ServerPush)>;

/// Observer for connection-state transitions.
#[cfg(not(target_arch = "wasm32"))]
pub type StateHandler = Box<dyn Fn(ConnectionState) + Send>;
#[cfg(target_arch = "wasm32")]
pub type StateHandler = Box<dyn Fn(ConnectionState)>;

#[cfg(not(target_arch = "wasm32"))]
pub(crate) type SignalSink = Arc<dyn Fn(TransportSignal) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub(crate) type SignalSink = std::rc::Rc<dyn Fn(TransportSignal)>;

#[cfg(not(target_arch = "wasm32"))]
pub(crate) type PushSink = Arc<dyn Fn(HubEnvelope<ServerPush>) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub(crate) type PushSink = std::rc::Rc<dyn Fn(HubEnvelope<ServerPush>)>;

#[cfg(not(target_arch = "wasm32"))]
fn signal_sink(f: impl Fn(TransportSignal) + Send + Sync + 'static) -> SignalSink {
    Arc::new(f)
}
#[cfg(target_arch = "wasm32")]
fn signal_sink(f: impl Fn(TransportSignal) + 'static) -> SignalSink {
    std::rc::Rc::new(f)
}

#[cfg(not(target_arch = "wasm32"))]
fn push_sink(f: impl Fn(HubEnvelope<ServerPush>) + Send + Sync + 'static) -> PushSink {
    Arc::new(f)
}
#[cfg(target_arch = "wasm32")]
fn push_sink(f: impl Fn(HubEnvelope<ServerPush>) + 'static) -> PushSink {
    std::rc::Rc::new(f)
}

/// Connection state for the hub link. Exactly one value is active at a
/// time, owned by the [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What the transport reports back to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    /// The link is up: a first connect or a successful resume.
    Up,
    /// The initial connect attempt failed.
    ConnectFailed,
    /// An established link dropped; the transport will retry.
    Lost,
    /// The transport exhausted its retries.
    GaveUp,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    /// Pure transition function. Signals with no row in the table leave the
    /// state unchanged, so a stale transport cannot resurrect a stopped
    /// connection.
    pub fn apply(self, signal: TransportSignal) -> ConnectionState {
        use ConnectionState::*;
        use TransportSignal::*;
        match (self, signal) {
            (Connecting, Up) => Connected,
            (Connecting, ConnectFailed) => Disconnected,
            (Connected, Lost) => Reconnecting,
            (Reconnecting, Up) => Connected,
            (Reconnecting, GaveUp) => Disconnected,
            (state, _) => state,
        }
    }
}

/// Backoff policy between reconnect attempts. Applied by the transport,
/// never by the manager.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum reconnect attempts after a drop (0 = infinite).
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }
}

/// Errors surfaced by the connection layer. All recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Send attempted while the link is not up. The message is dropped by
    /// design; the transport's own retry continues.
    #[error("hub send while {0:?}; message dropped")]
    NotConnected(ConnectionState),
    /// `start()` called twice; restarting requires a fresh instance.
    #[error("connection already started")]
    AlreadyStarted,
    /// The transport side of the outbound channel is gone.
    #[error("transport channel closed")]
    TransportClosed,
}

/// Clone-able handle for invoking hub methods, gated on connection state.
#[derive(Clone)]
pub struct HubHandle {
    state: Arc<Mutex<ConnectionState>>,
    sender: UnboundedSender<HubEnvelope<ClientInvoke>>,
}

impl HubHandle {
    /// Invoke a hub method. Permitted only while `Connected`; in any other
    /// state this is a no-op that logs a warning — callers treat the
    /// message as silently dropped, not as a fatal error.
    pub fn invoke(&self, invoke: ClientInvoke) -> Result<(), ConnectionError> {
        self.invoke_envelope(HubEnvelope::new(invoke))
    }

    /// Invoke with a correlation id for tracking replies.
    pub fn invoke_with_correlation(
        &self,
        invoke: ClientInvoke,
        correlation_id: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        self.invoke_envelope(HubEnvelope::with_correlation(invoke, correlation_id))
    }

    fn invoke_envelope(&self, envelope: HubEnvelope<ClientInvoke>) -> Result<(), ConnectionError> {
        let state = *self.state.lock();
        if !state.is_connected() {
            crate::log_warn!(
                "cannot invoke {} while {:?}; dropped",
                envelope.payload.method(),
                state
            );
            return Err(ConnectionError::NotConnected(state));
        }
        self.sender
            .unbounded_send(envelope)
            .map_err(|_| ConnectionError::TransportClosed)
    }

    /// Current connection state as seen by this handle.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

/// Owns the single hub connection for a widget session.
///
/// Created on mount of whichever feature needs the hub, stopped on
/// unmount. `start()` may be called at most once per instance.
pub struct ConnectionManager {
    hub_url: String,
    state: Arc<Mutex<ConnectionState>>,
    listeners: Arc<Mutex<HashMap<&'static str, PushHandler>>>,
    state_listener: Arc<Mutex<Option<StateHandler>>>,
    sender: UnboundedSender<HubEnvelope<ClientInvoke>>,
    receiver: Mutex<Option<UnboundedReceiver<HubEnvelope<ClientInvoke>>>>,
    started: AtomicBool,
    stopping: Arc<AtomicBool>,
    #[cfg(not(target_arch = "wasm32"))]
    stop_notify: Arc<tokio::sync::Notify>,
    #[cfg(target_arch = "wasm32")]
    active_socket: std::rc::Rc<std::cell::RefCell<Option<web_sys::WebSocket>>>,
}

impl ConnectionManager {
    pub fn new(hub_url: impl Into<String>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            hub_url: hub_url.into(),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            state_listener: Arc::new(Mutex::new(None)),
            sender,
            receiver: Mutex::new(Some(receiver)),
            started: AtomicBool::new(false),
            stopping: Arc::new(AtomicBool::new(false)),
            #[cfg(not(target_arch = "wasm32"))]
            stop_notify: Arc::new(tokio::sync::Notify::new()),
            #[cfg(target_arch = "wasm32")]
            active_socket: std::rc::Rc::new(std::cell::RefCell::new(None)),
        }
    }

    pub fn hub_url(&self) -> &str {
        &self.hub_url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// A clone-able send handle gated on this manager's state.
    pub fn handle(&self) -> HubHandle {
        HubHandle {
            state: self.state.clone(),
            sender: self.sender.clone(),
        }
    }

    /// Register a handler for a named inbound push. Re-registering the same
    /// method replaces the previous handler, so listeners survive
    /// reconnects without double-invocation.
    pub fn on(&self, method: &'static str, handler: PushHandler) {
        if self.listeners.lock().insert(method, handler).is_some() {
            crate::log_debug!("replaced hub listener for {}", method);
        }
    }

    /// Observe state transitions. At most one observer; registering again
    /// replaces it.
    pub fn on_state(&self, handler: StateHandler) {
        *self.state_listener.lock() = Some(handler);
    }

    /// Send a client invoke; permitted only while `Connected` (see
    /// [`HubHandle::invoke`]).
    pub fn send(&self, invoke: ClientInvoke) -> Result<(), ConnectionError> {
        self.handle().invoke(invoke)
    }

    /// Start the connection: Disconnected → Connecting, then hand the
    /// socket lifecycle to the platform transport. Safe to call at most
    /// once per instance; restarting requires a fresh manager.
    pub fn start(&self) -> Result<(), ConnectionError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyStarted);
        }
        let Some(receiver) = self.receiver.lock().take() else {
            return Err(ConnectionError::AlreadyStarted);
        };
        self.set_state(ConnectionState::Connecting);
        self.spawn_transport(receiver);
        Ok(())
    }

    /// Stop from any state: mark the transport for teardown and settle on
    /// `Disconnected`. Idempotent; safe during teardown even if the link
    /// never came up.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        #[cfg(not(target_arch = "wasm32"))]
        self.stop_notify.notify_waiters();
        #[cfg(target_arch = "wasm32")]
        if let Some(socket) = self.active_socket.borrow_mut().take() {
            let _ = socket.close();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Apply a transport signal to the state machine. Driven by the
    /// transport layer; public so alternative transports (and tests) can
    /// mirror their state through the manager.
    pub fn handle_transport_signal(&self, signal: TransportSignal) {
        apply_signal(&self.state, &self.state_listener, signal);
    }

    /// Dispatch one inbound push to its registered listener. Driven by the
    /// transport layer.
    pub fn handle_push(&self, envelope: HubEnvelope<ServerPush>) {
        dispatch_push(&self.listeners, envelope);
    }

    fn set_state(&self, next: ConnectionState) {
        set_state(&self.state, &self.state_listener, next);
    }

    fn spawn_transport(&self, receiver: UnboundedReceiver<HubEnvelope<ClientInvoke>>) {
        let on_signal = {
            let state = self.state.clone();
            let observer = self.state_listener.clone();
            let stopping = self.stopping.clone();
            signal_sink(move |signal| {
                // A stopped manager ignores whatever the dying transport
                // still reports.
                if stopping.load(Ordering::SeqCst) {
                    return;
                }
                apply_signal(&state, &observer, signal);
            })
        };
        let on_push = {
            let listeners = self.listeners.clone();
            push_sink(move |envelope| dispatch_push(&listeners, envelope))
        };

        #[cfg(not(target_arch = "wasm32"))]
        transport::spawn(transport::TransportParams {
            url: self.hub_url.clone(),
            receiver,
            stopping: self.stopping.clone(),
            stop_notify: self.stop_notify.clone(),
            on_signal,
            on_push,
        });

        #[cfg(target_arch = "wasm32")]
        transport::spawn(transport::TransportParams {
            url: self.hub_url.clone(),
            receiver,
            stopping: self.stopping.clone(),
            socket_slot: self.active_socket.clone(),
            on_signal,
            on_push,
        });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(
    state: &Arc<Mutex<ConnectionState>>,
    observer: &Arc<Mutex<Option<StateHandler>>>,
    next: ConnectionState,
) {
    let previous = {
        let mut state = state.lock();
        let previous = *state;
        *state = next;
        previous
    };
    if previous == next {
        return;
    }
    crate::log_info!("hub connection {:?} -> {:?}", previous, next);
    if let Some(callback) = observer.lock().as_ref() {
        callback(next);
    }
}

fn apply_signal(
    state: &Arc<Mutex<ConnectionState>>,
    observer: &Arc<Mutex<Option<StateHandler>>>,
    signal: TransportSignal,
) {
    let next = state.lock().apply(signal);
    set_state(state, observer, next);
}

fn dispatch_push(
    listeners: &Arc<Mutex<HashMap<&'static str, PushHandler>>>,
    envelope: HubEnvelope<ServerPush>,
) {
    let method = envelope.payload.method();
    let listeners = listeners.lock();
    match listeners.get(method) {
        Some(handler) => handler(&envelope.payload),
        None => crate::log_debug!("no listener registered for hub push {}", method),
    }
}
