//! Native hub transport using tokio-tungstenite.
//!
//! Owns the socket lifecycle and the reconnection policy; the manager only
//! sees [`TransportSignal`]s and decoded pushes. An initial connect failure
//! is terminal (mirroring a hub start() that rejects); retries only cover
//! drops of an established link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crowdplay_shared::{ClientInvoke, HubEnvelope, ServerPush};
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};

use super::{PushSink, ReconnectConfig, SignalSink, TransportSignal};

type SharedReceiver = Arc<tokio::sync::Mutex<UnboundedReceiver<HubEnvelope<ClientInvoke>>>>;

pub(super) struct TransportParams {
    pub url: String,
    pub receiver: UnboundedReceiver<HubEnvelope<ClientInvoke>>,
    pub stopping: Arc<AtomicBool>,
    pub stop_notify: Arc<tokio::sync::Notify>,
    pub on_signal: SignalSink,
    pub on_push: PushSink,
}

pub(super) fn spawn(params: TransportParams) {
    tokio::spawn(run(params));
}

async fn run(params: TransportParams) {
    let TransportParams {
        url,
        receiver,
        stopping,
        stop_notify,
        on_signal,
        on_push,
    } = params;
    let config = ReconnectConfig::default();

    // The outbound receiver is shared across sessions so queued invokes
    // survive a reconnect.
    let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

    match connect_async(url.as_str()).await {
        Ok((stream, _response)) => {
            on_signal(TransportSignal::Up);
            crate::log_info!("hub connected: {}", url);
            run_session(stream, &receiver, &stop_notify, &on_push).await;
        }
        Err(err) => {
            crate::log_error!("hub connect failed for {}: {}", url, err);
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
            tokio::select! {
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(delay as u64)) => {}
                _ = stop_notify.notified() => {}
            }
            if stopping.load(Ordering::SeqCst) {
                break 'reconnect;
            }
            match connect_async(url.as_str()).await {
                Ok((stream, _response)) => {
                    on_signal(TransportSignal::Up);
                    crate::log_info!("hub reconnected: {}", url);
                    run_session(stream, &receiver, &stop_notify, &on_push).await;
                    continue 'reconnect;
                }
                Err(err) => {
                    crate::log_warn!("hub reconnect failed: {}", err);
                    attempt += 1;
                }
            }
        }
    }
    crate::log_info!("hub transport for {} released", url);
}

/// Pump one established socket until it closes or the manager stops.
async fn run_session<S>(
    stream: WebSocketStream<S>,
    receiver: &SharedReceiver,
    stop_notify: &Arc<tokio::sync::Notify>,
    on_push: &PushSink,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = stream.split();
    let (close_tx, mut close_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    // Read task: decode pushes, stop on close or error.
    let on_push = on_push.clone();
    let close_tx_for_read = close_tx.clone();
    tokio::spawn(async move {
        while let Some(result) = read.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<HubEnvelope<ServerPush>>(text.as_str()) {
                        Ok(envelope) => on_push(envelope),
                        Err(err) => crate::log_error!("undecodable hub push: {}", err),
                    }
                }
                Ok(Message::Close(_)) => {
                    crate::log_info!("hub sent close frame");
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled by tungstenite.
                }
                Ok(_) => {}
                Err(err) => {
                    crate::log_error!("hub read error: {}", err);
                    break;
                }
            }
        }
        let _ = close_tx_for_read.send(());
    });

    // Write task: drain queued invokes onto the socket; a stop request
    // closes the link gracefully.
    let receiver_for_write = receiver.clone();
    let writer_stop = stop_notify.clone();
    tokio::spawn(async move {
        loop {
            let envelope = {
                let mut rx = receiver_for_write.lock().await;
                tokio::select! {
                    envelope = rx.next() => envelope,
                    _ = writer_stop.notified() => None,
                }
            };
            let Some(envelope) = envelope else {
                break;
            };
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    crate::log_debug!("hub invoke {}: {}", envelope.payload.method(), json);
                    if let Err(err) = write.send(Message::text(json)).await {
                        crate::log_error!("hub send failed: {}", err);
                        break;
                    }
                }
                Err(err) => {
                    crate::log_error!("hub invoke serialize failed: {}", err);
                }
            }
        }
        let _ = write.send(Message::Close(None)).await;
        let _ = close_tx.send(());
    });

    tokio::select! {
        _ = close_rx.recv() => {}
        _ = stop_notify.notified() => {}
    }
    crate::log_info!("hub session ended");
}
