//! WebSocket transport implementation.
//!
//! Connects to a `ws://` or `wss://` endpoint with `tokio-tungstenite` and
//! maps the socket onto the domain `Transport` contract:
//!
//! - text frames become `TransportEvent::Message`;
//! - binary frames are delivered as text when they are valid UTF-8 and
//!   dropped otherwise;
//! - a close frame stops sends at once; the closing handshake, end of
//!   stream or a read error then ends the connection with a single
//!   `TransportEvent::Closed`.
//!
//! Outbound frames are queued to a writer task so that `send()` never holds
//! the socket across an await from more than one caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::sync::lock_ignore_poison;
#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    Result,
    RpcError,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportEvent,
    TransportPtr,
};

const CHANNEL_CAPACITY: usize = 64;

struct WebSocketTransport {
    // ---
    base: TransportBase,
    open: Arc<AtomicBool>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    inbox: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, text: String) -> Result<()> {
        // ---
        if !self.is_open() {
            return Err(RpcError::Transport("connection not open".into()));
        }

        let tx = lock_ignore_poison(&self.outbound)
            .clone()
            .ok_or_else(|| RpcError::Transport("connection not open".into()))?;

        tx.send(text)
            .await
            .map_err(|_| RpcError::Transport("websocket writer stopped".into()))
    }

    async fn subscribe(&self) -> Result<SubscriptionHandle> {
        // ---
        let inbox = lock_ignore_poison(&self.inbox).take().ok_or_else(|| {
            RpcError::Transport("inbound stream already subscribed".into())
        })?;

        Ok(SubscriptionHandle { inbox })
    }

    /// Stop accepting sends; the writer task flushes what is queued and then
    /// sends a close frame. `Closed` is emitted by the reader once the peer
    /// acknowledges or the socket ends.
    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing websocket to {}", self.transport_id(), self.base.uri);
        self.open.store(false, Ordering::SeqCst);
        lock_ignore_poison(&self.outbound).take();
        Ok(())
    }
}

/// Open a WebSocket connection to `config.uri`.
///
/// # Errors
///
/// Returns [`RpcError::Transport`] if the handshake fails.
pub async fn create_websocket_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    let (stream, _response) = connect_async(config.uri.as_str())
        .await
        .map_err(|e| RpcError::Transport(format!("failed to connect to {}: {e}", config.uri)))?;

    log_info!("{}: connected to {}", config.node_id, config.uri);

    let (mut write, mut read) = stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let open = Arc::new(AtomicBool::new(true));

    let _ = event_tx.try_send(TransportEvent::Opened);

    let node_id = config.node_id.clone();
    tokio::spawn(async move {
        // ---
        while let Some(text) = out_rx.recv().await {
            if let Err(_err) = write.send(Message::Text(text.into())).await {
                log_error!("{node_id}: websocket send failed: {_err}");
                break;
            }
        }
        let _ = write.close().await;
        log_debug!("{node_id}: websocket writer stopped");
    });

    let node_id = config.node_id.clone();
    let reader_open = open.clone();
    tokio::spawn(async move {
        // ---
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        log_debug!("{node_id}: dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                // Keep reading so the close reply is flushed; the stream
                // ends once the handshake completes.
                Ok(Message::Close(_)) => {
                    reader_open.store(false, Ordering::SeqCst);
                    continue;
                }
                Ok(_) => continue,
                Err(_err) => {
                    log_warn!("{node_id}: websocket read failed: {_err}");
                    break;
                }
            };

            if event_tx.send(TransportEvent::Message(text)).await.is_err() {
                break;
            }
        }

        reader_open.store(false, Ordering::SeqCst);
        let _ = event_tx.send(TransportEvent::Closed).await;
        log_info!("{node_id}: websocket closed");
    });

    Ok(Arc::new(WebSocketTransport {
        base: TransportBase::from(&config),
        open,
        outbound: Mutex::new(Some(out_tx)),
        inbox: Mutex::new(Some(event_rx)),
    }))
}
