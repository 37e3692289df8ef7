use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use anyhow::{Context, anyhow};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::HostApiError;
use crate::protocol::Envelope;

/// Receives every inbound message as raw JSON.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// The host side of the message port.
pub trait IpcHost: Send + Sync {
    /// Queues `message` for the host. Never waits for an answer.
    fn post_message(&self, message: &Envelope) -> anyhow::Result<()>;

    /// Installs the inbound handler, replacing any previous one.
    fn set_onmessage(&self, handler: MessageHandler);
}

pub type HostFactory = Box<dyn Fn() -> anyhow::Result<Arc<dyn IpcHost>> + Send + Sync>;

/// Where the process finds its host: a factory provided by the embedder and
/// the host it produced, created on first lookup and kept afterwards.
pub struct HostLocator {
    factory: OnceLock<HostFactory>,
    host: OnceLock<Arc<dyn IpcHost>>,
}

impl HostLocator {
    pub const fn new() -> Self {
        HostLocator {
            factory: OnceLock::new(),
            host: OnceLock::new(),
        }
    }

    /// Returns false if a factory was already provided.
    pub fn provide(&self, factory: HostFactory) -> bool {
        self.factory.set(factory).is_ok()
    }

    pub fn find(&self) -> Result<Arc<dyn IpcHost>, HostApiError> {
        if let Some(host) = self.host.get() {
            return Ok(host.clone());
        }
        let factory = self.factory.get().ok_or(HostApiError::MissingHost)?;
        let host = factory().map_err(HostApiError::HostUnavailable)?;
        Ok(self.host.get_or_init(|| host).clone())
    }
}

impl Default for HostLocator {
    fn default() -> Self {
        Self::new()
    }
}

static LOCATOR: HostLocator = HostLocator::new();

/// Registers the process-wide host factory. Returns false if one exists.
pub fn provide_host_factory<F>(factory: F) -> bool
where
    F: Fn() -> anyhow::Result<Arc<dyn IpcHost>> + Send + Sync + 'static,
{
    LOCATOR.provide(Box::new(factory))
}

/// The process-wide host; fails if no factory was provided.
pub fn find_host() -> Result<Arc<dyn IpcHost>, HostApiError> {
    LOCATOR.find()
}

#[derive(Default)]
struct HandlerSlot(RwLock<Option<MessageHandler>>);

impl HandlerSlot {
    fn set(&self, handler: MessageHandler) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn get(&self) -> Option<MessageHandler> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// In-process host: outbound envelopes land on a channel, inbound messages
/// are pushed with [`deliver`](Self::deliver).
pub struct ChannelHost {
    outbound: mpsc::UnboundedSender<Envelope>,
    handler: HandlerSlot,
}

impl ChannelHost {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let host = Arc::new(ChannelHost {
            outbound,
            handler: HandlerSlot::default(),
        });
        (host, rx)
    }

    /// Hands `message` to the installed handler. Returns false if none is set.
    pub fn deliver(&self, message: Value) -> bool {
        match self.handler.get() {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }
}

impl IpcHost for ChannelHost {
    fn post_message(&self, message: &Envelope) -> anyhow::Result<()> {
        self.outbound
            .send(message.clone())
            .map_err(|_| anyhow!("host channel closed"))
    }

    fn set_onmessage(&self, handler: MessageHandler) {
        self.handler.set(handler);
    }
}

/// Host reached over a WebSocket; each text frame carries one JSON envelope.
pub struct WebSocketHost {
    outbound: mpsc::UnboundedSender<String>,
    handler: Arc<HandlerSlot>,
}

impl WebSocketHost {
    pub async fn connect(url: &str, cancel: CancellationToken) -> anyhow::Result<Arc<Self>> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("failed to connect to host at {url}"))?;
        info!(url, "connected to host");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let handler = Arc::new(HandlerSlot::default());

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    msg = outbound_rx.recv() => {
                        let Some(json) = msg else { break };
                        trace!(raw = %json, "→ raw");
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            error!("host write error: {e}");
                            break;
                        }
                    }
                }
            }
            let _ = sink.close().await;
        });

        let reader_handler = handler.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = source.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let raw = text.as_str();
                                trace!(raw = %raw, "← raw");
                                match serde_json::from_str::<Value>(raw) {
                                    Ok(value) => match reader_handler.get() {
                                        Some(handle) => handle(value),
                                        None => warn!("message from host before a handler was set"),
                                    },
                                    Err(e) => error!(raw = %raw, "invalid message from host: {e}"),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(e)) => {
                                error!("host read error: {e}");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }
            info!("host connection closed");
        });

        Ok(Arc::new(WebSocketHost { outbound, handler }))
    }
}

impl IpcHost for WebSocketHost {
    fn post_message(&self, message: &Envelope) -> anyhow::Result<()> {
        let json = serde_json::to_string(message)?;
        debug!(bytes = json.len(), "queueing message for host");
        self.outbound
            .send(json)
            .map_err(|_| anyhow!("host connection closed"))
    }

    fn set_onmessage(&self, handler: MessageHandler) {
        self.handler.set(handler);
    }
}
