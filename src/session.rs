//! StreamSession: one duplex command/response channel to a single node.
//!
//! # Key invariant
//!
//! Only the session's background receive loop calls `recv_envelope()` on its
//! transport. Writes (`subscribe`/`publish`) and `shutdown` may be issued
//! from any task concurrently with the loop; the loop is the single reader,
//! so inbound delivery order always matches arrival order.
//!
//! # Lifecycle
//!
//! Constructing -> Ready -> ShuttingDown -> Closed, with Constructing ->
//! Closed directly when the channel cannot be established. There is no
//! transition out of Closed. `shutdown()` is a rendezvous: it wakes the loop
//! and waits for it to exit before the transport is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::codec::decode_message;
use crate::error::TransportError;
use crate::trace::{HexPreview, TraceSummarizer};
use crate::transport::Transport;
use crate::types::{Command, Envelope, PubSubMessage, ResponseKind};

/// Messages buffered for `recv` when no callback is registered.
const RECV_QUEUE_CAPACITY: usize = 64;

/// Callback invoked once per decoded inbound message.
pub type MessageCallback = Arc<dyn Fn(PubSubMessage) + Send + Sync>;

/// Callback invoked with a human-readable trace preview.
pub type TraceCallback = Arc<dyn Fn(String) + Send + Sync>;

/// One open duplex channel to one node, with its background receive loop.
pub struct StreamSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    address: String,
    /// None when construction failed or after shutdown has released the
    /// channel; the session is then permanently closed.
    transport: Mutex<Option<Transport>>,
    ready: AtomicBool,
    closed: AtomicBool,
    stop: Notify,
    message_callback: Mutex<Option<MessageCallback>>,
    trace_callback: Mutex<Option<TraceCallback>>,
    trace_summarizers: Mutex<HashMap<u8, Arc<dyn TraceSummarizer>>>,
    recv_tx: mpsc::Sender<PubSubMessage>,
    recv_rx: AsyncMutex<mpsc::Receiver<PubSubMessage>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

fn default_summarizers() -> HashMap<u8, Arc<dyn TraceSummarizer>> {
    let mut map: HashMap<u8, Arc<dyn TraceSummarizer>> = HashMap::new();
    for kind in [ResponseKind::TraceRouter, ResponseKind::TraceGossip] {
        if let Some(label) = kind.trace_label() {
            map.insert(kind as u8, Arc::new(HexPreview::new(label)));
        }
    }
    map
}

impl StreamSession {
    /// Open a duplex channel to `address` (`host:port`).
    ///
    /// Construction never fails: if the channel cannot be established the
    /// session is returned already closed and [`is_ready`](Self::is_ready)
    /// is false. Callers check readiness instead of handling a partial
    /// object.
    pub async fn connect(address: impl Into<String>) -> Self {
        let address = address.into();
        match Transport::connect(&address).await {
            Ok(transport) => Self::start(address, transport),
            Err(e) => {
                tracing::warn!(address = address.as_str(), error = %e, "session connect failed");
                Self::dead(address)
            }
        }
    }

    /// Wrap an already-open transport (in-process pairs, embedding, tests).
    pub fn with_transport(address: impl Into<String>, transport: Transport) -> Self {
        Self::start(address.into(), transport)
    }

    fn start(address: String, transport: Transport) -> Self {
        let (recv_tx, recv_rx) = mpsc::channel(RECV_QUEUE_CAPACITY);
        let inner = Arc::new(SessionInner {
            address,
            transport: Mutex::new(Some(transport)),
            ready: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            stop: Notify::new(),
            message_callback: Mutex::new(None),
            trace_callback: Mutex::new(None),
            trace_summarizers: Mutex::new(default_summarizers()),
            recv_tx,
            recv_rx: AsyncMutex::new(recv_rx),
            recv_task: Mutex::new(None),
        });
        let task = tokio::spawn(receive_loop(inner.clone()));
        *inner.recv_task.lock() = Some(task);
        Self { inner }
    }

    fn dead(address: String) -> Self {
        let (recv_tx, recv_rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(SessionInner {
                address,
                transport: Mutex::new(None),
                ready: AtomicBool::new(false),
                closed: AtomicBool::new(true),
                stop: Notify::new(),
                message_callback: Mutex::new(None),
                trace_callback: Mutex::new(None),
                trace_summarizers: Mutex::new(default_summarizers()),
                recv_tx,
                recv_rx: AsyncMutex::new(recv_rx),
                recv_task: Mutex::new(None),
            }),
        }
    }

    /// True while the session can issue writes.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Write a Subscribe command envelope. Fire-and-forget: returns the
    /// success of the write, never waits for an acknowledgement.
    pub async fn subscribe(&self, topic: &str) -> bool {
        self.write_command(Command::SubscribeToTopic, topic, Bytes::new())
            .await
    }

    /// Write a Publish command envelope carrying `payload`. Same write-only
    /// semantics as [`subscribe`](Self::subscribe).
    pub async fn publish(&self, topic: &str, payload: Bytes) -> bool {
        self.write_command(Command::PublishData, topic, payload).await
    }

    async fn write_command(&self, command: Command, topic: &str, data: Bytes) -> bool {
        if !self.is_ready() {
            return false;
        }
        let transport = self.inner.transport.lock().clone();
        let Some(transport) = transport else {
            return false;
        };
        match transport
            .send_envelope(Envelope::command(command, topic, data))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    address = self.inner.address.as_str(),
                    ?command,
                    topic,
                    error = %e,
                    "write failed"
                );
                false
            }
        }
    }

    /// Wait up to `timeout` for the next inbound message.
    ///
    /// Only Message-kind envelopes surface here; trace envelopes go to the
    /// trace callback. Returns `None` on timeout or after the channel has
    /// closed and drained. While a message callback is registered,
    /// deliveries go there instead and this path stays empty.
    pub async fn recv(&self, timeout: Duration) -> Option<PubSubMessage> {
        let mut rx = self.inner.recv_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(message)) => Some(message),
            Ok(None) | Err(_) => None,
        }
    }

    /// Register the callback invoked once per decoded inbound message.
    ///
    /// May be replaced at any time; the most recently set callback applies
    /// to all subsequent deliveries.
    pub fn set_message_callback<F>(&self, callback: F)
    where
        F: Fn(PubSubMessage) + Send + Sync + 'static,
    {
        *self.inner.message_callback.lock() = Some(Arc::new(callback));
    }

    /// Register the callback receiving trace-event preview strings.
    pub fn set_trace_callback<F>(&self, callback: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        *self.inner.trace_callback.lock() = Some(Arc::new(callback));
    }

    /// Replace the summarizer used for one trace kind. Defaults to a
    /// labeled hex preview.
    pub fn set_trace_summarizer(&self, kind: ResponseKind, summarizer: Arc<dyn TraceSummarizer>) {
        self.inner
            .trace_summarizers
            .lock()
            .insert(kind as u8, summarizer);
    }

    /// Close the session.
    ///
    /// Idempotent and safe to call from any task, concurrently with an
    /// active receive loop. The first caller marks the session closed,
    /// wakes the loop, waits for it to exit, and only then releases the
    /// transport; later callers return immediately. This ordering
    /// guarantees the loop never touches a released channel, and the
    /// release makes the peer observe closure without waiting for the
    /// session value itself to drop.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.ready.store(false, Ordering::Release);
        self.inner.stop.notify_one();
        if let Some(transport) = self.inner.transport.lock().as_ref() {
            transport.close();
        }
        let task = self.inner.recv_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        // The loop has exited and dropped its handle; dropping ours closes
        // the underlying stream.
        drop(self.inner.transport.lock().take());
        tracing::debug!(address = self.inner.address.as_str(), "session closed");
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // Drop cannot await the loop, but it converges on the same closed
        // flag as shutdown(): signal the loop and close the transport so the
        // spawned task observes closure and exits on its own. The task holds
        // its own Arc of the shared state, so nothing it touches is freed
        // underneath it.
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.ready.store(false, Ordering::Release);
            self.inner.stop.notify_one();
            if let Some(transport) = self.inner.transport.lock().take() {
                transport.close();
            }
        }
    }
}

async fn receive_loop(inner: Arc<SessionInner>) {
    let transport = inner.transport.lock().clone();
    let Some(transport) = transport else {
        return;
    };
    tracing::debug!(address = inner.address.as_str(), "receive loop started");

    loop {
        let envelope = tokio::select! {
            _ = inner.stop.notified() => break,
            result = transport.recv_envelope() => match result {
                Ok(envelope) => envelope,
                Err(TransportError::Closed) => {
                    tracing::debug!(address = inner.address.as_str(), "stream closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(address = inner.address.as_str(), error = %e, "receive failed");
                    break;
                }
            },
        };

        match envelope.kind() {
            ResponseKind::Message => {
                let message = decode_message(&envelope.data);
                let callback = inner.message_callback.lock().clone();
                if let Some(callback) = callback {
                    callback(message);
                } else if inner.recv_tx.try_send(message).is_err() {
                    tracing::debug!(
                        address = inner.address.as_str(),
                        "recv queue full; dropping message"
                    );
                }
            }
            kind @ (ResponseKind::TraceRouter | ResponseKind::TraceGossip) => {
                let callback = inner.trace_callback.lock().clone();
                if let Some(callback) = callback {
                    let summarizer = inner.trace_summarizers.lock().get(&(kind as u8)).cloned();
                    if let Some(summarizer) = summarizer {
                        callback(summarizer.summarize(&envelope.data));
                    }
                }
            }
            ResponseKind::Unspecified => {
                tracing::trace!(
                    address = inner.address.as_str(),
                    tag = envelope.tag,
                    "ignoring envelope of unknown kind"
                );
            }
        }
    }

    inner.ready.store(false, Ordering::Release);
    tracing::debug!(address = inner.address.as_str(), "receive loop exited");
}
