//! Multi-node fan-out of publish and subscribe operations.
//!
//! Each fan-out unit owns its session exclusively; the output sink is the
//! only resource shared across units and serializes itself per line. A
//! failing node is isolated: it never aborts sibling units, is never
//! retried, and is at most logged.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;

use crate::output::OutputSink;
use crate::session::{StreamSession, TraceCallback};
use crate::types::PubSubMessage;

/// Orchestrator-level data callback: (originating node address, message).
pub type FanoutDataCallback = Arc<dyn Fn(&str, &PubSubMessage) + Send + Sync>;

/// Fans one publish operation out across many independent sessions.
pub struct FanoutPublisher {
    addresses: Vec<String>,
    sink: Option<Arc<OutputSink>>,
}

impl FanoutPublisher {
    /// Duplicate addresses are permitted and treated as independent nodes.
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            sink: None,
        }
    }

    /// Log one line per successful publish through `sink`.
    pub fn set_output_sink(&mut self, sink: Arc<OutputSink>) {
        self.sink = Some(sink);
    }

    /// Publish `count` messages to every node concurrently.
    ///
    /// One task per address; each opens its own session, publishes, and
    /// shuts the session down. Returns only after every task has finished
    /// (join semantics) — a slow or unreachable node delays completion but
    /// never aborts its siblings.
    pub async fn publish_all(&self, topic: &str, payload: &[u8], count: u32, delay: Duration) {
        let tasks: Vec<_> = self
            .addresses
            .iter()
            .cloned()
            .map(|address| {
                let topic = topic.to_owned();
                let payload = payload.to_vec();
                let sink = self.sink.clone();
                tokio::spawn(publish_to_node(address, topic, payload, count, delay, sink))
            })
            .collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "publish task panicked");
            }
        }
    }
}

async fn publish_to_node(
    address: String,
    topic: String,
    payload: Vec<u8>,
    count: u32,
    delay: Duration,
    sink: Option<Arc<OutputSink>>,
) {
    let session = StreamSession::connect(address.clone()).await;
    for index in 1..=count {
        let data = build_payload(&payload, index, count);
        if session.publish(&topic, data.clone()).await {
            if let Some(sink) = &sink {
                sink.publish_record(&address, &data);
            }
        } else {
            tracing::debug!(address = address.as_str(), index, "publish failed");
        }
        if !delay.is_zero() && index < count {
            tokio::time::sleep(delay).await;
        }
    }
    session.shutdown().await;
}

/// Build the self-describing payload for one fan-out message.
///
/// Single-message runs keep the caller's payload behind a timestamp/size
/// prefix; multi-message runs synthesize an indexed payload with a random
/// hex suffix so every message is distinguishable downstream. Inspection
/// convenience only, not protocol-mandated.
fn build_payload(payload: &[u8], index: u32, count: u32) -> Bytes {
    let nanos = unix_nanos();
    if count == 1 {
        let mut data = format!("[{nanos} {}] ", payload.len()).into_bytes();
        data.extend_from_slice(payload);
        Bytes::from(data)
    } else {
        let suffix = hex::encode(rand::random::<[u8; 4]>());
        Bytes::from(format!("[{nanos} {}] {index} - {suffix} XXX", suffix.len()))
    }
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Fans one subscription out across many independent sessions and funnels
/// every delivery into a single tagged data callback.
pub struct FanoutSubscriber {
    addresses: Vec<String>,
    sessions: Vec<StreamSession>,
    data_callback: Arc<Mutex<Option<FanoutDataCallback>>>,
    trace_callback: Arc<Mutex<Option<TraceCallback>>>,
    sink: Option<Arc<OutputSink>>,
}

impl FanoutSubscriber {
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            sessions: Vec::new(),
            data_callback: Arc::new(Mutex::new(None)),
            trace_callback: Arc::new(Mutex::new(None)),
            sink: None,
        }
    }

    /// Log one line per delivered message through `sink`.
    pub fn set_output_sink(&mut self, sink: Arc<OutputSink>) {
        self.sink = Some(sink);
    }

    /// Register the callback receiving every inbound message tagged with its
    /// originating node address. Replaceable at any time.
    pub fn set_data_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &PubSubMessage) + Send + Sync + 'static,
    {
        *self.data_callback.lock() = Some(Arc::new(callback));
    }

    /// Register the callback receiving trace previews from every session.
    pub fn set_trace_callback<F>(&self, callback: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        *self.trace_callback.lock() = Some(Arc::new(callback));
    }

    /// Open one session per node and subscribe each to `topic`.
    ///
    /// Nodes that fail to subscribe are dropped silently from the active
    /// set; survivors deliver through the shared data callback until
    /// [`shutdown_all`](Self::shutdown_all) or drop.
    pub async fn subscribe_all(&mut self, topic: &str) {
        for address in self.addresses.clone() {
            let session = StreamSession::connect(address.clone()).await;
            if !session.subscribe(topic).await {
                tracing::warn!(
                    address = address.as_str(),
                    topic,
                    "subscribe failed; dropping node"
                );
                session.shutdown().await;
                continue;
            }

            let data_callback = self.data_callback.clone();
            let sink = self.sink.clone();
            let message_address = address.clone();
            session.set_message_callback(move |message| {
                let callback = data_callback.lock().clone();
                if let Some(callback) = callback {
                    callback(&message_address, &message);
                }
                if let Some(sink) = &sink {
                    sink.subscribe_record(
                        &message_address,
                        &message.source_node_id,
                        &message.payload,
                    );
                }
            });

            let trace_callback = self.trace_callback.clone();
            session.set_trace_callback(move |preview| {
                let callback = trace_callback.lock().clone();
                if let Some(callback) = callback {
                    callback(preview);
                }
            });

            self.sessions.push(session);
        }
        tracing::debug!(
            topic,
            active = self.sessions.len(),
            total = self.addresses.len(),
            "fan-out subscribe complete"
        );
    }

    /// Number of nodes that subscribed successfully.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Shut every owned session down, waiting for each receive loop to exit.
    ///
    /// Dropping the subscriber without calling this still closes every
    /// session's transport; this method only adds the join.
    pub async fn shutdown_all(&mut self) {
        for session in self.sessions.drain(..) {
            session.shutdown().await;
        }
    }
}
