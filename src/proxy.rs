//! ProxyClient: REST control plane plus a streaming data plane.
//!
//! The proxy variant reaches a node through two transports: subscription and
//! publish registration go over HTTP POST, while message traffic arrives on
//! a separate duplex stream correlated to the REST identity by a client id
//! sent as the stream's first frame.

use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use crate::transport::Transport;
use crate::types::{Command, Envelope};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ProxyClient {
    rest_base: String,
    stream_address: String,
    http: reqwest::Client,
    stream: AsyncMutex<Option<Transport>>,
}

impl ProxyClient {
    /// `rest_base` is the control-plane URL prefix (e.g.
    /// `http://10.0.0.1:8080`); `stream_address` is the data-plane
    /// `host:port`.
    pub fn new(rest_base: impl Into<String>, stream_address: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("http client should build");
        Self {
            rest_base: rest_base.into().trim_end_matches('/').to_owned(),
            stream_address: stream_address.into(),
            http,
            stream: AsyncMutex::new(None),
        }
    }

    /// Register a subscription on the control plane. True iff the node
    /// answered 2xx; transport errors and rejections both collapse to false.
    pub async fn subscribe(&self, client_id: &str, topic: &str, threshold: f64) -> bool {
        self.post_json(
            "/api/v1/subscribe",
            &json!({ "client_id": client_id, "topic": topic, "threshold": threshold }),
        )
        .await
    }

    /// Publish a text message through the control plane. Same success
    /// contract as [`subscribe`](Self::subscribe).
    pub async fn publish(&self, client_id: &str, topic: &str, message: &str) -> bool {
        self.post_json(
            "/api/v1/publish",
            &json!({ "client_id": client_id, "topic": topic, "message": message }),
        )
        .await
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> bool {
        let url = format!("{}{path}", self.rest_base);
        match self.http.post(&url).json(body).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    tracing::debug!(
                        url = url.as_str(),
                        status = %response.status(),
                        "control-plane call rejected"
                    );
                }
                ok
            }
            Err(e) => {
                tracing::debug!(url = url.as_str(), error = %e, "control-plane call failed");
                false
            }
        }
    }

    /// Open the data-plane stream and announce `client_id` as its first
    /// frame so the remote side can correlate the stream with the REST
    /// registration. Replaces any previously connected stream.
    pub async fn connect_stream(&self, client_id: &str) -> bool {
        let transport = match Transport::connect(&self.stream_address).await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(
                    address = self.stream_address.as_str(),
                    error = %e,
                    "data-plane connect failed"
                );
                return false;
            }
        };

        let hello = Envelope::command(
            Command::Unspecified,
            "",
            Bytes::copy_from_slice(client_id.as_bytes()),
        );
        if let Err(e) = transport.send_envelope(hello).await {
            tracing::warn!(
                address = self.stream_address.as_str(),
                error = %e,
                "data-plane handshake failed"
            );
            return false;
        }

        *self.stream.lock().await = Some(transport);
        true
    }

    /// One blocking read from the data plane: the next `(topic, text)` pair.
    ///
    /// Payloads are plain text by contract in proxy mode, so no decoding
    /// heuristic is applied. `None` on timeout, closure, or when no stream
    /// is connected.
    pub async fn receive_message(&self, timeout: Duration) -> Option<(String, String)> {
        let stream = self.stream.lock().await.clone()?;
        match tokio::time::timeout(timeout, stream.recv_envelope()).await {
            Ok(Ok(envelope)) => Some((
                envelope.topic,
                String::from_utf8_lossy(&envelope.data).into_owned(),
            )),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "data-plane read failed");
                None
            }
            Err(_) => None,
        }
    }

    /// Random REST/stream correlation id: `client_` + hex of 4 random bytes.
    /// 32 bits of entropy; collisions are accepted as negligible.
    pub fn generate_client_id() -> String {
        format!("client_{}", hex::encode(rand::random::<[u8; 4]>()))
    }
}

impl Drop for ProxyClient {
    fn drop(&mut self) {
        if let Ok(mut stream) = self.stream.try_lock() {
            if let Some(transport) = stream.take() {
                transport.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_shape() {
        let id = ProxyClient::generate_client_id();
        let hex_part = id.strip_prefix("client_").expect("prefix");
        assert_eq!(hex_part.len(), 8);
        assert!(hex_part.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn client_ids_vary() {
        let a = ProxyClient::generate_client_id();
        let b = ProxyClient::generate_client_id();
        // 32 bits of entropy; two draws colliding would be remarkable.
        assert_ne!(a, b);
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let client = ProxyClient::new("http://10.0.0.1:8080/", "10.0.0.1:9000");
        assert_eq!(client.rest_base, "http://10.0.0.1:8080");
    }
}
