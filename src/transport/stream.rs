use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use super::TransportBackend;
use crate::{Envelope, TransportError};

/// Bytes of the envelope header inside the length-prefixed frame:
/// tag (1) + topic length (2).
const HEADER_SIZE: usize = 3;

/// Upper bound on a single frame; anything larger is a protocol violation.
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Envelope framing over any duplex byte stream.
///
/// Wire layout per frame, all integers little-endian:
/// `u32 frame_len | u8 tag | u16 topic_len | topic bytes | payload bytes`
/// where `frame_len` counts everything after the length prefix.
///
/// Reads and writes are independently serialized, so one task may block in
/// `recv_envelope` while others write.
///
/// Reads survive cancellation: a caller that drops its `recv_envelope`
/// future (a timeout, typically) leaves any partially-buffered frame in
/// place, and the next call resumes from those bytes instead of
/// desynchronizing the stream.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<StreamInner>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

struct StreamInner {
    reader: AsyncMutex<FrameReader>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send + Sync>>,
    closed: AtomicBool,
}

/// Read half plus the bytes of any frame still in flight.
struct FrameReader {
    stream: Box<dyn AsyncRead + Unpin + Send + Sync>,
    buf: BytesMut,
}

impl StreamTransport {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            inner: Arc::new(StreamInner {
                reader: AsyncMutex::new(FrameReader {
                    stream: Box::new(reader),
                    buf: BytesMut::new(),
                }),
                writer: AsyncMutex::new(Box::new(writer)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(65536);
        (Self::new(a), Self::new(b))
    }

    fn is_closed_inner(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl TransportBackend for StreamTransport {
    async fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.is_closed_inner() {
            return Err(TransportError::Closed);
        }

        let topic = envelope.topic.as_bytes();
        if topic.len() > u16::MAX as usize {
            return Err(TransportError::Malformed(format!(
                "topic too long: {} bytes",
                topic.len()
            )));
        }
        let frame_len = HEADER_SIZE + topic.len() + envelope.data.len();
        if frame_len > MAX_FRAME_SIZE {
            return Err(TransportError::Malformed(format!(
                "frame too large: {frame_len} bytes"
            )));
        }

        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&(frame_len as u32).to_le_bytes()).await?;
        writer.write_all(&[envelope.tag]).await?;
        writer
            .write_all(&(topic.len() as u16).to_le_bytes())
            .await?;
        writer.write_all(topic).await?;
        if !envelope.data.is_empty() {
            writer.write_all(&envelope.data).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    async fn recv_envelope(&self) -> Result<Envelope, TransportError> {
        if self.is_closed_inner() {
            return Err(TransportError::Closed);
        }

        let mut reader = self.inner.reader.lock().await;
        let reader = &mut *reader;
        loop {
            if let Some(envelope) = try_parse_frame(&mut reader.buf)? {
                return Ok(envelope);
            }
            // read_buf consumes nothing when its future is dropped, so a
            // timed-out caller leaves the partial frame buffered for the
            // next call.
            let n = reader.stream.read_buf(&mut reader.buf).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.is_closed_inner()
    }
}

/// Extract one complete frame from the front of `buf`, if present.
fn try_parse_frame(buf: &mut BytesMut) -> Result<Option<Envelope>, TransportError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let frame_len = u32::from_le_bytes(buf[..4].try_into().expect("4 bytes")) as usize;
    if frame_len < HEADER_SIZE {
        return Err(TransportError::Malformed(format!(
            "frame too small: {frame_len} < {HEADER_SIZE}"
        )));
    }
    if frame_len > MAX_FRAME_SIZE {
        return Err(TransportError::Malformed(format!(
            "frame too large: {frame_len} bytes"
        )));
    }
    if buf.len() < 4 + frame_len {
        return Ok(None);
    }

    buf.advance(4);
    let mut frame = buf.split_to(frame_len);
    let tag = frame.get_u8();
    let topic_len = frame.get_u16_le() as usize;
    if HEADER_SIZE + topic_len > frame_len {
        return Err(TransportError::Malformed(format!(
            "topic length {topic_len} exceeds frame length {frame_len}"
        )));
    }
    let topic_bytes = frame.split_to(topic_len);
    let topic = std::str::from_utf8(&topic_bytes)
        .map_err(|_| TransportError::Malformed("topic is not valid UTF-8".into()))?
        .to_owned();

    Ok(Some(Envelope {
        tag,
        topic,
        data: frame.freeze(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::{Command, ResponseKind, Transport};

    #[tokio::test]
    async fn envelope_survives_framing() {
        let (a, b) = Transport::stream_pair();

        let out = Envelope::command(
            Command::PublishData,
            "news",
            Bytes::from_static(b"payload bytes"),
        );
        a.send_envelope(out).await.expect("send");

        let got = b.recv_envelope().await.expect("recv");
        assert_eq!(got.tag, Command::PublishData as u8);
        assert_eq!(got.topic, "news");
        assert_eq!(&got.data[..], b"payload bytes");
    }

    #[tokio::test]
    async fn empty_topic_and_payload() {
        let (a, b) = Transport::stream_pair();
        a.send_envelope(Envelope::response(ResponseKind::Message, "", Bytes::new()))
            .await
            .expect("send");
        let got = b.recv_envelope().await.expect("recv");
        assert_eq!(got.kind(), ResponseKind::Message);
        assert!(got.topic.is_empty());
        assert!(got.data.is_empty());
    }

    #[tokio::test]
    async fn closed_transport_refuses_io() {
        let (a, _b) = Transport::stream_pair();
        a.close();
        assert!(a.is_closed());
        let err = a
            .send_envelope(Envelope::command(Command::PublishData, "t", Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn peer_drop_reads_as_closed() {
        let (a, b) = Transport::stream_pair();
        drop(a);
        let err = b.recv_envelope().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn timed_out_read_resumes_mid_frame() {
        let (a, mut raw) = tokio::io::duplex(65536);
        let transport = Transport::stream(a);

        // Frame for Envelope::response(Message, "news", b"hello").
        let mut frame = Vec::new();
        frame.extend_from_slice(&((HEADER_SIZE + 4 + 5) as u32).to_le_bytes());
        frame.push(ResponseKind::Message as u8);
        frame.extend_from_slice(&4u16.to_le_bytes());
        frame.extend_from_slice(b"news");
        frame.extend_from_slice(b"hello");

        // Only the prefix and part of the header arrive before the caller
        // gives up. Those bytes must stay buffered, not vanish with the
        // dropped future.
        raw.write_all(&frame[..6]).await.expect("partial write");
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            transport.recv_envelope(),
        )
        .await;
        assert!(timed_out.is_err());

        raw.write_all(&frame[6..]).await.expect("rest of frame");
        let got = transport.recv_envelope().await.expect("recv resumes");
        assert_eq!(got.kind(), ResponseKind::Message);
        assert_eq!(got.topic, "news");
        assert_eq!(&got.data[..], b"hello");
    }
}
