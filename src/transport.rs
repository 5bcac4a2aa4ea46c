//! Transport enum and internal backend trait.
//!
//! The public API is the [`Transport`] enum. Each backend lives in its own
//! module under `transport/` and implements the internal [`TransportBackend`]
//! trait. The envelope serialization on the stream backend is a private
//! framing detail; peers exchange [`Envelope`] values, never raw frames.

use tokio::net::TcpStream;

use crate::{Envelope, TransportError};

pub(crate) trait TransportBackend: Send + Sync + Clone + 'static {
    async fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError>;
    async fn recv_envelope(&self) -> Result<Envelope, TransportError>;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

#[derive(Clone, Debug)]
pub enum Transport {
    Mem(mem::MemTransport),
    Stream(stream::StreamTransport),
}

impl Transport {
    pub async fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        match self {
            Transport::Mem(t) => t.send_envelope(envelope).await,
            Transport::Stream(t) => t.send_envelope(envelope).await,
        }
    }

    pub async fn recv_envelope(&self) -> Result<Envelope, TransportError> {
        match self {
            Transport::Mem(t) => t.recv_envelope().await,
            Transport::Stream(t) => t.recv_envelope().await,
        }
    }

    pub fn close(&self) {
        match self {
            Transport::Mem(t) => t.close(),
            Transport::Stream(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Mem(t) => t.is_closed(),
            Transport::Stream(t) => t.is_closed(),
        }
    }

    /// Connected in-process pair, mainly for tests and embedding.
    pub fn mem_pair() -> (Self, Self) {
        let (a, b) = mem::MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
    {
        Transport::Stream(stream::StreamTransport::new(stream))
    }

    pub fn stream_pair() -> (Self, Self) {
        let (a, b) = stream::StreamTransport::pair();
        (Transport::Stream(a), Transport::Stream(b))
    }

    /// Open a TCP stream transport to `address` (`host:port`).
    pub async fn connect(address: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).await?;
        // Command frames are small; don't let Nagle batch them.
        stream.set_nodelay(true)?;
        Ok(Self::stream(stream))
    }
}

pub mod mem;
pub mod stream;
