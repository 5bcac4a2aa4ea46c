//! meshsub-client: streaming and proxy clients for meshsub pub/sub nodes.
//!
//! This crate speaks the thin command/response envelope a meshsub routing
//! node exposes. It defines:
//! - Wire types ([`Command`], [`ResponseKind`], [`Envelope`], [`PubSubMessage`])
//! - Transports ([`Transport`] over TCP streams or in-process pairs)
//! - A single-node duplex session ([`StreamSession`]) with a background
//!   receive loop and graceful, idempotent shutdown
//! - Multi-node fan-out ([`FanoutPublisher`], [`FanoutSubscriber`]) with
//!   per-node failure isolation and serialized result logging ([`OutputSink`])
//! - The proxy variant ([`ProxyClient`]): REST control plane plus a
//!   streaming data plane
//! - Best-effort payload decoding ([`decode_message`]) and trace-event
//!   previews ([`TraceSummarizer`], [`HexPreview`])
//!
//! The node's routing, peer discovery, and gossip protocol are external
//! collaborators; nothing in this crate interprets them.

#![forbid(unsafe_op_in_unsafe_fn)]

mod codec;
mod digest;
mod error;
mod fanout;
mod nodelist;
mod output;
mod proxy;
mod session;
mod trace;
mod transport;
mod types;

pub use codec::*;
pub use digest::*;
pub use error::*;
pub use fanout::*;
pub use nodelist::*;
pub use output::*;
pub use proxy::*;
pub use session::*;
pub use trace::*;
pub use transport::*;
pub use types::*;
