//! Transport error types.

use core::fmt;

/// Transport-level errors.
///
/// These never escape the public session/orchestrator surface: every public
/// operation collapses them to `bool`/`Option` at the component boundary.
#[derive(Debug)]
pub enum TransportError {
    /// The channel was closed, locally or by the peer.
    Closed,
    Io(std::io::Error),
    /// A frame violated the framing contract (oversized, bad topic bytes).
    Malformed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Malformed(msg) => write!(f, "malformed frame: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
