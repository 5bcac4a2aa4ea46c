//! Trace-event summarization.
//!
//! The node emits trace envelopes about protocol-internal activity. Their
//! schema is not decoded here; sessions only forward a short preview string
//! through a registered trace callback. [`TraceSummarizer`] is the extension
//! point: a real trace decoder can replace [`HexPreview`] per kind without
//! touching the session.

use crate::digest::head_hex;

/// Number of leading bytes shown in a hex preview.
pub const TRACE_PREVIEW_BYTES: usize = 64;

/// Capability interface for rendering a trace envelope as a string.
pub trait TraceSummarizer: Send + Sync {
    fn summarize(&self, raw: &[u8]) -> String;
}

/// Pass-through summarizer: a labeled hex preview of the leading bytes.
#[derive(Debug, Clone, Copy)]
pub struct HexPreview {
    label: &'static str,
}

impl HexPreview {
    pub const fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl TraceSummarizer for HexPreview {
    fn summarize(&self, raw: &[u8]) -> String {
        format!(
            "[{} Trace] {}...",
            self.label,
            head_hex(raw, TRACE_PREVIEW_BYTES)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_labeled_hex() {
        let preview = HexPreview::new("Gossip");
        assert_eq!(preview.summarize(&[0x01, 0x02, 0x03]), "[Gossip Trace] 010203...");
    }

    #[test]
    fn preview_caps_at_sixty_four_bytes() {
        let preview = HexPreview::new("Router");
        let raw = vec![0xaa; 100];
        let out = preview.summarize(&raw);
        assert_eq!(out, format!("[Router Trace] {}...", "aa".repeat(64)));
    }
}
