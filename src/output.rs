//! Append-only result log shared by concurrent fan-out units.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::digest::sha256_hex;

/// Line-oriented append sink.
///
/// One lock per appended line: records from concurrently-running fan-out
/// units never interleave within a line, and every line is flushed before
/// the lock is released.
pub struct OutputSink {
    file: Mutex<File>,
}

impl OutputSink {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append `address \t size \t sha256_hex` for a successful publish.
    pub fn publish_record(&self, address: &str, payload: &[u8]) {
        self.append_line(&format!(
            "{address}\t{}\t{}",
            payload.len(),
            sha256_hex(payload)
        ));
    }

    /// Append `address \t sender \t size \t sha256_hex` for a delivered
    /// subscription message.
    pub fn subscribe_record(&self, address: &str, source_node_id: &str, payload: &[u8]) {
        self.append_line(&format!(
            "{address}\t{source_node_id}\t{}\t{}",
            payload.len(),
            sha256_hex(payload)
        ));
    }

    fn append_line(&self, line: &str) {
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{line}").and_then(|()| file.flush()) {
            tracing::warn!(error = %e, "output sink write failed");
        }
    }
}
