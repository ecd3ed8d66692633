//! Write-once, read-many capture of the child's stdout.
//!
//! [`OutputWriter`] accumulates chunks and publishes a frozen [`Bytes`]
//! snapshot exactly once, when [`OutputWriter::complete`] consumes it.
//! [`OutputReader`] handles only ever see that snapshot; partial content is
//! never observable.

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;

/// The writer went away without completing the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("output capture was abandoned before completion")]
pub struct CaptureAbandoned;

/// Create a connected writer/reader pair.
pub fn output_buffer() -> (OutputWriter, OutputReader) {
    let (tx, rx) = watch::channel(None);
    (
        OutputWriter {
            data: BytesMut::new(),
            tx,
        },
        OutputReader { rx },
    )
}

/// Single writer side. Not `Clone`.
#[derive(Debug)]
pub struct OutputWriter {
    data: BytesMut,
    tx: watch::Sender<Option<Bytes>>,
}

impl OutputWriter {
    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// Bytes captured so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Freeze the capture and release every waiting reader.
    pub fn complete(self) -> Bytes {
        let snapshot = self.data.freeze();
        self.tx.send_replace(Some(snapshot.clone()));
        snapshot
    }
}

/// Cloneable read side.
#[derive(Debug, Clone)]
pub struct OutputReader {
    rx: watch::Receiver<Option<Bytes>>,
}

impl OutputReader {
    /// Wait until the capture is complete and return the full content.
    pub async fn wait(&self) -> Result<Bytes, CaptureAbandoned> {
        let mut rx = self.rx.clone();
        let snapshot = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CaptureAbandoned)?;
        snapshot.as_ref().cloned().ok_or(CaptureAbandoned)
    }
}
