//! Protocol link: the framer/queue pair behind every transport
//!
//! Each adapter owns one [`ProtocolLink`]. Receive paths feed raw chunks
//! in; the link frames them into protocol lines, fans each line out to
//! registered listeners, and routes it to the active command's
//! classifier. The adapters differ only in how bytes get here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use eggkit_core::{Result, TransportError};

use super::framing::{LineFramer, Utf8StreamDecoder};
use super::queue::{CommandQueue, CommandReply, RawWriter, ResponseMode};

/// Observer for every protocol line a connection produces, independent
/// of command classification.
pub trait LineListener: Send + Sync {
    /// Called once per framed, trimmed, non-empty line.
    fn on_line(&self, line: &str);
}

/// Opaque handle for unregistering a [`LineListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineListenerHandle(pub(crate) String);

/// Framer + queue + listener registry for one adapter.
pub struct ProtocolLink {
    framer: Mutex<LineFramer>,
    decoder: Mutex<Utf8StreamDecoder>,
    queue: Arc<CommandQueue>,
    listeners: RwLock<HashMap<String, Arc<dyn LineListener>>>,
}

impl ProtocolLink {
    /// Create a detached link.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            framer: Mutex::new(LineFramer::new()),
            decoder: Mutex::new(Utf8StreamDecoder::new()),
            queue: CommandQueue::new(),
            listeners: RwLock::new(HashMap::new()),
        })
    }

    /// Install the raw writer for the current connection.
    pub fn attach_writer(&self, writer: Arc<dyn RawWriter>) {
        self.queue.attach_writer(writer);
    }

    /// Whether a writer is currently attached.
    pub fn is_attached(&self) -> bool {
        self.queue.has_writer()
    }

    /// Feed a decoded text chunk from the transport receive path.
    pub async fn ingest_text(&self, chunk: &str) {
        let lines = self.framer.lock().consume(chunk);
        for line in lines {
            tracing::trace!(%line, "line received");
            let listeners: Vec<_> = self.listeners.read().values().cloned().collect();
            for listener in listeners {
                listener.on_line(&line);
            }
            if self.queue.offer_line(&line) {
                self.queue.pump().await;
            }
        }
    }

    /// Feed a raw byte chunk from a byte-oriented transport.
    pub async fn ingest_bytes(&self, chunk: &[u8]) {
        let text = self.decoder.lock().decode(chunk);
        if !text.is_empty() {
            self.ingest_text(&text).await;
        }
    }

    /// Enqueue a line-mode command; resolves with the first response
    /// line.
    pub async fn send_command(&self, text: &str) -> Result<String> {
        self.queue
            .submit(text, ResponseMode::Line, None)
            .await
            .map(CommandReply::into_line)
    }

    /// Enqueue an expect-OK command; resolves with every line before
    /// the OK sentinel.
    pub async fn send_command_expect_ok(
        &self,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        self.queue
            .submit(text, ResponseMode::ExpectOk, timeout)
            .await
            .map(CommandReply::into_lines)
    }

    /// Register a line listener, returning its handle.
    pub fn register_line_listener(&self, listener: Arc<dyn LineListener>) -> LineListenerHandle {
        let id = Uuid::new_v4().to_string();
        self.listeners.write().insert(id.clone(), listener);
        LineListenerHandle(id)
    }

    /// Unregister a previously registered line listener.
    pub fn unregister_line_listener(&self, handle: &LineListenerHandle) {
        let _ = self.listeners.write().remove(&handle.0);
    }

    /// Number of registered line listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of commands waiting behind the active one.
    pub fn queued_len(&self) -> usize {
        self.queue.queued_len()
    }

    /// Whether a command is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    /// Disconnect sweep: drop the writer, clear framing state, and
    /// reject every owned command with `error`.
    ///
    /// Listeners survive teardown; they belong to the adapter, not the
    /// connection.
    pub fn teardown(&self, error: TransportError) {
        self.queue.detach_writer();
        self.framer.lock().clear();
        self.decoder.lock().clear();
        self.queue.reject_all(error);
    }
}
