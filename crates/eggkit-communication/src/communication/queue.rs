//! Command queue with one-at-a-time dispatch and acknowledgment tracking
//!
//! Implements the EBB request/response discipline: every command is a
//! CR-terminated ASCII line, and the device answers with one or more
//! response lines. Callers may submit concurrently; the queue serializes
//! dispatch so at most one command is ever in flight, classifies
//! response lines per command mode, and enforces a per-command timeout.
//!
//! # Features
//! - FIFO submission order, strict settle-in-order guarantee
//! - Single active-command slot with a generation-tagged timeout timer
//! - Line-mode and expect-OK response classification
//! - Write-failure and disconnect rejection sweeps

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use eggkit_core::{Result, TransportError};

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(1200);

/// Response line that terminates a multiline expect-OK response.
const OK_SENTINEL: &str = "ok";

/// Substring (lowercased) marking a protocol-level rejection.
const UNKNOWN_COMMAND_SENTINEL: &str = "unknown cmd";

/// How response lines settle a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// The first response line settles the command with that line.
    Line,
    /// Lines accumulate until a case-insensitive `ok` sentinel; a line
    /// containing `unknown cmd` rejects the command.
    ExpectOk,
}

/// Successful settlement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// Line-mode result: the first response line.
    Line(String),
    /// Expect-OK result: every line before the OK sentinel.
    Lines(Vec<String>),
}

impl CommandReply {
    /// Unwrap into a single line (line-mode commands).
    pub fn into_line(self) -> String {
        match self {
            Self::Line(line) => line,
            Self::Lines(lines) => lines.into_iter().next().unwrap_or_default(),
        }
    }

    /// Unwrap into the accumulated lines (expect-OK commands).
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Self::Lines(lines) => lines,
            Self::Line(line) => vec![line],
        }
    }
}

/// Raw write seam between the queue and a transport.
///
/// Adapters install an implementation on connect and remove it on
/// disconnect; the queue writes command text through whichever one is
/// currently attached.
#[async_trait]
pub trait RawWriter: Send + Sync {
    /// Write already-normalized command text to the physical link.
    async fn write_raw(&self, text: &str) -> Result<()>;
}

struct PendingCommand {
    text: String,
    mode: ResponseMode,
    timeout: Duration,
    done: oneshot::Sender<Result<CommandReply>>,
}

struct ActiveCommand {
    generation: u64,
    mode: ResponseMode,
    lines: Vec<String>,
    done: oneshot::Sender<Result<CommandReply>>,
    timer: Option<JoinHandle<()>>,
}

impl ActiveCommand {
    /// Cancel the timer and settle the completion channel.
    fn settle(mut self, result: Result<CommandReply>) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let _ = self.done.send(result);
    }
}

/// What a response line means for the active command.
enum Disposition {
    Resolve,
    ResolveOk,
    RejectUnknown,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingCommand>,
    active: Option<ActiveCommand>,
    next_generation: u64,
}

/// FIFO command queue with a single active-command slot.
pub struct CommandQueue {
    state: Mutex<QueueState>,
    writer: RwLock<Option<Arc<dyn RawWriter>>>,
    // Handed to timer tasks so they can settle and redispatch without
    // keeping the queue alive.
    weak_self: Weak<CommandQueue>,
}

impl CommandQueue {
    /// Create a detached queue (no writer attached yet).
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(QueueState::default()),
            writer: RwLock::new(None),
            weak_self: weak.clone(),
        })
    }

    /// Install the raw writer for the current connection.
    pub fn attach_writer(&self, writer: Arc<dyn RawWriter>) {
        *self.writer.write() = Some(writer);
    }

    /// Remove the raw writer; subsequent submissions fail fast.
    pub fn detach_writer(&self) {
        *self.writer.write() = None;
    }

    /// Whether a writer is currently attached.
    pub fn has_writer(&self) -> bool {
        self.writer.read().is_some()
    }

    /// Number of commands waiting behind the active one.
    pub fn queued_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether a command is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Enqueue a command and wait for it to settle.
    ///
    /// The text is normalized to end with exactly one trailing carriage
    /// return before transmission.
    pub async fn submit(
        &self,
        text: &str,
        mode: ResponseMode,
        timeout: Option<Duration>,
    ) -> Result<CommandReply> {
        if !self.has_writer() {
            return Err(TransportError::NotConnected);
        }

        let (done, settled) = oneshot::channel();
        {
            let mut state = self.state.lock();
            state.pending.push_back(PendingCommand {
                text: normalize_command(text),
                mode,
                timeout: timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
                done,
            });
        }
        self.pump().await;

        match settled.await {
            Ok(result) => result,
            // The sender side only disappears when the queue itself is
            // dropped mid-flight.
            Err(_) => Err(TransportError::disconnected(
                "command dropped before settlement",
            )),
        }
    }

    /// Dispatch the next pending command if the active slot is free.
    ///
    /// No-op while a command is in flight or the queue is empty. A write
    /// failure rejects that command and moves on to the next.
    pub async fn pump(&self) {
        loop {
            let (generation, text) = {
                let mut state = self.state.lock();
                if state.active.is_some() {
                    return;
                }
                let Some(command) = state.pending.pop_front() else {
                    return;
                };
                let generation = state.next_generation;
                state.next_generation += 1;
                let timer = self.spawn_timer(generation, command.timeout);
                state.active = Some(ActiveCommand {
                    generation,
                    mode: command.mode,
                    lines: Vec::new(),
                    done: command.done,
                    timer: Some(timer),
                });
                (generation, command.text)
            };

            let writer = self.writer.read().clone();
            let written = match writer {
                Some(writer) => writer.write_raw(&text).await,
                None => Err(TransportError::NotConnected),
            };

            match written {
                Ok(()) => return,
                Err(error) => {
                    tracing::warn!(command = text.trim_end(), %error, "command write failed");
                    if let Some(command) = self.take_active_if(generation) {
                        command.settle(Err(error));
                    }
                    // Try the next queued command.
                }
            }
        }
    }

    /// Route a framed response line to the active command.
    ///
    /// Returns `true` when the line settled the command, in which case
    /// the caller must pump the queue. Lines arriving while no command
    /// is active are dropped here (they still reach line listeners).
    pub fn offer_line(&self, line: &str) -> bool {
        let mut state = self.state.lock();
        let Some(active) = state.active.as_mut() else {
            return false;
        };

        let disposition = match active.mode {
            ResponseMode::Line => Disposition::Resolve,
            ResponseMode::ExpectOk => {
                if line.eq_ignore_ascii_case(OK_SENTINEL) {
                    Disposition::ResolveOk
                } else if line.to_ascii_lowercase().contains(UNKNOWN_COMMAND_SENTINEL) {
                    Disposition::RejectUnknown
                } else {
                    active.lines.push(line.to_string());
                    return false;
                }
            }
        };

        let Some(mut command) = state.active.take() else {
            return false;
        };
        drop(state);

        match disposition {
            Disposition::Resolve => {
                command.settle(Ok(CommandReply::Line(line.to_string())));
            }
            Disposition::ResolveOk => {
                let lines = std::mem::take(&mut command.lines);
                command.settle(Ok(CommandReply::Lines(lines)));
            }
            Disposition::RejectUnknown => {
                let mut lines = std::mem::take(&mut command.lines);
                lines.push(line.to_string());
                command.settle(Err(TransportError::UnknownCommand {
                    response: lines.join("\n"),
                }));
            }
        }
        true
    }

    /// Reject the active command and every queued command.
    ///
    /// Used by the disconnect sweep; every settlement carries the same
    /// error.
    pub fn reject_all(&self, error: TransportError) {
        let (active, pending) = {
            let mut state = self.state.lock();
            (state.active.take(), std::mem::take(&mut state.pending))
        };

        if let Some(command) = active {
            command.settle(Err(error.clone()));
        }
        for command in pending {
            let _ = command.done.send(Err(error.clone()));
        }
    }

    fn spawn_timer(&self, generation: u64, timeout: Duration) -> JoinHandle<()> {
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(queue) = weak.upgrade() else {
                return;
            };
            if let Some(mut command) = queue.take_active_if(generation) {
                // This task is the timer; clearing the handle avoids
                // aborting ourselves before the redispatch below.
                command.timer = None;
                let timeout_ms = timeout.as_millis() as u64;
                tracing::debug!(timeout_ms, "command timed out");
                command.settle(Err(TransportError::ResponseTimeout { timeout_ms }));
                queue.pump().await;
            }
        })
    }

    /// Remove the active command if it still belongs to `generation`.
    ///
    /// The generation check ties each timer to its own command so a
    /// late-firing timer can never settle a successor.
    fn take_active_if(&self, generation: u64) -> Option<ActiveCommand> {
        let mut state = self.state.lock();
        match &state.active {
            Some(active) if active.generation == generation => state.active.take(),
            _ => None,
        }
    }
}

/// Ensure command text ends with exactly one carriage return.
fn normalize_command(text: &str) -> String {
    if text.ends_with('\r') {
        text.to_string()
    } else {
        format!("{text}\r")
    }
}
