//! Simulated bus transport for tests and offline development.
//!
//! [`MockTransport`] records every write and read and answers reads from a
//! per-address queue of scripted frames. A responder closure can be installed
//! to simulate a stateful probe: it sees every written command and queues the
//! frames the probe would answer with.
//!
//! Reading from an address whose queue is empty yields a "no data" frame
//! (status 255), like a probe that was never asked anything.
//!
//! # Example
//!
//! ```rust,ignore
//! use ezo_core::mock::{MockReply, MockTransport};
//!
//! let mock = Arc::new(MockTransport::new());
//! mock.push_reply(99, MockReply::Pending);
//! mock.push_reply(99, MockReply::success("7.00"));
//! ```

use crate::protocol::{ReplyFrame, FRAME_LEN};
use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// A scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Status `1` with a payload.
    Success(String),
    /// Status `2`.
    DeviceError,
    /// Status `254`.
    Pending,
    /// Status `255`.
    NoData,
    /// Arbitrary status byte with payload.
    Raw(u8, String),
}

impl MockReply {
    /// Successful reply carrying `payload`.
    pub fn success(payload: impl Into<String>) -> Self {
        MockReply::Success(payload.into())
    }

    /// Successful reply with no payload, as sent for settings commands.
    pub fn ok() -> Self {
        MockReply::Success(String::new())
    }

    /// Encode as the frame a probe would put on the bus.
    pub fn to_frame(&self) -> ReplyFrame {
        match self {
            MockReply::Success(payload) => ReplyFrame::encode(1, payload),
            MockReply::DeviceError => ReplyFrame::encode(2, ""),
            MockReply::Pending => ReplyFrame::encode(254, ""),
            MockReply::NoData => ReplyFrame::encode(255, ""),
            MockReply::Raw(code, payload) => ReplyFrame::encode(*code, payload),
        }
    }
}

type Responder = Box<dyn FnMut(u8, &str) -> Vec<MockReply> + Send>;

enum Scripted {
    Frame(ReplyFrame),
    ReadFailure,
}

#[derive(Default)]
struct MockState {
    queues: HashMap<u8, VecDeque<Scripted>>,
    writes: Vec<(u8, String)>,
    log: Vec<String>,
    reads: usize,
    fail_next_write: bool,
    fail_next_read: bool,
    responder: Option<Responder>,
}

/// Scripted in-memory transport.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Transport with empty reply queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose replies are produced by `responder` for each write.
    ///
    /// The responder runs while the transport's internal lock is held and
    /// must not call back into the transport.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(u8, &str) -> Vec<MockReply> + Send + 'static,
    {
        let mock = Self::new();
        mock.state.lock().responder = Some(Box::new(responder));
        mock
    }

    /// Queue a reply for the next read at `address`.
    pub fn push_reply(&self, address: u8, reply: MockReply) {
        self.state
            .lock()
            .queues
            .entry(address)
            .or_default()
            .push_back(Scripted::Frame(reply.to_frame()));
    }

    /// Queue a transport failure for the read at `address` whose turn it is
    /// after the replies already queued there.
    pub fn push_read_failure(&self, address: u8) {
        self.state
            .lock()
            .queues
            .entry(address)
            .or_default()
            .push_back(Scripted::ReadFailure);
    }

    /// Fail the next write, whatever its address.
    pub fn fail_next_write(&self) {
        self.state.lock().fail_next_write = true;
    }

    /// Fail the next read, whatever its address.
    pub fn fail_next_read(&self) {
        self.state.lock().fail_next_read = true;
    }

    /// Every command written so far, with its address.
    pub fn writes(&self) -> Vec<(u8, String)> {
        self.state.lock().writes.clone()
    }

    /// Commands written to `address`, in order.
    pub fn commands_for(&self, address: u8) -> Vec<String> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Number of successful reads.
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Interleaved log of bus activity (`"write <addr> <cmd>"`, `"read <addr>"`).
    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Forget recorded writes, reads and log entries. Queued replies stay.
    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.log.clear();
        state.reads = 0;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&self, address: u8, bytes: &[u8]) -> std::io::Result<()> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_write) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ));
        }

        let text = String::from_utf8_lossy(bytes).into_owned();
        state.log.push(format!("write {address} {text}"));
        state.writes.push((address, text.clone()));

        if let Some(responder) = state.responder.as_mut() {
            let replies = responder(address, &text);
            let queue = state.queues.entry(address).or_default();
            queue.extend(replies.iter().map(|r| Scripted::Frame(r.to_frame())));
        }
        Ok(())
    }

    async fn read(&self, address: u8, buffer: &mut [u8]) -> std::io::Result<()> {
        let mut state = self.state.lock();
        let scripted = if std::mem::take(&mut state.fail_next_read) {
            Scripted::ReadFailure
        } else {
            state
                .queues
                .get_mut(&address)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Scripted::Frame(MockReply::NoData.to_frame()))
        };

        let frame = match scripted {
            Scripted::Frame(frame) => frame,
            Scripted::ReadFailure => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "simulated read failure",
                ))
            }
        };

        state.reads += 1;
        state.log.push(format!("read {address}"));

        let n = buffer.len().min(FRAME_LEN);
        buffer[..n].copy_from_slice(&frame.as_bytes()[..n]);
        Ok(())
    }
}
