//! The transport seam decoupling the producer's buffering/routing logic
//! from a concrete broker client, plus a fake used throughout this crate's
//! tests.

use crate::error::EventError;
use crate::event::Event;
use async_trait::async_trait;
use parking_lot::Mutex;

/// A concrete message-broker client. The engine never constructs one
/// itself; a host process wires a real implementation in.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send_batch(&self, topic: &str, messages: Vec<Event>) -> Result<(), EventError>;

    async fn close(&self) -> Result<(), EventError>;
}

#[derive(Default)]
struct FakeTransportState {
    sent: Vec<(String, Vec<Event>)>,
    reject_remaining: u32,
    closed: bool,
}

/// Records every batch handed to it; `reject_next` makes the following `n`
/// calls to `send_batch` fail, for exercising the producer's requeue path.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeTransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_next(&self, n: u32) {
        self.state.lock().reject_remaining = n;
    }

    pub fn sent_batches(&self) -> Vec<(String, Vec<Event>)> {
        self.state.lock().sent.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[async_trait]
impl EventTransport for FakeTransport {
    async fn send_batch(&self, topic: &str, messages: Vec<Event>) -> Result<(), EventError> {
        let mut state = self.state.lock();
        if state.reject_remaining > 0 {
            state.reject_remaining -= 1;
            return Err(EventError::Transport(topic.to_string()));
        }
        state.sent.push((topic.to_string(), messages));
        Ok(())
    }

    async fn close(&self) -> Result<(), EventError> {
        self.state.lock().closed = true;
        Ok(())
    }
}
