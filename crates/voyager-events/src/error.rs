//! Error types for the event bus producer.

use thiserror::Error;

pub type EventResult<T> = Result<T, EventError>;

#[derive(Error, Debug, Clone)]
pub enum EventError {
    /// A batch transmission was rejected by the transport. Carries the
    /// topic so the caller's logs can correlate with the requeue.
    #[error("transport rejected batch on topic {0}")]
    Transport(String),

    /// `emit` or `flush` was called after `disconnect`.
    #[error("producer is closed")]
    Closed,
}
