//! The batching event-bus producer: buffers structured events in memory,
//! flushes on batch-size or linger-timer expiry, routes by type prefix, and
//! recovers from transport failure by requeueing at the head of the buffer.

pub mod error;
pub mod event;
pub mod producer;
pub mod routing;
pub mod transport;

pub use error::{EventError, EventResult};
pub use event::{Event, TraceContext};
pub use producer::{Producer, ProducerConfig};
pub use routing::topic_for;
pub use transport::{EventTransport, FakeTransport};
