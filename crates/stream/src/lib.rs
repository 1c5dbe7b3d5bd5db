//! Per-session push delivery: the event wire format, subscriber channels
//! with heartbeats, and the registry that routes published events.

pub mod channel;
pub mod events;
pub mod registry;

pub use channel::{ChannelMessage, Subscription};
pub use events::{EventType, QuoteEvent};
pub use registry::{InMemorySessionRegistry, PublishOutcome, SessionRegistry};
