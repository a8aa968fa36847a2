//! Stream relay and its wire events.

pub mod events;
pub mod stream_relay;

pub use events::{STREAM_COMPLETED, StreamEvent};
pub use stream_relay::{DEFAULT_EVENT_BUFFER, StreamRelay};
