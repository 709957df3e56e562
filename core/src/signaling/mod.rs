//! Signaling channel: relayed named events between two endpoints.

mod events;
mod hub;
mod ws;

pub use events::{AnswerCall, CallRequest, EventKind, Relay, RelayedMessage, SignalEvent};
pub use hub::{LinkWatch, SignalingHub, Subscription};
