//! Chatlink Core Library
//!
//! Conversation view, signaling channel and peer-to-peer call sessions
//! shared by every Chatlink front end.

pub mod api;
pub mod call;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod signaling;

pub use api::{ApiClient, CallRecord, ChatBackend, NewMessage, StoredMessage};
pub use call::{CallController, CallSession, CallSummary, CallUpdate, ControllerInput};
pub use chat::{ActiveConversation, ChatView, Delivery, Draft, Pane, Received};
pub use client::{ChatClient, ClientCommand, ClientUpdate, Cue};
pub use config::AppConfig;
pub use error::*;
pub use models::*;
pub use signaling::{EventKind, RelayedMessage, SignalEvent, SignalingHub, Subscription};
