//! Peer-to-peer call lifecycle

mod controller;
mod session;

pub use controller::{CallController, CallUpdate, ControllerInput};
pub use session::{CallSession, CallSummary, SetupOutcome};
