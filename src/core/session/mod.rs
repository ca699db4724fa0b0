//! Session layer: protocol state machine, turn model, reset coordination.

mod controller;
mod reset;
mod turn;

use thiserror::Error;

use crate::core::audio::DeviceError;
use crate::core::transport::ChannelError;

pub use controller::{
    SessionController, SessionHandle, SessionNotification, SessionSettings, SessionState,
};
pub use reset::{ResetGuard, ResetLock};
pub use turn::{Turn, TurnAccumulator};

/// Errors that end (or prevent) a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection-level failure (config send or channel failure)
    #[error("connection error: {0}")]
    Connection(#[from] ChannelError),

    /// Device-level failure during audio (re)initialization
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The inbound event stream failed mid-session
    #[error("event stream failed: {0}")]
    Stream(String),
}
