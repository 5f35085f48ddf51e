//! Error types for the btptester library
//!
//! Every failure inside a command handler resolves to a BTP status byte on the
//! wire; nothing here is allowed to panic the dispatch loop.

use thiserror::Error;

use crate::btp::constants::{BTP_STATUS_FAILED, BTP_STATUS_NOT_READY, BTP_STATUS_UNKNOWN_CMD};
use crate::btp::message::FramingError;
use crate::host::HostError;

/// Errors that can occur while handling BTP commands
#[derive(Error, Debug)]
pub enum TesterError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("malformed command payload")]
    MalformedPayload,

    #[error("unknown command: service {service:#04x} opcode {opcode:#04x}")]
    UnknownCommand { service: u8, opcode: u8 },

    #[error("service {0:#04x} is not registered")]
    ServiceNotRegistered(u8),

    #[error("no service is open for attribute declarations")]
    NoOpenService,

    #[error("no characteristic is open for descriptor declarations")]
    NoOpenCharacteristic,

    #[error("unknown attribute id: {0}")]
    UnknownAttribute(u16),

    #[error("no attribute at handle {0:#06x}")]
    UnknownHandle(u16),

    #[error("peer is not connected")]
    NotConnected,

    #[error("an operation is already in progress")]
    OperationPending,

    #[error("peer is already subscribed")]
    AlreadySubscribed,

    #[error("peer is not subscribed")]
    NotSubscribed,

    #[error("requested mode is not supported by the attribute")]
    NotSupported,

    #[error("host error: {0}")]
    Host(#[from] HostError),
}

impl TesterError {
    /// Maps the error onto the status byte carried by an error reply.
    pub fn status(&self) -> u8 {
        match self {
            TesterError::UnknownCommand { .. } => BTP_STATUS_UNKNOWN_CMD,
            TesterError::ServiceNotRegistered(_) => BTP_STATUS_NOT_READY,
            _ => BTP_STATUS_FAILED,
        }
    }
}

// Command payloads are parsed through `Cursor`; a short read means the
// payload was truncated.
impl From<std::io::Error> for TesterError {
    fn from(_: std::io::Error) -> Self {
        TesterError::MalformedPayload
    }
}

pub type Result<T> = std::result::Result<T, TesterError>;
