// Copyright (c) 2022-2023 The MobileCoin Foundation

use ledger_dmk_apdu::{ApduError, CommandError};

/// Link-level transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Exchange did not complete within the request timeout
    #[error("request timeout")]
    Timeout,

    /// Transport closed or device removed
    #[error("transport closed")]
    Closed,

    /// IO error
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed transport framing
    #[error("invalid framing: {0}")]
    Framing(String),

    /// Driver specific failure
    #[error("{0}")]
    Other(String),
}

/// Device session and action engine errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error {
    /// Link-level failure, not retried by the session
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timeout
    #[error("request timeout")]
    Timeout,

    /// Session closed or device disconnected
    #[error("device disconnected")]
    Disconnected,

    /// Foreground send issued while another foreground send is in flight
    #[error("device busy")]
    DeviceBusy,

    /// Device reported a PIN lock
    #[error("device locked")]
    DeviceLocked,

    /// Protocol / status word error
    #[error("command error: {0}")]
    Command(CommandError),

    /// Workflow declared error
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Unclassified failure (including caught panics)
    #[error("unknown error: {0}")]
    Unknown(String),

    /// Action cancelled by the caller
    #[error("cancelled")]
    Cancelled,

    /// Invalid machine description
    #[error("invalid machine: {0}")]
    InvalidMachine(String),
}

/// Workflow level errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("refused by user")]
    RefusedByUser,

    #[error("application not found: {0}")]
    AppNotFound(String),

    #[error("timeout waiting for device unlock")]
    UnlockTimeout,

    #[error("application {0} not opened")]
    AppNotOpened(String),

    #[error("missing metadata for applications: {0:?}")]
    MissingAppMetadata(Vec<String>),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => Error::Timeout,
            TransportError::Closed => Error::Disconnected,
            _ => Error::Transport(e.to_string()),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::DeviceLocked => Error::DeviceLocked,
            _ => Error::Command(e),
        }
    }
}

impl From<ApduError> for Error {
    fn from(e: ApduError) -> Self {
        Error::Command(CommandError::Protocol(e))
    }
}

impl Error {
    /// Check whether the error is a link-level failure
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Timeout | Error::Disconnected
        )
    }
}
