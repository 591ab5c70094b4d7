// Copyright (c) 2022-2023 The MobileCoin Foundation

use ledger_dmk_core::{Error, TransportError};

/// Device discovery and connection errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HID Init Error
    #[error("could not create HidApi instance")]
    HidInit,

    /// No matching device
    #[error("no device found")]
    NoDevice,

    /// Transport could not be opened
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session could not be opened
    #[error("session error: {0}")]
    Session(#[from] Error),
}
