// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command contract shared by session and workflow layers

use core::fmt::Debug;

use encdec::Encode;

use crate::{
    frame::{ApduHeader, RequestFrame, ResponseFrame},
    model::DeviceModelId,
    status::StatusWord,
};

/// Frame encoding / decoding errors
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ApduError {
    /// Buffer too short or length field mismatch
    #[error("invalid length")]
    InvalidLength,

    /// Malformed field encoding
    #[error("invalid encoding")]
    InvalidEncoding,

    /// Invalid UTF-8 in string field
    #[error("invalid utf8")]
    Utf8,

    /// Request payload exceeds the 255 byte limit
    #[error("payload too long ({0} bytes)")]
    PayloadTooLong(usize),
}

impl From<encdec::Error> for ApduError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            #[allow(unreachable_patterns)]
            _ => ApduError::InvalidEncoding,
        }
    }
}

/// Errors produced when parsing a command response
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum CommandError {
    /// Device reported a PIN lock
    #[error("device locked")]
    DeviceLocked,

    /// Known, non-success status word
    #[error("device returned status {0}")]
    Status(StatusWord),

    /// Unrecognised status word
    #[error("unknown status word {0:#06x}")]
    UnknownStatus(u16),

    /// Malformed or unexpected response payload
    #[error("invalid response: {0}")]
    Protocol(#[from] ApduError),
}

/// Static APDU header information
pub trait ApduStatic {
    /// APDU class
    const CLA: u8;

    /// APDU instruction
    const INS: u8;

    /// First APDU parameter
    fn p1(&self) -> u8 {
        0
    }

    /// Second APDU parameter
    fn p2(&self) -> u8 {
        0
    }
}

/// Typed device command
///
/// Builds a [`RequestFrame`] from the command header and encoded payload,
/// and parses a [`ResponseFrame`] into [`Command::Response`].
pub trait Command: ApduStatic + Encode<Error = ApduError> + Send + Sync {
    /// Parsed response type
    type Response: Debug + Send + 'static;

    /// Command name for logging
    fn name(&self) -> &'static str;

    /// Build a request frame for this command
    fn request(&self) -> Result<RequestFrame, ApduError> {
        let n = self.encode_len()?;
        if n > crate::MAX_PAYLOAD {
            return Err(ApduError::PayloadTooLong(n));
        }

        let mut buff = vec![0u8; n];
        let n = self.encode(&mut buff)?;
        buff.truncate(n);

        RequestFrame::new(
            ApduHeader::new(Self::CLA, Self::INS, self.p1(), self.p2()),
            buff,
        )
    }

    /// Parse a response frame for the provided device model
    fn parse(
        &self,
        resp: &ResponseFrame,
        model: DeviceModelId,
    ) -> Result<Self::Response, CommandError>;
}
