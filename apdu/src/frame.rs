// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Raw request / response frames

use crate::{command::ApduError, status::StatusWord};

/// Maximum request payload length
pub const MAX_PAYLOAD: usize = 255;

/// Request frame header length
pub const HEADER_LEN: usize = 5;

/// APDU header (class, instruction, parameters)
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct ApduHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
}

impl ApduHeader {
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self { cla, ins, p1, p2 }
    }
}

/// Request frame, a header and up to [`MAX_PAYLOAD`] bytes of payload
#[derive(Clone, PartialEq, Debug)]
pub struct RequestFrame {
    header: ApduHeader,
    data: Vec<u8>,
}

impl RequestFrame {
    /// Create a new request frame, rejecting oversized payloads
    pub fn new(header: ApduHeader, data: Vec<u8>) -> Result<Self, ApduError> {
        if data.len() > MAX_PAYLOAD {
            return Err(ApduError::PayloadTooLong(data.len()));
        }

        Ok(Self { header, data })
    }

    pub fn header(&self) -> &ApduHeader {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serialise to raw bytes for transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(HEADER_LEN + self.data.len());

        b.extend_from_slice(&[
            self.header.cla,
            self.header.ins,
            self.header.p1,
            self.header.p2,
            self.data.len() as u8,
        ]);
        b.extend_from_slice(&self.data);

        b
    }
}

impl TryFrom<&[u8]> for RequestFrame {
    type Error = ApduError;

    fn try_from(buff: &[u8]) -> Result<Self, Self::Error> {
        if buff.len() < HEADER_LEN {
            return Err(ApduError::InvalidLength);
        }

        let header = ApduHeader::new(buff[0], buff[1], buff[2], buff[3]);
        let lc = buff[4] as usize;

        if buff.len() != HEADER_LEN + lc {
            return Err(ApduError::InvalidLength);
        }

        Ok(Self {
            header,
            data: buff[HEADER_LEN..].to_vec(),
        })
    }
}

/// Response frame, payload followed by a big-endian status word
#[derive(Clone, PartialEq, Debug)]
pub struct ResponseFrame {
    data: Vec<u8>,
    status: u16,
}

impl ResponseFrame {
    pub fn new(data: Vec<u8>, status: u16) -> Self {
        Self { data, status }
    }

    /// Response payload, excluding the status word
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Status word, where known
    pub fn status_word(&self) -> Option<StatusWord> {
        StatusWord::try_from(self.status).ok()
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusWord::Ok as u16
    }

    /// Check whether the device reported a PIN lock
    pub fn is_locked(&self) -> bool {
        self.status == StatusWord::Locked as u16
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(self.data.len() + 2);
        b.extend_from_slice(&self.data);
        b.extend_from_slice(&self.status.to_be_bytes());
        b
    }
}

impl TryFrom<&[u8]> for ResponseFrame {
    type Error = ApduError;

    fn try_from(buff: &[u8]) -> Result<Self, Self::Error> {
        if buff.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        let n = buff.len() - 2;
        let status = u16::from_be_bytes([buff[n], buff[n + 1]]);

        Ok(Self {
            data: buff[..n].to_vec(),
            status,
        })
    }
}
