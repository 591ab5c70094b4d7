// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Open application APDU

use encdec::Encode;

use super::parse_empty;
use crate::{
    ApduError, ApduStatic, Command, CommandError, DeviceModelId, Instruction, ResponseFrame,
    OS_APDU_CLA,
};

/// Open an installed application by name
///
/// Requires the dashboard to be running, the device may prompt the user to
/// confirm. Payload is the raw application name.
#[derive(Clone, PartialEq, Debug)]
pub struct OpenApp {
    pub name: String,
}

impl OpenApp {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl ApduStatic for OpenApp {
    /// OpenApp is class `0xe0`
    const CLA: u8 = OS_APDU_CLA;

    /// OpenApp is instruction `0xd8`
    const INS: u8 = Instruction::OpenApp as u8;
}

impl Encode for OpenApp {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.name.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let b = self.name.as_bytes();
        if buff.len() < b.len() {
            return Err(ApduError::InvalidLength);
        }

        buff[..b.len()].copy_from_slice(b);

        Ok(b.len())
    }
}

impl Command for OpenApp {
    type Response = ();

    fn name(&self) -> &'static str {
        "OpenApp"
    }

    fn parse(&self, resp: &ResponseFrame, _model: DeviceModelId) -> Result<(), CommandError> {
        parse_empty(resp)
    }
}
