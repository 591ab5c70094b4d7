// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Close application APDU

use encdec::Encode;

use super::parse_empty;
use crate::{
    ApduError, ApduStatic, Command, CommandError, DeviceModelId, Instruction, ResponseFrame,
    APP_APDU_CLA,
};

/// Close the running application and return to the dashboard
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct CloseApp;

impl ApduStatic for CloseApp {
    /// CloseApp is class `0xb0`
    const CLA: u8 = APP_APDU_CLA;

    /// CloseApp is instruction `0xa7`
    const INS: u8 = Instruction::CloseApp as u8;
}

impl Encode for CloseApp {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl Command for CloseApp {
    type Response = ();

    fn name(&self) -> &'static str {
        "CloseApp"
    }

    fn parse(&self, resp: &ResponseFrame, _model: DeviceModelId) -> Result<(), CommandError> {
        parse_empty(resp)
    }
}
