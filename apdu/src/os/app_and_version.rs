// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Running application name and version APDUs

use encdec::{DecodeOwned, Encode};

use crate::{
    helpers::{read_lv, read_lv_str, read_u8, write_lv},
    status::check_status,
    ApduError, ApduStatic, Command, CommandError, DeviceModelId, ResponseFrame, APP_APDU_CLA,
    DASHBOARD_APP_NAME, INS_GET_APP_AND_VERSION,
};

/// Fetch the name and version of the running application
///
/// Answered by the dashboard (as `BOLOS`) and by every application.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct GetAppAndVersion;

impl ApduStatic for GetAppAndVersion {
    /// GetAppAndVersion is class `0xb0`
    const CLA: u8 = APP_APDU_CLA;

    /// GetAppAndVersion is instruction `0x01`
    const INS: u8 = INS_GET_APP_AND_VERSION;
}

impl Encode for GetAppAndVersion {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl Command for GetAppAndVersion {
    type Response = AppAndVersion;

    fn name(&self) -> &'static str {
        "GetAppAndVersion"
    }

    fn parse(
        &self,
        resp: &ResponseFrame,
        _model: DeviceModelId,
    ) -> Result<Self::Response, CommandError> {
        check_status(resp)?;

        let (v, _n) = AppAndVersion::decode_owned(resp.data())?;

        Ok(v)
    }
}

/// Running application name and version
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    FORMAT     |   NAME_LEN    |                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
/// /                             NAME...                           /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  VERSION_LEN  |                                               |
/// +-+-+-+-+-+-+-+-+                                               +
/// /                            VERSION...                         /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   FLAGS_LEN   |   FLAGS...    (optional)                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppAndVersion {
    /// Application name (`BOLOS` for the dashboard)
    pub name: String,

    /// Application version
    pub version: String,

    /// Raw application flags
    pub flags: Vec<u8>,
}

/// Response format identifier
const APP_AND_VERSION_FORMAT: u8 = 0x01;

impl AppAndVersion {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            flags: vec![],
        }
    }

    /// Check whether the dashboard (no application) is running
    pub fn is_dashboard(&self) -> bool {
        self.name == DASHBOARD_APP_NAME
    }
}

impl Encode for AppAndVersion {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(4 + self.name.len() + self.version.len() + self.flags.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }

        let mut index = 0;

        buff[0] = APP_AND_VERSION_FORMAT;
        index += 1;

        write_lv(buff, &mut index, self.name.as_bytes())?;
        write_lv(buff, &mut index, self.version.as_bytes())?;
        write_lv(buff, &mut index, &self.flags)?;

        Ok(index)
    }
}

impl DecodeOwned for AppAndVersion {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut index = 0;

        // Check response format
        let format = read_u8(buff, &mut index)?;
        if format != APP_AND_VERSION_FORMAT {
            return Err(ApduError::InvalidEncoding);
        }

        // Fetch name and version
        let name = read_lv_str(buff, &mut index)?;
        let version = read_lv_str(buff, &mut index)?;

        // Flags are omitted by some applications
        let flags = match index < buff.len() {
            true => read_lv(buff, &mut index)?.to_vec(),
            false => vec![],
        };

        Ok((
            Self {
                name,
                version,
                flags,
            },
            index,
        ))
    }
}
