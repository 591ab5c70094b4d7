// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Firmware (OS) version APDUs

use encdec::{DecodeOwned, Encode};

use crate::{
    helpers::{read_bytes, read_lv, read_lv_str, write_lv},
    status::check_status,
    ApduError, ApduStatic, Command, CommandError, DeviceModelId, Instruction, ResponseFrame,
    OS_APDU_CLA,
};

/// Fetch firmware version information
///
/// Only answered by the dashboard, applications respond with
/// `ClaNotSupported`.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct GetOsVersion;

impl ApduStatic for GetOsVersion {
    /// GetOsVersion is class `0xe0`
    const CLA: u8 = OS_APDU_CLA;

    /// GetOsVersion is instruction `0x01`
    const INS: u8 = Instruction::GetOsVersion as u8;
}

impl Encode for GetOsVersion {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl Command for GetOsVersion {
    type Response = OsVersion;

    fn name(&self) -> &'static str {
        "GetOsVersion"
    }

    fn parse(
        &self,
        resp: &ResponseFrame,
        _model: DeviceModelId,
    ) -> Result<Self::Response, CommandError> {
        check_status(resp)?;

        let (v, _n) = OsVersion::decode_owned(resp.data())?;

        Ok(v)
    }
}

/// Firmware version information
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      TARGET_ID (u32, BE)                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | SE_VERSION_LEN|  SE_VERSION...                                /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | SE_FLAGS_LEN  |  SE_FLAGS...                                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | MCU_SEPH_LEN  |  MCU_SEPH_VERSION...                (optional)/
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | MCU_BL_LEN    |  MCU_BOOTLOADER_VERSION...          (optional)/
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OsVersion {
    /// Target identifier
    pub target_id: u32,

    /// Secure element (BOLOS) version
    pub se_version: String,

    /// Secure element flags
    pub se_flags: Vec<u8>,

    /// MCU SEPH version
    pub mcu_seph_version: String,

    /// MCU bootloader version
    pub mcu_bootloader_version: String,
}

/// Target id mask / value for devices running the main firmware
const TARGET_ID_MASK: u32 = 0xf000_0000;
const TARGET_ID_FIRMWARE: u32 = 0x3000_0000;

impl OsVersion {
    /// Check whether the device is running its bootloader
    pub fn is_bootloader(&self) -> bool {
        self.target_id & TARGET_ID_MASK != TARGET_ID_FIRMWARE
    }

    /// Check whether the device is running an OS updater
    pub fn is_osu(&self) -> bool {
        self.se_version.contains("-osu")
    }
}

impl Encode for OsVersion {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(4 + 4
            + self.se_version.len()
            + self.se_flags.len()
            + self.mcu_seph_version.len()
            + self.mcu_bootloader_version.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.len() < 4 {
            return Err(ApduError::InvalidLength);
        }

        buff[..4].copy_from_slice(&self.target_id.to_be_bytes());
        let mut index = 4;

        write_lv(buff, &mut index, self.se_version.as_bytes())?;
        write_lv(buff, &mut index, &self.se_flags)?;
        write_lv(buff, &mut index, self.mcu_seph_version.as_bytes())?;
        write_lv(buff, &mut index, self.mcu_bootloader_version.as_bytes())?;

        Ok(index)
    }
}

impl DecodeOwned for OsVersion {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut index = 0;

        let t = read_bytes(buff, &mut index, 4)?;
        let target_id = u32::from_be_bytes([t[0], t[1], t[2], t[3]]);

        // Old firmware omits version and flags
        let (se_version, se_flags) = match index < buff.len() {
            true => (
                read_lv_str(buff, &mut index)?,
                read_lv(buff, &mut index)?.to_vec(),
            ),
            false => ("0.0.0".to_string(), vec![]),
        };

        let optional_str = |index: &mut usize| -> Result<String, ApduError> {
            match *index < buff.len() {
                true => read_lv_str(buff, index),
                false => Ok(String::new()),
            }
        };

        let mcu_seph_version = optional_str(&mut index)?;
        let mcu_bootloader_version = optional_str(&mut index)?;

        Ok((
            Self {
                target_id,
                se_version,
                se_flags,
                mcu_seph_version,
                mcu_bootloader_version,
            },
            index,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{status::StatusWord, test::encode_command};

    #[test]
    fn get_os_version_request() {
        let f = encode_command(&GetOsVersion);
        assert_eq!(f.to_bytes(), vec![0xe0, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn parse_os_version() {
        let v = OsVersion {
            target_id: 0x3300_0004,
            se_version: "2.2.3".to_string(),
            se_flags: vec![0x8e, 0x00, 0x00, 0x00],
            mcu_seph_version: "2.30".to_string(),
            mcu_bootloader_version: "1.16".to_string(),
        };

        let mut buff = [0u8; 64];
        let n = v.encode(&mut buff).unwrap();
        assert_eq!(n, v.encode_len().unwrap());

        let resp = ResponseFrame::new(buff[..n].to_vec(), 0x9000);
        let d = GetOsVersion.parse(&resp, DeviceModelId::NanoX).unwrap();

        assert_eq!(d, v);
        assert!(!d.is_bootloader());
        assert!(!d.is_osu());
    }

    #[test]
    fn parse_legacy_os_version() {
        let resp = ResponseFrame::new(vec![0x01, 0x00, 0x00, 0x01], 0x9000);
        let d = GetOsVersion.parse(&resp, DeviceModelId::NanoS).unwrap();

        assert_eq!(d.se_version, "0.0.0");
        assert!(d.se_flags.is_empty());
        assert!(d.is_bootloader());
    }

    #[test]
    fn os_version_from_app() {
        let resp = ResponseFrame::new(vec![], 0x6e00);
        assert_eq!(
            GetOsVersion.parse(&resp, DeviceModelId::NanoS),
            Err(CommandError::Status(StatusWord::ClaNotSupported))
        );
    }
}
