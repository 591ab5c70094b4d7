// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Installed application listing APDUs
//!
//! Listing is paged, [`ListApps`] fetches the first page and
//! [`ListAppsContinue`] each following page until an empty page is returned.

use encdec::{DecodeOwned, Encode};

use crate::{
    helpers::{read_bytes, read_lv_str, read_u8},
    status::check_status,
    ApduError, ApduStatic, Command, CommandError, DeviceModelId, Instruction, ResponseFrame,
    OS_APDU_CLA,
};

/// Fetch the first page of installed applications
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct ListApps;

impl ApduStatic for ListApps {
    /// ListApps is class `0xe0`
    const CLA: u8 = OS_APDU_CLA;

    /// ListApps is instruction `0xde`
    const INS: u8 = Instruction::ListApps as u8;
}

/// Fetch the next page of installed applications
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct ListAppsContinue;

impl ApduStatic for ListAppsContinue {
    /// ListAppsContinue is class `0xe0`
    const CLA: u8 = OS_APDU_CLA;

    /// ListAppsContinue is instruction `0xdf`
    const INS: u8 = Instruction::ListAppsContinue as u8;
}

macro_rules! impl_list_apps {
    ($t:ty, $name:literal) => {
        impl Encode for $t {
            type Error = ApduError;

            fn encode_len(&self) -> Result<usize, Self::Error> {
                Ok(0)
            }

            fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
                Ok(0)
            }
        }

        impl Command for $t {
            type Response = ListAppsPage;

            fn name(&self) -> &'static str {
                $name
            }

            fn parse(
                &self,
                resp: &ResponseFrame,
                _model: DeviceModelId,
            ) -> Result<Self::Response, CommandError> {
                check_status(resp)?;

                let (p, _n) = ListAppsPage::decode_owned(resp.data())?;

                Ok(p)
            }
        }
    };
}

impl_list_apps!(ListApps, "ListApps");
impl_list_apps!(ListAppsContinue, "ListAppsContinue");

bitflags::bitflags! {
    /// Installed application flags
    pub struct AppEntryFlags: u16 {
        /// Application may derive master keys
        const DERIVE_MASTER = 1 << 4;

        /// Application is signed by the issuer
        const SIGNED = 1 << 9;

        /// Application is enabled
        const ENABLED = 1 << 11;
    }
}

/// Installed application entry
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListedApp {
    /// Application name
    pub name: String,

    /// Raw application flags
    pub flags: u16,

    /// Hash of the application code
    pub hash_code_data: [u8; 32],

    /// Hash of the full application image
    pub hash: [u8; 32],
}

impl ListedApp {
    /// Known application flags
    pub fn entry_flags(&self) -> AppEntryFlags {
        AppEntryFlags::from_bits_truncate(self.flags)
    }

    fn entry_len(&self) -> usize {
        2 + 32 + 32 + 1 + self.name.len()
    }
}

/// Page of installed applications
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    FORMAT     |   ENTRY_LEN   |          FLAGS (BE)           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                   HASH_CODE_DATA (32 bytes)                   /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                        HASH (32 bytes)                        /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   NAME_LEN    |  NAME...                                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                    ENTRY_LEN, FLAGS, ...                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// An empty payload marks the end of the listing.
#[derive(Clone, PartialEq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListAppsPage {
    pub apps: Vec<ListedApp>,
}

/// Page format identifier
const LIST_APPS_FORMAT: u8 = 0x01;

impl ListAppsPage {
    /// Check whether this page terminates the listing
    pub fn is_last(&self) -> bool {
        self.apps.is_empty()
    }
}

impl Encode for ListAppsPage {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        if self.apps.is_empty() {
            return Ok(0);
        }

        Ok(1 + self.apps.iter().map(|a| 1 + a.entry_len()).sum::<usize>())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }
        if n == 0 {
            return Ok(0);
        }

        buff[0] = LIST_APPS_FORMAT;
        let mut index = 1;

        for a in &self.apps {
            let entry_len = a.entry_len();
            if entry_len > u8::MAX as usize {
                return Err(ApduError::InvalidEncoding);
            }

            buff[index] = entry_len as u8;
            buff[index + 1..][..2].copy_from_slice(&a.flags.to_be_bytes());
            buff[index + 3..][..32].copy_from_slice(&a.hash_code_data);
            buff[index + 35..][..32].copy_from_slice(&a.hash);
            buff[index + 67] = a.name.len() as u8;
            buff[index + 68..][..a.name.len()].copy_from_slice(a.name.as_bytes());

            index += 1 + entry_len;
        }

        Ok(index)
    }
}

impl DecodeOwned for ListAppsPage {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut apps = vec![];

        if buff.is_empty() {
            return Ok((Self { apps }, 0));
        }

        let mut index = 0;
        let format = read_u8(buff, &mut index)?;
        if format != LIST_APPS_FORMAT {
            return Err(ApduError::InvalidEncoding);
        }

        while index < buff.len() {
            let entry_len = read_u8(buff, &mut index)? as usize;
            let entry = read_bytes(buff, &mut index, entry_len)?;

            // Parse entry fields
            let mut i = 0;
            let f = read_bytes(entry, &mut i, 2)?;
            let flags = u16::from_be_bytes([f[0], f[1]]);

            let mut hash_code_data = [0u8; 32];
            hash_code_data.copy_from_slice(read_bytes(entry, &mut i, 32)?);

            let mut hash = [0u8; 32];
            hash.copy_from_slice(read_bytes(entry, &mut i, 32)?);

            let name = read_lv_str(entry, &mut i)?;

            apps.push(ListedApp {
                name,
                flags,
                hash_code_data,
                hash,
            });
        }

        Ok((Self { apps }, index))
    }
}
