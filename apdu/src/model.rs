// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device model identifiers

use strum::{Display, EnumIter, EnumString};

/// Ledger device model
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DeviceModelId {
    NanoS,
    #[strum(to_string = "nano_sp", serialize = "nanosp")]
    NanoSP,
    NanoX,
    Stax,
    Flex,
    ApexP,
}

impl DeviceModelId {
    /// Resolve a device model from a USB product id
    ///
    /// Recent firmware reports the model in the upper byte of the product
    /// id, bootloader / legacy firmware uses the full value.
    pub fn from_usb_product_id(pid: u16) -> Option<Self> {
        let m = match pid {
            0x0001 => Self::NanoS,
            0x0004 => Self::NanoX,
            0x0005 => Self::NanoSP,
            0x0006 => Self::Stax,
            0x0007 => Self::Flex,
            _ => match pid >> 8 {
                0x10 => Self::NanoS,
                0x40 => Self::NanoX,
                0x50 => Self::NanoSP,
                0x60 => Self::Stax,
                0x70 => Self::Flex,
                0x80 => Self::ApexP,
                _ => return None,
            },
        };

        Some(m)
    }

    /// Human readable product name
    pub fn product_name(&self) -> &'static str {
        match self {
            Self::NanoS => "Ledger Nano S",
            Self::NanoSP => "Ledger Nano S Plus",
            Self::NanoX => "Ledger Nano X",
            Self::Stax => "Ledger Stax",
            Self::Flex => "Ledger Flex",
            Self::ApexP => "Ledger Apex P",
        }
    }
}
