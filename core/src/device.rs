// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device status and static model information

use std::time::Duration;

use strum::{Display, EnumIter, EnumString};

pub use ledger_dmk_apdu::DeviceModelId;

/// Device status, one current value per session
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceStatus {
    Connected,
    Busy,
    Locked,
    NotConnected,
}

/// Static per-model capabilities
#[derive(Clone, PartialEq, Debug)]
pub struct DeviceModel {
    pub id: DeviceModelId,

    /// Product name
    pub product_name: &'static str,

    /// USB product id prefix (upper byte)
    pub usb_product_id: u16,

    /// Minimum refresher polling interval
    pub polling_floor: Duration,

    /// Status probe must also issue GetOsVersion to detect a lock
    pub os_probe: bool,
}

/// Polling floor for most models
pub const DEFAULT_POLLING_FLOOR: Duration = Duration::from_millis(1000);

/// Polling floor for slower models
pub const SLOW_POLLING_FLOOR: Duration = Duration::from_millis(2000);

impl DeviceModel {
    /// Resolve static information for a model identifier
    pub fn info(id: DeviceModelId) -> Self {
        let (usb_product_id, slow) = match id {
            DeviceModelId::NanoS => (0x10, true),
            DeviceModelId::NanoX => (0x40, false),
            DeviceModelId::NanoSP => (0x50, false),
            DeviceModelId::Stax => (0x60, false),
            DeviceModelId::Flex => (0x70, false),
            DeviceModelId::ApexP => (0x80, false),
        };

        Self {
            id,
            product_name: id.product_name(),
            usb_product_id,
            polling_floor: match slow {
                true => SLOW_POLLING_FLOOR,
                false => DEFAULT_POLLING_FLOOR,
            },
            os_probe: slow,
        }
    }
}
