// Copyright (c) 2022-2023 The MobileCoin Foundation

use strum::{Display, EnumString};

/// User interaction required on the device for an action to progress
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Display, EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UserInteractionRequired {
    #[default]
    None,
    UnlockDevice,
    AllowSecureConnection,
    ConfirmOpenApp,
    AllowListApps,
    VerifyAddress,
    SignTransaction,
    SignTypedData,
    SignPersonalMessage,
}

/// Intermediate value emitted with every pending snapshot
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Intermediate {
    pub required_user_interaction: UserInteractionRequired,
}

impl Intermediate {
    pub const fn new(required_user_interaction: UserInteractionRequired) -> Self {
        Self {
            required_user_interaction,
        }
    }

    pub const fn none() -> Self {
        Self::new(UserInteractionRequired::None)
    }
}

impl From<UserInteractionRequired> for Intermediate {
    fn from(i: UserInteractionRequired) -> Self {
        Self::new(i)
    }
}
