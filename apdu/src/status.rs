// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device status words

use strum::{Display, EnumIter};

use crate::{command::CommandError, frame::ResponseFrame};

/// Status words returned by the device OS and applications
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum StatusWord {
    /// Command completed successfully
    Ok = 0x9000,

    /// Device is locked, PIN entry required
    Locked = 0x5515,

    /// User refused the request on the device
    Refused = 0x5501,

    /// Conditions of use not satisfied (often user rejection in applications)
    ConditionsNotSatisfied = 0x6985,

    /// Requested application is not installed
    AppNotFound = 0x6807,

    /// Incorrect payload length
    WrongLength = 0x6700,

    /// Invalid payload data
    InvalidData = 0x6a80,

    /// Instruction not supported by the running application
    InsNotSupported = 0x6d00,

    /// Class not supported by the running application
    ClaNotSupported = 0x6e00,
}

/// Map a non-success status word to a [`CommandError`]
pub fn check_status(resp: &ResponseFrame) -> Result<(), CommandError> {
    match resp.status_word() {
        Some(StatusWord::Ok) => Ok(()),
        Some(StatusWord::Locked) => Err(CommandError::DeviceLocked),
        Some(sw) => Err(CommandError::Status(sw)),
        None => Err(CommandError::UnknownStatus(resp.status())),
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn status_word_roundtrip() {
        for sw in StatusWord::iter() {
            assert_eq!(StatusWord::try_from(sw as u16).ok(), Some(sw));
        }
    }

    #[test]
    fn check_status_mapping() {
        assert_eq!(check_status(&ResponseFrame::new(vec![], 0x9000)), Ok(()));
        assert_eq!(
            check_status(&ResponseFrame::new(vec![], 0x5515)),
            Err(CommandError::DeviceLocked)
        );
        assert_eq!(
            check_status(&ResponseFrame::new(vec![], 0x6807)),
            Err(CommandError::Status(StatusWord::AppNotFound))
        );
        assert_eq!(
            check_status(&ResponseFrame::new(vec![], 0x6f42)),
            Err(CommandError::UnknownStatus(0x6f42))
        );
    }
}
