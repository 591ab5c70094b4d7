// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for Ledger device management
//!
//! This crate provides the narrow command contract used by the session and
//! action engine ([ledger-dmk-core](https://docs.rs/ledger-dmk-core)), along
//! with the OS-level commands required to manage applications on a device.
//!
//! Request frames consist of a fixed 5-byte header (class, instruction,
//! parameter-1, parameter-2, payload length) followed by up to 255 payload
//! bytes. Response frames carry an arbitrary payload followed by a 2-byte
//! big-endian status word.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      CLA      |      INS      |      P1       |      P2       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      LC       |                                               |
//! +-+-+-+-+-+-+-+-+                                               +
//! /                       PAYLOAD (LC bytes)                      /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Commands implement [`ApduStatic`] to declare their header and
//! [`encdec::Encode`] to write their payload, then [`Command`] to parse the
//! typed response.

pub mod command;
pub use command::{ApduError, ApduStatic, Command, CommandError};

pub mod frame;
pub use frame::{ApduHeader, RequestFrame, ResponseFrame, MAX_PAYLOAD};

pub mod status;
pub use status::StatusWord;

pub mod model;
pub use model::DeviceModelId;

pub mod os;

pub mod prelude;

mod helpers;

/// Class for BOLOS dashboard / application management APDUs
pub const OS_APDU_CLA: u8 = 0xe0;

/// Class for commands answered by any running application
pub const APP_APDU_CLA: u8 = 0xb0;

/// Name reported by GetAppAndVersion when the dashboard is running
pub const DASHBOARD_APP_NAME: &str = "BOLOS";

/// OS instruction codes
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Instruction {
    /// Fetch OS version (class `0xe0`)
    GetOsVersion = 0x01,

    /// Open an application by name (class `0xe0`)
    OpenApp = 0xd8,

    /// Start listing installed applications (class `0xe0`)
    ListApps = 0xde,

    /// Continue listing installed applications (class `0xe0`)
    ListAppsContinue = 0xdf,

    /// Close the running application (class `0xb0`)
    CloseApp = 0xa7,
}

/// Fetch running application name and version (class `0xb0`)
///
/// Shares the `0x01` instruction value with [`Instruction::GetOsVersion`],
/// distinguished by class.
pub const INS_GET_APP_AND_VERSION: u8 = 0x01;
