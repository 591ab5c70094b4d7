// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    command::{ApduError, ApduStatic, Command, CommandError},
    frame::{ApduHeader, RequestFrame, ResponseFrame},
    model::DeviceModelId,
    os::{
        AppAndVersion, AppEntryFlags, CloseApp, GetAppAndVersion, GetOsVersion, ListApps,
        ListAppsContinue, ListAppsPage, ListedApp, OpenApp, OsVersion,
    },
    status::{check_status, StatusWord},
};
