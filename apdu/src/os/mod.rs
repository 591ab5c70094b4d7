// Copyright (c) 2022-2023 The MobileCoin Foundation

//! OS / dashboard commands used for device status and application management

mod app_and_version;
pub use app_and_version::{AppAndVersion, GetAppAndVersion};

mod os_version;
pub use os_version::{GetOsVersion, OsVersion};

mod open_app;
pub use open_app::OpenApp;

mod close_app;
pub use close_app::CloseApp;

mod list_apps;
pub use list_apps::{AppEntryFlags, ListApps, ListAppsContinue, ListAppsPage, ListedApp};

use crate::{status::check_status, CommandError, ResponseFrame};

/// Parse a response with no payload
pub(crate) fn parse_empty(resp: &ResponseFrame) -> Result<(), CommandError> {
    check_status(resp)
}
