// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device actions, workflows executed through the action engine
//!
//! Each action builds a [`Machine`](ledger_dmk_core::engine::Machine)
//! describing its workflow, composite actions invoke simpler actions as
//! nested machines.
//!
//! ```text
//! OpenApp
//!   GetDeviceStatus -> CheckApp -> (dashboard) -> OpenApp -> GetDeviceStatus ...
//!                               -> (other app) -> GoToDashboard -> OpenApp ...
//! ```

use std::{sync::Arc, time::Duration};

use futures::StreamExt;

use ledger_dmk_apdu::{CommandError, StatusWord};
use ledger_dmk_core::{DeviceApi, DeviceStatus, Error, WorkflowError};

mod get_device_status;
pub use get_device_status::{GetDeviceStatusAction, GetDeviceStatusState};

mod go_to_dashboard;
pub use go_to_dashboard::{GoToDashboardAction, GoToDashboardState, MAX_CLOSE_ATTEMPTS};

mod open_app;
pub use open_app::{OpenAppAction, OpenAppState};

mod send_command_in_app;
pub use send_command_in_app::{SendCommandInAppAction, SendCommandInAppState};

mod list_apps;
pub use list_apps::{ListAppsAction, ListAppsState};

mod list_apps_with_metadata;
pub use list_apps_with_metadata::{ListAppsWithMetadataAction, ListAppsWithMetadataState};

/// Wait for the session to report an unlocked device
async fn wait_for_unlock(api: Arc<dyn DeviceApi>, timeout: Duration) -> Result<(), Error> {
    let mut states = api.subscribe();

    let wait = async move {
        while let Some(s) = states.next().await {
            match s.device_status {
                DeviceStatus::Connected => return Ok(()),
                DeviceStatus::NotConnected => return Err(Error::Disconnected),
                _ => (),
            }
        }

        Err(Error::Disconnected)
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(r) => r,
        Err(_) => Err(WorkflowError::UnlockTimeout.into()),
    }
}

/// Map application management status words to workflow errors
fn app_error(e: Error, name: &str) -> Error {
    match e {
        Error::Command(CommandError::Status(StatusWord::AppNotFound)) => {
            WorkflowError::AppNotFound(name.to_string()).into()
        }
        Error::Command(CommandError::Status(
            StatusWord::Refused | StatusWord::ConditionsNotSatisfied,
        )) => WorkflowError::RefusedByUser.into(),
        e => e,
    }
}
