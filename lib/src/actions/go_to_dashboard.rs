// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use log::warn;

use ledger_dmk_apdu::os::{AppAndVersion, CloseApp};
use ledger_dmk_core::{
    engine::{DeviceAction, Intermediate, Machine},
    Error,
};

use super::GetDeviceStatusAction;
use crate::session::DEFAULT_UNLOCK_TIMEOUT;

/// Maximum CloseApp attempts before giving up
pub const MAX_CLOSE_ATTEMPTS: usize = 3;

/// Close the running application, returning to the dashboard
///
/// ```text
/// GetDeviceStatus -> CheckDeviceStatus -> Success (dashboard)
///                                      -> CloseApp -> GetDeviceStatus
///                                      -> Error
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct GoToDashboardAction {
    pub unlock_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct GoToDashboardState {
    app: Option<AppAndVersion>,
    attempts: usize,
    error: Option<Error>,
}

type M = Machine<GoToDashboardState, Intermediate, (), Error>;

impl Default for GoToDashboardAction {
    fn default() -> Self {
        Self {
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
        }
    }
}

impl GoToDashboardAction {
    pub fn new(unlock_timeout: Duration) -> Self {
        Self { unlock_timeout }
    }

    pub(crate) fn machine(unlock_timeout: Duration) -> Result<M, Error> {
        M::builder("go_to_dashboard", GoToDashboardState::default(), Intermediate::none())
            .initial("GetDeviceStatus")
            .state("GetDeviceStatus", |s| {
                s.nested(
                    "get_device_status",
                    move |_ctx| GetDeviceStatusAction::machine(unlock_timeout),
                    "CheckDeviceStatus",
                    |ctx, r| match r {
                        Ok(app) => ctx.state.app = Some(app),
                        Err(e) => ctx.state.error = Some(e),
                    },
                )
            })
            .state("CheckDeviceStatus", |s| {
                s.entry(|ctx| {
                    let st = &mut ctx.state;
                    if let Some(app) = st.app.as_ref().filter(|a| !a.is_dashboard()) {
                        if st.attempts >= MAX_CLOSE_ATTEMPTS {
                            warn!("Failed to close {} after {} attempts", app.name, st.attempts);
                            st.error = Some(Error::Unknown(format!("unable to close {}", app.name)));
                        }
                    }
                })
                .always_if("Error", |ctx| ctx.state.error.is_some())
                .always_if("Success", |ctx| {
                    ctx.state.app.as_ref().map(|a| a.is_dashboard()).unwrap_or(false)
                })
                .always("CloseApp")
            })
            .state("CloseApp", |s| {
                s.task(
                    "close_app",
                    |_ctx, api| async move { api.send_command(&CloseApp).await },
                    |t| {
                        t.on_done("GetDeviceStatus", |ctx, _| ctx.state.attempts += 1)
                            .on_error("Error", |ctx, e| ctx.state.error = Some(e))
                    },
                )
            })
            .final_state("Success")
            .final_state("Error")
            .output(|ctx| match &ctx.state.error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            })
            .build()
    }
}

impl DeviceAction for GoToDashboardAction {
    type State = GoToDashboardState;
    type Output = ();

    fn make_machine(&self) -> Result<M, Error> {
        Self::machine(self.unlock_timeout)
    }
}
