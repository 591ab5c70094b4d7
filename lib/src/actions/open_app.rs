// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use ledger_dmk_apdu::os::{AppAndVersion, OpenApp};
use ledger_dmk_core::{
    engine::{DeviceAction, Intermediate, Machine, UserInteractionRequired},
    Error, WorkflowError,
};

use super::{app_error, GetDeviceStatusAction, GoToDashboardAction};
use crate::session::DEFAULT_UNLOCK_TIMEOUT;

/// Open an application by name
///
/// ```text
/// GetDeviceStatus -> CheckApp -> Success (already open)
///                             -> OpenApp -> GetDeviceStatus
///                             -> GoToDashboard -> CheckDashboard -> OpenApp
///                             -> Error
/// ```
///
/// The application must be running after a single open attempt, otherwise
/// the action fails with [`WorkflowError::AppNotOpened`].
#[derive(Clone, PartialEq, Debug)]
pub struct OpenAppAction {
    pub name: String,
    pub unlock_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct OpenAppState {
    app: Option<AppAndVersion>,
    opened: bool,
    error: Option<Error>,
}

type M = Machine<OpenAppState, Intermediate, (), Error>;

impl OpenAppAction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
        }
    }

    pub fn with_unlock_timeout(mut self, unlock_timeout: Duration) -> Self {
        self.unlock_timeout = unlock_timeout;
        self
    }

    pub(crate) fn machine(name: &str, unlock_timeout: Duration) -> Result<M, Error> {
        let (n1, n2, n3) = (name.to_string(), name.to_string(), name.to_string());

        M::builder("open_app", OpenAppState::default(), Intermediate::none())
            .initial("GetDeviceStatus")
            .state("GetDeviceStatus", |s| {
                s.nested(
                    "get_device_status",
                    move |_ctx| GetDeviceStatusAction::machine(unlock_timeout),
                    "CheckApp",
                    |ctx, r| match r {
                        Ok(app) => ctx.state.app = Some(app),
                        Err(e) => ctx.state.error = Some(e),
                    },
                )
            })
            .state("CheckApp", |s| {
                s.entry(move |ctx| {
                    let st = &mut ctx.state;
                    let running = st.app.as_ref().map(|a| a.name == n1).unwrap_or(false);

                    if st.opened && !running && st.error.is_none() {
                        st.error = Some(WorkflowError::AppNotOpened(n1.clone()).into());
                    }
                })
                .always_if("Error", |ctx| ctx.state.error.is_some())
                .always_if("Success", move |ctx| {
                    ctx.state.app.as_ref().map(|a| a.name == n2).unwrap_or(false)
                })
                .always_if("OpenApp", |ctx| {
                    ctx.state.app.as_ref().map(|a| a.is_dashboard()).unwrap_or(false)
                })
                .always("GoToDashboard")
            })
            .state("GoToDashboard", |s| {
                s.nested(
                    "go_to_dashboard",
                    move |_ctx| GoToDashboardAction::machine(unlock_timeout),
                    "CheckDashboard",
                    |ctx, r| {
                        if let Err(e) = r {
                            ctx.state.error = Some(e);
                        }
                    },
                )
            })
            .state("CheckDashboard", |s| {
                s.always_if("Error", |ctx| ctx.state.error.is_some())
                    .always("OpenApp")
            })
            .state("OpenApp", |s| {
                s.entry(|ctx| ctx.intermediate = UserInteractionRequired::ConfirmOpenApp.into())
                    .exit(|ctx| ctx.intermediate = Intermediate::none())
                    .task(
                        "open_app",
                        move |_ctx, api| {
                            let name = n3.clone();
                            async move {
                                api.send_interactive_command(&OpenApp::new(&name))
                                    .await
                                    .map_err(|e| app_error(e, &name))
                            }
                        },
                        |t| {
                            t.on_done("GetDeviceStatus", |ctx, _| ctx.state.opened = true)
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

impl DeviceAction for OpenAppAction {
    type State = OpenAppState;
    type Output = ();

    fn make_machine(&self) -> Result<M, Error> {
        Self::machine(&self.name, self.unlock_timeout)
    }
}
