// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use ledger_dmk_apdu::os::{AppAndVersion, GetAppAndVersion};
use ledger_dmk_core::{
    engine::{DeviceAction, Intermediate, Machine, UserInteractionRequired},
    Error,
};

use super::wait_for_unlock;
use crate::session::DEFAULT_UNLOCK_TIMEOUT;

/// Fetch the running application, waiting for the user to unlock the device
/// if required
///
/// ```text
/// GetAppAndVersion -> CheckStatus -> Success
///                                 -> WaitForUnlock -> GetAppAndVersion
///                                 -> Error
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct GetDeviceStatusAction {
    pub unlock_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct GetDeviceStatusState {
    app: Option<AppAndVersion>,
    locked: bool,
    error: Option<Error>,
}

type M = Machine<GetDeviceStatusState, Intermediate, AppAndVersion, Error>;

impl Default for GetDeviceStatusAction {
    fn default() -> Self {
        Self {
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
        }
    }
}

impl GetDeviceStatusAction {
    pub fn new(unlock_timeout: Duration) -> Self {
        Self { unlock_timeout }
    }

    pub(crate) fn machine(unlock_timeout: Duration) -> Result<M, Error> {
        M::builder(
            "get_device_status",
            GetDeviceStatusState::default(),
            Intermediate::none(),
        )
        .initial("GetAppAndVersion")
        .state("GetAppAndVersion", |s| {
            s.task(
                "get_app_and_version",
                |_ctx, api| async move {
                    let app = api.send_command(&GetAppAndVersion).await?;

                    let a = app.clone();
                    api.update_session_state(Box::new(move |s| s.with_current_app(a)));

                    Ok::<_, Error>(app)
                },
                |t| {
                    t.on_done("CheckStatus", |ctx, app| {
                        ctx.state.locked = false;
                        ctx.state.app = Some(app);
                    })
                    .on_error("CheckStatus", |ctx, e| match e {
                        Error::DeviceLocked => ctx.state.locked = true,
                        e => ctx.state.error = Some(e),
                    })
                },
            )
        })
        .state("CheckStatus", |s| {
            s.always_if("Error", |ctx| ctx.state.error.is_some())
                .always_if("WaitForUnlock", |ctx| ctx.state.locked)
                .always("Success")
        })
        .state("WaitForUnlock", |s| {
            s.entry(|ctx| ctx.intermediate = UserInteractionRequired::UnlockDevice.into())
                .exit(|ctx| ctx.intermediate = Intermediate::none())
                .task(
                    "wait_for_unlock",
                    move |_ctx, api| wait_for_unlock(api, unlock_timeout),
                    |t| {
                        t.on_done("GetAppAndVersion", |_ctx, _| ())
                            .on_error("Error", |ctx, e| ctx.state.error = Some(e))
                    },
                )
        })
        .final_state("Success")
        .final_state("Error")
        .output(|ctx| match (&ctx.state.error, &ctx.state.app) {
            (Some(e), _) => Err(e.clone()),
            (None, Some(app)) => Ok(app.clone()),
            (None, None) => Err(Error::Unknown("missing application status".to_string())),
        })
        .build()
    }
}

impl DeviceAction for GetDeviceStatusAction {
    type State = GetDeviceStatusState;
    type Output = AppAndVersion;

    fn make_machine(&self) -> Result<M, Error> {
        Self::machine(self.unlock_timeout)
    }
}

#[cfg(test)]
mod test {
    use futures::StreamExt;

    use ledger_dmk_apdu::DASHBOARD_APP_NAME;
    use ledger_dmk_core::{engine::ActionState, DeviceModelId, DeviceStatus, WorkflowError};
    use ledger_dmk_sim::{SimApp, SimDevice};

    use super::*;
    use crate::actions::test::{pending, sim_session};

    #[tokio::test]
    async fn reports_running_app() {
        let d = SimDevice::new(DeviceModelId::NanoX).with_app(SimApp::new("Bitcoin", "2.1.0"));
        let h = d.handle();
        let s = sim_session(d, false).await;

        let app = s.execute(&GetDeviceStatusAction::default()).result().await.unwrap();
        assert!(app.is_dashboard());
        assert_eq!(app.name, DASHBOARD_APP_NAME);

        h.launch("Bitcoin");

        let app = s.execute(&GetDeviceStatusAction::default()).result().await.unwrap();
        assert_eq!(app.name, "Bitcoin");
        assert_eq!(app.version, "2.1.0");

        assert_eq!(s.state().current_app, Some(app));
        assert_eq!(s.status(), DeviceStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_unlock() {
        let d = SimDevice::new(DeviceModelId::NanoX).with_locked(true);
        let h = d.handle();
        let s = sim_session(d, true).await;

        let exec = s.execute(&GetDeviceStatusAction::default());

        // Unlock after a while, detected by the refresher
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            h.set_locked(false);
        });

        let updates: Vec<_> = exec.collect().await;

        let p = pending(&updates);
        assert!(p.contains(&UserInteractionRequired::UnlockDevice.into()));

        match updates.last() {
            Some(ActionState::Completed(app)) => assert!(app.is_dashboard()),
            other => panic!("unexpected terminal state: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_timeout() {
        let d = SimDevice::new(DeviceModelId::NanoX).with_locked(true);
        let s = sim_session(d, true).await;

        let r = s
            .execute(&GetDeviceStatusAction::new(Duration::from_secs(5)))
            .result()
            .await;

        assert_eq!(r, Err(WorkflowError::UnlockTimeout.into()));
        assert_eq!(s.status(), DeviceStatus::Locked);
    }
}
