// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use ledger_dmk_apdu::os::{ListApps, ListAppsContinue, ListAppsPage, ListedApp};
use ledger_dmk_core::{
    engine::{DeviceAction, Intermediate, Machine, UserInteractionRequired},
    Error, RefresherBlocker,
};

use super::{app_error, GoToDashboardAction};
use crate::session::DEFAULT_UNLOCK_TIMEOUT;

/// Blocker name held while listing applications
const LIST_APPS_BLOCKER: &str = "list_apps";

/// List installed applications
///
/// ```text
/// GoToDashboard -> CheckDashboard -> ListApps -> CheckPage -> ListAppsContinue -> CheckPage ...
///                                                          -> Done -> Success
/// ```
///
/// The refresher is suspended for the duration of the listing, status probes
/// would otherwise reset the device-side listing cursor.
#[derive(Clone, PartialEq, Debug)]
pub struct ListAppsAction {
    pub unlock_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct ListAppsState {
    apps: Vec<ListedApp>,
    last: bool,
    blocker: Option<RefresherBlocker>,
    error: Option<Error>,
}

impl ListAppsState {
    fn page(&mut self, page: ListAppsPage) {
        self.last = page.is_last();
        self.apps.extend(page.apps);
    }

    fn fail(&mut self, e: Error) {
        self.blocker = None;
        self.error = Some(e);
    }
}

type M = Machine<ListAppsState, Intermediate, Vec<ListedApp>, Error>;

impl Default for ListAppsAction {
    fn default() -> Self {
        Self {
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
        }
    }
}

impl ListAppsAction {
    pub fn new(unlock_timeout: Duration) -> Self {
        Self { unlock_timeout }
    }

    pub(crate) fn machine(unlock_timeout: Duration) -> Result<M, Error> {
        M::builder("list_apps", ListAppsState::default(), Intermediate::none())
            .initial("GoToDashboard")
            .state("GoToDashboard", |s| {
                s.nested(
                    "go_to_dashboard",
                    move |_ctx| GoToDashboardAction::machine(unlock_timeout),
                    "CheckDashboard",
                    |ctx, r| {
                        if let Err(e) = r {
                            ctx.state.fail(e);
                        }
                    },
                )
            })
            .state("CheckDashboard", |s| {
                s.always_if("Error", |ctx| ctx.state.error.is_some())
                    .always("ListApps")
            })
            .state("ListApps", |s| {
                s.entry(|ctx| ctx.intermediate = UserInteractionRequired::AllowListApps.into())
                    .exit(|ctx| ctx.intermediate = Intermediate::none())
                    .task(
                        "list_apps",
                        |_ctx, api| async move {
                            let blocker = api.disable_refresher(LIST_APPS_BLOCKER);

                            let page = api
                                .send_interactive_command(&ListApps)
                                .await
                                .map_err(|e| app_error(e, ""))?;

                            Ok::<_, Error>((page, blocker))
                        },
                        |t| {
                            t.on_done("CheckPage", |ctx, (page, blocker)| {
                                ctx.state.blocker = Some(blocker);
                                ctx.state.page(page);
                            })
                            .on_error("Error", |ctx, e| ctx.state.fail(e))
                        },
                    )
            })
            .state("CheckPage", |s| {
                s.always_if("Done", |ctx| ctx.state.last)
                    .always("ListAppsContinue")
            })
            .state("ListAppsContinue", |s| {
                s.task(
                    "list_apps_continue",
                    |_ctx, api| async move { api.send_command(&ListAppsContinue).await },
                    |t| {
                        t.on_done("CheckPage", |ctx, page| ctx.state.page(page))
                            .on_error("Error", |ctx, e| ctx.state.fail(e))
                    },
                )
            })
            .state("Done", |s| {
                s.entry(|ctx| {
                    if let Some(b) = ctx.state.blocker.take() {
                        b.release();
                    }
                })
                .always("Success")
            })
            .final_state("Success")
            .final_state("Error")
            .output(|ctx| match &ctx.state.error {
                Some(e) => Err(e.clone()),
                None => Ok(ctx.state.apps.clone()),
            })
            .build()
    }
}

impl DeviceAction for ListAppsAction {
    type State = ListAppsState;
    type Output = Vec<ListedApp>;

    fn make_machine(&self) -> Result<M, Error> {
        Self::machine(self.unlock_timeout)
    }
}
