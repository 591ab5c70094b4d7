// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{sync::Arc, time::Duration};

use log::debug;

use ledger_dmk_apdu::os::ListedApp;
use ledger_dmk_core::{
    engine::{DeviceAction, Intermediate, Machine},
    AppMetadata, Error, WorkflowError,
};

use super::ListAppsAction;
use crate::{manager::ManagerApi, session::DEFAULT_UNLOCK_TIMEOUT};

/// List installed applications and resolve their catalog metadata
///
/// ```text
/// ListApps -> CheckListApps -> FetchMetadata -> Success
///                           -> Error
/// ```
///
/// Installed applications and their metadata are recorded in the session
/// state. Applications missing from the catalog fail the action with
/// [`WorkflowError::MissingAppMetadata`].
#[derive(Clone)]
pub struct ListAppsWithMetadataAction {
    pub manager: Arc<dyn ManagerApi>,
    pub unlock_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct ListAppsWithMetadataState {
    apps: Vec<ListedApp>,
    catalog: Vec<AppMetadata>,
    error: Option<Error>,
}

type M = Machine<ListAppsWithMetadataState, Intermediate, Vec<AppMetadata>, Error>;

impl ListAppsWithMetadataAction {
    pub fn new(manager: Arc<dyn ManagerApi>) -> Self {
        Self {
            manager,
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
        }
    }
}

/// Resolve metadata for listed apps, failing on any missing entry
async fn fetch_metadata(
    manager: Arc<dyn ManagerApi>,
    apps: Vec<ListedApp>,
) -> Result<Vec<AppMetadata>, Error> {
    let metadata = manager.app_metadata(&apps).await?;

    let missing: Vec<_> = apps
        .iter()
        .zip(metadata.iter())
        .filter(|(_, m)| m.is_none())
        .map(|(a, _)| a.name.clone())
        .collect();

    if !missing.is_empty() || metadata.len() != apps.len() {
        return Err(WorkflowError::MissingAppMetadata(missing).into());
    }

    debug!("Resolved metadata for {} apps", apps.len());

    Ok(metadata.into_iter().flatten().collect())
}

impl DeviceAction for ListAppsWithMetadataAction {
    type State = ListAppsWithMetadataState;
    type Output = Vec<AppMetadata>;

    fn make_machine(&self) -> Result<M, Error> {
        let unlock_timeout = self.unlock_timeout;
        let manager = self.manager.clone();

        M::builder(
            "list_apps_with_metadata",
            ListAppsWithMetadataState::default(),
            Intermediate::none(),
        )
        .initial("ListApps")
        .state("ListApps", |s| {
            s.nested(
                "list_apps",
                move |_ctx| ListAppsAction::machine(unlock_timeout),
                "CheckListApps",
                |ctx, r| match r {
                    Ok(apps) => ctx.state.apps = apps,
                    Err(e) => ctx.state.error = Some(e),
                },
            )
        })
        .state("CheckListApps", |s| {
            s.always_if("Error", |ctx| ctx.state.error.is_some())
                .always("FetchMetadata")
        })
        .state("FetchMetadata", |s| {
            s.task(
                "fetch_metadata",
                move |ctx, api| {
                    let apps = ctx.state.apps.clone();
                    let manager = manager.clone();

                    async move {
                        let catalog = fetch_metadata(manager, apps.clone()).await?;

                        let c = catalog.clone();
                        api.update_session_state(Box::new(move |s| s.with_installed_apps(apps, c)));

                        Ok::<_, Error>(catalog)
                    }
                },
                |t| {
                    t.on_done("Success", |ctx, catalog| ctx.state.catalog = catalog)
                        .on_error("Error", |ctx, e| ctx.state.error = Some(e))
                },
            )
        })
        .final_state("Success")
        .final_state("Error")
        .output(|ctx| match &ctx.state.error {
            Some(e) => Err(e.clone()),
            None => Ok(ctx.state.catalog.clone()),
        })
        .build()
    }
}
