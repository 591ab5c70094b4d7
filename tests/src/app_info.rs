// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device status tests

use std::future::Future;

use log::info;

use ledger_dmk::{
    actions::GetDeviceStatusAction, core::engine::UserInteractionRequired, transport::Transport,
    DeviceStatus, Session,
};

/// Fetch the running application, checking it is recorded in the session state
pub async fn test<T, F>(
    s: &Session<T>,
    approve: impl Fn(UserInteractionRequired) -> F,
) -> anyhow::Result<()>
where
    T: Transport + 'static,
    F: Future<Output = ()>,
{
    let a = GetDeviceStatusAction::new(s.options().unlock_timeout);

    let (app, _) = crate::drive(s, &a, approve).await?;

    info!("running app: {} ({})", app.name, app.version);

    let state = s.state();
    assert_eq!(state.current_app.as_ref(), Some(&app));
    assert_eq!(state.device_status, DeviceStatus::Connected);

    Ok(())
}
