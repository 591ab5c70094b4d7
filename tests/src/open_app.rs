// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Application lifecycle tests

use std::future::Future;

use log::info;

use ledger_dmk::{
    actions::{GetDeviceStatusAction, GoToDashboardAction, OpenAppAction},
    core::engine::UserInteractionRequired,
    transport::Transport,
    Session,
};

/// Open the named application from the dashboard, then close it again
pub async fn test<T, F>(
    s: &Session<T>,
    approve: impl Fn(UserInteractionRequired) -> F,
    name: &str,
) -> anyhow::Result<()>
where
    T: Transport + 'static,
    F: Future<Output = ()>,
{
    let unlock_timeout = s.options().unlock_timeout;
    let status = GetDeviceStatusAction::new(unlock_timeout);

    // Start from the dashboard so opening always prompts
    crate::drive(s, &GoToDashboardAction::new(unlock_timeout), &approve).await?;

    info!("Opening app: {}", name);

    let open = OpenAppAction::new(name).with_unlock_timeout(unlock_timeout);
    let (_, requested) = crate::drive(s, &open, &approve).await?;
    assert!(requested.contains(&UserInteractionRequired::ConfirmOpenApp));

    let (app, _) = crate::drive(s, &status, &approve).await?;
    assert_eq!(app.name, name);

    // Opening a running app is a no-op
    let (_, requested) = crate::drive(s, &open, &approve).await?;
    assert!(requested.is_empty());

    info!("Closing app: {}", name);

    crate::drive(s, &GoToDashboardAction::new(unlock_timeout), &approve).await?;

    let (app, _) = crate::drive(s, &status, &approve).await?;
    assert!(app.is_dashboard());

    Ok(())
}
