// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Installed application listing tests

use std::{collections::HashSet, future::Future};

use log::info;

use ledger_dmk::{
    actions::ListAppsAction, core::engine::UserInteractionRequired, transport::Transport, Session,
};

/// List installed applications, checking the expected applications are present
pub async fn test<T, F>(
    s: &Session<T>,
    approve: impl Fn(UserInteractionRequired) -> F,
    expected: &[String],
) -> anyhow::Result<()>
where
    T: Transport + 'static,
    F: Future<Output = ()>,
{
    let a = ListAppsAction::new(s.options().unlock_timeout);

    let (apps, requested) = crate::drive(s, &a, approve).await?;

    for a in &apps {
        info!("  {:24} flags: {:04x}", a.name, a.flags);
    }

    assert!(requested.contains(&UserInteractionRequired::AllowListApps));

    // Pages are concatenated without duplicates
    let names: HashSet<_> = apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names.len(), apps.len());

    for e in expected {
        assert!(names.contains(e.as_str()), "missing app: {e}");
    }

    // Listing releases its refresher blocker
    assert!(s.blockers().is_empty());
    assert_eq!(s.refresher().is_running(), s.refresher().is_enabled());

    Ok(())
}
