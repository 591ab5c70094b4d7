// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Scenario tests over an in-process simulated device

use std::sync::Arc;

use ledger_dmk::{
    actions::{ListAppsWithMetadataAction, SendCommandInAppAction},
    apdu::os::{CloseApp, GetAppAndVersion, OpenApp},
    core::{engine::UserInteractionRequired, AppMetadata},
    manager::StaticCatalog,
    DeviceModelId, DeviceStatus, Session,
};
use ledger_dmk_tests::*;

mod helpers;
use helpers::*;

const MODELS: &[DeviceModelId] = &[
    DeviceModelId::NanoS,
    DeviceModelId::NanoSP,
    DeviceModelId::NanoX,
    DeviceModelId::Stax,
];

#[tokio::test]
async fn app_info() -> anyhow::Result<()> {
    setup_logging();

    for m in MODELS {
        let d = device(*m);
        let s = Session::open(d, *m, options(true)).await?;

        app_info::test(&s, approve).await?;

        s.close().await?;
    }

    Ok(())
}

#[tokio::test]
async fn open_app() -> anyhow::Result<()> {
    setup_logging();

    for m in MODELS {
        let d = device(*m);
        let h = d.handle();
        h.launch("Ethereum");

        let s = Session::open(d, *m, options(true)).await?;

        open_app::test(&s, approve, "Solana").await?;

        assert_eq!(h.running_app(), None);
        assert_eq!(h.count::<OpenApp>(), 1);
        assert_eq!(h.count::<CloseApp>(), 2);

        s.close().await?;
    }

    Ok(())
}

#[tokio::test]
async fn list_apps() -> anyhow::Result<()> {
    setup_logging();

    let d = device(DeviceModelId::NanoX);
    let s = Session::open(d, DeviceModelId::NanoX, options(true)).await?;

    let expected = vec!["Bitcoin".to_string(), "Solana".to_string()];
    list_apps::test(&s, approve, &expected).await?;

    s.close().await?;

    Ok(())
}

#[tokio::test]
async fn status() -> anyhow::Result<()> {
    setup_logging();

    let s = Session::open(device(DeviceModelId::Stax), DeviceModelId::Stax, options(false)).await?;

    status::test(&s).await?;

    s.close().await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unlock_during_workflow() -> anyhow::Result<()> {
    setup_logging();

    let d = device(DeviceModelId::NanoX).with_locked(true);
    let h = d.handle();

    let s = Session::open(d, DeviceModelId::NanoX, options(true)).await?;

    // Unlock once the workflow is waiting on the user
    let h1 = h.clone();
    let unlock = move |i: UserInteractionRequired| {
        let h = h1.clone();
        async move {
            if i == UserInteractionRequired::UnlockDevice {
                h.set_locked(false);
            }
        }
    };

    let a = SendCommandInAppAction::new(
        "Bitcoin",
        GetAppAndVersion,
        UserInteractionRequired::VerifyAddress,
    );
    let (app, requested) = drive(&s, &a, unlock).await?;

    assert_eq!(app.name, "Bitcoin");
    assert_eq!(
        requested,
        vec![
            UserInteractionRequired::UnlockDevice,
            UserInteractionRequired::ConfirmOpenApp,
            UserInteractionRequired::VerifyAddress,
        ]
    );
    assert_eq!(s.status(), DeviceStatus::Connected);

    s.close().await?;

    Ok(())
}

#[tokio::test]
async fn catalog_metadata() -> anyhow::Result<()> {
    setup_logging();

    let d = device(DeviceModelId::NanoSP);
    let catalog: Vec<_> = d
        .handle()
        .apps()
        .iter()
        .map(|a| AppMetadata {
            name: a.name.clone(),
            version: a.version.clone(),
            hash: hex::encode(a.hash),
            hash_code_data: hex::encode(a.hash_code_data),
            description: Some(format!("{} wallet", a.name)),
        })
        .collect();

    let s = Session::open(d, DeviceModelId::NanoSP, options(true)).await?;

    let a = ListAppsWithMetadataAction::new(Arc::new(StaticCatalog::new(catalog.clone())));
    let (apps, _) = drive(&s, &a, approve).await?;

    assert_eq!(apps, catalog);
    assert_eq!(s.state().catalog, catalog);
    assert_eq!(s.state().installed_apps.len(), catalog.len());

    // Refresher resumes after the listing
    assert!(s.refresher().is_running());

    s.close().await?;

    Ok(())
}
