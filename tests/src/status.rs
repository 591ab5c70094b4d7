// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session state publication tests

use std::time::Duration;

use futures::StreamExt;
use log::debug;

use ledger_dmk::{apdu::os::GetAppAndVersion, transport::Transport, DeviceStatus, Session};

/// Timeout for observing the expected status sequence
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Issue a foreground request and check subscribers observe Busy followed by
/// the settled status, with increasing versions
pub async fn test<T: Transport + 'static>(s: &Session<T>) -> anyhow::Result<()> {
    let mut states = s.subscribe();

    // Current snapshot is replayed first
    let first = states
        .next()
        .await
        .ok_or_else(|| anyhow::anyhow!("state stream closed"))?;
    debug!("initial state: {:?}", first);

    s.send_command(&GetAppAndVersion).await?;

    let mut last = first.version;
    let mut busy = false;

    let r = tokio::time::timeout(STATUS_TIMEOUT, async {
        while let Some(st) = states.next().await {
            debug!("state {}: {}", st.version, st.device_status);

            assert!(st.version > last, "versions must increase");
            last = st.version;

            match st.device_status {
                DeviceStatus::Busy => busy = true,
                DeviceStatus::Connected if busy => return Ok(()),
                DeviceStatus::NotConnected => break,
                _ => (),
            }
        }

        Err(anyhow::anyhow!("session closed before status settled"))
    })
    .await;

    match r {
        Ok(r) => r,
        Err(_) => Err(anyhow::anyhow!("timeout waiting for status updates")),
    }
}
