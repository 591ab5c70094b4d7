// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Scenario tests for ledger device sessions.
//!
//! Generic over [ledger_dmk::transport::Transport] for reuse against the
//! simulator, a speculos instance or a physical device.
//!

use std::future::Future;

use futures::StreamExt;
use log::{debug, info};

use ledger_dmk::{
    core::engine::{ActionState, DeviceAction, UserInteractionRequired},
    transport::Transport,
    Session,
};

pub mod app_info;

pub mod open_app;

pub mod list_apps;

pub mod status;

/// Execute an action, calling `approve` each time a new user interaction is
/// requested
///
/// Returns the action output and the sequence of requested interactions.
pub async fn drive<T, A, F>(
    s: &Session<T>,
    action: &A,
    approve: impl Fn(UserInteractionRequired) -> F,
) -> anyhow::Result<(A::Output, Vec<UserInteractionRequired>)>
where
    T: Transport + 'static,
    A: DeviceAction,
    F: Future<Output = ()>,
{
    let mut exec = s.execute(action);
    let mut requested = vec![];
    let mut current = UserInteractionRequired::None;

    while let Some(u) = exec.next().await {
        match u {
            ActionState::Pending(i) if i.required_user_interaction != current => {
                current = i.required_user_interaction;

                if current != UserInteractionRequired::None {
                    info!("Interaction required: {}", current);
                    requested.push(current);

                    approve(current).await;
                }
            }
            ActionState::Pending(_) => (),
            ActionState::Completed(o) => return Ok((o, requested)),
            ActionState::Error(e) => {
                debug!("Action failed after interactions: {:?}", requested);
                return Err(e.into());
            }
        }
    }

    Err(anyhow::anyhow!("action ended without result"))
}
