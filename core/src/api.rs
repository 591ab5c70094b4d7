// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device API available to executing actions

use futures::stream::BoxStream;
use log::debug;

use ledger_dmk_apdu::{Command, ResponseFrame};

use crate::{device::DeviceModelId, state::SessionState, Error};

/// Session functions available to actions during execution
///
/// Implemented by the session, actions hold a shared reference for the
/// duration of one execution.
#[async_trait::async_trait]
pub trait DeviceApi: Send + Sync {
    /// Send a raw request frame as a foreground request
    async fn send_raw_frame(&self, frame: &[u8]) -> Result<ResponseFrame, Error>;

    /// Send a raw request frame that waits on user confirmation, allowing
    /// the longer interaction timeout
    async fn send_interactive_frame(&self, frame: &[u8]) -> Result<ResponseFrame, Error> {
        self.send_raw_frame(frame).await
    }

    /// Model of the connected device
    fn device_model(&self) -> DeviceModelId;

    /// Current session state snapshot
    fn session_state(&self) -> SessionState;

    /// Atomically replace the session state snapshot
    fn update_session_state(&self, f: Box<dyn FnOnce(SessionState) -> SessionState + Send + '_>);

    /// Subscribe to session state changes, starting with the current snapshot
    fn subscribe(&self) -> BoxStream<'static, SessionState>;

    /// Suspend the refresher until the returned blocker is released
    fn disable_refresher(&self, name: &str) -> RefresherBlocker;
}

impl dyn DeviceApi {
    /// Encode and send a command, parsing the response for the session's
    /// device model
    pub async fn send_command<C: Command>(&self, cmd: &C) -> Result<C::Response, Error> {
        let req = cmd.request()?;

        debug!("Sending command: {}", cmd.name());

        let resp = self.send_raw_frame(&req.to_bytes()).await?;
        let v = cmd.parse(&resp, self.device_model())?;

        Ok(v)
    }

    /// Encode and send a command requiring user confirmation
    pub async fn send_interactive_command<C: Command>(&self, cmd: &C) -> Result<C::Response, Error> {
        let req = cmd.request()?;

        debug!("Sending interactive command: {}", cmd.name());

        let resp = self.send_interactive_frame(&req.to_bytes()).await?;
        let v = cmd.parse(&resp, self.device_model())?;

        Ok(v)
    }
}

/// Named refresher suspension, released explicitly or on drop
pub struct RefresherBlocker {
    name: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl RefresherBlocker {
    pub fn new(name: &str, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the blocker
    pub fn release(mut self) {
        if let Some(f) = self.release.take() {
            f()
        }
    }
}

impl Drop for RefresherBlocker {
    fn drop(&mut self) {
        if let Some(f) = self.release.take() {
            f()
        }
    }
}

impl core::fmt::Debug for RefresherBlocker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RefresherBlocker")
            .field("name", &self.name)
            .finish()
    }
}
