// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device session channel
//!
//! A [`Session`] owns the transport for one connected device, serialising
//! request frames, tracking [`DeviceStatus`], publishing [`SessionState`]
//! snapshots and running the background [`Refresher`].

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{oneshot, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;

use ledger_dmk_apdu::{
    os::{GetAppAndVersion, GetOsVersion},
    Command, ResponseFrame,
};
use ledger_dmk_core::{
    engine::{DeviceAction, Execution, Intermediate},
    DeviceApi, DeviceModel, DeviceModelId, DeviceStatus, Error, RefresherBlocker, SessionState,
    Transport, TransportError,
};

mod blockers;
pub use blockers::BlockerRegistry;

mod options;
pub use options::{
    RefresherOptions, SessionOptions, DEFAULT_INTERACTION_TIMEOUT, DEFAULT_INTERVAL_MULTIPLIER,
    DEFAULT_POLLING_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_UNLOCK_TIMEOUT,
};

mod publisher;
pub use publisher::StatePublisher;

mod refresher;
use refresher::RefreshTarget;
pub use refresher::{effective_interval, Refresher};

/// Per-request send options
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SendOptions {
    /// Background polling request, bypasses the busy check and leaves
    /// status handling to the caller
    pub polling: bool,

    /// Response timeout
    pub timeout: Duration,
}

impl SendOptions {
    /// Foreground request with the provided timeout
    pub fn foreground(timeout: Duration) -> Self {
        Self {
            polling: false,
            timeout,
        }
    }

    /// Polling request with the provided timeout
    pub fn polling(timeout: Duration) -> Self {
        Self {
            polling: true,
            timeout,
        }
    }
}

/// Session for a connected device, generic over [`Transport`] types
///
/// Cloning a session returns a new handle to the same device.
pub struct Session<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T: Transport> {
    id: String,
    model: DeviceModel,
    options: SessionOptions,
    transport: Arc<Mutex<Option<T>>>,
    publisher: StatePublisher,
    blockers: BlockerRegistry,
    refresher: Refresher,
    closed: AtomicBool,
    me: Weak<Inner<T>>,
}

/// Marks a foreground send in flight, restoring the previous status if the
/// send is abandoned before it settles
struct BusyGuard<'a> {
    publisher: &'a StatePublisher,
    prev: DeviceStatus,
    armed: bool,
}

impl<'a> BusyGuard<'a> {
    /// Atomically check for and enter the busy state
    fn enter(publisher: &'a StatePublisher) -> Result<Self, Error> {
        let mut prev = None;
        let mut current = DeviceStatus::NotConnected;

        publisher.update_if(|s| {
            current = s.device_status;
            match s.device_status {
                DeviceStatus::Busy | DeviceStatus::NotConnected => None,
                status => {
                    prev = Some(status);
                    Some(s.clone().with_status(DeviceStatus::Busy))
                }
            }
        });

        match (prev, current) {
            (Some(prev), _) => Ok(Self {
                publisher,
                prev,
                armed: true,
            }),
            (None, DeviceStatus::Busy) => Err(Error::DeviceBusy),
            (None, _) => Err(Error::Disconnected),
        }
    }

    /// Leave the busy state with the provided status
    fn settle(mut self, status: DeviceStatus) {
        self.armed = false;
        Self::set(self.publisher, status);
    }

    fn set(publisher: &StatePublisher, status: DeviceStatus) {
        // Only replace our own busy marker, never a later disconnect
        publisher.update_if(|s| match s.device_status {
            DeviceStatus::Busy => Some(s.clone().with_status(status)),
            _ => None,
        });
    }
}

impl<'a> Drop for BusyGuard<'a> {
    fn drop(&mut self) {
        if self.armed {
            Self::set(self.publisher, self.prev);
        }
    }
}

impl<T: Transport + 'static> Session<T> {
    /// Open a session over the provided transport
    ///
    /// Starts the refresher when enabled, otherwise pings the device once to
    /// check the link.
    pub async fn open(t: T, model: DeviceModelId, options: SessionOptions) -> Result<Self, Error> {
        let id = format!("{:016x}", rand::random::<u64>());
        let info = DeviceModel::info(model);

        info!("Opening session {} ({})", id, info.product_name);

        let inner = Arc::new_cyclic(|me| Inner {
            id,
            refresher: Refresher::new(options.refresher.clone(), &info),
            model: info,
            options,
            transport: Arc::new(Mutex::new(Some(t))),
            publisher: StatePublisher::new(SessionState::new(model)),
            blockers: BlockerRegistry::default(),
            closed: AtomicBool::new(false),
            me: me.clone(),
        });

        let s = Self { inner };

        if s.inner.refresher.is_enabled() {
            s.inner.refresher.start(s.inner.target());
        } else {
            debug!("Refresher disabled, checking device link");

            match s.send_command(&GetAppAndVersion).await {
                Ok(app) => {
                    s.set_state(|st| st.with_current_app(app));
                }
                Err(Error::DeviceLocked) => (),
                Err(e) => return Err(e),
            }
        }

        Ok(s)
    }

    /// Session identifier for log correlation
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Device model information
    pub fn model(&self) -> &DeviceModel {
        &self.inner.model
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Current session state snapshot
    pub fn state(&self) -> SessionState {
        self.inner.publisher.current()
    }

    /// Current device status
    pub fn status(&self) -> DeviceStatus {
        self.inner.publisher.current().device_status
    }

    /// Replace the session state snapshot
    pub fn set_state(&self, f: impl FnOnce(SessionState) -> SessionState) -> SessionState {
        self.inner.publisher.update(f)
    }

    /// Subscribe to session state snapshots, starting with the current value
    pub fn subscribe(&self) -> UnboundedReceiverStream<SessionState> {
        self.inner.publisher.subscribe()
    }

    /// Access the session refresher
    pub fn refresher(&self) -> &Refresher {
        &self.inner.refresher
    }

    /// Names of held refresher blockers
    pub fn blockers(&self) -> Vec<String> {
        self.inner.blockers.held()
    }

    /// Encode and send a command as a foreground request
    pub async fn send_command<C: Command>(&self, cmd: &C) -> Result<C::Response, Error> {
        let opts = SendOptions::foreground(self.inner.options.request_timeout);
        self.inner.send_command(cmd, opts).await
    }

    /// Encode and send a command with the provided options
    pub async fn send_command_with<C: Command>(
        &self,
        cmd: &C,
        opts: SendOptions,
    ) -> Result<C::Response, Error> {
        self.inner.send_command(cmd, opts).await
    }

    /// Send a raw request frame as a foreground request
    pub async fn send_raw_frame(&self, frame: &[u8]) -> Result<ResponseFrame, Error> {
        let opts = SendOptions::foreground(self.inner.options.request_timeout);
        self.inner.send_frame(frame, opts).await
    }

    /// Send a raw request frame with the provided options
    pub async fn send_raw_frame_with(
        &self,
        frame: &[u8],
        opts: SendOptions,
    ) -> Result<ResponseFrame, Error> {
        self.inner.send_frame(frame, opts).await
    }

    /// Suspend the refresher until the returned blocker is released
    pub fn disable_refresher(&self, name: &str) -> RefresherBlocker {
        self.inner.disable_refresher(name)
    }

    /// Execute an action against this session
    pub fn execute<A: DeviceAction>(&self, action: &A) -> Execution<A::Output, Error, Intermediate> {
        action.execute(Arc::new(self.clone()))
    }

    /// Close the session
    ///
    /// Marks the device disconnected, stops the refresher, completes state
    /// streams and closes the transport. Idempotent.
    pub async fn close(&self) -> Result<(), Error> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing session {}", self.inner.id);

        self.inner.refresher.stop();
        self.inner
            .publisher
            .update(|s| s.with_status(DeviceStatus::NotConnected));
        self.inner.publisher.close();

        let t = self.inner.transport.lock().await.take();
        if let Some(mut t) = t {
            t.close().await?;
        }

        Ok(())
    }
}

impl<T: Transport + 'static> Inner<T> {
    fn target(&self) -> Weak<dyn RefreshTarget> {
        let w: Weak<dyn RefreshTarget> = self.me.clone();
        w
    }

    async fn send_command<C: Command>(&self, cmd: &C, opts: SendOptions) -> Result<C::Response, Error> {
        let req = cmd.request()?;

        debug!("Sending command: {}", cmd.name());

        let resp = self.send_frame(&req.to_bytes(), opts).await?;
        let v = cmd.parse(&resp, self.model.id)?;

        Ok(v)
    }

    async fn send_frame(&self, frame: &[u8], opts: SendOptions) -> Result<ResponseFrame, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Disconnected);
        }

        // Polling requests bypass busy handling
        if opts.polling {
            return self.exchange(frame, opts.timeout).await;
        }

        let guard = BusyGuard::enter(&self.publisher)?;

        let r = self.exchange(frame, opts.timeout).await;

        match &r {
            Ok(resp) if resp.is_locked() => guard.settle(DeviceStatus::Locked),
            Ok(_) => guard.settle(DeviceStatus::Connected),
            // Transport failures leave the previous status
            Err(_) => drop(guard),
        }

        r
    }

    /// Exchange a frame with the device
    ///
    /// The transport exchange runs on its own task holding the transport
    /// lock, so a written frame always has its response consumed even when
    /// the caller times out or is dropped. Late responses are discarded.
    async fn exchange(&self, frame: &[u8], timeout: Duration) -> Result<ResponseFrame, Error> {
        let mut t = self.transport.clone().lock_owned().await;
        if t.is_none() {
            return Err(Error::Disconnected);
        }

        debug!("[{}] TX: {}", self.id, hex::encode(frame));

        let (tx, rx) = oneshot::channel();
        let id = self.id.clone();
        let frame = frame.to_vec();

        tokio::spawn(async move {
            let r = match t.as_mut() {
                Some(t) => t.exchange(&frame, timeout).await,
                None => Err(TransportError::Closed),
            };

            if tx.send(r).is_err() {
                debug!("[{}] Discarding late response", id);
            }
        });

        let raw = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(r)) => r?,
            Ok(Err(_)) => return Err(Error::Unknown("exchange task failed".to_string())),
            Err(_) => return Err(Error::Timeout),
        };

        debug!("[{}] RX: {}", self.id, hex::encode(&raw));

        let resp = ResponseFrame::try_from(raw.as_slice())?;

        Ok(resp)
    }

    fn disable_refresher(&self, name: &str) -> RefresherBlocker {
        if self.blockers.acquire(name) {
            self.refresher.stop();
        }

        let me = self.me.clone();
        let n = name.to_string();

        RefresherBlocker::new(name, move || {
            let inner = match me.upgrade() {
                Some(i) => i,
                None => return,
            };

            if inner.blockers.release(&n) && !inner.closed.load(Ordering::SeqCst) {
                inner.refresher.restart(inner.target());
            }
        })
    }

    /// Fold a polled status into the session state
    fn fold_status(&self, f: impl FnOnce(SessionState) -> SessionState) {
        // Polling never overrides foreground or disconnected status
        self.publisher.update_if(|s| match s.device_status {
            DeviceStatus::Busy | DeviceStatus::NotConnected => None,
            _ => Some(f(s.clone())),
        });
    }
}

#[async_trait]
impl<T: Transport + 'static> RefreshTarget for Inner<T> {
    fn device_status(&self) -> DeviceStatus {
        self.publisher.current().device_status
    }

    fn is_blocked(&self) -> bool {
        !self.blockers.is_empty()
    }

    async fn refresh(&self) {
        let opts = SendOptions::polling(self.options.request_timeout);

        let app = match self.send_command(&GetAppAndVersion, opts).await {
            Ok(v) => v,
            Err(Error::DeviceLocked) => {
                self.fold_status(|s| s.with_status(DeviceStatus::Locked));
                return;
            }
            Err(e) => {
                error!("[{}] Status probe failed: {}", self.id, e);
                return;
            }
        };

        // Slow models only report locking via an OS version timeout
        if self.model.os_probe && app.is_dashboard() {
            match self.send_command(&GetOsVersion, opts).await {
                Ok(_) => (),
                Err(Error::Timeout) | Err(Error::DeviceLocked) => {
                    self.fold_status(|s| s.with_status(DeviceStatus::Locked));
                    return;
                }
                Err(e) => {
                    warn!("[{}] OS version probe failed: {}", self.id, e);
                }
            }
        }

        self.fold_status(|s| s.with_status(DeviceStatus::Connected).with_current_app(app));
    }
}

#[async_trait]
impl<T: Transport + 'static> DeviceApi for Session<T> {
    async fn send_raw_frame(&self, frame: &[u8]) -> Result<ResponseFrame, Error> {
        Session::send_raw_frame(self, frame).await
    }

    async fn send_interactive_frame(&self, frame: &[u8]) -> Result<ResponseFrame, Error> {
        let opts = SendOptions::foreground(self.inner.options.interaction_timeout);
        self.inner.send_frame(frame, opts).await
    }

    fn device_model(&self) -> DeviceModelId {
        self.inner.model.id
    }

    fn session_state(&self) -> SessionState {
        self.state()
    }

    fn update_session_state(&self, f: Box<dyn FnOnce(SessionState) -> SessionState + Send + '_>) {
        self.inner.publisher.update(f);
    }

    fn subscribe(&self) -> BoxStream<'static, SessionState> {
        Session::subscribe(self).boxed()
    }

    fn disable_refresher(&self, name: &str) -> RefresherBlocker {
        self.inner.disable_refresher(name)
    }
}
