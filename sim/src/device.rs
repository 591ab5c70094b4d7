// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated device state and APDU handling

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use encdec::Encode;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum::Display;

use ledger_dmk_apdu::{prelude::*, DASHBOARD_APP_NAME};
use ledger_dmk_core::{Transport, TransportError};

/// Applications returned per ListApps page
pub const LIST_APPS_PAGE_SIZE: usize = 2;

/// Simulated OS version
pub const SIM_OS_VERSION: &str = "2.1.0";

/// Target id reported by the simulated firmware
const SIM_TARGET_ID: u32 = 0x3300_0004;

/// Installed application
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SimApp {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub flags: u16,
    #[serde(default)]
    pub hash: [u8; 32],
    #[serde(default)]
    pub hash_code_data: [u8; 32],
}

impl SimApp {
    /// Create an app with hashes derived from its name and version
    pub fn new(name: &str, version: &str) -> Self {
        let mut hash = [0u8; 32];
        let mut hash_code_data = [0u8; 32];

        for (i, b) in name.bytes().chain(version.bytes()).enumerate() {
            hash[i % 32] ^= b;
            hash_code_data[(i + 7) % 32] ^= b.rotate_left(3);
        }

        Self {
            name: name.to_string(),
            version: version.to_string(),
            flags: 0,
            hash,
            hash_code_data,
        }
    }

    fn listed(&self) -> ListedApp {
        ListedApp {
            name: self.name.clone(),
            flags: self.flags,
            hash_code_data: self.hash_code_data,
            hash: self.hash,
        }
    }
}

/// User response to on-device confirmation prompts
#[derive(Copy, Clone, PartialEq, Debug, Display)]
pub enum Approval {
    /// Approve immediately
    Approve,
    /// Refuse immediately
    Refuse,
    /// Approve after a delay
    Delay(Duration),
}

/// Transport fault injected into the next exchange
#[derive(Copy, Clone, PartialEq, Debug, Display)]
pub enum Fault {
    /// Request times out
    Timeout,
    /// Link drops, closing the transport
    Disconnect,
    /// I/O failure, link remains usable
    Io,
}

/// Logged request and response status
#[derive(Clone, PartialEq, Debug)]
pub struct Exchange {
    pub header: Option<ApduHeader>,
    pub status: u16,
}

struct State {
    model: DeviceModelId,
    apps: Vec<SimApp>,
    running: Option<SimApp>,
    locked: bool,
    approval: Approval,
    latency: Duration,
    faults: VecDeque<Fault>,
    log: Vec<Exchange>,
    list_cursor: Option<usize>,
    closed: bool,
}

/// Cloneable handle for inspecting and controlling a [`SimDevice`]
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<State>>,
}

/// Simulated device implementing [`Transport`]
pub struct SimDevice {
    handle: SimHandle,
}

impl SimDevice {
    /// Create a simulated device on the dashboard with no apps installed
    pub fn new(model: DeviceModelId) -> Self {
        Self {
            handle: SimHandle {
                state: Arc::new(Mutex::new(State {
                    model,
                    apps: vec![],
                    running: None,
                    locked: false,
                    approval: Approval::Approve,
                    latency: Duration::ZERO,
                    faults: VecDeque::new(),
                    log: vec![],
                    list_cursor: None,
                    closed: false,
                })),
            },
        }
    }

    /// Install an application
    pub fn with_app(self, app: SimApp) -> Self {
        self.handle.lock().apps.push(app);
        self
    }

    /// Install applications
    pub fn with_apps(self, apps: impl IntoIterator<Item = SimApp>) -> Self {
        self.handle.lock().apps.extend(apps);
        self
    }

    /// Set the initial lock state
    pub fn with_locked(self, locked: bool) -> Self {
        self.handle.set_locked(locked);
        self
    }

    /// Set the user approval policy
    pub fn with_approval(self, approval: Approval) -> Self {
        self.handle.set_approval(approval);
        self
    }

    /// Set per-exchange response latency
    pub fn with_latency(self, latency: Duration) -> Self {
        self.handle.set_latency(latency);
        self
    }

    /// Fetch a control handle for this device
    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    pub fn model(&self) -> DeviceModelId {
        self.lock().model
    }

    pub fn set_locked(&self, locked: bool) {
        debug!("Sim {}", if locked { "locked" } else { "unlocked" });
        self.lock().locked = locked;
    }

    pub fn is_locked(&self) -> bool {
        self.lock().locked
    }

    pub fn set_approval(&self, approval: Approval) {
        self.lock().approval = approval;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Queue a fault for a following exchange
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Name of the running application, `None` on the dashboard
    pub fn running_app(&self) -> Option<String> {
        self.lock().running.as_ref().map(|a| a.name.clone())
    }

    /// Start an application directly, bypassing approval
    pub fn launch(&self, name: &str) -> bool {
        let mut s = self.lock();
        match s.apps.iter().find(|a| a.name == name).cloned() {
            Some(a) => {
                s.running = Some(a);
                true
            }
            None => false,
        }
    }

    pub fn apps(&self) -> Vec<SimApp> {
        self.lock().apps.clone()
    }

    /// Exchanges handled so far
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock().log.clone()
    }

    /// Number of exchanges matching a command type
    pub fn count<C: ApduStatic>(&self) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|e| matches!(&e.header, Some(h) if is::<C>(h)))
            .count()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Handle a raw request frame, returning the raw response
    pub async fn process(&self, frame: &[u8]) -> Vec<u8> {
        let req = match RequestFrame::try_from(frame) {
            Ok(r) => r,
            Err(_) => {
                self.record(None, StatusWord::WrongLength as u16);
                return status(StatusWord::WrongLength).to_bytes();
            }
        };

        let resp = self.handle(&req).await;

        self.record(Some(*req.header()), resp.status());

        resp.to_bytes()
    }

    fn record(&self, header: Option<ApduHeader>, status: u16) {
        trace!("Sim exchange {:02x?} -> {:04x}", header, status);
        self.lock().log.push(Exchange { header, status });
    }

    async fn handle(&self, req: &RequestFrame) -> ResponseFrame {
        let h = req.header();

        if self.is_locked() {
            return status(StatusWord::Locked);
        }

        let r = if is::<GetAppAndVersion>(h) {
            self.app_and_version()
        } else if is::<GetOsVersion>(h) {
            self.os_version()
        } else if is::<OpenApp>(h) {
            self.open_app(req.data()).await
        } else if is::<CloseApp>(h) {
            self.lock().running = None;
            Ok(ResponseFrame::new(vec![], StatusWord::Ok as u16))
        } else if is::<ListApps>(h) {
            self.list_apps(true).await
        } else if is::<ListAppsContinue>(h) {
            self.list_apps(false).await
        } else {
            return status(StatusWord::InsNotSupported);
        };

        r.unwrap_or_else(|_| status(StatusWord::InvalidData))
    }

    fn app_and_version(&self) -> Result<ResponseFrame, ApduError> {
        let v = match &self.lock().running {
            Some(a) => AppAndVersion::new(&a.name, &a.version),
            None => AppAndVersion::new(DASHBOARD_APP_NAME, SIM_OS_VERSION),
        };

        ok(&v)
    }

    fn os_version(&self) -> Result<ResponseFrame, ApduError> {
        if self.lock().running.is_some() {
            return Ok(status(StatusWord::ClaNotSupported));
        }

        ok(&OsVersion {
            target_id: SIM_TARGET_ID,
            se_version: SIM_OS_VERSION.to_string(),
            se_flags: vec![0x00, 0x00, 0x00, 0x00],
            mcu_seph_version: "1.0".to_string(),
            mcu_bootloader_version: "1.0".to_string(),
        })
    }

    /// Wait for the user per the approval policy, returns false on refusal
    async fn confirm(&self) -> bool {
        let approval = self.lock().approval;

        match approval {
            Approval::Approve => true,
            Approval::Refuse => false,
            Approval::Delay(d) => {
                tokio::time::sleep(d).await;
                true
            }
        }
    }

    async fn open_app(&self, name: &[u8]) -> Result<ResponseFrame, ApduError> {
        let name = core::str::from_utf8(name).map_err(|_| ApduError::Utf8)?;

        let app = {
            let s = self.lock();
            if s.running.is_some() {
                return Ok(status(StatusWord::ConditionsNotSatisfied));
            }

            match s.apps.iter().find(|a| a.name == name) {
                Some(a) => a.clone(),
                None => return Ok(status(StatusWord::AppNotFound)),
            }
        };

        if !self.confirm().await {
            return Ok(status(StatusWord::Refused));
        }

        debug!("Sim opening app: {}", app.name);
        self.lock().running = Some(app);

        Ok(ResponseFrame::new(vec![], StatusWord::Ok as u16))
    }

    async fn list_apps(&self, first: bool) -> Result<ResponseFrame, ApduError> {
        if self.lock().running.is_some() {
            return Ok(status(StatusWord::ClaNotSupported));
        }

        if first && !self.confirm().await {
            return Ok(status(StatusWord::Refused));
        }

        let mut s = self.lock();

        let start = match (first, s.list_cursor) {
            (true, _) => 0,
            (false, Some(c)) => c,
            (false, None) => return Ok(status(StatusWord::ConditionsNotSatisfied)),
        };

        let apps: Vec<_> = s
            .apps
            .iter()
            .skip(start)
            .take(LIST_APPS_PAGE_SIZE)
            .map(SimApp::listed)
            .collect();

        s.list_cursor = match apps.is_empty() {
            true => None,
            false => Some(start + apps.len()),
        };

        ok(&ListAppsPage { apps })
    }
}

/// Check whether a header matches a command type
fn is<C: ApduStatic>(h: &ApduHeader) -> bool {
    h.cla == C::CLA && h.ins == C::INS
}

fn status(sw: StatusWord) -> ResponseFrame {
    ResponseFrame::new(vec![], sw as u16)
}

fn ok(v: &impl Encode<Error = ApduError>) -> Result<ResponseFrame, ApduError> {
    let mut b = vec![0u8; v.encode_len()?];
    let n = v.encode(&mut b)?;
    b.truncate(n);

    Ok(ResponseFrame::new(b, StatusWord::Ok as u16))
}

#[async_trait]
impl Transport for SimDevice {
    async fn exchange(&mut self, frame: &[u8], _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let (latency, fault) = {
            let mut s = self.handle.lock();
            if s.closed {
                return Err(TransportError::Closed);
            }
            (s.latency, s.faults.pop_front())
        };

        match fault {
            Some(Fault::Timeout) => return Err(TransportError::Timeout),
            Some(Fault::Disconnect) => {
                self.handle.lock().closed = true;
                return Err(TransportError::Closed);
            }
            Some(Fault::Io) => {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "injected fault",
                )))
            }
            None => (),
        }

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        Ok(self.handle.process(frame).await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle.lock().closed = true;
        Ok(())
    }
}
