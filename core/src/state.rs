// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Versioned session state snapshots

use ledger_dmk_apdu::os::{AppAndVersion, ListedApp};
use strum::Display;

use crate::device::{DeviceModelId, DeviceStatus};

/// Session type, promoted once the device has answered a probe
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionStateType {
    Connected,
    ReadyWithoutSecureChannel,
}

/// Catalog metadata for an installed application
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    pub hash: String,
    pub hash_code_data: String,
    pub description: Option<String>,
}

/// Immutable session snapshot, replaced on every change
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionState {
    /// Monotonic version, bumped by the publisher on every replacement
    pub version: u64,

    pub session_type: SessionStateType,

    pub device_status: DeviceStatus,

    pub device_model: DeviceModelId,

    pub device_name: Option<String>,

    /// Running application, when known
    pub current_app: Option<AppAndVersion>,

    /// Installed applications, when listed
    pub installed_apps: Vec<ListedApp>,

    /// Catalog metadata for installed applications
    pub catalog: Vec<AppMetadata>,
}

impl SessionState {
    /// Initial state for a newly connected session
    pub fn new(device_model: DeviceModelId) -> Self {
        Self {
            version: 0,
            session_type: SessionStateType::Connected,
            device_status: DeviceStatus::Connected,
            device_model,
            device_name: None,
            current_app: None,
            installed_apps: vec![],
            catalog: vec![],
        }
    }

    pub fn with_status(mut self, device_status: DeviceStatus) -> Self {
        self.device_status = device_status;
        self
    }

    pub fn with_current_app(mut self, app: AppAndVersion) -> Self {
        self.current_app = Some(app);
        self.session_type = SessionStateType::ReadyWithoutSecureChannel;
        self
    }

    pub fn with_installed_apps(mut self, apps: Vec<ListedApp>, catalog: Vec<AppMetadata>) -> Self {
        self.installed_apps = apps;
        self.catalog = catalog;
        self
    }

    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name = Some(name.to_string());
        self
    }
}
