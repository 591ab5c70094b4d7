// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session and refresher configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default requested polling interval
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(1000);

/// Default multiplier applied to the effective polling interval
pub const DEFAULT_INTERVAL_MULTIPLIER: u32 = 2;

/// Default timeout for device responses
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for requests awaiting on-device confirmation
pub const DEFAULT_INTERACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout waiting for the user to unlock the device
pub const DEFAULT_UNLOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Background status polling options
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RefresherOptions {
    /// Enable background polling
    pub enabled: bool,

    /// Requested polling interval, raised to the device model floor
    #[serde(with = "duration_ms", rename = "polling_interval_ms")]
    pub polling_interval: Duration,

    /// Multiplier applied to the (corrected) interval
    pub interval_multiplier: u32,
}

impl Default for RefresherOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            interval_multiplier: DEFAULT_INTERVAL_MULTIPLIER,
        }
    }
}

/// Device session options
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub refresher: RefresherOptions,

    /// Timeout for each device request
    #[serde(with = "duration_ms", rename = "request_timeout_ms")]
    pub request_timeout: Duration,

    /// Timeout for requests awaiting on-device confirmation
    #[serde(with = "duration_ms", rename = "interaction_timeout_ms")]
    pub interaction_timeout: Duration,

    /// Timeout waiting for the user to unlock the device in workflows
    #[serde(with = "duration_ms", rename = "unlock_timeout_ms")]
    pub unlock_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresher: RefresherOptions::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            interaction_timeout: DEFAULT_INTERACTION_TIMEOUT,
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
        }
    }
}

impl SessionOptions {
    /// Load options from a JSON string, missing fields take defaults
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Serialize durations as integer milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
