// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ledger Device Management Library (and CLI)
//!
//! This provides device discovery ([`LedgerProvider`]), device sessions
//! ([`Session`]) serialising requests to a connected device while polling
//! its status in the background, and a library of device [actions]
//! executed through the [`ledger_dmk_core::engine`].

use std::fmt::Debug;

use async_trait::async_trait;

#[cfg(feature = "transport_hid")]
use hidapi::HidApi;

/// Re-export transports for consumer use
pub mod transport;
use transport::*;

/// Re-export `ledger-dmk-apdu` for consumers
pub use ledger_dmk_apdu::{self as apdu};

/// Re-export `ledger-dmk-core` for consumers
pub use ledger_dmk_core::{self as core, DeviceModelId, DeviceStatus, Error, SessionState};

mod error;
pub use error::ProviderError;

pub mod session;
pub use session::{SendOptions, Session, SessionOptions};

pub mod actions;

pub mod manager;

/// Ledger provider manages ledger devices and connections
pub struct LedgerProvider {
    #[cfg(feature = "transport_hid")]
    hid_api: HidApi,
    #[cfg(feature = "transport_tcp")]
    tcp: TcpOptions,
}

/// Device discovery filter
#[derive(Copy, Clone, Debug, PartialEq, clap::ValueEnum, strum::Display)]
#[non_exhaustive]
pub enum Filter {
    /// List all devices available using supported transport
    Any,
    /// List only HID devices
    Hid,
    /// List only TCP devices
    Tcp,
}

/// Ledger device information for listing, used by connect
#[derive(Debug)]
pub enum LedgerInfo {
    #[cfg(feature = "transport_hid")]
    Hid(hidapi::DeviceInfo),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpOptions),
}

impl LedgerInfo {
    /// Device model, derived from the USB product id for HID devices
    pub fn model(&self) -> Option<DeviceModelId> {
        match self {
            #[cfg(feature = "transport_hid")]
            LedgerInfo::Hid(i) => DeviceModelId::from_usb_product_id(i.product_id()),
            #[cfg(feature = "transport_tcp")]
            LedgerInfo::Tcp(o) => Some(o.model),
            #[cfg(not(any(feature = "transport_hid", feature = "transport_tcp")))]
            _ => None,
        }
    }
}

impl LedgerProvider {
    /// Create a new ledger provider
    /// NOTE: only one provider may exist at a time (workaround for global HID context errors on macos/m1)
    pub fn new() -> Result<Self, ProviderError> {
        Ok(Self {
            #[cfg(feature = "transport_hid")]
            hid_api: HidApi::new().map_err(|_| ProviderError::HidInit)?,
            #[cfg(feature = "transport_tcp")]
            tcp: TcpOptions::default(),
        })
    }

    /// Set the simulator address probed by [`LedgerProvider::list_devices`]
    #[cfg(feature = "transport_tcp")]
    pub fn with_tcp_options(mut self, tcp: TcpOptions) -> Self {
        self.tcp = tcp;
        self
    }

    /// List available ledger devices
    #[allow(unused_variables)]
    pub async fn list_devices(&self, filter: Filter) -> Vec<LedgerInfo> {
        let mut devices = vec![];

        #[cfg(feature = "transport_hid")]
        if filter == Filter::Any || filter == Filter::Hid {
            TransportHid::list(&self.hid_api).cloned().for_each(|d| {
                devices.push(LedgerInfo::Hid(d));
            });
        }

        #[cfg(feature = "transport_tcp")]
        if filter == Filter::Any || filter == Filter::Tcp {
            // Try connecting to the simulator port
            let o = self.tcp.clone();
            if let Ok(_t) = tokio::net::TcpStream::connect(o.socket_addr()).await {
                // Return port if connection succeeded
                devices.push(LedgerInfo::Tcp(o));
            };
        }

        log::debug!("Found {} devices: {:?}", devices.len(), devices);

        devices
    }
}

impl std::fmt::Display for LedgerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "transport_hid")]
            LedgerInfo::Hid(hid_info) => {
                write!(
                    f,
                    "{:16} (USB, {:04x}:{:04x}, {})",
                    hid_info.product_string().unwrap_or("UNKNOWN"),
                    hid_info.vendor_id(),
                    hid_info.product_id(),
                    hid_info.serial_number().unwrap_or("UNKNOWN"),
                )
            }
            #[cfg(feature = "transport_tcp")]
            LedgerInfo::Tcp(tcp_info) => {
                write!(
                    f,
                    "{:16} (TCP, {}:{}, {})",
                    "Simulator", tcp_info.addr, tcp_info.port, tcp_info.model
                )
            }
            #[cfg(not(any(feature = "transport_hid", feature = "transport_tcp")))]
            _ => write!(f, "unavailable"),
        }
    }
}

/// Connect trait for supported transports
#[async_trait]
pub trait Connect<T: Transport> {
    type Options: Debug;

    /// Connect to the specified device, opening a session
    async fn connect(&self, info: &Self::Options, opts: SessionOptions) -> Result<Session<T>, ProviderError>;
}

/// Generic connect implementation
#[cfg(any(feature = "transport_hid", feature = "transport_tcp"))]
#[async_trait]
impl Connect<GenericTransport> for LedgerProvider {
    type Options = LedgerInfo;

    async fn connect(
        &self,
        info: &Self::Options,
        opts: SessionOptions,
    ) -> Result<Session<GenericTransport>, ProviderError> {
        let model = info.model().ok_or(ProviderError::NoDevice)?;

        let t = match info {
            #[cfg(feature = "transport_hid")]
            LedgerInfo::Hid(hid_info) => {
                // Connect to device
                let t = TransportHid::open(&self.hid_api, hid_info)?;

                GenericTransport::Hid(t)
            }
            #[cfg(feature = "transport_tcp")]
            LedgerInfo::Tcp(tcp_info) => {
                // Connect to simulator
                let t = TransportTcp::new(tcp_info.clone()).await?;

                GenericTransport::Tcp(t)
            }
        };

        // Open session
        let s = Session::open(t, model, opts).await?;

        Ok(s)
    }
}

/// Connect implementation for HID devices
#[cfg(feature = "transport_hid")]
#[async_trait]
impl Connect<TransportHid> for LedgerProvider {
    type Options = hidapi::DeviceInfo;

    async fn connect(
        &self,
        info: &Self::Options,
        opts: SessionOptions,
    ) -> Result<Session<TransportHid>, ProviderError> {
        let model = DeviceModelId::from_usb_product_id(info.product_id()).ok_or(ProviderError::NoDevice)?;

        // Connect to device
        let t = TransportHid::open(&self.hid_api, info)?;

        // Open session
        let s = Session::open(t, model, opts).await?;

        Ok(s)
    }
}

/// Connect implementation for TCP devices
#[cfg(feature = "transport_tcp")]
#[async_trait]
impl Connect<TransportTcp> for LedgerProvider {
    type Options = TcpOptions;

    async fn connect(
        &self,
        info: &Self::Options,
        opts: SessionOptions,
    ) -> Result<Session<TransportTcp>, ProviderError> {
        // Connect to simulator
        let t = TransportTcp::new(info.clone()).await?;

        // Open session
        let s = Session::open(t, info.model, opts).await?;

        Ok(s)
    }
}
