// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Generic transport abstraction for hiding underlying transport types

use std::time::Duration;

use async_trait::async_trait;
use strum::Display;

pub use ledger_dmk_core::{Transport, TransportError};

#[cfg(feature = "transport_hid")]
mod hid;
#[cfg(feature = "transport_hid")]
pub use hid::{is_ledger, TransportHid, LEDGER_VID};

#[cfg(feature = "transport_tcp")]
mod tcp;
#[cfg(feature = "transport_tcp")]
pub use tcp::{TcpOptions, TransportTcp};

/// Generic ledger transport (abstract over transport types)
#[derive(Display)]
#[non_exhaustive]
pub enum GenericTransport {
    #[cfg(feature = "transport_hid")]
    Hid(TransportHid),
    #[cfg(feature = "transport_tcp")]
    Tcp(TransportTcp),
}

/// Convert a HID transport into a generic transport
#[cfg(feature = "transport_hid")]
impl From<TransportHid> for GenericTransport {
    fn from(t: TransportHid) -> Self {
        Self::Hid(t)
    }
}

/// Convert a TCP transport into a generic transport
#[cfg(feature = "transport_tcp")]
impl From<TransportTcp> for GenericTransport {
    fn from(t: TransportTcp) -> Self {
        Self::Tcp(t)
    }
}

/// Implementation of [Transport] for [GenericTransport]
#[async_trait]
impl Transport for GenericTransport {
    async fn exchange(&mut self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.exchange(frame, timeout).await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.exchange(frame, timeout).await,
            #[cfg(not(any(feature = "transport_hid", feature = "transport_tcp")))]
            _ => Err(TransportError::Other("no transports enabled".to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.close().await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.close().await,
            #[cfg(not(any(feature = "transport_hid", feature = "transport_tcp")))]
            _ => Err(TransportError::Other("no transports enabled".to_string())),
        }
    }
}
