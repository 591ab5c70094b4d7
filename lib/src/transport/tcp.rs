// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TCP transport for the speculos simulator APDU protocol

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use log::debug;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use ledger_dmk_apdu::DeviceModelId;
use ledger_dmk_core::{Transport, TransportError};

/// Maximum accepted response payload
const MAX_RESPONSE_LEN: usize = 64 * 1024;

/// TCP transport options
#[derive(Clone, PartialEq, Debug, clap::Args)]
pub struct TcpOptions {
    /// Simulator address
    #[clap(long = "tcp-addr", default_value_t = Ipv4Addr::LOCALHOST.into())]
    pub addr: IpAddr,

    /// Simulator APDU port
    #[clap(long = "tcp-port", default_value_t = 9999)]
    pub port: u16,

    /// Simulated device model
    #[clap(long = "model", default_value_t = DeviceModelId::NanoX)]
    pub model: DeviceModelId,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: Ipv4Addr::LOCALHOST.into(),
            port: 9999,
            model: DeviceModelId::NanoX,
        }
    }
}

impl TcpOptions {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// Speculos APDU transport
///
/// Responses are framed from an internal buffer so a timed out read never
/// loses part of a reply. Replies owed to timed out requests are discarded
/// before the next request is written.
pub struct TransportTcp {
    s: TcpStream,
    rx: Vec<u8>,
    outstanding: usize,
}

impl TransportTcp {
    /// Connect to a simulator
    pub async fn new(opts: TcpOptions) -> Result<Self, TransportError> {
        debug!("Connecting to {}", opts.socket_addr());

        let s = TcpStream::connect(opts.socket_addr()).await?;

        Ok(Self {
            s,
            rx: Vec::new(),
            outstanding: 0,
        })
    }

    /// Number of responses owed to abandoned requests
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    async fn request(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        while self.outstanding > 0 {
            let stale = self.next_response().await?;
            self.outstanding -= 1;

            debug!("Discarded stale response: {}", hex::encode(&stale));
        }

        // Write length prefixed request
        let mut req = Vec::with_capacity(4 + frame.len());
        req.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        req.extend_from_slice(frame);

        self.s.write_all(&req).await?;
        self.outstanding += 1;

        let resp = self.next_response().await?;
        self.outstanding -= 1;

        Ok(resp)
    }

    /// Read the next complete response (payload and status word)
    async fn next_response(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(r) = self.take_response()? {
                return Ok(r);
            }

            let mut chunk = [0u8; 1024];
            let n = self.s.read(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }

            self.rx.extend_from_slice(&chunk[..n]);
        }
    }

    /// Split a complete response from the receive buffer
    fn take_response(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.rx.len() < 4 {
            return Ok(None);
        }

        let n = u32::from_be_bytes([self.rx[0], self.rx[1], self.rx[2], self.rx[3]]) as usize;
        if n > MAX_RESPONSE_LEN {
            return Err(TransportError::Framing(format!(
                "response length {n} exceeds maximum"
            )));
        }

        if self.rx.len() < 4 + n + 2 {
            return Ok(None);
        }

        let resp = self.rx[4..][..n + 2].to_vec();
        self.rx.drain(..4 + n + 2);

        Ok(Some(resp))
    }
}

#[async_trait]
impl Transport for TransportTcp {
    async fn exchange(&mut self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match tokio::time::timeout(timeout, self.request(frame)).await {
            Ok(r) => r,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.s.shutdown().await?;
        Ok(())
    }
}
