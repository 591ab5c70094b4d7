// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Speculos-compatible APDU server
//!
//! Requests are a big-endian `u32` length followed by the APDU, responses a
//! big-endian `u32` payload length, the payload and a two byte status word.

use log::{debug, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::SimHandle;

/// Maximum accepted request length
const MAX_REQUEST_LEN: usize = 5 + 255;

/// Serve a simulated device over TCP until the listener fails
pub async fn serve(listener: TcpListener, device: SimHandle) -> anyhow::Result<()> {
    info!("Serving simulated {} on {}", device.model(), listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;

        debug!("Accepted connection from {}", peer);

        let d = device.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, d).await {
                warn!("Connection {} closed: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, device: SimHandle) -> anyhow::Result<()> {
    let mut len = [0u8; 4];

    loop {
        // Read request length, a clean close ends the connection
        match stream.read_exact(&mut len).await {
            Ok(_) => (),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let n = u32::from_be_bytes(len) as usize;
        if n > MAX_REQUEST_LEN {
            return Err(anyhow::anyhow!("request length {} exceeds maximum", n));
        }

        let mut req = vec![0u8; n];
        stream.read_exact(&mut req).await?;

        // Response is payload followed by status word
        let resp = device.process(&req).await;
        let data_len = resp.len().saturating_sub(2) as u32;

        stream.write_all(&data_len.to_be_bytes()).await?;
        stream.write_all(&resp).await?;
    }
}
