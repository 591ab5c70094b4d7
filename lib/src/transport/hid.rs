// Copyright (c) 2022-2023 The MobileCoin Foundation

//! USB HID transport for physical devices

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use hidapi::{DeviceInfo, HidApi, HidDevice};
use log::{debug, trace};

use ledger_dmk_core::{Transport, TransportError};

/// Ledger USB vendor id
pub const LEDGER_VID: u16 = 0x2c97;

/// HID usage page for the APDU interface
const LEDGER_USAGE_PAGE: u16 = 0xffa0;

/// Channel id used for APDU exchange
const LEDGER_CHANNEL: u16 = 0x0101;

/// HID report size
const LEDGER_PACKET_SIZE: usize = 64;

/// Tag for APDU packets
const TAG_APDU: u8 = 0x05;

/// Packet header length (channel, tag, sequence)
const HEADER_LEN: usize = 5;

/// Encode an APDU into HID packets
///
/// ```text
/// | CHANNEL (2) | TAG (1) | SEQ (2) | [LEN (2), first packet only] | DATA ... |
/// ```
pub(crate) fn encode_packets(apdu: &[u8]) -> Vec<[u8; LEDGER_PACKET_SIZE]> {
    let mut packets = vec![];

    // Prefix the payload with its length, carried in the first packet
    let mut data = Vec::with_capacity(apdu.len() + 2);
    data.extend_from_slice(&(apdu.len() as u16).to_be_bytes());
    data.extend_from_slice(apdu);

    for (seq, chunk) in data.chunks(LEDGER_PACKET_SIZE - HEADER_LEN).enumerate() {
        let mut p = [0u8; LEDGER_PACKET_SIZE];

        p[..2].copy_from_slice(&LEDGER_CHANNEL.to_be_bytes());
        p[2] = TAG_APDU;
        p[3..5].copy_from_slice(&(seq as u16).to_be_bytes());
        p[HEADER_LEN..][..chunk.len()].copy_from_slice(chunk);

        packets.push(p);
    }

    packets
}

/// Reassemble a response from HID packets
#[derive(Default)]
pub(crate) struct Reassembler {
    expected: Option<usize>,
    seq: u16,
    data: Vec<u8>,
}

impl Reassembler {
    /// Push a packet, returning the complete response once available
    pub fn push(&mut self, p: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        if p.len() < HEADER_LEN {
            return Err(TransportError::Framing("short packet".to_string()));
        }

        let channel = u16::from_be_bytes([p[0], p[1]]);
        let seq = u16::from_be_bytes([p[3], p[4]]);

        if channel != LEDGER_CHANNEL || p[2] != TAG_APDU {
            return Err(TransportError::Framing(format!(
                "unexpected channel {channel:04x} tag {:02x}",
                p[2]
            )));
        }
        if seq != self.seq {
            return Err(TransportError::Framing(format!(
                "unexpected sequence {seq} (expected {})",
                self.seq
            )));
        }

        let mut body = &p[HEADER_LEN..];

        // First packet carries the response length
        if self.expected.is_none() {
            if body.len() < 2 {
                return Err(TransportError::Framing("missing length".to_string()));
            }
            self.expected = Some(u16::from_be_bytes([body[0], body[1]]) as usize);
            body = &body[2..];
        }

        let expected = self.expected.unwrap_or_default();
        let n = (expected - self.data.len()).min(body.len());
        self.data.extend_from_slice(&body[..n]);
        self.seq = self.seq.wrapping_add(1);

        match self.data.len() == expected {
            true => Ok(Some(core::mem::take(&mut self.data))),
            false => Ok(None),
        }
    }
}

/// Check whether a HID device is a ledger APDU interface
pub fn is_ledger(d: &DeviceInfo) -> bool {
    d.vendor_id() == LEDGER_VID && (d.usage_page() == LEDGER_USAGE_PAGE || d.interface_number() == 0)
}

/// Open device with the count of responses owed to timed out requests
struct HidLink {
    device: HidDevice,
    outstanding: usize,
}

/// Native HID transport
pub struct TransportHid {
    link: Arc<Mutex<HidLink>>,
}

impl TransportHid {
    /// List connected ledger devices
    pub fn list(api: &HidApi) -> impl Iterator<Item = &DeviceInfo> {
        api.device_list().filter(|d| is_ledger(d))
    }

    /// Open the provided device
    pub fn open(api: &HidApi, info: &DeviceInfo) -> Result<Self, TransportError> {
        debug!(
            "Opening HID device {:04x}:{:04x}",
            info.vendor_id(),
            info.product_id()
        );

        let device = info
            .open_device(api)
            .map_err(|e| TransportError::Other(format!("HID open: {e}")))?;

        Ok(Self {
            link: Arc::new(Mutex::new(HidLink {
                device,
                outstanding: 0,
            })),
        })
    }
}

fn hid_err(e: hidapi::HidError) -> TransportError {
    TransportError::Other(format!("HID: {e}"))
}

/// Blocking write / read cycle
///
/// Responses to earlier timed out requests are read and discarded first,
/// all within the same deadline.
fn exchange_blocking(
    link: &Mutex<HidLink>,
    frame: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let mut link = match link.lock() {
        Ok(l) => l,
        Err(p) => p.into_inner(),
    };
    let deadline = Instant::now() + timeout;

    while link.outstanding > 0 {
        let stale = read_response(&link.device, deadline)?;
        link.outstanding -= 1;

        debug!("Discarded stale response: {}", hex::encode(&stale));
    }

    // Write packets, prefixed with report id
    for p in encode_packets(frame) {
        let mut report = [0u8; LEDGER_PACKET_SIZE + 1];
        report[1..].copy_from_slice(&p);

        trace!("HID write: {}", hex::encode(p));
        link.device.write(&report).map_err(hid_err)?;
    }
    link.outstanding += 1;

    let resp = read_response(&link.device, deadline)?;
    link.outstanding -= 1;

    Ok(resp)
}

/// Read packets until a response is complete or the deadline passes
fn read_response(device: &HidDevice, deadline: Instant) -> Result<Vec<u8>, TransportError> {
    let mut r = Reassembler::default();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout);
        }

        let mut buff = [0u8; LEDGER_PACKET_SIZE];
        let n = device
            .read_timeout(&mut buff, remaining.as_millis() as i32)
            .map_err(hid_err)?;

        if n == 0 {
            continue;
        }

        trace!("HID read: {}", hex::encode(&buff[..n]));

        if let Some(resp) = r.push(&buff[..n])? {
            return Ok(resp);
        }
    }
}

#[async_trait]
impl Transport for TransportHid {
    async fn exchange(&mut self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let link = self.link.clone();
        let frame = frame.to_vec();

        match tokio::task::spawn_blocking(move || exchange_blocking(&link, &frame, timeout)).await {
            Ok(r) => r,
            Err(e) => Err(TransportError::Other(format!("HID task: {e}"))),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
