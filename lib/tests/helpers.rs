// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    net::{Ipv4Addr, SocketAddr},
    str::FromStr,
};

use log::{debug, LevelFilter};
use portpicker::pick_unused_port;
use simplelog::SimpleLogger;
use tokio::{net::TcpListener, task::JoinHandle};

use ledger_dmk::{transport::TcpOptions, DeviceModelId, SessionOptions};
use ledger_dmk_sim::*;

/// Setup logging from the `LOG_LEVEL` environment variable
pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Info,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Simulated device with a set of installed apps
pub fn device(model: DeviceModelId) -> SimDevice {
    SimDevice::new(model).with_apps([
        SimApp::new("Bitcoin", "2.1.0"),
        SimApp::new("Ethereum", "1.10.0"),
        SimApp::new("Solana", "1.3.1"),
    ])
}

/// Default session options, optionally disabling the refresher
pub fn options(refresher: bool) -> SessionOptions {
    let mut o = SessionOptions::default();
    o.refresher.enabled = refresher;
    o
}

/// Serve a simulated device on an unused local port
#[allow(unused)]
pub async fn serve_tcp(d: &SimDevice) -> (TcpOptions, JoinHandle<anyhow::Result<()>>) {
    let port = pick_unused_port().expect("no free ports");
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);

    let listener = TcpListener::bind(addr).await.unwrap();

    debug!("Simulator listening on {}", addr);

    let h = tokio::spawn(serve(listener, d.handle()));

    let opts = TcpOptions {
        addr: addr.ip(),
        port,
        model: d.handle().model(),
    };

    (opts, h)
}

/// Approval hook for the simulator, confirmations are handled by the
/// device approval policy
#[allow(unused)]
pub async fn approve(_i: ledger_dmk::core::engine::UserInteractionRequired) {}
