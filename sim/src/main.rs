// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::net::SocketAddr;

use clap::Parser;
use log::{debug, info, LevelFilter};
use tokio::net::TcpListener;

use ledger_dmk_apdu::DeviceModelId;
use ledger_dmk_sim::*;

/// Simulated ledger device
///
/// Serves an in-memory device over the speculos APDU protocol for use
/// with `ledger-dmk-cli --target tcp` and the TCP transport.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1:9999", env = "SIM_ADDR")]
    addr: SocketAddr,

    /// Device model to simulate
    #[clap(long, default_value = "nano_x")]
    model: DeviceModelId,

    /// Installed applications as NAME:VERSION
    #[clap(long = "app", value_parser = parse_app)]
    apps: Vec<SimApp>,

    /// JSON file listing installed applications
    #[clap(long)]
    apps_file: Option<String>,

    /// Start locked
    #[clap(long)]
    locked: bool,

    /// Refuse on-device confirmations
    #[clap(long)]
    refuse: bool,

    /// Log level
    #[clap(long, default_value = "debug")]
    log_level: LevelFilter,
}

fn parse_app(s: &str) -> anyhow::Result<SimApp> {
    match s.split_once(':') {
        Some((name, version)) => Ok(SimApp::new(name, version)),
        None => Err(anyhow::anyhow!("expected NAME:VERSION")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    // Build simulated device
    let mut apps = args.apps.clone();
    if let Some(f) = &args.apps_file {
        let s = std::fs::read_to_string(f)?;
        let v: Vec<SimApp> = serde_json::from_str(&s)?;
        apps.extend(v);
    }

    let approval = match args.refuse {
        true => Approval::Refuse,
        false => Approval::Approve,
    };

    let d = SimDevice::new(args.model)
        .with_apps(apps)
        .with_locked(args.locked)
        .with_approval(approval);

    info!("Launching simulator ({} apps)...", d.handle().apps().len());

    let listener = TcpListener::bind(args.addr).await?;

    // Await server exit or exit signal
    tokio::select!(
        r = serve(listener, d.handle()) => {
            debug!("Complete!");
            r?;
        }
        // Exit on ctrl + c
        _ = tokio::signal::ctrl_c() => {
            debug!("Exit!");
        },
    );

    Ok(())
}
