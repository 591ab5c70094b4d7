// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use strum::{Display, EnumString, EnumVariantNames};

use ledger_dmk::{
    core::engine::UserInteractionRequired, transport::Transport, DeviceModelId, Session,
    SessionOptions,
};

/// Test CLI arguments
#[derive(Clone, Debug, Parser)]
pub struct Opts {
    #[clap(subcommand)]
    pub test: Tests,

    /// Target for test execution
    #[clap(long, value_enum, default_value = "tcp", env)]
    pub target: Target,

    /// Simulator address for TCP targets
    #[clap(long, default_value = "127.0.0.1:9999", env)]
    pub tcp_addr: std::net::SocketAddr,

    /// Simulated device model for TCP targets
    #[clap(long, default_value = "nano_x", env)]
    pub model: DeviceModelId,

    /// Disable background status polling
    #[clap(long)]
    pub no_refresher: bool,

    /// Request timeout
    #[clap(long, default_value = "2000")]
    pub request_timeout_ms: u64,

    /// Log level
    #[clap(long, default_value = "debug", env)]
    pub log_level: LevelFilter,

    /// Enable logging for transports
    #[clap(long)]
    pub log_transports: bool,
}

/// Test modes
#[derive(Clone, PartialEq, Debug, Parser, Display, EnumString, EnumVariantNames)]
pub enum Tests {
    /// Test running application status
    AppInfo,
    /// Test state publication
    Status,
    /// Test opening and closing an application
    OpenApp {
        /// Application to open (must be installed)
        #[clap(long)]
        name: String,
    },
    /// Test installed application listing
    ListApps {
        /// Applications expected to be installed
        #[clap(long)]
        expect: Vec<String>,
    },
    /// Run every test
    All {
        /// Installed application used for open / list tests
        #[clap(long)]
        name: String,
    },
}

/// Test target connection
#[derive(Clone, PartialEq, Debug, clap::ValueEnum, Display, EnumString, EnumVariantNames)]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum Target {
    /// USB-HID connection for physical ledger devices
    Hid,
    /// TCP connection for speculos or the simulator
    Tcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load command line options
    let opts = Opts::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    if !opts.log_transports {
        c.add_filter_ignore_str("ledger_dmk::transport");
    }

    let _ = simplelog::SimpleLogger::init(opts.log_level, c.build());

    debug!("options: {:?}", opts);

    info!("Running test '{}` via {}", opts.test, opts.target);

    let mut session_opts = SessionOptions::default();
    session_opts.refresher.enabled = !opts.no_refresher;
    session_opts.request_timeout = Duration::from_millis(opts.request_timeout_ms);

    // Connect to target and execute test
    match opts.target {
        #[cfg(feature = "transport_tcp")]
        Target::Tcp => {
            use ledger_dmk::transport::{TcpOptions, TransportTcp};

            let t = TransportTcp::new(TcpOptions {
                addr: opts.tcp_addr.ip(),
                port: opts.tcp_addr.port(),
                model: opts.model,
            })
            .await?;

            let s = Session::open(t, opts.model, session_opts).await?;

            execute(s, opts).await?;
        }
        #[cfg(feature = "transport_hid")]
        Target::Hid => {
            use ledger_dmk::{transport::GenericTransport, Connect, Filter, LedgerProvider};

            let p = LedgerProvider::new()?;

            let devices = p.list_devices(Filter::Hid).await;
            debug!("Found devices: {:?}", devices);

            let d = devices
                .first()
                .ok_or_else(|| anyhow::anyhow!("No HID devices found"))?;

            let s = Connect::<GenericTransport>::connect(&p, d, session_opts).await?;

            execute(s, opts).await?;
        }
        #[cfg(any(not(feature = "transport_tcp"), not(feature = "transport_hid")))]
        _ => {
            return Err(anyhow::anyhow!(
                "transport: {} feature not enabled",
                opts.target
            ));
        }
    };

    log::info!("Test OK!");

    Ok(())
}

/// Prompt the operator for on-device interactions
async fn approve(i: UserInteractionRequired) {
    warn!("Waiting for user interaction: {}", i);
}

/// Execute a test with the provided session, closing it afterwards
async fn execute<T: Transport + 'static>(s: Session<T>, opts: Opts) -> anyhow::Result<()> {
    use ledger_dmk_tests::*;

    let r = match opts.test {
        Tests::AppInfo => app_info::test(&s, approve).await,
        Tests::Status => status::test(&s).await,
        Tests::OpenApp { name } => open_app::test(&s, approve, &name).await,
        Tests::ListApps { expect } => list_apps::test(&s, approve, &expect).await,
        Tests::All { name } => run_all(&s, &name).await,
    };

    s.close().await?;

    r
}

async fn run_all<T: Transport + 'static>(s: &Session<T>, name: &str) -> anyhow::Result<()> {
    use ledger_dmk_tests::*;

    app_info::test(s, approve).await?;
    status::test(s).await?;
    list_apps::test(s, approve, &[name.to_string()]).await?;
    open_app::test(s, approve, name).await?;

    Ok(())
}
