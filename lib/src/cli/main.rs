// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for managing Ledger devices

use std::{fmt::Debug, sync::Arc, time::Duration};

use clap::Parser;
use futures::StreamExt;
use log::{debug, error, info, warn, LevelFilter};

use ledger_dmk::{
    actions::{
        GetDeviceStatusAction, GoToDashboardAction, ListAppsAction, ListAppsWithMetadataAction,
        OpenAppAction,
    },
    apdu::os::GetOsVersion,
    core::engine::{ActionState, DeviceAction, UserInteractionRequired},
    manager::StaticCatalog,
    transport::{GenericTransport, TcpOptions, Transport},
    Connect, Filter, LedgerProvider, Session, SessionOptions,
};

mod helpers;
use helpers::*;

/// Ledger device management utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Supported transports for ledger discovery
    #[clap(long, value_enum, default_value = "any")]
    target: Filter,

    /// Device index (where more than one device is available)
    #[clap(long, default_value = "0")]
    device_index: usize,

    #[clap(flatten)]
    tcp: TcpOptions,

    /// Requested status polling interval
    #[clap(long)]
    polling_interval_ms: Option<u64>,

    /// Disable background status polling
    #[clap(long)]
    no_refresher: bool,

    /// Session options JSON file (command line options take precedence)
    #[clap(long)]
    config: Option<String>,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// List available devices
    List,

    /// Fetch the running application (waiting for unlock where required)
    AppInfo,

    /// Fetch OS version information (from the dashboard)
    OsVersion,

    /// Open an application by name
    OpenApp {
        /// Application name
        #[clap(long)]
        name: String,
    },

    /// Close the running application, returning to the dashboard
    CloseApp,

    /// List installed applications
    ListApps {
        /// Application catalog (JSON) for metadata lookup
        #[clap(long)]
        catalog: Option<String>,
    },

    /// Watch session state updates
    Watch {
        /// Time to watch for
        #[clap(long, default_value = "30")]
        seconds: u64,
    },

    /// Send a raw APDU
    Raw {
        /// Hex encoded APDU (header and payload)
        #[clap(long)]
        apdu: HexData,
    },
}

impl Options {
    /// Build session options from the config file and command line overrides
    fn session_options(&self) -> anyhow::Result<SessionOptions> {
        let mut o = match &self.config {
            Some(f) => {
                debug!("Loading session options from '{}'", f);
                SessionOptions::from_json(&std::fs::read_to_string(f)?)?
            }
            None => SessionOptions::default(),
        };

        if let Some(ms) = self.polling_interval_ms {
            o.refresher.polling_interval = Duration::from_millis(ms);
        }
        if self.no_refresher {
            o.refresher.enabled = false;
        }

        Ok(o)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    let opts = args.session_options()?;

    // Setup device provider
    let p = LedgerProvider::new()?.with_tcp_options(args.tcp.clone());

    debug!("Using transport: {:?}", args.target);

    // List available devices
    let devices = p.list_devices(args.target).await;
    if devices.is_empty() {
        return Err(anyhow::anyhow!("No devices found"));
    }

    // Handle list command
    if args.cmd == Actions::List {
        info!("Devices:");
        for (i, d) in devices.iter().enumerate() {
            info!("  {}: {}", i, d);
        }

        return Ok(());
    }

    // Select device by index
    if args.device_index >= devices.len() {
        return Err(anyhow::anyhow!(
            "Invalid device index: {} (max: {})",
            args.device_index,
            devices.len() - 1
        ));
    }

    let info = &devices[args.device_index];
    debug!("Using device {}: {}", args.device_index, info);

    // Connect to device
    let s = match Connect::<GenericTransport>::connect(&p, info, opts).await {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to connect to device: {}", info);
            return Err(e.into());
        }
    };

    info!("Session {} open ({})", s.id(), s.model().product_name);

    // Execute command, closing the session regardless of the outcome
    let r = execute(&s, args.cmd).await;

    if let Err(e) = s.close().await {
        warn!("Failed to close session: {}", e);
    }

    r
}

/// Execute a command with the provided session
async fn execute<T: Transport + 'static>(s: &Session<T>, cmd: Actions) -> anyhow::Result<()> {
    debug!("Executing command: {:?}", cmd);

    let unlock_timeout = s.options().unlock_timeout;

    match cmd {
        Actions::AppInfo => {
            let a = run(s, &GetDeviceStatusAction::new(unlock_timeout)).await?;

            info!("running app: {} (version: {})", a.name, a.version);
        }
        Actions::OsVersion => {
            run(s, &GoToDashboardAction::new(unlock_timeout)).await?;

            let v = s.send_command(&GetOsVersion).await?;

            info!("os version: {:#?}", v);
        }
        Actions::OpenApp { name } => {
            let a = OpenAppAction::new(&name).with_unlock_timeout(unlock_timeout);
            run(s, &a).await?;

            info!("opened app: {}", name);
        }
        Actions::CloseApp => {
            run(s, &GoToDashboardAction::new(unlock_timeout)).await?;

            info!("returned to dashboard");
        }
        Actions::ListApps { catalog: None } => {
            let apps = run(s, &ListAppsAction::new(unlock_timeout)).await?;

            info!("Installed apps:");
            for a in apps {
                info!("  {:24} {}", a.name, hex::encode(a.hash));
            }
        }
        Actions::ListApps { catalog: Some(f) } => {
            let c = StaticCatalog::load(&f)?;

            let mut a = ListAppsWithMetadataAction::new(Arc::new(c));
            a.unlock_timeout = unlock_timeout;

            let apps = run(s, &a).await?;

            info!("Installed apps:");
            for a in apps {
                info!("  {:24} {:12} {}", a.name, a.version, a.description.unwrap_or_default());
            }
        }
        Actions::Watch { seconds } => {
            let mut states = s.subscribe();
            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    st = states.next() => match st {
                        Some(st) => info!(
                            "state {}: {} ({}) app: {:?}",
                            st.version,
                            st.device_status,
                            st.session_type,
                            st.current_app.map(|a| a.name),
                        ),
                        None => break,
                    },
                    _ = &mut deadline => break,
                }
            }
        }
        Actions::Raw { apdu } => {
            info!("sending: {}", apdu);

            let r = s.send_raw_frame(apdu.as_ref()).await?;

            info!("status: {:04x} ({:?})", r.status(), r.status_word());
            info!("data: {}", hex::encode(r.data()));
        }
        Actions::List => unreachable!(),
    }

    Ok(())
}

/// Execute an action, logging required user interactions as they arrive
async fn run<T, A>(s: &Session<T>, action: &A) -> anyhow::Result<A::Output>
where
    T: Transport + 'static,
    A: DeviceAction,
    A::Output: Debug,
{
    let mut exec = s.execute(action);
    let mut interaction = UserInteractionRequired::None;

    while let Some(u) = exec.next().await {
        match u {
            ActionState::Pending(i) => {
                if i.required_user_interaction != interaction {
                    interaction = i.required_user_interaction;

                    if interaction != UserInteractionRequired::None {
                        info!("Waiting for user: {}", interaction);
                    }
                }
            }
            ActionState::Completed(o) => {
                debug!("Action complete: {:?}", o);
                return Ok(o);
            }
            ActionState::Error(e) => return Err(e.into()),
        }
    }

    Err(anyhow::anyhow!("action ended without result"))
}
