// Copyright (c) 2022-2023 The MobileCoin Foundation

//! A simulated ledger device for exercising device sessions.
//!
//! [`SimDevice`] implements [`ledger_dmk_core::Transport`] directly for
//! in-process use, [`serve`] exposes a device over the speculos APDU/TCP
//! protocol for use with TCP transports.

mod device;
pub use device::{
    Approval, Exchange, Fault, SimApp, SimDevice, SimHandle, LIST_APPS_PAGE_SIZE, SIM_OS_VERSION,
};

mod server;
pub use server::serve;
