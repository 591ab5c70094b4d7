// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ledger device session data model and action engine
//!
//! This provides the shared types used by device sessions
//! ([`DeviceStatus`], [`SessionState`], [`DeviceModel`]), the [`Transport`]
//! boundary for byte transports, the [`DeviceApi`] available to executing
//! actions, and the action [engine] used to express multi-step device
//! interactions as finite state machines.
//!
//! See [ledger_dmk_apdu] for the command contract and frame encodings.

pub use ledger_dmk_apdu::{self as apdu};

mod error;
pub use error::{Error, TransportError, WorkflowError};

pub mod device;
pub use device::{DeviceModel, DeviceModelId, DeviceStatus};

pub mod state;
pub use state::{AppMetadata, SessionState, SessionStateType};

mod transport;
pub use transport::Transport;

mod api;
pub use api::{DeviceApi, RefresherBlocker};

pub mod engine;
