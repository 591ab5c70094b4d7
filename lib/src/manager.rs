// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Application catalog boundary
//!
//! [`ManagerApi`] resolves catalog metadata for installed applications,
//! [`StaticCatalog`] provides an in-memory implementation loaded from JSON.

use std::path::Path;

use async_trait::async_trait;
use log::debug;

use ledger_dmk_apdu::os::ListedApp;
use ledger_dmk_core::{AppMetadata, Error};

/// Catalog metadata lookup for installed applications
#[async_trait]
pub trait ManagerApi: Send + Sync {
    /// Resolve metadata for each listed application by hash, `None` where the
    /// catalog has no matching entry
    async fn app_metadata(&self, apps: &[ListedApp]) -> Result<Vec<Option<AppMetadata>>, Error>;
}

/// In-memory application catalog
#[derive(Clone, PartialEq, Debug, Default)]
pub struct StaticCatalog {
    apps: Vec<AppMetadata>,
}

impl StaticCatalog {
    pub fn new(apps: Vec<AppMetadata>) -> Self {
        Self { apps }
    }

    /// Parse a catalog from a JSON array of [`AppMetadata`]
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        let apps = serde_json::from_str(s)?;
        Ok(Self { apps })
    }

    /// Load a catalog from a JSON file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let c = Self::from_json(&s)?;

        debug!("Loaded catalog with {} entries", c.apps.len());

        Ok(c)
    }

    pub fn apps(&self) -> &[AppMetadata] {
        &self.apps
    }

    /// Find metadata matching an application hash
    pub fn find(&self, hash: &[u8; 32]) -> Option<&AppMetadata> {
        let h = hex::encode(hash);
        self.apps.iter().find(|a| a.hash.eq_ignore_ascii_case(&h))
    }
}

#[async_trait]
impl ManagerApi for StaticCatalog {
    async fn app_metadata(&self, apps: &[ListedApp]) -> Result<Vec<Option<AppMetadata>>, Error> {
        Ok(apps.iter().map(|a| self.find(&a.hash).cloned()).collect())
    }
}
