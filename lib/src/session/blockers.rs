// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Named refresher suspension requests

use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
};

use log::debug;

/// Set of named blockers, the refresher may only run while empty
///
/// Re-acquiring a held name is idempotent, a single release removes it.
#[derive(Default)]
pub struct BlockerRegistry {
    names: Mutex<BTreeSet<String>>,
}

impl BlockerRegistry {
    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        match self.names.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Add a blocker, returns true if the registry was previously empty
    pub fn acquire(&self, name: &str) -> bool {
        let mut names = self.lock();

        let was_empty = names.is_empty();
        if names.insert(name.to_string()) {
            debug!("Refresher blocked by '{}' ({} held)", name, names.len());
        }

        was_empty
    }

    /// Remove a blocker, returns true if this emptied the registry
    pub fn release(&self, name: &str) -> bool {
        let mut names = self.lock();

        if !names.remove(name) {
            return false;
        }

        debug!("Refresher blocker '{}' released ({} held)", name, names.len());

        names.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Names of currently held blockers
    pub fn held(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }
}
