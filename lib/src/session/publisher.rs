// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Replay-latest session state publisher

use std::sync::{Mutex, MutexGuard};

use log::debug;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use ledger_dmk_core::SessionState;

/// Fan-out publisher for [`SessionState`] snapshots
///
/// Each subscriber receives the current snapshot on subscription followed by
/// every replacement, in version order. Closing the publisher completes all
/// subscriber streams.
pub struct StatePublisher {
    inner: Mutex<Inner>,
}

struct Inner {
    current: SessionState,
    subscribers: Vec<UnboundedSender<SessionState>>,
    closed: bool,
}

impl StatePublisher {
    pub fn new(initial: SessionState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: initial,
                subscribers: vec![],
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Fetch the current snapshot
    pub fn current(&self) -> SessionState {
        self.lock().current.clone()
    }

    /// Replace the current snapshot, returning the published value
    pub fn update(&self, f: impl FnOnce(SessionState) -> SessionState) -> SessionState {
        let mut s = None;
        self.update_if(|c| {
            let n = f(c.clone());
            s = Some(n.clone());
            Some(n)
        });

        match s {
            Some(s) => s,
            None => self.current(),
        }
    }

    /// Replace the current snapshot if `f` returns a new value
    ///
    /// Returns whether a snapshot was published. Updates are ignored once the
    /// publisher is closed.
    pub fn update_if(&self, f: impl FnOnce(&SessionState) -> Option<SessionState>) -> bool {
        let mut inner = self.lock();

        if inner.closed {
            return false;
        }

        let mut next = match f(&inner.current) {
            Some(n) => n,
            None => return false,
        };
        next.version = inner.current.version + 1;

        inner.subscribers.retain(|tx| tx.send(next.clone()).is_ok());
        inner.current = next;

        true
    }

    /// Subscribe to snapshots, starting with the current value
    pub fn subscribe(&self) -> UnboundedReceiverStream<SessionState> {
        let mut inner = self.lock();

        let (tx, rx) = unbounded_channel();
        let _ = tx.send(inner.current.clone());

        if !inner.closed {
            inner.subscribers.push(tx);
        }

        UnboundedReceiverStream::new(rx)
    }

    /// Close the publisher, completing subscriber streams
    pub fn close(&self) {
        let mut inner = self.lock();

        if !inner.closed {
            debug!("Closing state publisher ({} subscribers)", inner.subscribers.len());
            inner.closed = true;
            inner.subscribers.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
