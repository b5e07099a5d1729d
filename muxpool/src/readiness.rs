// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! Pool readiness aggregation

use crate::channel::{PortReceiver, Receiver};
use crate::error::Error;

/// Aggregate startup report of a pool
///
/// `online + failed` equals the configured worker count. Individual startup
/// failures are not fatal, the pool simply starts with fewer workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReady {
    pub online: usize,
    pub failed: usize,
}

/// One-time readiness signal of a freshly spawned pool
///
/// Completes once every configured worker has either come online or failed
/// to start. Consuming the signal is the only way to wait for it, so it can
/// be observed exactly once.
pub struct ReadySignal {
    receiver: PortReceiver<PoolReady>,
}

impl ReadySignal {
    pub(crate) fn new(receiver: PortReceiver<PoolReady>) -> ReadySignal {
        ReadySignal { receiver }
    }

    /// Block until all workers have resolved their startup
    pub fn wait(self) -> Result<PoolReady, Error> {
        let mut receiver = self.receiver;
        receiver.recv()
    }
}

/// Book-keeping of the per-worker startup outcomes behind [ReadySignal]
///
/// Each of the initially configured workers occupies one slot; a slot
/// resolves exactly once, on the worker's first `Online` event, on a failure
/// while still `Starting`, or on a spawn error. Replacement workers spawned
/// by the restart policy do not occupy slots.
pub(crate) struct StartupLedger {
    unresolved: usize,
    online: usize,
    failed: usize,
}

impl StartupLedger {
    pub(crate) fn new(slots: usize) -> StartupLedger {
        StartupLedger {
            unresolved: slots,
            online: 0,
            failed: 0,
        }
    }

    pub(crate) fn resolve_online(&mut self) {
        assert!(self.unresolved > 0, "startup ledger over-resolved");
        self.unresolved -= 1;
        self.online += 1;
    }

    pub(crate) fn resolve_failed(&mut self) {
        assert!(self.unresolved > 0, "startup ledger over-resolved");
        self.unresolved -= 1;
        self.failed += 1;
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.unresolved == 0
    }

    pub(crate) fn report(&self) -> PoolReady {
        PoolReady {
            online: self.online,
            failed: self.failed,
        }
    }
}
