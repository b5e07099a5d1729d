// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

use crate::channel::{self, PortSender, Sender};
use crate::error::Error;
use crate::message::Message;
use crate::pool::PoolEvent;
use crate::port::WorkerPort;
use log::error;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// Worker id type. This id is unique to each worker thread for the lifetime
/// of the pool; replacement workers get fresh ids.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct WorkerId(usize);

impl From<usize> for WorkerId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<&WorkerId> for usize {
    fn from(value: &WorkerId) -> Self {
        value.0
    }
}

impl From<WorkerId> for usize {
    fn from(value: WorkerId) -> Self {
        value.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Starting,
    Online,
    Crashed,
}

/// The worker program. Runs on the worker thread with the worker's port;
/// invoked once per spawned worker, again for each restarted replacement.
pub(crate) type Entry = Arc<dyn Fn(WorkerPort) -> Result<(), Error> + Send + Sync>;

/// Handle to one spawned worker thread
#[allow(unused)]
pub(crate) struct Worker {
    id: WorkerId,
    liveness: Liveness,
    // whether this worker still occupies a slot in the startup ledger
    gate_slot: bool,
    sender: Box<dyn Sender<Message>>,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    pub(crate) fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub(crate) fn set_liveness(&mut self, liveness: Liveness) {
        self.liveness = liveness;
    }

    /// Resolve this worker's startup-ledger slot; true only on the first call
    pub(crate) fn resolve_gate_slot(&mut self) -> bool {
        std::mem::take(&mut self.gate_slot)
    }

    /// Post a message to the worker's inbound port
    pub(crate) fn send(&mut self, message: Message) -> Result<(), Error> {
        self.sender.send(message)
    }

    /// Spawn a new worker thread running the given entry function.
    ///
    /// The thread reports `Online` before invoking the entry, then a terminal
    /// `Exited` or `Failed` event once the entry returns or panics. A spawn
    /// failure is returned to the caller and counts as a startup failure of
    /// this worker only.
    pub(crate) fn spawn(
        id: WorkerId,
        stack_size: Option<usize>,
        gate_slot: bool,
        entry: Entry,
        events: PortSender<PoolEvent>,
    ) -> Result<Worker, Error> {
        let (inbox_sender, inbox_receiver) = channel::port();

        let thread_name = format!("muxpool-{id}").to_lowercase();
        let mut builder = thread::Builder::new().name(thread_name);
        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }
        let thread = builder
            .spawn(move || {
                run(id, entry, events, inbox_receiver);
            })
            .map_err(|e| Error::Io((e, "could not spawn worker thread")))?;

        Ok(Worker {
            id,
            liveness: Liveness::Starting,
            gate_slot,
            sender: Box::new(inbox_sender),
            thread,
        })
    }
}

/// Worker thread main function
fn run(
    id: WorkerId,
    entry: Entry,
    mut events: PortSender<PoolEvent>,
    inbox: channel::PortReceiver<Message>,
) {
    let port = WorkerPort::new(id, events.clone(), inbox);

    // The pool may already be gone; then there is nobody left to notify.
    let _ = events.send(PoolEvent::Online(id));

    let terminal = match catch_unwind(AssertUnwindSafe(|| entry(port))) {
        Ok(Ok(())) => PoolEvent::Exited(id),
        Ok(Err(e)) => {
            error!("Worker {id} failed: {e}");
            PoolEvent::Failed(id)
        }
        Err(_) => {
            error!("Worker {id} panicked");
            PoolEvent::Failed(id)
        }
    };
    let _ = events.send(terminal);
}
