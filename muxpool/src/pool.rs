// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! The worker pool channel
//!
//! All pool state (worker map, rotation, affinity map, inbound queue) is
//! owned by a dedicated pool thread. Worker lifecycle callbacks and consumer
//! operations are marshalled onto that thread as [PoolEvent]s over a single
//! funnel channel, so no state needs locking.

use crate::channel::{self, Channel, PortReceiver, PortSender, Receiver, Sender};
use crate::error::Error;
use crate::message::Message;
use crate::port::WorkerPort;
use crate::readiness::{PoolReady, ReadySignal, StartupLedger};
use crate::registrar::CallRegistrar;
use crate::worker::{Entry, Liveness, Worker, WorkerId};
use log::{debug, error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;

/// Configuration of a worker pool
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of workers to spawn
    pub worker_count: usize,

    /// Spawn a replacement whenever a worker crashes after coming online
    pub restart_on_error: bool,

    /// Workers' stack size
    pub stack_size: Option<usize>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            worker_count: 1,
            restart_on_error: false,
            stack_size: None,
        }
    }
}

/// Snapshot of the pool state, taken on the pool thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Online workers in current rotation order
    pub online: Vec<WorkerId>,

    /// Inbound messages buffered for the consumer
    pub queued: usize,

    /// Worker-originated calls still awaiting their result
    pub pending_results: usize,
}

/// Events processed by the pool thread
pub(crate) enum PoolEvent {
    // Worker lifecycle, reported by the worker runtime
    Online(WorkerId),
    Failed(WorkerId),
    Exited(WorkerId),

    // Message arrival from a worker
    Arrived(WorkerId, Message),

    // Consumer operations, each answered over the carried reply port
    Deliver(Message, PortSender<Result<(), Error>>),
    Fetch(PortSender<Message>),
    Inspect(PortSender<PoolStats>),
    Shutdown,
}

/// Spawn a pool of workers running the given entry function.
///
/// Returns immediately with the pool channel and its one-time readiness
/// signal; workers come online asynchronously. Individual worker startup
/// failures are reported through the readiness signal, never as an error
/// here. The only synchronous failures are structural: a zero worker count
/// or failure to spawn the pool thread itself.
pub fn spawn_pool<E>(options: PoolOptions, entry: E) -> Result<(WorkerPool, ReadySignal), Error>
where
    E: Fn(WorkerPort) -> Result<(), Error> + Send + Sync + 'static,
{
    if options.worker_count == 0 {
        return Err(Error::Config("worker_count must be at least 1"));
    }

    let (event_sender, event_receiver) = channel::port();
    let (ready_sender, ready_receiver) = channel::port();

    let entry: Entry = Arc::new(entry);
    let mut router = Router {
        events: event_receiver,
        event_sender: event_sender.clone(),
        entry,
        stack_size: options.stack_size,
        restart_on_error: options.restart_on_error,
        workers: HashMap::new(),
        rotation: VecDeque::new(),
        registrar: CallRegistrar::default(),
        queue: VecDeque::new(),
        waiting: VecDeque::new(),
        ledger: StartupLedger::new(options.worker_count),
        ready: Some(ready_sender),
        next_worker_id: 0,
    };

    for _ in 0..options.worker_count {
        router.spawn_worker(true);
    }
    // All spawns may have failed synchronously
    router.signal_ready_if_complete();

    let router_thread = thread::Builder::new()
        .name("muxpool-pool".into())
        .spawn(move || router.run())
        .map_err(|e| Error::Io((e, "could not spawn pool thread")))?;

    let pool = WorkerPool {
        deliver: Mutex::new(event_sender.clone()),
        fetch: Mutex::new(event_sender.clone()),
        control: Mutex::new(event_sender),
        router: Some(router_thread),
    };

    Ok((pool, ReadySignal::new(ready_receiver)))
}

/// A pool of worker threads behind a single bidirectional channel
///
/// Calls written to the pool are load-balanced round-robin over the online
/// workers; results written to the pool are routed back to the worker that
/// issued the matching call. Messages sent by workers are read back in
/// arrival order via [Channel::recv]. Dropping the pool shuts it down.
pub struct WorkerPool {
    deliver: Mutex<PortSender<PoolEvent>>,
    fetch: Mutex<PortSender<PoolEvent>>,
    control: Mutex<PortSender<PoolEvent>>,
    router: Option<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Snapshot the current pool state
    pub fn stats(&self) -> Result<PoolStats, Error> {
        let (reply_sender, mut reply_receiver) = channel::port();
        self.control
            .lock()
            .expect("control guard poisoned")
            .send(PoolEvent::Inspect(reply_sender))?;
        reply_receiver.recv()
    }
}

impl Channel for WorkerPool {
    fn send(&self, message: Message) -> Result<(), Error> {
        let (reply_sender, mut reply_receiver) = channel::port();

        // The lock is the single-slot in-flight-send guard: it is held until
        // the pool thread has confirmed or rejected this delivery, so there
        // is never more than one outbound delivery in flight.
        let mut deliver = self.deliver.lock().expect("send guard poisoned");
        deliver.send(PoolEvent::Deliver(message, reply_sender))?;
        reply_receiver.recv()?
    }

    fn recv(&self) -> Result<Message, Error> {
        let (reply_sender, mut reply_receiver) = channel::port();
        self.fetch
            .lock()
            .expect("fetch guard poisoned")
            .send(PoolEvent::Fetch(reply_sender))?;
        reply_receiver.recv()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Ok(mut control) = self.control.lock() {
            let _ = control.send(PoolEvent::Shutdown);
        }
        if let Some(router) = self.router.take() {
            let _ = router.join();
        }
    }
}

/// State and event loop of the pool thread
struct Router {
    events: PortReceiver<PoolEvent>,
    // handed to replacement workers spawned on restart
    event_sender: PortSender<PoolEvent>,
    entry: Entry,
    stack_size: Option<usize>,
    restart_on_error: bool,
    workers: HashMap<WorkerId, Worker>,
    rotation: VecDeque<WorkerId>,
    registrar: CallRegistrar,
    queue: VecDeque<Message>,
    // parked consumer reads, served on the next arrival
    waiting: VecDeque<PortSender<Message>>,
    ledger: StartupLedger,
    ready: Option<PortSender<PoolReady>>,
    next_worker_id: usize,
}

impl Router {
    fn run(mut self) {
        loop {
            let Ok(event) = self.events.recv() else {
                break;
            };
            match event {
                PoolEvent::Online(id) => self.on_online(id),
                PoolEvent::Failed(id) => self.on_failed(id),
                PoolEvent::Exited(id) => self.on_exited(id),
                PoolEvent::Arrived(id, message) => self.on_arrived(id, message),
                PoolEvent::Deliver(message, mut reply) => {
                    let outcome = self.route(message);
                    let _ = reply.send(outcome);
                }
                PoolEvent::Fetch(reply) => self.on_fetch(reply),
                PoolEvent::Inspect(mut reply) => {
                    let _ = reply.send(self.stats());
                }
                PoolEvent::Shutdown => break,
            }
        }
    }

    /// Spawn one worker; `gate_slot` marks it as occupying a startup-ledger
    /// slot (initial workers only, restart replacements do not)
    fn spawn_worker(&mut self, gate_slot: bool) {
        let id = WorkerId::from(self.next_worker_id);
        self.next_worker_id += 1;

        match Worker::spawn(
            id,
            self.stack_size,
            gate_slot,
            self.entry.clone(),
            self.event_sender.clone(),
        ) {
            Ok(worker) => {
                debug!("Spawned worker {id}");
                self.workers.insert(id, worker);
            }
            Err(e) => {
                error!("Failed to spawn worker {id}: {e}");
                if gate_slot {
                    self.ledger.resolve_failed();
                }
            }
        }
    }

    fn on_online(&mut self, id: WorkerId) {
        let Some(worker) = self.workers.get_mut(&id) else {
            return;
        };
        worker.set_liveness(Liveness::Online);
        let newly_resolved = worker.resolve_gate_slot();

        debug!("Worker {id} is online");
        self.rotation.push_back(id);

        if newly_resolved {
            self.ledger.resolve_online();
            self.signal_ready_if_complete();
        }
    }

    fn on_failed(&mut self, id: WorkerId) {
        let Some(mut worker) = self.workers.remove(&id) else {
            return;
        };
        let was = worker.liveness();
        worker.set_liveness(Liveness::Crashed);

        match was {
            Liveness::Starting => {
                error!("Worker {id} failed during startup");
                if worker.resolve_gate_slot() {
                    self.ledger.resolve_failed();
                    self.signal_ready_if_complete();
                }
            }
            Liveness::Online => {
                warn!("Worker {id} crashed, removing it from the rotation");
                self.rotation.retain(|w| *w != id);
                if self.restart_on_error {
                    self.spawn_worker(false);
                }
            }
            Liveness::Crashed => {}
        }
    }

    fn on_exited(&mut self, id: WorkerId) {
        if let Some(mut worker) = self.workers.remove(&id) {
            debug!("Worker {id} exited");
            self.rotation.retain(|w| *w != id);
            // an exit before going online still resolves the ledger slot
            if worker.resolve_gate_slot() {
                self.ledger.resolve_failed();
                self.signal_ready_if_complete();
            }
        }
    }

    fn on_arrived(&mut self, worker_id: WorkerId, message: Message) {
        if message.is_call() {
            // Register before the message becomes visible to the consumer so
            // a fast round-trip result cannot race ahead of the registration
            self.registrar.record(message.id().clone(), worker_id);
        }

        let mut message = message;
        while let Some(mut waiter) = self.waiting.pop_front() {
            match waiter.send_or_return(message) {
                Ok(()) => return,
                // stale waiter whose reader is gone; try the next one
                Err(returned) => message = returned,
            }
        }
        self.queue.push_back(message);
    }

    fn on_fetch(&mut self, mut reply: PortSender<Message>) {
        match self.queue.pop_front() {
            Some(message) => {
                if let Err(returned) = reply.send_or_return(message) {
                    self.queue.push_front(returned);
                }
            }
            None => self.waiting.push_back(reply),
        }
    }

    /// Outbound routing policy.
    ///
    /// Results go to the worker recorded for their call id; without an entry
    /// there is no recipient to notify and the result is dropped. Calls go
    /// round-robin over the rotation; with no online workers the send is a
    /// no-op. Rotation and registrar mutations are deliberately not rolled
    /// back when the subsequent port send fails.
    fn route(&mut self, message: Message) -> Result<(), Error> {
        let target = if message.is_result() {
            let target = self.registrar.take(message.id());
            if target.is_none() {
                debug!("Dropping unroutable result for call {}", message.id());
            }
            target
        } else {
            match self.rotation.pop_front() {
                Some(id) => {
                    self.rotation.push_back(id);
                    Some(id)
                }
                None => {
                    warn!("No online workers, dropping call {}", message.id());
                    None
                }
            }
        };

        match target.and_then(|id| self.workers.get_mut(&id)) {
            Some(worker) => worker.send(message),
            None => Ok(()),
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            online: self.rotation.iter().copied().collect(),
            queued: self.queue.len(),
            pending_results: self.registrar.len(),
        }
    }

    fn signal_ready_if_complete(&mut self) {
        if !self.ledger.is_complete() {
            return;
        }
        if let Some(mut ready) = self.ready.take() {
            let report = self.ledger.report();
            info!(
                "Pool ready, {} of {} workers online",
                report.online,
                report.online + report.failed
            );
            // nobody waiting for the signal is fine
            let _ = ready.send(report);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{spawn_pool, PoolOptions, PoolStats, WorkerPool};
    use crate::channel::Channel;
    use crate::error::Error;
    use crate::message::{CallId, Message};
    use crate::port::WorkerPort;
    use crate::readiness::PoolReady;
    use crate::worker::WorkerId;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    fn options(worker_count: usize, restart_on_error: bool) -> PoolOptions {
        PoolOptions {
            worker_count,
            restart_on_error,
            stack_size: None,
        }
    }

    fn call(id: &str, payload: Value) -> Message {
        Message::Call {
            id: CallId::from(id),
            payload,
        }
    }

    /// Answers every call with its payload plus the handling worker's id;
    /// panics when the payload says so
    fn echo_entry(port: WorkerPort) -> Result<(), Error> {
        let worker = usize::from(port.worker_id());
        while let Ok(message) = port.recv() {
            if let Message::Call { id, payload } = message {
                if payload == json!("panic") {
                    panic!("poisoned call");
                }
                port.send(Message::ResultSuccess {
                    id,
                    value: json!({ "worker": worker, "echo": payload }),
                })?;
            }
        }
        Ok(())
    }

    fn reply_parts(message: Message) -> (usize, Value) {
        match message {
            Message::ResultSuccess { value, .. } => (
                value["worker"].as_u64().unwrap() as usize,
                value["echo"].clone(),
            ),
            other => panic!("unexpected message {other:?}"),
        }
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn wait_for_stats(pool: &WorkerPool, predicate: impl Fn(&PoolStats) -> bool) {
        for _ in 0..500 {
            if predicate(&pool.stats().unwrap()) {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("pool did not reach the expected state");
    }

    #[test]
    fn test_zero_workers_is_a_config_error() {
        let result = spawn_pool(options(0, false), echo_entry);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_readiness_reports_all_online() {
        let (_pool, ready) = spawn_pool(options(3, false), echo_entry).unwrap();
        assert_eq!(
            ready.wait().unwrap(),
            PoolReady {
                online: 3,
                failed: 0
            }
        );
    }

    #[test]
    fn test_round_robin_over_two_workers() {
        let (pool, ready) = spawn_pool(options(2, false), echo_entry).unwrap();
        ready.wait().unwrap();

        for i in 1..=10u64 {
            pool.send(call(&format!("c{i}"), json!(i))).unwrap();
        }

        let mut by_worker: BTreeMap<usize, BTreeSet<u64>> = BTreeMap::new();
        for _ in 0..10 {
            let (worker, echo) = reply_parts(pool.recv().unwrap());
            by_worker
                .entry(worker)
                .or_default()
                .insert(echo.as_u64().unwrap());
        }

        // strict alternation: one worker got the odd calls, the other the even
        let groups: Vec<BTreeSet<u64>> = by_worker.into_values().collect();
        assert_eq!(groups.len(), 2);
        assert!(groups.contains(&BTreeSet::from([1, 3, 5, 7, 9])));
        assert!(groups.contains(&BTreeSet::from([2, 4, 6, 8, 10])));
    }

    /// Entry that issues one call to the pool side, waits for its result and
    /// reports what it got
    fn caller_entry(port: WorkerPort) -> Result<(), Error> {
        let worker = usize::from(port.worker_id());
        port.send(Message::Call {
            id: CallId::new(format!("w{worker}")),
            payload: json!(worker),
        })?;

        let value = match port.recv()? {
            Message::ResultSuccess { value, .. } => value,
            other => json!({ "unexpected": format!("{other:?}") }),
        };
        port.send(Message::ResultSuccess {
            id: CallId::new(format!("confirm-w{worker}")),
            value: json!({ "worker": worker, "got": value }),
        })?;
        Ok(())
    }

    #[test]
    fn test_results_route_back_to_the_calling_worker() {
        let (pool, ready) = spawn_pool(options(2, false), caller_entry).unwrap();
        ready.wait().unwrap();

        let mut calls = Vec::new();
        for _ in 0..2 {
            match pool.recv().unwrap() {
                Message::Call { id, .. } => calls.push(id),
                other => panic!("unexpected message {other:?}"),
            }
        }

        // answer in reverse arrival order; affinity must still hold
        for id in calls.iter().rev() {
            pool.send(Message::ResultSuccess {
                id: id.clone(),
                value: json!(format!("token-{id}")),
            })
            .unwrap();
        }

        for _ in 0..2 {
            match pool.recv().unwrap() {
                Message::ResultSuccess { id, value } => {
                    let worker = value["worker"].as_u64().unwrap();
                    assert_eq!(id.as_str(), format!("confirm-w{worker}"));
                    assert_eq!(value["got"], json!(format!("token-w{worker}")));
                }
                other => panic!("unexpected message {other:?}"),
            }
        }

        // both affinity entries were consumed by the routed results
        assert_eq!(pool.stats().unwrap().pending_results, 0);
    }

    #[test]
    fn test_unroutable_results_are_dropped() {
        let (pool, ready) = spawn_pool(options(2, false), echo_entry).unwrap();
        ready.wait().unwrap();

        pool.send(Message::ResultSuccess {
            id: CallId::from("never-seen"),
            value: json!(1),
        })
        .unwrap();
        pool.send(Message::ResultError {
            id: CallId::from("also-never-seen"),
            error: json!("boom"),
        })
        .unwrap();

        // the rotation is unaffected: fresh calls still go to distinct workers
        pool.send(call("a", json!("a"))).unwrap();
        pool.send(call("b", json!("b"))).unwrap();
        let first = reply_parts(pool.recv().unwrap()).0;
        let second = reply_parts(pool.recv().unwrap()).0;
        assert_ne!(first, second);
    }

    /// Entry that emits a burst of calls and exits
    fn burst_entry(port: WorkerPort) -> Result<(), Error> {
        for i in 0..10 {
            port.send(Message::Call {
                id: CallId::new(format!("b{i}")),
                payload: json!(i),
            })?;
        }
        Ok(())
    }

    #[test]
    fn test_arrival_order_survives_a_declining_consumer() {
        let (pool, ready) = spawn_pool(options(1, false), burst_entry).unwrap();
        ready.wait().unwrap();

        // decline to read until everything has arrived
        wait_for_stats(&pool, |stats| stats.queued == 10);

        let mut seen = Vec::new();
        for _ in 0..10 {
            match pool.recv().unwrap() {
                Message::Call { id, .. } => seen.push(id.as_str().to_string()),
                other => panic!("unexpected message {other:?}"),
            }
        }
        let expected: Vec<String> = (0..10).map(|i| format!("b{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_crash_with_restart_refills_the_rotation() {
        init_logging();
        let (pool, ready) = spawn_pool(options(2, true), echo_entry).unwrap();
        ready.wait().unwrap();

        pool.send(call("poison", json!("panic"))).unwrap();

        // the replacement gets a fresh id and joins the rotation once online
        wait_for_stats(&pool, |stats| {
            stats.online.len() == 2 && stats.online.contains(&WorkerId::from(2))
        });

        for i in 0..4u64 {
            pool.send(call(&format!("p{i}"), json!(i))).unwrap();
        }
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for _ in 0..4 {
            let (worker, _) = reply_parts(pool.recv().unwrap());
            *counts.entry(worker).or_default() += 1;
        }
        assert_eq!(counts.len(), 2);
        assert!(counts.values().all(|count| *count == 2));
    }

    #[test]
    fn test_crash_without_restart_shrinks_the_rotation() {
        init_logging();
        let (pool, ready) = spawn_pool(options(2, false), echo_entry).unwrap();
        ready.wait().unwrap();

        pool.send(call("poison", json!("panic"))).unwrap();
        wait_for_stats(&pool, |stats| stats.online.len() == 1);

        let mut workers = BTreeSet::new();
        for i in 0..3u64 {
            pool.send(call(&format!("s{i}"), json!(i))).unwrap();
        }
        for _ in 0..3 {
            workers.insert(reply_parts(pool.recv().unwrap()).0);
        }
        assert_eq!(workers.len(), 1);
    }

    #[test]
    fn test_calls_without_online_workers_are_noops() {
        let (pool, ready) = spawn_pool(options(1, false), echo_entry).unwrap();
        ready.wait().unwrap();

        pool.send(call("poison", json!("panic"))).unwrap();
        wait_for_stats(&pool, |stats| stats.online.is_empty());

        pool.send(call("after", json!(1))).unwrap();
        assert_eq!(pool.stats().unwrap().queued, 0);
    }
}
