// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! muxpool lets an RPC multiplexer talk to a pool of worker threads as if the
//! pool were a single bidirectional message channel.
//!
//! # Messages
//!
//! Both sides exchange [Message](crate::message::Message) values: a `Call`
//! carrying a unique correlation id, answered by exactly one `ResultSuccess`
//! or `ResultError` with the same id. Messages pass through this layer
//! verbatim; encoding method invocations into them is the multiplexer's job.
//!
//! # The pool channel
//!
//! [spawn_pool](crate::pool::spawn_pool) starts a configured number of worker
//! threads and returns a [WorkerPool](crate::pool::WorkerPool) together with a
//! [ReadySignal](crate::readiness::ReadySignal) that completes once every
//! worker has either come online or failed to start. Calls written to the
//! pool are distributed round-robin over the online workers; results written
//! to the pool are routed back to the exact worker that issued the matching
//! call.
//!
//! # The worker side
//!
//! Each worker runs a caller-provided entry function which receives a
//! [WorkerPort](crate::port::WorkerPort), the single-peer counterpart of the
//! pool channel. Both implement [Channel](crate::channel::Channel).

pub mod channel;
pub mod error;
pub mod ident;
pub mod message;
pub mod pool;
pub mod port;
pub mod readiness;
mod registrar;
mod worker;

pub use worker::WorkerId;

/// Re-export the public API
pub mod prelude {
    pub use crate::channel::Channel;
    pub use crate::error::Error;
    pub use crate::ident::{IdentifierGenerator, RandomIdentifierGenerator};
    pub use crate::message::{CallId, Message};
    pub use crate::pool::{spawn_pool, PoolOptions, PoolStats, WorkerPool};
    pub use crate::port::WorkerPort;
    pub use crate::readiness::{PoolReady, ReadySignal};
    pub use crate::worker::WorkerId;
}
