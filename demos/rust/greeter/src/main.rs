// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! Greeter demo: a pool of workers answering greeting calls.

use log::info;
use muxpool::prelude::*;
use serde_json::json;
use std::thread;
use std::time::Duration;

const WORKER_COUNT: usize = 10;

fn main() {
    env_logger::init();

    let options = PoolOptions {
        worker_count: WORKER_COUNT,
        restart_on_error: true,
        stack_size: None,
    };
    let (pool, ready) = spawn_pool(options, greeter).expect("failed to spawn pool");

    let report = ready.wait().expect("pool never became ready");
    info!(
        "Pool ready with {} of {} workers online",
        report.online, WORKER_COUNT
    );

    // One call per worker; the pool distributes them round-robin.
    let ids = RandomIdentifierGenerator;
    for kind in ["happy", "sunny", "rainy", "cloudy", "windy"] {
        pool.send(Message::Call {
            id: ids.next_id(),
            payload: json!({ "method": "greet", "args": [kind] }),
        })
        .expect("call could not be delivered");
    }

    for _ in 0..5 {
        match pool.recv().expect("pool channel closed") {
            Message::ResultSuccess { value, .. } => println!("{value}"),
            Message::ResultError { error, .. } => eprintln!("call failed: {error}"),
            Message::Call { .. } => unreachable!("greeters do not call back"),
        }
    }
}

/// Worker entry: answer greet calls until the pool shuts down
fn greeter(port: WorkerPort) -> Result<(), Error> {
    while let Ok(message) = port.recv() {
        if let Message::Call { id, payload } = message {
            let kind = payload["args"][0].as_str().unwrap_or("plain");

            // pretend this takes a while
            thread::sleep(Duration::from_millis(100));

            port.send(Message::ResultSuccess {
                id,
                value: json!(format!("Hello, {kind} world!")),
            })?;
        }
    }
    Ok(())
}
