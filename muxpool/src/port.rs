// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! Worker-side channel

use crate::channel::{Channel, PortReceiver, PortSender, Receiver, Sender};
use crate::error::Error;
use crate::message::Message;
use crate::pool::PoolEvent;
use crate::worker::WorkerId;
use std::sync::Mutex;

/// The single-peer channel a worker uses to talk back to the pool
///
/// Handed to the worker entry function by the pool runtime. The only peer is
/// the thread that spawned the worker, so there is no routing: every outbound
/// message goes to the pool, every inbound message comes from it. `recv`
/// returns an error once the pool has shut down; worker entries normally
/// treat that as the signal to return.
pub struct WorkerPort {
    id: WorkerId,
    events: Mutex<PortSender<PoolEvent>>,
    inbox: Mutex<PortReceiver<Message>>,
}

impl WorkerPort {
    pub(crate) fn new(
        id: WorkerId,
        events: PortSender<PoolEvent>,
        inbox: PortReceiver<Message>,
    ) -> WorkerPort {
        WorkerPort {
            id,
            events: Mutex::new(events),
            inbox: Mutex::new(inbox),
        }
    }

    /// Id of the worker this port belongs to
    pub fn worker_id(&self) -> WorkerId {
        self.id
    }
}

impl Channel for WorkerPort {
    fn send(&self, message: Message) -> Result<(), Error> {
        self.events
            .lock()
            .expect("port sender lock poisoned")
            .send(PoolEvent::Arrived(self.id, message))
    }

    fn recv(&self) -> Result<Message, Error> {
        self.inbox
            .lock()
            .expect("port receiver lock poisoned")
            .recv()
    }
}

#[cfg(test)]
mod test {
    use super::WorkerPort;
    use crate::channel::{self, Channel, Receiver, Sender};
    use crate::message::{CallId, Message};
    use crate::pool::PoolEvent;
    use crate::worker::WorkerId;
    use serde_json::json;

    #[test]
    fn test_outbound_is_tagged_with_worker_id() {
        let (event_sender, mut event_receiver) = channel::port();
        let (_inbox_sender, inbox_receiver) = channel::port::<Message>();
        let port = WorkerPort::new(WorkerId::from(7), event_sender, inbox_receiver);

        assert_eq!(port.worker_id(), WorkerId::from(7));

        let call = Message::Call {
            id: CallId::from("c"),
            payload: json!(null),
        };
        port.send(call.clone()).unwrap();

        match event_receiver.recv().unwrap() {
            PoolEvent::Arrived(worker_id, message) => {
                assert_eq!(worker_id, WorkerId::from(7));
                assert_eq!(message, call);
            }
            _ => panic!("unexpected event"),
        }
    }

    #[test]
    fn test_inbound_passes_through() {
        let (event_sender, _event_receiver) = channel::port();
        let (mut inbox_sender, inbox_receiver) = channel::port();
        let port = WorkerPort::new(WorkerId::from(0), event_sender, inbox_receiver);

        let result = Message::ResultSuccess {
            id: CallId::from("c"),
            value: json!(42),
        };
        inbox_sender.send(result.clone()).unwrap();
        assert_eq!(port.recv().unwrap(), result);
    }

    #[test]
    fn test_recv_fails_after_pool_is_gone() {
        let (event_sender, _event_receiver) = channel::port();
        let (inbox_sender, inbox_receiver) = channel::port::<Message>();
        let port = WorkerPort::new(WorkerId::from(0), event_sender, inbox_receiver);

        drop(inbox_sender);
        assert!(port.recv().is_err());
    }
}
