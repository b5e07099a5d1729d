// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! Channel abstractions
//!
//! [Channel] is the bidirectional contract the multiplexer consumes; it is
//! implemented by the pool on the main side and by the worker port inside
//! each worker. [Sender] and [Receiver] are the one-directional port
//! endpoints used for all cross-thread plumbing.

use crate::error::Error;
use crate::error::Error::Channel as ChannelError;
use crate::message::Message;
use std::sync::mpsc;

/// Bidirectional message channel as seen by an RPC multiplexer
///
/// `send` completes once the message has been handed off to the peer port or
/// a transport error occurred. `recv` blocks until the next inbound message
/// arrives. Messages are received in arrival order, exactly once.
pub trait Channel {
    fn send(&self, message: Message) -> Result<(), Error>;
    fn recv(&self) -> Result<Message, Error>;
}

pub trait Receiver<T>: Send {
    fn recv(&mut self) -> Result<T, Error>;
}

pub trait Sender<T>: Send {
    fn send(&mut self, t: T) -> Result<(), Error>;
}

/// Create a connected pair of port endpoints
pub fn port<T>() -> (PortSender<T>, PortReceiver<T>) {
    let (sender, receiver) = mpsc::channel();
    (PortSender::new(sender), PortReceiver::new(receiver))
}

pub struct PortReceiver<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> PortReceiver<T> {
    pub fn new(receiver: mpsc::Receiver<T>) -> PortReceiver<T> {
        PortReceiver { receiver }
    }
}

impl<T: Send> Receiver<T> for PortReceiver<T> {
    fn recv(&mut self) -> Result<T, Error> {
        self.receiver
            .recv()
            .map_err(|_| ChannelError("port disconnected"))
    }
}

pub struct PortSender<T> {
    sender: mpsc::Sender<T>,
}

impl<T> PortSender<T> {
    pub fn new(sender: mpsc::Sender<T>) -> PortSender<T> {
        PortSender { sender }
    }
}

impl<T> PortSender<T> {
    /// Like [Sender::send] but hands the value back when the peer is gone,
    /// so it can be re-queued instead of lost
    pub fn send_or_return(&mut self, t: T) -> Result<(), T> {
        self.sender.send(t).map_err(|e| e.0)
    }
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> PortSender<T> {
        PortSender {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Send> Sender<T> for PortSender<T> {
    fn send(&mut self, t: T) -> Result<(), Error> {
        self.sender
            .send(t)
            .map_err(|_| ChannelError("failed to post message to port"))
    }
}
