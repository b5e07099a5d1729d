// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! Call identifier generation
//!
//! The pool itself treats call ids as opaque; this module is the shim that
//! multiplexer-side callers use to mint fresh ids for outgoing calls.

use crate::message::CallId;
use rand::RngCore;

/// Source of fresh, globally unique call ids
pub trait IdentifierGenerator {
    fn next_id(&self) -> CallId;
}

/// Generator producing random UUID version 4 formatted ids
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdentifierGenerator;

impl IdentifierGenerator for RandomIdentifierGenerator {
    fn next_id(&self) -> CallId {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);

        // RFC 4122: version nibble and variant bits
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;

        let mut id = String::with_capacity(36);
        for (i, byte) in bytes.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                id.push('-');
            }
            id.push_str(&format!("{byte:02x}"));
        }
        CallId::new(id)
    }
}
