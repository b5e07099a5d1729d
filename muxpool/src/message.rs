// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! Messages exchanged between the multiplexer side and the worker side

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

/// Correlation id of a call
///
/// Ids are generated outside this layer and treated as opaque strings.
/// They are assumed to be globally unique for the lifetime of the pool.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Message types passed between the multiplexer and the workers
///
/// A `Call` may originate on either side. Each call produces at most one
/// terminal result with the same id. Messages are forwarded verbatim, this
/// layer never looks at the payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // A method invocation request identified by a unique correlation id
    Call { id: CallId, payload: Value },

    // The successful terminal response to a prior call with the same id
    ResultSuccess { id: CallId, value: Value },

    // The failed terminal response to a prior call with the same id
    ResultError { id: CallId, error: Value },
}

impl Message {
    /// Return the correlation id of the message
    pub fn id(&self) -> &CallId {
        match self {
            Message::Call { id, .. } => id,
            Message::ResultSuccess { id, .. } => id,
            Message::ResultError { id, .. } => id,
        }
    }

    /// Whether this is a call message
    pub fn is_call(&self) -> bool {
        matches!(self, Message::Call { .. })
    }

    /// Whether this is one of the two terminal result messages
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            Message::ResultSuccess { .. } | Message::ResultError { .. }
        )
    }
}
