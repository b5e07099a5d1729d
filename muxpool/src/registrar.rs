// Copyright 2025 Accenture.
//
// SPDX-License-Identifier: Apache-2.0

//! Call affinity tracking

use crate::message::CallId;
use crate::worker::WorkerId;
use std::collections::HashMap;

/// Map from in-flight call id to the worker that issued the call
///
/// An entry is recorded when a call flows out of a worker and removed when
/// the matching result flows back in. Entries have no expiry; an entry whose
/// worker crashed before the result was produced is never consulted again
/// because ids are unique.
#[derive(Default)]
pub(crate) struct CallRegistrar {
    entries: HashMap<CallId, WorkerId>,
}

impl CallRegistrar {
    /// Record the originating worker of a call
    ///
    /// # Panics:
    ///
    /// Panics if an entry for the id already exists. Ids are unique by
    /// contract, a collision is an upstream bug.
    pub(crate) fn record(&mut self, id: CallId, worker: WorkerId) {
        let previous = self.entries.insert(id, worker);
        assert!(
            previous.is_none(),
            "duplicate call id recorded in affinity map"
        );
    }

    /// Look up and remove the originating worker for the given id
    pub(crate) fn take(&mut self, id: &CallId) -> Option<WorkerId> {
        self.entries.remove(id)
    }

    /// Number of calls still waiting for their result
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod test {
    use super::CallRegistrar;
    use crate::message::CallId;
    use crate::worker::WorkerId;

    #[test]
    fn test_record_and_take() {
        let mut registrar = CallRegistrar::default();
        registrar.record(CallId::from("a"), WorkerId::from(0));
        registrar.record(CallId::from("b"), WorkerId::from(1));
        assert_eq!(registrar.len(), 2);

        assert_eq!(registrar.take(&CallId::from("b")), Some(WorkerId::from(1)));
        assert_eq!(registrar.take(&CallId::from("b")), None);
        assert_eq!(registrar.take(&CallId::from("unknown")), None);
        assert_eq!(registrar.len(), 1);
    }

    #[test]
    #[should_panic(expected = "duplicate call id")]
    fn test_duplicate_id_is_a_defect() {
        let mut registrar = CallRegistrar::default();
        registrar.record(CallId::from("a"), WorkerId::from(0));
        registrar.record(CallId::from("a"), WorkerId::from(1));
    }
}
