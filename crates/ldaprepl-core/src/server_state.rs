//! Per-replica checkpoints
//!
//! A [`ServerState`] remembers, for every replica, the newest CSN seen from
//! it. Entries only move forward: `update` with an older or equal CSN is a
//! no-op. The state doubles as a resume cookie in handshake messages and as
//! a progress report in monitoring messages.
//!
//! [`SharedServerState`] is the concurrent flavour fed by many tasks at once;
//! its update-if-greater runs under the shard lock of the replica key.

use crate::csn::{CSN_BYTE_LEN, Csn};
use crate::{Error, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Highest CSN seen per replica
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    entries: BTreeMap<u16, Csn>,
}

impl ServerState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a CSN into the state; returns whether the state changed
    pub fn update(&mut self, csn: Csn) -> bool {
        match self.entries.entry(csn.replica_id()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(csn);
                true
            }
            btree_map::Entry::Occupied(mut slot) => {
                if csn > *slot.get() {
                    slot.insert(csn);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Fold every entry of `other` into this state
    pub fn update_from(&mut self, other: &ServerState) -> bool {
        let mut changed = false;
        for csn in other.entries.values() {
            changed |= self.update(*csn);
        }
        changed
    }

    /// Newest CSN seen from `replica_id`, `None` if never seen
    pub fn csn(&self, replica_id: u16) -> Option<Csn> {
        self.entries.get(&replica_id).copied()
    }

    /// True when this state already includes `csn`
    pub fn cover(&self, csn: &Csn) -> bool {
        self.csn(csn.replica_id()).is_some_and(|seen| seen >= *csn)
    }

    /// Newest CSN across all replicas
    pub fn max_csn(&self) -> Option<Csn> {
        self.entries.values().max().copied()
    }

    /// Number of replicas tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no replica has been seen
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(replica id, csn)` in replica id order
    pub fn iter(&self) -> impl Iterator<Item = (u16, Csn)> + '_ {
        self.entries.iter().map(|(id, csn)| (*id, *csn))
    }

    /// Add the first CSN of a replica while parsing a wire form
    pub(crate) fn insert_unique(&mut self, csn: Csn) -> Result<()> {
        match self.entries.entry(csn.replica_id()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(csn);
                Ok(())
            }
            btree_map::Entry::Occupied(slot) => Err(Error::malformed(format!(
                "replica {} listed twice in server state ({} and {})",
                csn.replica_id(),
                slot.get(),
                csn
            ))),
        }
    }

    /// Binary form: u32 big-endian byte length, then 14 bytes per CSN
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.entries.len() * CSN_BYTE_LEN;
        let mut out = Vec::with_capacity(4 + len);
        out.extend_from_slice(&(len as u32).to_be_bytes());
        for csn in self.entries.values() {
            out.extend_from_slice(&csn.to_bytes());
        }
        out
    }

    /// Parse the binary form produced by [`ServerState::to_bytes`]
    ///
    /// Returns the state and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 4 {
            return Err(Error::malformed("server state length prefix truncated"));
        }
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if len % CSN_BYTE_LEN != 0 {
            return Err(Error::malformed(format!(
                "server state length {} is not a multiple of {}",
                len, CSN_BYTE_LEN
            )));
        }
        let body = bytes
            .get(4..4 + len)
            .ok_or_else(|| Error::malformed("server state body truncated"))?;
        let mut state = ServerState::new();
        for chunk in body.chunks_exact(CSN_BYTE_LEN) {
            state.insert_unique(Csn::from_bytes(chunk)?)?;
        }
        Ok((state, 4 + len))
    }
}

impl FromIterator<Csn> for ServerState {
    fn from_iter<I: IntoIterator<Item = Csn>>(iter: I) -> Self {
        let mut state = ServerState::new();
        for csn in iter {
            state.update(csn);
        }
        state
    }
}

/// Server state updated concurrently by many feeders
#[derive(Debug, Default)]
pub struct SharedServerState {
    entries: DashMap<u16, Csn>,
}

impl SharedServerState {
    /// Create an empty shared state
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic update-if-greater for the CSN's replica
    pub fn update(&self, csn: Csn) -> bool {
        let mut changed = false;
        self.entries
            .entry(csn.replica_id())
            .and_modify(|seen| {
                if csn > *seen {
                    *seen = csn;
                    changed = true;
                }
            })
            .or_insert_with(|| {
                changed = true;
                csn
            });
        changed
    }

    /// Newest CSN seen from `replica_id`
    pub fn csn(&self, replica_id: u16) -> Option<Csn> {
        self.entries.get(&replica_id).map(|entry| *entry.value())
    }

    /// Point-in-time copy suitable for encoding
    pub fn snapshot(&self) -> ServerState {
        self.entries.iter().map(|entry| *entry.value()).collect()
    }
}

impl From<ServerState> for SharedServerState {
    fn from(state: ServerState) -> Self {
        let shared = SharedServerState::new();
        for (_, csn) in state.iter() {
            shared.update(csn);
        }
        shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_update_keeps_highest() {
        let mut state = ServerState::new();
        assert!(state.update(Csn::new(10, 0, 1)));
        assert!(!state.update(Csn::new(10, 0, 1)));
        assert!(!state.update(Csn::new(9, 5, 1)));
        assert!(state.update(Csn::new(10, 1, 1)));
        assert_eq!(state.csn(1), Some(Csn::new(10, 1, 1)));
        assert_eq!(state.csn(2), None);
    }

    #[test]
    fn test_cover_and_max() {
        let state: ServerState = [Csn::new(10, 0, 1), Csn::new(20, 0, 2)].into_iter().collect();
        assert!(state.cover(&Csn::new(5, 0, 1)));
        assert!(state.cover(&Csn::new(10, 0, 1)));
        assert!(!state.cover(&Csn::new(11, 0, 1)));
        assert!(!state.cover(&Csn::new(1, 0, 3)));
        assert_eq!(state.max_csn(), Some(Csn::new(20, 0, 2)));
    }

    #[test]
    fn test_update_from() {
        let mut a: ServerState = [Csn::new(10, 0, 1)].into_iter().collect();
        let b: ServerState = [Csn::new(5, 0, 1), Csn::new(7, 0, 2)].into_iter().collect();
        assert!(a.update_from(&b));
        assert_eq!(a.csn(1), Some(Csn::new(10, 0, 1)));
        assert_eq!(a.csn(2), Some(Csn::new(7, 0, 2)));
        assert!(!a.update_from(&b));
    }

    #[test]
    fn test_byte_form() {
        let state: ServerState = [Csn::new(1, 2, 3), Csn::new(4, 5, 6)].into_iter().collect();
        let bytes = state.to_bytes();
        assert_eq!(&bytes[..4], &28u32.to_be_bytes());
        let (decoded, used) = ServerState::from_bytes(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded, state);

        let (empty, used) = ServerState::from_bytes(&[0, 0, 0, 0]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(used, 4);
    }

    #[test]
    fn test_byte_form_rejects_partial_records() {
        let mut bytes = vec![0, 0, 0, 13];
        bytes.extend_from_slice(&[0u8; 13]);
        assert!(matches!(ServerState::from_bytes(&bytes), Err(Error::Malformed(_))));

        let truncated = vec![0, 0, 0, 14, 0, 0];
        assert!(matches!(ServerState::from_bytes(&truncated), Err(Error::Malformed(_))));
        assert!(ServerState::from_bytes(&[0, 0]).is_err());
    }

    #[test]
    fn test_byte_form_rejects_repeated_replica() {
        let mut bytes = 28u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&Csn::new(10, 0, 7).to_bytes());
        bytes.extend_from_slice(&Csn::new(20, 0, 7).to_bytes());
        assert!(matches!(ServerState::from_bytes(&bytes), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_shared_state_concurrent_updates() {
        let shared = Arc::new(SharedServerState::new());
        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        shared.update(Csn::new(i * 8 + worker, 0, (i % 4) as u16));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.len(), 4);
        // Highest timestamps per replica id come from i = 496..=499, worker 7
        for (i, replica) in [(496u64, 0u16), (497, 1), (498, 2), (499, 3)] {
            assert_eq!(snapshot.csn(replica), Some(Csn::new(i * 8 + 7, 0, replica)));
        }
    }

    #[test]
    fn test_shared_from_state() {
        let state: ServerState = [Csn::new(1, 0, 1)].into_iter().collect();
        let shared = SharedServerState::from(state.clone());
        assert!(!shared.update(Csn::new(1, 0, 1)));
        assert_eq!(shared.snapshot(), state);
    }

    proptest! {
        #[test]
        fn prop_monotonic(updates in proptest::collection::vec((0u64..50, 0u32..4, 0u16..4), 0..64)) {
            let mut state = ServerState::new();
            for (t, s, r) in updates {
                let before = state.csn(r);
                let changed = state.update(Csn::new(t, s, r));
                let after = state.csn(r);
                prop_assert!(after >= before);
                prop_assert_eq!(changed, after != before);
            }
        }
    }
}
