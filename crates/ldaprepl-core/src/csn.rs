//! Change Sequence Numbers
//!
//! A CSN identifies one replicated change and gives every change in the
//! topology a place in a single total order:
//!
//! ```text
//! ┌──────────────────────┬───────────────┬────────────────┐
//! │ timestamp (ms, u64)  │ sequence (u32)│ replica id(u16)│
//! └──────────────────────┴───────────────┴────────────────┘
//!   compared first          then            then
//! ```
//!
//! Two textual forms are used on the wire: the 28 hex digit string
//! (`%016x` timestamp, `%04x` replica id, `%08x` sequence) and a 14 byte
//! big-endian binary form in the same field order.

use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Length of the hex string form
pub const CSN_STRING_LEN: usize = 28;

/// Length of the binary form
pub const CSN_BYTE_LEN: usize = 14;

/// Immutable logical timestamp of a replicated change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Csn {
    timestamp: u64,
    seqnum: u32,
    replica_id: u16,
}

impl Csn {
    /// The "never seen" CSN, older than every real change
    pub const ZERO: Csn = Csn {
        timestamp: 0,
        seqnum: 0,
        replica_id: 0,
    };

    /// Create a CSN from its three components
    pub const fn new(timestamp: u64, seqnum: u32, replica_id: u16) -> Self {
        Self {
            timestamp,
            seqnum,
            replica_id,
        }
    }

    /// Wall-clock milliseconds of the change
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Same-millisecond disambiguator
    pub fn seqnum(&self) -> u32 {
        self.seqnum
    }

    /// Replica that produced the change
    pub fn replica_id(&self) -> u16 {
        self.replica_id
    }

    /// True when `self` sorts strictly before `other`
    pub fn is_older_than(&self, other: &Csn) -> bool {
        self < other
    }

    /// True when `self` sorts strictly after `other`
    pub fn is_newer_than(&self, other: &Csn) -> bool {
        self > other
    }

    /// Milliseconds between two CSNs, saturating at zero
    pub fn time_diff_ms(&self, older: &Csn) -> u64 {
        self.timestamp.saturating_sub(older.timestamp)
    }

    /// Fixed-width binary form: timestamp, replica id, sequence, big-endian
    pub fn to_bytes(&self) -> [u8; CSN_BYTE_LEN] {
        let mut out = [0u8; CSN_BYTE_LEN];
        out[0..8].copy_from_slice(&self.timestamp.to_be_bytes());
        out[8..10].copy_from_slice(&self.replica_id.to_be_bytes());
        out[10..14].copy_from_slice(&self.seqnum.to_be_bytes());
        out
    }

    /// Parse the fixed-width binary form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CSN_BYTE_LEN {
            return Err(Error::invalid_csn(format!(
                "expected {} bytes, got {}",
                CSN_BYTE_LEN,
                bytes.len()
            )));
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[0..8]);
        let mut id = [0u8; 2];
        id.copy_from_slice(&bytes[8..10]);
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&bytes[10..14]);
        Ok(Self {
            timestamp: u64::from_be_bytes(ts),
            replica_id: u16::from_be_bytes(id),
            seqnum: u32::from_be_bytes(seq),
        })
    }
}

impl Ord for Csn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.seqnum.cmp(&other.seqnum))
            .then(self.replica_id.cmp(&other.replica_id))
    }
}

impl PartialOrd for Csn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}{:04x}{:08x}",
            self.timestamp, self.replica_id, self.seqnum
        )
    }
}

impl FromStr for Csn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != CSN_STRING_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::invalid_csn(format!("'{}' is not a 28 digit hex CSN", s)));
        }
        let parse = |range: std::ops::Range<usize>| {
            u64::from_str_radix(&s[range], 16).map_err(|e| Error::invalid_csn(e.to_string()))
        };
        Ok(Self {
            timestamp: parse(0..16)?,
            replica_id: parse(16..20)? as u16,
            seqnum: parse(20..28)? as u32,
        })
    }
}

/// Local change clock of one replica
///
/// Every CSN handed out is strictly greater than the previous one and
/// greater than any CSN passed to [`CsnGenerator::adjust`].
#[derive(Debug)]
pub struct CsnGenerator {
    replica_id: u16,
    last: Mutex<(u64, u32)>,
}

impl CsnGenerator {
    /// Create a generator for `replica_id`
    pub fn new(replica_id: u16) -> Self {
        Self {
            replica_id,
            last: Mutex::new((0, 0)),
        }
    }

    /// Create a generator that resumes after `last`
    pub fn resume(replica_id: u16, last: &Csn) -> Self {
        Self {
            replica_id,
            last: Mutex::new((last.timestamp, last.seqnum)),
        }
    }

    /// Replica id stamped on generated CSNs
    pub fn replica_id(&self) -> u16 {
        self.replica_id
    }

    /// Generate the next CSN from the wall clock
    pub fn new_csn(&self) -> Result<Csn> {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.new_csn_at(now)
    }

    /// Generate the next CSN as if the wall clock read `now_ms`
    ///
    /// Fails once the clock sits on the largest representable CSN, which
    /// only a peer announcing that CSN can cause.
    pub fn new_csn_at(&self, now_ms: u64) -> Result<Csn> {
        let mut last = self.last.lock();
        let (ts, seq) = *last;
        let next = if now_ms > ts {
            (now_ms, 0)
        } else if let Some(seq) = seq.checked_add(1) {
            (ts, seq)
        } else {
            let ts = ts.checked_add(1).ok_or_else(|| {
                Error::invalid_csn(format!(
                    "CSN space of replica {} is exhausted",
                    self.replica_id
                ))
            })?;
            (ts, 0)
        };
        *last = next;
        Ok(Csn::new(next.0, next.1, self.replica_id))
    }

    /// Move the clock forward past a CSN received from another replica
    pub fn adjust(&self, seen: &Csn) {
        let mut last = self.last.lock();
        if (seen.timestamp, seen.seqnum) > *last {
            tracing::trace!("Adjusting CSN clock of replica {} to {}", self.replica_id, seen);
            *last = (seen.timestamp, seen.seqnum);
        }
    }
}
