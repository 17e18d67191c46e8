//! Versioned values and cells
//!
//! A [`Value`] is one version of a key: a timestamp, an optional payload
//! (`None` = tombstone) and an optional absolute expiry. A [`Cell`] ties a
//! value to its key and to the generation of the table it was read from.
//!
//! ## Clock
//! Timestamps are nanoseconds since the UNIX epoch. They come from the wall
//! clock so replicas on different machines can compare them, and
//! [`timestamp_now`] bumps them so they never repeat or go backwards inside
//! one process.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Last timestamp handed out by [`timestamp_now`]
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Current wall-clock time in nanoseconds since the UNIX epoch
pub fn wall_clock_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Next write timestamp: wall clock, strictly increasing within the process
pub fn timestamp_now() -> u64 {
    let wall = wall_clock_nanos();
    let mut last = LAST_TIMESTAMP.load(AtomicOrdering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(
            last,
            next,
            AtomicOrdering::AcqRel,
            AtomicOrdering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Absolute expiry deadline `ttl` from now
pub fn deadline_after(ttl: Duration) -> u64 {
    wall_clock_nanos().saturating_add(ttl.as_nanos().min(u64::MAX as u128) as u64)
}

/// One version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    timestamp: u64,
    payload: Option<Bytes>,
    expires_at: Option<u64>,
}

impl Value {
    /// A live value stamped with the current time
    pub fn live(payload: Bytes) -> Self {
        Self::from_parts(timestamp_now(), Some(payload), None)
    }

    /// A live value that expires at the absolute time `expires_at`
    pub fn expiring(payload: Bytes, expires_at: u64) -> Self {
        Self::from_parts(timestamp_now(), Some(payload), Some(expires_at))
    }

    /// A tombstone stamped with the current time
    pub fn tombstone() -> Self {
        Self::from_parts(timestamp_now(), None, None)
    }

    pub fn from_parts(timestamp: u64, payload: Option<Bytes>, expires_at: Option<u64>) -> Self {
        Self {
            timestamp,
            payload,
            expires_at,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Payload, `None` for tombstones
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Takes the payload out, `None` for tombstones
    pub fn into_payload(self) -> Option<Bytes> {
        self.payload
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// True once the expiry deadline is at or before `now`
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }

    /// Neither a tombstone nor expired at `now`
    pub fn is_live(&self, now: u64) -> bool {
        !self.is_tombstone() && !self.is_expired(now)
    }

    /// Bytes this value contributes to a memtable's size
    pub fn footprint(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.len())
    }

    /// Orders by recency: the later timestamp compares greater
    pub fn cmp_recency(&self, other: &Value) -> Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

/// A value together with its key and the generation of its source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub key: Bytes,
    pub value: Value,
    pub generation: u64,
}

impl Cell {
    pub fn new(key: Bytes, value: Value, generation: u64) -> Self {
        Self {
            key,
            value,
            generation,
        }
    }

    /// Merge order: key ascending, then newest generation first
    pub fn merge_cmp(&self, other: &Cell) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}
