//! Replica values
//!
//! What one replica reports for a key, and how a coordinator reconciles the
//! reports of several replicas.

use bytes::Bytes;

use crate::value::Value;

/// One replica's view of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaValue {
    /// Live value written at `timestamp`
    Present { timestamp: u64, data: Bytes },
    /// Deleted (or expired) at `timestamp`
    Removed { timestamp: u64 },
    /// The replica never saw the key
    Absent,
}

impl ReplicaValue {
    /// Classify a stored version, judging expiry at `now`
    ///
    /// An expired value reads as removed at its write timestamp.
    pub fn from_stored(value: Option<Value>, now: u64) -> Self {
        match value {
            None => ReplicaValue::Absent,
            Some(value) if value.is_live(now) => {
                let timestamp = value.timestamp();
                match value.into_payload() {
                    Some(data) => ReplicaValue::Present { timestamp, data },
                    None => ReplicaValue::Removed { timestamp },
                }
            }
            Some(value) => ReplicaValue::Removed {
                timestamp: value.timestamp(),
            },
        }
    }

    pub fn timestamp(&self) -> Option<u64> {
        match self {
            ReplicaValue::Present { timestamp, .. } | ReplicaValue::Removed { timestamp } => {
                Some(*timestamp)
            }
            ReplicaValue::Absent => None,
        }
    }

    /// Last write wins: the newest non-absent report, else absent
    ///
    /// On equal timestamps a removal beats a present value.
    pub fn merge<I>(values: I) -> ReplicaValue
    where
        I: IntoIterator<Item = ReplicaValue>,
    {
        values
            .into_iter()
            .fold(ReplicaValue::Absent, |best, candidate| {
                match (best.timestamp(), candidate.timestamp()) {
                    (_, None) => best,
                    (None, Some(_)) => candidate,
                    (Some(best_ts), Some(candidate_ts)) => {
                        let removal_tie = candidate_ts == best_ts
                            && matches!(candidate, ReplicaValue::Removed { .. });
                        if candidate_ts > best_ts || removal_tie {
                            candidate
                        } else {
                            best
                        }
                    }
                }
            })
    }

    /// Payload a client read returns, `None` for removed or absent keys
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            ReplicaValue::Present { data, .. } => Some(data),
            _ => None,
        }
    }
}
