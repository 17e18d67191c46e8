//! Replica factor
//!
//! `ack/from`: send an operation to `from` nodes and succeed once `ack` of
//! them acknowledged it.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaFactor {
    ack: usize,
    from: usize,
}

impl ReplicaFactor {
    /// Unchecked; see [`ReplicaFactor::validate`]
    pub fn new(ack: usize, from: usize) -> Self {
        Self { ack, from }
    }

    /// Majority of `nodes`: `(nodes / 2 + 1) / nodes`
    pub fn majority(nodes: usize) -> Self {
        Self::new(nodes / 2 + 1, nodes)
    }

    pub fn ack(&self) -> usize {
        self.ack
    }

    pub fn from(&self) -> usize {
        self.from
    }

    /// Reject factors that cannot be served by a cluster of `nodes`
    pub fn validate(&self, nodes: usize) -> Result<()> {
        if self.ack < 1 {
            return Err(RingError::InvalidReplicaFactor(format!("{}: ack must be at least 1", self)));
        }
        if self.ack > self.from {
            return Err(RingError::InvalidReplicaFactor(format!("{}: ack exceeds from", self)));
        }
        if self.from > nodes {
            return Err(RingError::InvalidReplicaFactor(format!(
                "{}: only {} nodes in the cluster",
                self, nodes
            )));
        }
        Ok(())
    }
}

impl FromStr for ReplicaFactor {
    type Err = RingError;

    /// Parses `"ack/from"`; the result is not validated yet
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RingError::InvalidReplicaFactor(format!("expected ack/from, got {:?}", s));

        let (ack, from) = s.split_once('/').ok_or_else(invalid)?;
        let ack = ack.trim().parse().map_err(|_| invalid())?;
        let from = from.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(ack, from))
    }
}

impl fmt::Display for ReplicaFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ack, self.from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let factor: ReplicaFactor = "2/3".parse().unwrap();
        assert_eq!((factor.ack(), factor.from()), (2, 3));
        assert!("2".parse::<ReplicaFactor>().is_err());
        assert!("a/3".parse::<ReplicaFactor>().is_err());
        assert!("2/3/4".parse::<ReplicaFactor>().is_err());
        assert!("-1/3".parse::<ReplicaFactor>().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ReplicaFactor::new(2, 3).validate(3).is_ok());
        assert!(ReplicaFactor::new(0, 3).validate(3).is_err());
        assert!(ReplicaFactor::new(4, 3).validate(3).is_err());
        assert!(ReplicaFactor::new(1, 4).validate(3).is_err());
    }

    #[test]
    fn test_majority() {
        assert_eq!(ReplicaFactor::majority(1), ReplicaFactor::new(1, 1));
        assert_eq!(ReplicaFactor::majority(3), ReplicaFactor::new(2, 3));
        assert_eq!(ReplicaFactor::majority(4), ReplicaFactor::new(3, 4));
    }
}
