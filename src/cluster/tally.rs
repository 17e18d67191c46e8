//! Quorum tally
//!
//! Counts replica answers and decides as early as the outcome is certain.

use super::ReplicaFactor;

/// Outcome of a tally so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyState {
    /// Still waiting on replicas that could change the outcome
    Pending,
    /// At least `ack` replicas acknowledged
    Reached,
    /// Too few replicas left to reach `ack`
    Failed,
}

#[derive(Debug, Clone)]
pub struct Tally {
    required: usize,
    outstanding: usize,
    acks: usize,
}

impl Tally {
    pub fn new(factor: ReplicaFactor) -> Self {
        Self {
            required: factor.ack(),
            outstanding: factor.from(),
            acks: 0,
        }
    }

    /// Record an acknowledgement
    pub fn ack(&mut self) -> TallyState {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.acks += 1;
        self.state()
    }

    /// Record a failure, timeout or unreachable replica
    pub fn fail(&mut self) -> TallyState {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.state()
    }

    pub fn state(&self) -> TallyState {
        if self.acks >= self.required {
            TallyState::Reached
        } else if self.acks + self.outstanding < self.required {
            TallyState::Failed
        } else {
            TallyState::Pending
        }
    }

    pub fn acks(&self) -> usize {
        self.acks
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_of_three_with_one_failure() {
        let mut tally = Tally::new(ReplicaFactor::new(2, 3));
        assert_eq!(tally.fail(), TallyState::Pending);
        assert_eq!(tally.ack(), TallyState::Pending);
        assert_eq!(tally.ack(), TallyState::Reached);
    }

    #[test]
    fn test_fails_as_soon_as_quorum_is_impossible() {
        let mut tally = Tally::new(ReplicaFactor::new(2, 3));
        assert_eq!(tally.fail(), TallyState::Pending);
        assert_eq!(tally.fail(), TallyState::Failed);
        assert_eq!(tally.outstanding(), 1);
    }

    #[test]
    fn test_reaches_early() {
        let mut tally = Tally::new(ReplicaFactor::new(1, 3));
        assert_eq!(tally.ack(), TallyState::Reached);
        assert_eq!(tally.outstanding(), 2);
    }
}
