//! Batch bookkeeping: outcome partitions and the controller states.

pub mod controller;

pub use controller::{BatchController, BatchReport, RunSummary};

use crate::phone::PhoneIdentity;
use serde::Serialize;
use std::fmt;

/// Where an attempted identity ended up in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Selected in the UI; processed only after the operator confirms the add.
    Added,
    AlreadyInGroup,
    Invited,
    NotAdded,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Added,
        Partition::AlreadyInGroup,
        Partition::Invited,
        Partition::NotAdded,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            Partition::Added => "added",
            Partition::AlreadyInGroup => "already_in_group",
            Partition::Invited => "invited",
            Partition::NotAdded => "not_added",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Partition::Added => "Added",
            Partition::AlreadyInGroup => "Already in group",
            Partition::Invited => "Invited",
            Partition::NotAdded => "Not added",
        }
    }

    /// Whether the identity is resolved without waiting for a commit.
    pub fn resolves_immediately(self) -> bool {
        matches!(self, Partition::AlreadyInGroup | Partition::Invited)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// States the controller moves through while running a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    AwaitBatchSize,
    SelectingParticipant,
    ManualLookup,
    AutomaticLookup,
    InteractiveFallback,
    BatchFull,
    QueueExhausted,
    ConfirmCommit,
    BatchClosed,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchPhase::AwaitBatchSize => "await-batch-size",
            BatchPhase::SelectingParticipant => "selecting-participant",
            BatchPhase::ManualLookup => "manual-lookup",
            BatchPhase::AutomaticLookup => "automatic-lookup",
            BatchPhase::InteractiveFallback => "interactive-fallback",
            BatchPhase::BatchFull => "batch-full",
            BatchPhase::QueueExhausted => "queue-exhausted",
            BatchPhase::ConfirmCommit => "confirm-commit",
            BatchPhase::BatchClosed => "batch-closed",
        };
        f.write_str(name)
    }
}

/// The four disjoint partitions of the identities attempted in one batch.
///
/// Every identity is recorded exactly once; recording it again is ignored
/// and reported as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub added: Vec<PhoneIdentity>,
    pub already_in_group: Vec<PhoneIdentity>,
    pub invited: Vec<PhoneIdentity>,
    pub not_added: Vec<PhoneIdentity>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, identity: PhoneIdentity, partition: Partition) -> bool {
        if self.contains(&identity) {
            return false;
        }
        self.partition_mut(partition).push(identity);
        true
    }

    pub fn contains(&self, identity: &PhoneIdentity) -> bool {
        Partition::ALL
            .iter()
            .any(|p| self.partition(*p).contains(identity))
    }

    pub fn partition(&self, partition: Partition) -> &[PhoneIdentity] {
        match partition {
            Partition::Added => &self.added,
            Partition::AlreadyInGroup => &self.already_in_group,
            Partition::Invited => &self.invited,
            Partition::NotAdded => &self.not_added,
        }
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut Vec<PhoneIdentity> {
        match partition {
            Partition::Added => &mut self.added,
            Partition::AlreadyInGroup => &mut self.already_in_group,
            Partition::Invited => &mut self.invited,
            Partition::NotAdded => &mut self.not_added,
        }
    }

    /// Number of entries selected in the UI (pending the operator's add).
    pub fn selected_count(&self) -> usize {
        self.added.len()
    }

    pub fn attempted(&self) -> usize {
        Partition::ALL
            .iter()
            .map(|p| self.partition(*p).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PhoneIdentity {
        PhoneIdentity::try_from(s.to_string()).unwrap()
    }

    #[test]
    fn test_record_keeps_partitions_disjoint() {
        let mut outcome = BatchOutcome::new();
        assert!(outcome.record(id("+911"), Partition::Invited));
        assert!(!outcome.record(id("+911"), Partition::Added));
        assert!(outcome.record(id("+912"), Partition::Added));
        assert_eq!(outcome.invited, vec![id("+911")]);
        assert_eq!(outcome.added, vec![id("+912")]);
        assert_eq!(outcome.attempted(), 2);
        assert_eq!(outcome.selected_count(), 1);
    }

    #[test]
    fn test_only_added_waits_for_commit() {
        assert!(!Partition::Added.resolves_immediately());
        assert!(!Partition::NotAdded.resolves_immediately());
        assert!(Partition::Invited.resolves_immediately());
        assert!(Partition::AlreadyInGroup.resolves_immediately());
    }

    #[test]
    fn test_file_stems_are_distinct() {
        let stems: std::collections::HashSet<_> =
            Partition::ALL.iter().map(|p| p.file_stem()).collect();
        assert_eq!(stems.len(), 4);
    }

    #[test]
    fn test_batch_phase_display() {
        assert_eq!(BatchPhase::InteractiveFallback.to_string(), "interactive-fallback");
        assert_eq!(BatchPhase::ConfirmCommit.to_string(), "confirm-commit");
    }
}
