//! Loading the participant roster into an immutable processing queue.

use crate::errors::{EnrollError, Result};
use crate::phone::{PhoneIdentity, PhoneNormalizer};
use std::collections::HashSet;
use std::path::Path;

/// A roster line that could not be turned into an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    pub line_number: usize,
    pub raw: String,
}

/// Ordered participants, fixed at load time. Insertion order is processing
/// priority; repeated numbers keep their first position.
#[derive(Debug, Clone)]
pub struct ParticipantQueue {
    identities: Vec<PhoneIdentity>,
    rejected: Vec<RejectedLine>,
}

impl ParticipantQueue {
    /// Read a newline-delimited roster file. Blank lines are ignored.
    pub fn load(path: &Path, normalizer: &PhoneNormalizer) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EnrollError::ResourceLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let queue = Self::parse(&content, normalizer);
        if queue.identities.is_empty() {
            return Err(EnrollError::EmptyRoster {
                path: path.to_path_buf(),
            });
        }
        Ok(queue)
    }

    pub fn parse(content: &str, normalizer: &PhoneNormalizer) -> Self {
        let mut seen = HashSet::new();
        let mut identities = Vec::new();
        let mut rejected = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match normalizer.normalize(line) {
                Ok(identity) => {
                    if seen.insert(identity.clone()) {
                        identities.push(identity);
                    }
                }
                Err(_) => rejected.push(RejectedLine {
                    line_number: idx + 1,
                    raw: line.to_string(),
                }),
            }
        }

        Self {
            identities,
            rejected,
        }
    }

    pub fn identities(&self) -> &[PhoneIdentity] {
        &self.identities
    }

    pub fn rejected(&self) -> &[RejectedLine] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PhoneIdentity> {
        self.identities.get(index)
    }
}
