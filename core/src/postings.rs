use crate::vector::SparseVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Owner of a posting: a cluster index while clustering, a query id in search.
pub type OwnerId = u32;

/// Feature -> set of owners whose vector carries that feature.
///
/// Candidate lookup is a safe over-approximation: every owner sharing at least
/// one feature with the probe comes back, nothing else does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingsIndex {
    postings: HashMap<String, BTreeSet<OwnerId>>,
}

impl PostingsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `owner` to the posting of every feature of `vector`.
    pub fn register(&mut self, owner: OwnerId, vector: &SparseVector) {
        for (feature, weight) in vector.iter() {
            if weight != 0.0 {
                self.insert(feature, owner);
            }
        }
    }

    /// Set semantics: inserting an existing (feature, owner) pair is a no-op.
    pub fn insert(&mut self, feature: &str, owner: OwnerId) {
        match self.postings.get_mut(feature) {
            Some(owners) => {
                owners.insert(owner);
            }
            None => {
                self.postings.insert(feature.to_string(), BTreeSet::from([owner]));
            }
        }
    }

    pub fn candidates(&self, vector: &SparseVector) -> Vec<OwnerId> {
        self.candidates_for(vector.features())
    }

    /// Distinct owners sharing a feature with `features`, in first-seen order:
    /// features in the given order, owners ascending within a posting.
    /// Unknown features contribute nothing.
    pub fn candidates_for<'a, I>(&self, features: I) -> Vec<OwnerId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for feature in features {
            if let Some(owners) = self.postings.get(feature) {
                for &owner in owners {
                    if seen.insert(owner) {
                        out.push(owner);
                    }
                }
            }
        }
        out
    }

    pub fn posting(&self, feature: &str) -> Option<&BTreeSet<OwnerId>> {
        self.postings.get(feature)
    }

    pub fn document_frequency(&self, feature: &str) -> usize {
        self.postings.get(feature).map_or(0, BTreeSet::len)
    }

    /// Number of distinct features.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}
