//! Single-pass clustering under a diameter bound.
//!
//! Entities are consumed in caller order and each one either joins the
//! nearest existing cluster it shares a feature with, or starts a new one.
//! Order matters: the result is an online clustering, not a global optimum.
//! Candidate clusters come from a postings index over cluster features, so a
//! cluster that shares no feature with the entity is never considered.
//!
//! When two candidate centroids are equidistant the one seen first wins.
//! Candidates are visited by ascending feature, then ascending cluster index,
//! which makes the tie-break stable from run to run.

use crate::corpus::{Corpus, Field, QueryId};
use crate::error::{Error, Result};
use crate::postings::{OwnerId, PostingsIndex};
use crate::vector::{centroid, diameter, euclidean_distance, SparseVector, MAX_EUCLIDEAN_DISTANCE};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    members: Vec<QueryId>,
    centroid: SparseVector,
}

impl Cluster {
    /// Members in insertion order.
    pub fn members(&self) -> &[QueryId] {
        &self.members
    }

    pub fn centroid(&self) -> &SparseVector {
        &self.centroid
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStats {
    pub entities: usize,
    pub merges: usize,
    /// Entities whose nearest candidate would have exceeded the diameter.
    pub rejected: usize,
}

pub struct IncrementalClusterer<'c> {
    corpus: &'c Corpus,
    field: Field,
    max_diameter: f64,
    clusters: Vec<Cluster>,
    postings: PostingsIndex,
    assignment: HashMap<QueryId, usize>,
    stats: ClusterStats,
}

impl<'c> IncrementalClusterer<'c> {
    pub fn new(corpus: &'c Corpus, field: Field, max_diameter: f64) -> Result<Self> {
        if !max_diameter.is_finite() || max_diameter < 0.0 {
            return Err(Error::InvalidDiameter(max_diameter));
        }
        Ok(Self {
            corpus,
            field,
            max_diameter,
            clusters: Vec::new(),
            postings: PostingsIndex::new(),
            assignment: HashMap::new(),
            stats: ClusterStats::default(),
        })
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn max_diameter(&self) -> f64 {
        self.max_diameter
    }

    /// Clusters in creation order; indices are stable until `finish`.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster_of(&self, id: QueryId) -> Option<usize> {
        self.assignment.get(&id).copied()
    }

    pub fn stats(&self) -> ClusterStats {
        self.stats
    }

    /// Place one entity and return the index of the cluster it landed in.
    pub fn push(&mut self, id: QueryId) -> Result<usize> {
        let corpus = self.corpus;
        let record = corpus.get(id).ok_or(Error::UnknownQuery(id))?;
        if self.assignment.contains_key(&id) {
            return Err(Error::DuplicateQuery(id));
        }
        let vector = record.vector(self.field);
        self.stats.entities += 1;

        if let Some(cid) = self.nearest(vector) {
            let mut members = self.clusters[cid].members.clone();
            members.push(id);
            let vectors: Vec<&SparseVector> = members
                .iter()
                .filter_map(|m| corpus.get(*m))
                .map(|r| r.vector(self.field))
                .collect();
            if diameter(&vectors) <= self.max_diameter {
                let merged = centroid(&vectors).unwrap_or_default();
                let cluster = &mut self.clusters[cid];
                cluster.members = members;
                cluster.centroid = merged;
                self.postings.register(cid as OwnerId, vector);
                self.assignment.insert(id, cid);
                self.stats.merges += 1;
                return Ok(cid);
            }
            self.stats.rejected += 1;
        }

        let cid = self.clusters.len();
        self.clusters.push(Cluster { members: vec![id], centroid: vector.clone() });
        self.postings.register(cid as OwnerId, vector);
        self.assignment.insert(id, cid);
        Ok(cid)
    }

    pub fn extend<I: IntoIterator<Item = QueryId>>(&mut self, ids: I) -> Result<()> {
        for id in ids {
            self.push(id)?;
        }
        Ok(())
    }

    /// Nearest candidate centroid strictly closer than the normalized-distance bound.
    fn nearest(&self, vector: &SparseVector) -> Option<usize> {
        let mut best_dist = MAX_EUCLIDEAN_DISTANCE;
        let mut best = None;
        for cid in self.postings.candidates(vector) {
            let dist = euclidean_distance(vector, &self.clusters[cid as usize].centroid);
            if dist < best_dist {
                best_dist = dist;
                best = Some(cid as usize);
            }
        }
        best
    }

    /// Sort clusters by descending size and members by descending frequency.
    /// Both sorts are stable.
    pub fn finish(self) -> Clustering {
        let corpus = self.corpus;
        let mut clusters: Vec<Vec<QueryId>> =
            self.clusters.into_iter().map(|c| c.members).collect();
        clusters.sort_by_key(|c| Reverse(c.len()));
        for members in clusters.iter_mut() {
            members.sort_by_key(|id| Reverse(corpus.get(*id).map_or(0, |r| r.frequency)));
        }
        tracing::debug!(
            field = ?self.field,
            max_diameter = self.max_diameter,
            entities = self.stats.entities,
            clusters = clusters.len(),
            merges = self.stats.merges,
            "clustering pass complete"
        );
        Clustering { clusters, stats: self.stats }
    }
}

/// Finalized clusters, largest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Clustering {
    clusters: Vec<Vec<QueryId>>,
    stats: ClusterStats,
}

impl Clustering {
    pub fn clusters(&self) -> &[Vec<QueryId>] {
        &self.clusters
    }

    pub fn iter(&self) -> impl Iterator<Item = &[QueryId]> {
        self.clusters.iter().map(Vec::as_slice)
    }

    pub fn stats(&self) -> ClusterStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn into_clusters(self) -> Vec<Vec<QueryId>> {
        self.clusters
    }
}

/// Behavioral clusters, each split again into lexical subgroups.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Hierarchy {
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub members: Vec<QueryId>,
    pub subgroups: Vec<Vec<QueryId>>,
}

impl Hierarchy {
    pub fn subgroup_count(&self) -> usize {
        self.groups.iter().map(|g| g.subgroups.len()).sum()
    }
}

/// Two clustering passes with independent bounds: clicks first, then tokens
/// within each click cluster.
#[derive(Debug, Clone, Copy)]
pub struct HierarchicalGrouper {
    outer_diameter: f64,
    inner_diameter: f64,
    outer_field: Field,
    inner_field: Field,
}

impl HierarchicalGrouper {
    pub fn new(outer_diameter: f64, inner_diameter: f64) -> Result<Self> {
        Self::with_fields(Field::Clicks, outer_diameter, Field::Tokens, inner_diameter)
    }

    pub fn with_fields(
        outer_field: Field,
        outer_diameter: f64,
        inner_field: Field,
        inner_diameter: f64,
    ) -> Result<Self> {
        for d in [outer_diameter, inner_diameter] {
            if !d.is_finite() || d < 0.0 {
                return Err(Error::InvalidDiameter(d));
            }
        }
        Ok(Self { outer_diameter, inner_diameter, outer_field, inner_field })
    }

    /// Outer pass over `ids` in order, then the inner pass per outer cluster.
    pub fn group<I>(&self, corpus: &Corpus, ids: I) -> Result<Hierarchy>
    where
        I: IntoIterator<Item = QueryId>,
    {
        let mut outer = IncrementalClusterer::new(corpus, self.outer_field, self.outer_diameter)?;
        outer.extend(ids)?;
        let clustering = outer.finish();
        self.regroup(corpus, &clustering)
    }

    /// Inner pass only, over an existing outer clustering. Each outer cluster
    /// gets a fresh clusterer; they share nothing and run in parallel, with
    /// results kept in outer-cluster order.
    pub fn regroup(&self, corpus: &Corpus, outer: &Clustering) -> Result<Hierarchy> {
        let groups = outer
            .clusters()
            .par_iter()
            .map(|members| {
                let mut inner =
                    IncrementalClusterer::new(corpus, self.inner_field, self.inner_diameter)?;
                inner.extend(members.iter().copied())?;
                Ok(Group { members: members.clone(), subgroups: inner.finish().into_clusters() })
            })
            .collect::<Result<Vec<_>>>()?;
        let hierarchy = Hierarchy { groups };
        tracing::info!(
            outer_diameter = self.outer_diameter,
            inner_diameter = self.inner_diameter,
            clusters = hierarchy.groups.len(),
            groups = hierarchy.subgroup_count(),
            "grouping complete"
        );
        Ok(hierarchy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicks(pairs: &[(&str, f64)]) -> SparseVector {
        pairs.iter().map(|(k, w)| (*k, *w)).collect::<SparseVector>().l2_normalize()
    }

    fn corpus_of(rows: &[(&str, u64, &[(&str, f64)])]) -> Corpus {
        let mut corpus = Corpus::new();
        for (text, freq, c) in rows {
            let tokens = SparseVector::from_features(text.split_whitespace());
            corpus.push(*text, *freq, clicks(c), tokens);
        }
        corpus
    }

    #[test]
    fn merges_overlapping_and_isolates_disjoint() {
        let corpus = corpus_of(&[
            ("q1", 3, &[("pA", 1.0)]),
            ("q2", 5, &[("pA", 0.9), ("pB", 0.1)]),
            ("q3", 9, &[("pC", 1.0)]),
        ]);
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.5).unwrap();
        c.extend(corpus.ids()).unwrap();
        assert_eq!(c.cluster_of(0), c.cluster_of(1));
        assert_ne!(c.cluster_of(0), c.cluster_of(2));
        let out = c.finish();
        assert_eq!(out.clusters(), &[vec![1, 0], vec![2]]);
        assert_eq!(out.stats().merges, 1);
    }

    #[test]
    fn rejects_bad_diameter() {
        let corpus = Corpus::new();
        assert!(matches!(
            IncrementalClusterer::new(&corpus, Field::Clicks, -0.1),
            Err(Error::InvalidDiameter(_))
        ));
        assert!(IncrementalClusterer::new(&corpus, Field::Clicks, f64::NAN).is_err());
        assert!(HierarchicalGrouper::new(0.5, f64::INFINITY).is_err());
    }

    #[test]
    fn unknown_and_repeated_ids_fail() {
        let corpus = corpus_of(&[("q1", 1, &[("pA", 1.0)])]);
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.5).unwrap();
        assert!(matches!(c.push(4), Err(Error::UnknownQuery(4))));
        c.push(0).unwrap();
        assert!(matches!(c.push(0), Err(Error::DuplicateQuery(0))));
    }

    #[test]
    fn zero_diameter_merges_identical_vectors() {
        let corpus = corpus_of(&[
            ("a", 1, &[("p", 1.0)]),
            ("b", 1, &[("p", 1.0)]),
            ("c", 1, &[("p", 1.0)]),
        ]);
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.0).unwrap();
        c.extend(corpus.ids()).unwrap();
        assert_eq!(c.clusters().len(), 1);
    }

    #[test]
    fn point_just_past_the_bound_is_a_singleton() {
        let corpus = corpus_of(&[("a", 1, &[("p", 1.0)]), ("b", 1, &[("p", 1.0), ("q", 1.0)])]);
        let a = corpus.get(0).unwrap().vector(Field::Clicks);
        let b = corpus.get(1).unwrap().vector(Field::Clicks);
        let d = diameter(&[a, b]);
        assert!(d > 0.0 && d < MAX_EUCLIDEAN_DISTANCE);

        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, d * (1.0 - 1e-9)).unwrap();
        c.extend(corpus.ids()).unwrap();
        assert_eq!(c.clusters().len(), 2);
        assert_eq!(c.stats().rejected, 1);

        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, d).unwrap();
        c.extend(corpus.ids()).unwrap();
        assert_eq!(c.clusters().len(), 1);
    }

    #[test]
    fn empty_vector_never_matches() {
        let mut corpus = Corpus::new();
        corpus.push("x", 1, SparseVector::new(), SparseVector::new());
        corpus.push("y", 1, SparseVector::new(), SparseVector::new());
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 1.0).unwrap();
        c.extend(corpus.ids()).unwrap();
        assert_eq!(c.clusters().len(), 2);
    }

    #[test]
    fn members_never_move_once_assigned() {
        let corpus = corpus_of(&[
            ("a", 1, &[("p", 1.0)]),
            ("b", 1, &[("p", 1.0), ("q", 0.2)]),
            ("c", 1, &[("q", 1.0)]),
            ("d", 1, &[("p", 0.5), ("q", 1.0)]),
            ("e", 1, &[("q", 1.0), ("r", 0.3)]),
        ]);
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.4).unwrap();
        let mut seen = Vec::new();
        for id in corpus.ids() {
            c.push(id).unwrap();
            seen.push(id);
            for prev in &seen {
                let cid = c.cluster_of(*prev).unwrap();
                assert!(c.clusters()[cid].members().contains(prev));
            }
        }
    }

    #[test]
    fn finish_orders_by_size_then_frequency() {
        let corpus = corpus_of(&[
            ("lone", 100, &[("z", 1.0)]),
            ("low", 1, &[("p", 1.0)]),
            ("high", 50, &[("p", 1.0)]),
            ("mid", 50, &[("p", 1.0)]),
        ]);
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.1).unwrap();
        c.extend(corpus.ids()).unwrap();
        let out = c.finish();
        assert_eq!(out.clusters(), &[vec![2, 3, 1], vec![0]]);
    }

    #[test]
    fn grouper_splits_click_clusters_by_tokens() {
        let corpus = corpus_of(&[
            ("red shoes", 10, &[("p", 1.0)]),
            ("shoes red", 8, &[("p", 1.0)]),
            ("crimson sneakers", 4, &[("p", 1.0)]),
            ("blue hat", 2, &[("h", 1.0)]),
        ]);
        let grouper = HierarchicalGrouper::new(0.1, 0.1).unwrap();
        let h = grouper.group(&corpus, corpus.ids()).unwrap();
        assert_eq!(h.groups.len(), 2);
        assert_eq!(h.groups[0].members, vec![0, 1, 2]);
        assert_eq!(h.groups[0].subgroups, vec![vec![0, 1], vec![2]]);
        assert_eq!(h.groups[1].subgroups, vec![vec![3]]);
        assert_eq!(h.subgroup_count(), 3);
    }
}
