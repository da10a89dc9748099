//! Plain-text cluster dumps.
//!
//! ```text
//! [cluster 0]
//! red shoes	120
//! shoes red	40
//! ```
//!
//! Grouped dumps nest `----------group N----------` blocks under each cluster
//! label and end every cluster with a blank line. Group numbers restart at 0
//! inside each cluster.

use crate::cluster::{Clustering, Hierarchy};
use crate::corpus::{Corpus, QueryId};
use crate::error::Result;
use std::io::Write;

fn write_members<W: Write>(w: &mut W, corpus: &Corpus, members: &[QueryId]) -> Result<()> {
    for id in members {
        if let Some(r) = corpus.get(*id) {
            writeln!(w, "{}\t{}", r.text, r.frequency)?;
        }
    }
    Ok(())
}

/// Returns the number of clusters written.
pub fn write_clustering<W: Write>(w: &mut W, corpus: &Corpus, clustering: &Clustering) -> Result<usize> {
    for (cid, members) in clustering.iter().enumerate() {
        writeln!(w, "[cluster {cid}]")?;
        write_members(w, corpus, members)?;
    }
    Ok(clustering.len())
}

/// Returns the number of groups written.
pub fn write_hierarchy<W: Write>(w: &mut W, corpus: &Corpus, hierarchy: &Hierarchy) -> Result<usize> {
    for (cid, group) in hierarchy.groups.iter().enumerate() {
        writeln!(w, "[cluster {cid}]")?;
        for (gid, members) in group.subgroups.iter().enumerate() {
            writeln!(w, "----------group {gid}----------")?;
            write_members(w, corpus, members)?;
        }
        writeln!(w)?;
    }
    Ok(hierarchy.subgroup_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{HierarchicalGrouper, IncrementalClusterer};
    use crate::corpus::Field;
    use crate::vector::SparseVector;

    fn corpus() -> Corpus {
        let mut c = Corpus::new();
        let p = SparseVector::from_features(["p"]);
        c.push("red shoes", 3, p.clone(), SparseVector::from_features(["red", "shoes"]));
        c.push("shoes red", 9, p.clone(), SparseVector::from_features(["red", "shoes"]));
        c.push("sneakers", 1, p, SparseVector::from_features(["sneakers"]));
        c
    }

    #[test]
    fn clustering_layout() {
        let corpus = corpus();
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.5).unwrap();
        c.extend(corpus.ids()).unwrap();
        let mut out = Vec::new();
        let n = write_clustering(&mut out, &corpus, &c.finish()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[cluster 0]\nshoes red\t9\nred shoes\t3\nsneakers\t1\n"
        );
    }

    #[test]
    fn hierarchy_layout() {
        let corpus = corpus();
        let h = HierarchicalGrouper::new(0.5, 0.5).unwrap().group(&corpus, corpus.ids()).unwrap();
        let mut out = Vec::new();
        let n = write_hierarchy(&mut out, &corpus, &h).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[cluster 0]\n----------group 0----------\nshoes red\t9\nred shoes\t3\n\
             ----------group 1----------\nsneakers\t1\n\n"
        );
    }
}
