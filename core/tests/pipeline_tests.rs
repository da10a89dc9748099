use qsuggest::cluster::IncrementalClusterer;
use qsuggest::dump::write_hierarchy;
use qsuggest::log::{read_click_log, ClickFilter};
use qsuggest::persist::{load_search_indexes, save_search_index, IndexPaths};
use qsuggest::search::Eligibility;
use qsuggest::tokenizer::WordTokenizer;
use qsuggest::vector::{euclidean_distance, MAX_EUCLIDEAN_DISTANCE};
use qsuggest::{
    Condition, Corpus, Field, HierarchicalGrouper, SearchConfig, SearchIndexBuilder, SearchRanker,
    SparseVector, TokenizerKind,
};
use std::io::Cursor;
use std::sync::Arc;

fn unit(pairs: &[(&str, f64)]) -> SparseVector {
    pairs.iter().map(|(k, w)| (*k, *w)).collect::<SparseVector>().l2_normalize()
}

#[test]
fn two_overlapping_click_vectors_share_a_cluster() {
    let mut corpus = Corpus::new();
    corpus.push("q1", 1, unit(&[("pA", 1.0)]), SparseVector::new());
    corpus.push("q2", 1, unit(&[("pA", 0.9), ("pB", 0.1)]), SparseVector::new());
    corpus.push("q3", 1, unit(&[("pC", 1.0)]), SparseVector::new());

    let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.5).unwrap();
    c.extend(corpus.ids()).unwrap();
    let out = c.finish();
    assert_eq!(out.len(), 2);
    assert_eq!(out.clusters()[0].len(), 2);
    assert!(out.clusters()[0].contains(&0) && out.clusters()[0].contains(&1));
    assert_eq!(out.clusters()[1], vec![2]);
}

#[test]
fn identical_input_gives_identical_clusters() {
    let mut corpus = Corpus::new();
    let rows: &[&[(&str, f64)]] = &[
        &[("a", 1.0), ("b", 0.5)],
        &[("b", 1.0)],
        &[("a", 0.2), ("c", 1.0)],
        &[("c", 1.0), ("d", 1.0)],
        &[("a", 1.0)],
        &[("d", 0.3), ("b", 1.0)],
    ];
    for (i, r) in rows.iter().enumerate() {
        corpus.push(format!("q{i}"), i as u64, unit(r), SparseVector::new());
    }

    let run = || {
        let mut c = IncrementalClusterer::new(&corpus, Field::Clicks, 0.6).unwrap();
        c.extend(corpus.ids()).unwrap();
        let centroids: Vec<SparseVector> = c.clusters().iter().map(|k| k.centroid().clone()).collect();
        (c.finish(), centroids)
    };
    assert_eq!(run(), run());
}

#[test]
fn distances_of_normalized_vectors_stay_bounded() {
    let vs = [
        unit(&[("a", 1.0)]),
        unit(&[("a", 1.0), ("b", 1.0)]),
        unit(&[("b", 3.0), ("c", 4.0)]),
        unit(&[("d", 1.0)]),
    ];
    for a in &vs {
        assert_eq!(euclidean_distance(a, a), 0.0);
        for b in &vs {
            let d = euclidean_distance(a, b);
            assert!(d >= 0.0 && d <= MAX_EUCLIDEAN_DISTANCE + 1e-12);
        }
    }
}

#[test]
fn click_log_to_grouped_dump() {
    let log = "red shoes\t50|p1\t1\t30\n\
               shoes red\t20|p1\t2\t25\n\
               crimson sneakers\t10|p1\t1\t40\n\
               blue hat\t30|p9\t1\t12\n";
    let tokenizer = WordTokenizer::default();
    let corpus = read_click_log(Cursor::new(log), &ClickFilter::default(), &tokenizer).unwrap();
    assert_eq!(corpus.len(), 4);

    let hierarchy = HierarchicalGrouper::new(0.3, 0.3).unwrap().group(&corpus, corpus.ids()).unwrap();
    let mut out = Vec::new();
    let groups = write_hierarchy(&mut out, &corpus, &hierarchy).unwrap();
    assert_eq!(groups, 3);
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with(
        "[cluster 0]\n----------group 0----------\nred shoes\t50\nshoes red\t20\n\
         ----------group 1----------\ncrimson sneakers\t10\n\n[cluster 1]\n"
    ));
}

#[test]
fn subset_ranker_returns_the_superset_query() {
    let mut b = SearchIndexBuilder::new(TokenizerKind::Word).unwrap().min_freq(1);
    b.add("red shoes", 15);
    let ranker = SearchRanker::new(
        Arc::new(b.build()),
        SearchConfig {
            name: "subset".into(),
            tokenizer: TokenizerKind::Word,
            condition: Condition::Subset,
            scores: vec![],
        },
    )
    .unwrap();
    let hit = ranker.search("red").unwrap();
    assert_eq!(hit.text, "red shoes");
}

#[test]
fn stop_substring_text_is_never_suggested() {
    let mut b = SearchIndexBuilder::new(TokenizerKind::Word).unwrap().min_freq(1);
    b.add("free shipping", 10_000);
    b.add("free shipping shoes", 1);
    let eligibility = Eligibility::new(vec!["free shipping".into()]);
    let ranker = SearchRanker::new(Arc::new(b.build()), SearchConfig::seg())
        .unwrap()
        .with_eligibility(eligibility);
    let ranked = ranker.rank("free shipping");
    assert_eq!(ranked[0].text, "free shipping");
    assert!(ranker.search("free shipping").is_none());
}

#[test]
fn saved_indexes_serve_the_default_rankers() {
    let dir = tempfile::tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let log = ["iphone case\t40", "iphone case leather\t25", "ipad stand\t30", "rare query\t2"];
    for kind in [TokenizerKind::Word, TokenizerKind::BIGRAM] {
        let mut b = SearchIndexBuilder::new(kind).unwrap();
        for line in log {
            let (q, f) = qsuggest::log::parse_query_line(line, 1).unwrap();
            b.add(&q, f);
        }
        save_search_index(&paths, &b.build(), 10).unwrap();
    }

    let indexes = load_search_indexes(&paths, [TokenizerKind::Word, TokenizerKind::BIGRAM]).unwrap();
    assert_eq!(indexes[&TokenizerKind::Word].len(), 3);
    let rankers =
        SearchRanker::from_configs(&SearchConfig::defaults(), &indexes, &Eligibility::default()).unwrap();
    let names: Vec<_> = rankers.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["gram", "seg", "seg-subset"]);

    let gram = rankers[0].search("iphone cases").unwrap();
    assert_eq!(gram.text, "iphone case");
    let subset = rankers[2].search("iphone").unwrap();
    assert_eq!(subset.text, "iphone case");
}
