use criterion::{criterion_group, criterion_main, Criterion};
use qsuggest::{Corpus, Field, HierarchicalGrouper, IncrementalClusterer, SparseVector};

// Deterministic synthetic log: queries click into overlapping windows of targets.
fn synthetic_corpus(n: u32) -> Corpus {
    let mut corpus = Corpus::new();
    for i in 0..n {
        let clicks: SparseVector = (0..3)
            .map(|k| (format!("p{}", (i / 7 + k) % 400), 1.0 + ((i + k) % 5) as f64))
            .collect::<SparseVector>()
            .l2_normalize();
        let tokens = SparseVector::from_features([format!("w{}", i % 31), format!("w{}", i % 17)]);
        corpus.push(format!("query {i}"), u64::from(i % 97 + 1), clicks, tokens);
    }
    corpus
}

fn bench_cluster(c: &mut Criterion) {
    let corpus = synthetic_corpus(5_000);
    c.bench_function("cluster_clicks_5k", |b| {
        b.iter(|| {
            let mut clusterer = IncrementalClusterer::new(&corpus, Field::Clicks, 0.5).unwrap();
            clusterer.extend(corpus.ids()).unwrap();
            clusterer.finish()
        })
    });
    let grouper = HierarchicalGrouper::new(0.5, 0.7).unwrap();
    c.bench_function("group_5k", |b| b.iter(|| grouper.group(&corpus, corpus.ids()).unwrap()));
}

criterion_group!(benches, bench_cluster);
criterion_main!(benches);
