#![cfg(feature = "tantivy")]

use ragdb_core::types::{Passage, SourceKind};
use ragdb_text::sparse::fingerprint;
use ragdb_text::{Bm25Index, SparseIndex};

fn corpus() -> Vec<Passage> {
    vec![
        Passage::new("bio.txt", None, 0, "Photosynthesis converts light into chemical energy."),
        Passage::new("bio.txt", None, 1, "Respiration releases energy from glucose."),
        Passage::new("geo.txt", None, 0, "Rivers carve valleys over long periods of time."),
    ]
}

#[test]
fn analyzer_strips_punctuation_and_lowercases() {
    let index = Bm25Index::build(&corpus()).expect("build");
    let tokens = index.analyze("Energy, LIGHT. glucose?").expect("analyze");
    assert_eq!(tokens, vec!["energy", "light", "glucose"]);
}

#[test]
fn bm25_ranks_matching_passages_only() {
    let passages = corpus();
    let mut index = SparseIndex::new(true);
    assert!(index.is_available());
    index.build(&passages).expect("build");

    let hits = index.query("river valleys", 10).expect("query");
    assert_eq!(hits.len(), 1, "only the geology passage mentions valleys");
    assert_eq!(hits[0].0, 2);
    assert_eq!(hits[0].1.id, passages[2].id);
    assert_eq!(hits[0].1.source, SourceKind::Sparse);

    let hits = index.query("energy", 10).expect("query");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|(_, h)| h.score > 0.0));
    assert!(hits[0].1.score >= hits[1].1.score);
}

#[test]
fn query_edge_cases_return_nothing() {
    let mut index = SparseIndex::new(true);
    assert!(index.query("energy", 5).expect("unbuilt").is_empty());
    index.build(&corpus()).expect("build");
    assert!(index.query("energy", 0).expect("k=0").is_empty());
    assert!(index.query("?!  ..", 5).expect("no tokens").is_empty());
    assert!(index.query("zebra", 5).expect("no match").is_empty());
    // Query syntax characters are plain text here.
    assert!(!index.query("energy AND (light OR \"glucose", 5).expect("syntax").is_empty());
}

#[test]
fn top_k_truncates_and_breaks_ties_by_store_order() {
    let passages: Vec<Passage> = (0..5).map(|i| Passage::new("same.txt", None, i, "identical words here")).collect();
    let mut index = SparseIndex::new(true);
    index.build(&passages).expect("build");
    let hits = index.query("identical", 3).expect("query");
    assert_eq!(hits.len(), 3);
    let ords: Vec<usize> = hits.iter().map(|(o, _)| *o).collect();
    assert_eq!(ords, vec![0, 1, 2]);
}

#[test]
fn disabled_index_is_unavailable_and_empty() {
    let mut index = SparseIndex::new(false);
    assert!(!index.is_available());
    index.build(&corpus()).expect("build is a no-op");
    assert!(index.query("energy", 5).expect("query").is_empty());
    assert!(index.snapshot().is_none());
}

#[test]
fn snapshot_verifies_against_rebuilt_index() {
    let passages = corpus();
    let mut index = SparseIndex::new(true);
    index.build(&passages).expect("build");
    let snapshot = index.snapshot().expect("snapshot");
    assert_eq!(snapshot.passage_count, 3);
    assert_eq!(snapshot.fingerprint, fingerprint(&passages));

    let mut rebuilt = SparseIndex::new(true);
    rebuilt.build(&passages).expect("rebuild");
    rebuilt.verify(&snapshot).expect("same passages verify");

    let mut other = SparseIndex::new(true);
    other.build(&passages[..2]).expect("partial");
    assert!(other.verify(&snapshot).is_err());

    other.clear();
    assert!(other.verify(&snapshot).is_err());
    assert!(other.query("energy", 5).expect("cleared").is_empty());
}
