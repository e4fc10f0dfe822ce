mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use ragdb_core::types::Meta;
use ragdb_core::{Error, SourceText};
use ragdb_hybrid::{HybridEngine, SearchEngine, SearchFilters, SearchRequest};

fn texts(hits: &[ragdb_hybrid::ScoredPassage]) -> Vec<&str> { hits.iter().map(|h| h.passage.text.as_str()).collect() }

#[test]
fn plants_query_prefers_photosynthesis() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    assert_eq!(engine.ingest(&corpus()).expect("ingest"), 6);

    let hits = engine.search("how do plants make energy", &SearchRequest::top(1)).expect("search");
    assert_eq!(texts(&hits), vec![P1]);
    assert_eq!(hits[0].passage.citation(), "[bio]");
    assert!(hits[0].dense_score.is_some() && hits[0].sparse_score.is_some());
}

#[test]
fn results_are_bounded_and_sorted() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine.ingest(&corpus()).expect("ingest");
    for k in 1..=8 {
        let hits = engine.search("energy from rivers and castles", &SearchRequest::top(k)).expect("search");
        assert!(hits.len() <= k);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[test]
fn min_score_without_near_exact_match_is_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine.ingest(&corpus()).expect("ingest");
    let req = SearchRequest::top(5).filters(SearchFilters::min_score(0.99));
    assert!(engine.search("how do plants make energy", &req).expect("search").is_empty());
}

#[test]
fn source_and_metadata_filters() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine.ingest(&corpus()).expect("ingest");

    let req = SearchRequest::top(10).filters(SearchFilters::source("notes/geo.txt"));
    let hits = engine.search("rivers energy castles", &req).expect("search");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.passage.source == "notes/geo.txt"));

    let req = SearchRequest::top(10).filters(SearchFilters::source("missing.txt"));
    assert!(engine.search("rivers", &req).expect("search").is_empty());

    let mut map = Meta::new();
    map.insert("file_type".into(), "md".into());
    let req = SearchRequest::top(10).filters(SearchFilters::from_map(&map).expect("filters"));
    let hits = engine.search("castles rivers energy", &req).expect("search");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.passage.source.ends_with(".md")));

    // A key no passage carries does not exclude anything.
    let mut map = Meta::new();
    map.insert("topic".into(), "science".into());
    let req = SearchRequest::top(3).filters(SearchFilters::from_map(&map).expect("filters"));
    assert_eq!(engine.search("castles", &req).expect("search").len(), 3);
}

#[test]
fn filter_map_rejects_wrong_types() {
    let mut map = Meta::new();
    map.insert("min_score".into(), "high".into());
    assert!(matches!(SearchFilters::from_map(&map), Err(Error::InvalidArgument(_))));
    let mut map = Meta::new();
    map.insert("source".into(), 3.into());
    assert!(matches!(SearchFilters::from_map(&map), Err(Error::InvalidArgument(_))));
}

#[test]
fn invalid_k_and_alpha_are_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine.ingest(&corpus()).expect("ingest");
    assert!(matches!(engine.search("x", &SearchRequest::top(0)), Err(Error::InvalidArgument(_))));
    for alpha in [-0.1, 1.5, f32::NAN, f32::INFINITY] {
        let req = SearchRequest::top(3).alpha(alpha);
        assert!(matches!(engine.search("energy", &req), Err(Error::InvalidArgument(_))), "alpha {alpha}");
        assert!(matches!(engine.retrieve("energy", &req), Err(Error::InvalidArgument(_))));
    }
}

#[test]
fn empty_engine_returns_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let engine = engine(tmp.path());
    assert!(engine.search("anything", &SearchRequest::top(3)).expect("search").is_empty());
    let r = engine.retrieve("anything", &SearchRequest::top(3)).expect("retrieve");
    assert!(r.context.is_empty() && r.citations.is_empty() && r.passages.is_empty());
}

#[test]
fn zero_weight_signals_are_not_queried() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let embedder = ConceptEmbedder::new();
    let counter = embedder.counter();
    let mut engine = HybridEngine::with_models(test_config(tmp.path()), Some(Box::new(embedder)), None).expect("engine");
    engine.ingest(&corpus()).expect("ingest");

    let before = counter.load(Ordering::SeqCst);
    let sparse_only = engine.search("energy", &SearchRequest::top(3).alpha(0.0)).expect("search");
    assert_eq!(counter.load(Ordering::SeqCst), before, "alpha = 0 never embeds the query");
    assert!(sparse_only.iter().all(|h| h.dense_score.is_none()));

    let dense_only = engine.search("energy", &SearchRequest::top(3).alpha(1.0)).expect("search");
    assert_eq!(counter.load(Ordering::SeqCst), before + 1);
    assert!(dense_only.iter().all(|h| h.sparse_score.is_none()));
}

#[cfg(feature = "tantivy")]
#[test]
fn dense_disabled_gives_scaled_sparse_ranking() {
    use ragdb_text::SparseIndex;

    let tmp = tempfile::tempdir().expect("tempdir");
    let mut cfg = test_config(tmp.path());
    cfg.dense.enabled = false;
    let mut engine = HybridEngine::with_models(cfg, Some(Box::new(ConceptEmbedder::new())), None).expect("engine");
    assert!(!engine.capabilities().has_dense);
    engine.ingest(&corpus()).expect("ingest");

    let mut sparse = SparseIndex::new(true);
    sparse.build(engine.store().all()).expect("sparse");
    let expected = sparse.query("rivers carve energy", 5).expect("query");

    let alpha = 0.3;
    let hits = engine.search("rivers carve energy", &SearchRequest::top(5).alpha(alpha)).expect("search");
    assert_eq!(hits.len(), expected.len());
    for (hit, (_, want)) in hits.iter().zip(&expected) {
        assert_eq!(hit.passage.id, want.id);
        assert!((hit.score - (1.0 - alpha) * want.score).abs() < 1e-5);
    }
}

#[test]
fn no_indices_available_is_empty_not_an_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut cfg = test_config(tmp.path());
    cfg.dense.enabled = false;
    cfg.sparse.enabled = false;
    let mut engine = HybridEngine::with_models(cfg, None, None).expect("engine");
    let caps = engine.capabilities();
    assert!(!caps.has_sparse && !caps.has_dense && !caps.has_dense_accel && !caps.has_reranker);
    engine.ingest(&corpus()).expect("ingest");
    assert_eq!(engine.len(), 6);
    assert!(engine.search("energy", &SearchRequest::top(3)).expect("search").is_empty());
}

#[test]
fn reranker_reorders_candidates() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = HybridEngine::with_models(
        test_config(tmp.path()),
        Some(Box::new(ConceptEmbedder::new())),
        Some(Box::new(KeywordReranker { word: "glucose" })),
    )
    .expect("engine");
    assert!(engine.capabilities().has_reranker);
    engine.ingest(&corpus()).expect("ingest");

    let plain = engine.search("how do plants make energy", &SearchRequest::top(2).rerank(false)).expect("search");
    assert_eq!(plain[0].passage.text, P1);
    assert!(plain[0].rerank_score.is_none());

    let reranked = engine.search("how do plants make energy", &SearchRequest::top(2)).expect("search");
    assert_eq!(reranked[0].passage.text, P2);
    let r = reranked[0].rerank_score.expect("rerank score");
    assert!(r > 0.99 && r < 1.0);
    assert!(reranked.iter().all(|h| (0.0..=1.0).contains(&h.score)));
}

#[test]
fn reranker_failure_is_an_operation_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = HybridEngine::with_models(test_config(tmp.path()), Some(Box::new(ConceptEmbedder::new())), Some(Box::new(FailingReranker))).expect("engine");
    engine.ingest(&corpus()).expect("ingest");
    assert!(matches!(engine.search("energy", &SearchRequest::top(2)), Err(Error::Operation(_))));
    assert!(engine.search("energy", &SearchRequest::top(2).rerank(false)).is_ok());
}

#[test]
fn retrieve_formats_context_and_dedups_citations() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine.ingest(&corpus()).expect("ingest");
    let req = SearchRequest::top(2).filters(SearchFilters::source("notes/bio.txt"));
    let r = engine.retrieve("energy", &req).expect("retrieve");
    assert_eq!(r.passages.len(), 2);
    assert_eq!(r.citations, vec!["[bio]".to_string()]);
    let blocks: Vec<&str> = r.context.split("\n\n---\n\n").collect();
    assert_eq!(blocks.len(), 2);
    for (block, sp) in blocks.iter().zip(&r.passages) {
        assert_eq!(*block, format!("[Relevance: {:.2}]\n{}", sp.score, sp.passage.text));
    }
}

#[test]
fn ingestion_fills_metadata_and_chunk_indices() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    let mut custom = Meta::new();
    custom.insert("file_type".into(), "report".into());
    custom.insert("author".into(), "lab".into());
    let mut page2 = SourceText::page("docs/Paper.PDF", 2, "Leaves capture light. Plants store energy.");
    page2.metadata = custom;
    let inserted = engine
        .ingest(&[SourceText::page("docs/Paper.PDF", 1, "Plants grow toward light. Roots take up water."), page2])
        .expect("ingest");
    assert_eq!(inserted, 4);

    let all = engine.store().all();
    let indices: Vec<usize> = all.iter().map(|p| p.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(all[0].metadata["file_type"], "pdf");
    assert_eq!(all[0].metadata["page_count"], 2);
    assert_eq!(all[0].metadata["chunk_size"], all[0].text.chars().count());
    assert_eq!(all[2].metadata["file_type"], "report", "caller metadata wins");
    assert_eq!(all[2].metadata["author"], "lab");
    assert_eq!(all[2].citation(), "[Paper, p. 2]");

    // Same content again: same ids, nothing new.
    let again = engine
        .ingest(&[SourceText::page("docs/Paper.PDF", 1, "Plants grow toward light. Roots take up water.")])
        .expect("ingest");
    assert_eq!(again, 0);
    assert_eq!(engine.len(), 4);
}

#[test]
fn statistics_report_sources_and_backend() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine.ingest(&corpus()).expect("ingest");
    let stats = engine.statistics();
    assert_eq!(stats.total_passages, 6);
    assert_eq!(stats.total_sources, 3);
    assert_eq!(stats.index_backend_name, "candle-flat");
    assert_eq!(stats.sparse_available, cfg!(feature = "tantivy"));
    assert!(!stats.reranker_available);
    assert_eq!(stats.per_source_chunk_counts.get("bio.txt"), Some(&2));
    assert_eq!(stats.per_source_chunk_counts.get("history.md"), Some(&2));

    engine.clear();
    assert_eq!(engine.statistics().total_passages, 0);
    assert!(engine.search("energy", &SearchRequest::top(2)).expect("search").is_empty());
}

#[test]
fn same_file_name_in_different_directories_counts_as_two_sources() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine
        .ingest(&[
            SourceText::new("2023/notes.txt", "Rivers carve valleys."),
            SourceText::new("2024/notes.txt", "Knights defended castles."),
        ])
        .expect("ingest");
    let stats = engine.statistics();
    assert_eq!(stats.total_passages, 2);
    assert_eq!(stats.total_sources, 2);
    assert_eq!(stats.per_source_chunk_counts.get("notes.txt"), Some(&2));
}

#[test]
fn failed_ingest_keeps_previous_passages_and_indices() {
    ragdb_core::telemetry::init_test_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let embedder = FlakyEmbedder::new();
    let failing = embedder.switch();
    let mut engine = HybridEngine::with_models(test_config(tmp.path()), Some(Box::new(embedder)), None).expect("engine");
    engine.ingest(&corpus()).expect("first ingest");
    let before = engine.search("how do plants make energy", &SearchRequest::top(3)).expect("search");

    failing.store(true, Ordering::SeqCst);
    let err = engine
        .ingest(&[SourceText::new("notes/extra.txt", "Leaves capture light for the plant.")])
        .expect_err("second ingest must fail");
    assert!(matches!(err, Error::BuildFailure(_)), "{err:?}");
    failing.store(false, Ordering::SeqCst);

    assert_eq!(engine.len(), 6);
    assert_eq!(engine.statistics().total_sources, 3);
    assert!(engine.store().all().iter().all(|p| p.source != "notes/extra.txt"));
    let after = engine.search("how do plants make energy", &SearchRequest::top(3)).expect("search");
    assert_eq!(texts(&after), texts(&before));
    let scores = |hits: &[ragdb_hybrid::ScoredPassage]| hits.iter().map(|h| h.score).collect::<Vec<_>>();
    assert_eq!(scores(&after), scores(&before));
}

#[test]
fn engine_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<HybridEngine>();

    let tmp = tempfile::tempdir().expect("tempdir");
    let mut engine = engine(tmp.path());
    engine.ingest(&corpus()).expect("ingest");
    let engine: Arc<dyn SearchEngine> = Arc::new(engine);
    let expected = engine.search("how do plants make energy", &SearchRequest::top(3)).expect("search");

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                s.spawn(move || engine.search("how do plants make energy", &SearchRequest::top(3)).expect("search"))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().expect("thread"), expected);
        }
    });
}

#[cfg(feature = "lance")]
#[test]
fn accelerated_backend_survives_reload() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut cfg = test_config(tmp.path());
    cfg.dense.use_accel = true;
    let mut engine = HybridEngine::with_models(cfg.clone(), Some(Box::new(ConceptEmbedder::new())), None).expect("engine");
    assert!(engine.capabilities().has_dense_accel);
    engine.ingest(&corpus()).expect("ingest");
    assert_eq!(engine.statistics().index_backend_name, "lancedb");
    engine.save().expect("save");
    assert!(tmp.path().join("lancedb").exists());

    let hits = engine.search("how do plants make energy", &SearchRequest::top(1)).expect("search");
    assert_eq!(texts(&hits), vec![P1]);

    let mut reloaded = HybridEngine::with_models(cfg, Some(Box::new(ConceptEmbedder::new())), None).expect("engine");
    assert!(reloaded.load());
    let again = reloaded.search("how do plants make energy", &SearchRequest::top(1)).expect("search");
    assert_eq!(texts(&again), vec![P1]);
}
