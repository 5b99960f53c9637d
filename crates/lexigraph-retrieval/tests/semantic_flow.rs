//! End-to-end semantic-guided retrieval: initial vector and keyword
//! searches, beam-search graph expansion, batched materialization and
//! source grouping, feeding the processing pipeline.

use std::sync::Arc;

use serde_json::json;

use lexigraph_core::config::{RerankerStrategy, RetrievalConfig, RetryConfig};
use lexigraph_core::metadata::FilterConfig;
use lexigraph_core::model::SearchQuery;
use lexigraph_core::stubs::{InMemoryVectorStore, StubGraphStore, VectorRecord};
use lexigraph_retrieval::cache::{SharedEmbeddingCache, SharedNeighbourCache};
use lexigraph_retrieval::processing::ResultProcessingPipeline;
use lexigraph_retrieval::query::PassThruKeywordExtractor;
use lexigraph_retrieval::retrievers::semantic_guided::hits_to_collection;
use lexigraph_retrieval::retrievers::{
    KeywordRankingSearch, SearchType, SemanticBeamSearch, SemanticGuidedRetriever,
    StatementCosineSearch,
};

fn statement_record(id: &str, embedding: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        embedding,
        row: json!({ "statement": { "statementId": id } }),
    }
}

fn materialized_row(id: &str, value: &str, source: &str) -> serde_json::Value {
    json!({
        "result": {
            "statement": { "statementId": id, "value": value },
            "topic": { "topicId": "t1", "value": "Invoicing" },
            "chunk": { "chunkId": "c1" },
            "source": { "sourceId": source, "metadata": { "title": "Ledger" } }
        }
    })
}

fn build_retriever(
    graph: Arc<StubGraphStore>,
    vector: Arc<InMemoryVectorStore>,
    config: &RetrievalConfig,
) -> SemanticGuidedRetriever {
    let embedding_cache = Arc::new(SharedEmbeddingCache::new(
        Arc::clone(&vector) as _,
        RetryConfig::default(),
    ));
    let neighbour_cache = Arc::new(SharedNeighbourCache::new(
        Arc::clone(&graph) as _,
        RetryConfig::default(),
    ));

    let cosine = Arc::new(
        StatementCosineSearch::new(
            Arc::clone(&vector) as _,
            Arc::clone(&embedding_cache),
            FilterConfig::default(),
        )
        .with_top_k(1),
    );
    let keywords = Arc::new(KeywordRankingSearch::new(
        Arc::clone(&graph) as _,
        Arc::new(PassThruKeywordExtractor),
        Arc::clone(&embedding_cache),
        config.clone(),
    ));
    let beam = Arc::new(SemanticBeamSearch::new(
        Arc::clone(&vector) as _,
        embedding_cache,
        neighbour_cache,
        config.clone(),
        FilterConfig::default(),
    ));

    SemanticGuidedRetriever::new(
        graph,
        vec![cosine, keywords],
        vec![beam],
        config.clone(),
        FilterConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn initial_hits_dedup_and_beam_expansion_adds_new_statements() {
    // Both initial searches surface s1; the beam search walks the
    // statement graph from s1 to s2.
    let graph = Arc::new(
        StubGraphStore::new()
            .with_rows(
                "keyword ranking search",
                vec![json!({
                    "result": {
                        "statement": { "statementId": "s1" },
                        "matchedKeywords": ["invoice 42"]
                    }
                })],
            )
            .with_rows(
                "get statement neighbours",
                vec![json!({ "statementId": "s2" })],
            )
            .with_rows(
                "materialize statements",
                vec![
                    materialized_row("s1", "Alice reviewed invoice 42", "src1"),
                    materialized_row("s2", "Bob approved invoice 42", "src1"),
                ],
            ),
    );
    let vector = Arc::new(InMemoryVectorStore::with_indexes(&["statement"]));
    vector
        .add_record("statement", statement_record("s1", vec![1.0, 0.0]))
        .unwrap();
    vector
        .add_record("statement", statement_record("s2", vec![0.9, 0.1]))
        .unwrap();

    let config = RetrievalConfig {
        reranker: RerankerStrategy::None,
        // Beam hits carry zero scores until a reranker runs; keep them.
        statement_pruning_factor: 0.0,
        ..Default::default()
    };
    let retriever = build_retriever(graph, vector, &config);

    let query = SearchQuery::new("invoice 42").with_embedding(vec![1.0, 0.0]);
    let hits = retriever.retrieve(&query).await.unwrap();

    // s1 appears exactly once, carrying the cosine score from the first
    // retriever that returned it; s2 arrives through beam expansion.
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].statement_id, "s1");
    assert_eq!(hits[0].search_type, SearchType::CosineSimilarity);
    assert!(hits[0].score > 0.99);
    assert_eq!(hits[1].statement_id, "s2");
    assert_eq!(hits[1].search_type, SearchType::BeamSearch);
    assert_eq!(hits[1].path, vec!["s1", "s2"]);

    // Every hit is materialized by the single batched fetch.
    assert!(hits.iter().all(|h| h.statement.is_some() && h.source.is_some()));

    // The collection view groups both statements under one source/topic
    // and the pipeline keeps them apart as distinct statements.
    let collection = hits_to_collection(hits);
    assert_eq!(collection.results.len(), 1);
    assert_eq!(collection.results[0].topics.len(), 1);
    assert_eq!(collection.results[0].topics[0].statements.len(), 2);

    let pipeline =
        ResultProcessingPipeline::with_defaults(&config, FilterConfig::default(), None).unwrap();
    let processed = pipeline.run(collection, &query).await;
    assert_eq!(processed.results.len(), 1);
    assert_eq!(processed.results[0].topics[0].statements.len(), 2);
}

#[tokio::test]
async fn hits_from_different_sources_stay_grouped() {
    let graph = Arc::new(StubGraphStore::new().with_rows(
        "materialize statements",
        vec![
            materialized_row("s1", "one", "src-a"),
            materialized_row("s2", "two", "src-b"),
            materialized_row("s3", "three", "src-a"),
        ],
    ));
    let vector = Arc::new(InMemoryVectorStore::with_indexes(&["statement"]));
    vector
        .add_record("statement", statement_record("s1", vec![1.0, 0.0]))
        .unwrap();
    vector
        .add_record("statement", statement_record("s2", vec![0.9, 0.1]))
        .unwrap();
    vector
        .add_record("statement", statement_record("s3", vec![0.8, 0.2]))
        .unwrap();

    let config = RetrievalConfig {
        reranker: RerankerStrategy::None,
        ..Default::default()
    };
    let embedding_cache = Arc::new(SharedEmbeddingCache::new(
        Arc::clone(&vector) as _,
        RetryConfig::default(),
    ));
    let cosine = Arc::new(StatementCosineSearch::new(
        Arc::clone(&vector) as _,
        embedding_cache,
        FilterConfig::default(),
    ));
    let retriever = SemanticGuidedRetriever::new(
        graph,
        vec![cosine],
        vec![],
        config,
        FilterConfig::default(),
    )
    .unwrap();

    let query = SearchQuery::new("q").with_embedding(vec![1.0, 0.0]);
    let hits = retriever.retrieve(&query).await.unwrap();

    let placement: Vec<(&str, &str)> = hits
        .iter()
        .map(|h| {
            (
                h.statement_id.as_str(),
                h.source.as_ref().unwrap().source_id.as_str(),
            )
        })
        .collect();
    // src-a was seen first, so its two statements lead, best first.
    assert_eq!(
        placement,
        vec![("s1", "src-a"), ("s3", "src-a"), ("s2", "src-b")]
    );
}
