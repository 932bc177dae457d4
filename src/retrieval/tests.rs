use super::*;
use crate::bm25_search::LexicalIndex;
use crate::types::{ChunkId, ChunkMetadata};
use crate::vector_db::VectorRecord;

fn metadata(file: &str, ordinal: usize) -> ChunkMetadata {
    ChunkMetadata {
        file_path: file.to_string(),
        chunk_type: "class".to_string(),
        ordinal,
        framework: None,
        language: Some("Kotlin".to_string()),
        file_hash: "h".to_string(),
        indexed_at: 0,
    }
}

fn id(file: &str, ordinal: usize) -> ChunkId {
    ChunkId::derive(file, "class", ordinal)
}

fn scored(file: &str, ordinal: usize, score: f32, source: MatchSource) -> ScoredResult {
    ScoredResult {
        id: id(file, ordinal),
        document: format!("{} #{}", file, ordinal),
        metadata: metadata(file, ordinal),
        score,
        source,
    }
}

fn vector_match(file: &str, ordinal: usize, distance: f32) -> VectorMatch {
    VectorMatch {
        id: id(file, ordinal),
        document: format!("{} #{}", file, ordinal),
        metadata: metadata(file, ordinal),
        distance,
    }
}

fn lexical_hit(file: &str, ordinal: usize, score: f32) -> LexicalHit {
    LexicalHit {
        id: id(file, ordinal),
        document: format!("{} #{}", file, ordinal),
        metadata: metadata(file, ordinal),
        score,
    }
}

struct UnitEmbedder;

impl Embedder for UnitEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "unit"
    }
}

struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn embed_batch(&self, _texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model not loaded")
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

/// Returns canned matches, or fails when `matches` is `None`
struct CannedStore {
    matches: Option<Vec<VectorMatch>>,
}

#[async_trait::async_trait]
impl VectorStore for CannedStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        Ok(records.len())
    }

    async fn query(&self, _vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        match &self.matches {
            Some(matches) => Ok(matches.iter().take(limit).cloned().collect()),
            None => anyhow::bail!("vector store offline"),
        }
    }

    async fn delete_by_file(&self, _file_path: &str) -> Result<usize> {
        Ok(0)
    }

    async fn records(&self) -> Result<Vec<VectorRecord>> {
        Ok(Vec::new())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.matches.as_ref().map_or(0, Vec::len))
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

struct CannedKeyword {
    hits: Option<Vec<LexicalHit>>,
}

impl KeywordSearch for CannedKeyword {
    fn search(&self, _query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        match &self.hits {
            Some(hits) => Ok(hits.iter().take(limit).cloned().collect()),
            None => anyhow::bail!("lexical index offline"),
        }
    }
}

fn retriever(
    matches: Option<Vec<VectorMatch>>,
    hits: Option<Vec<LexicalHit>>,
) -> HybridRetriever {
    HybridRetriever::new(
        Arc::new(UnitEmbedder),
        Arc::new(CannedStore { matches }),
        Arc::new(CannedKeyword { hits }),
        10.0,
    )
}

fn files(results: &[ScoredResult]) -> Vec<(&str, usize)> {
    results
        .iter()
        .map(|r| (r.metadata.file_path.as_str(), r.metadata.ordinal))
        .collect()
}

#[test]
fn test_score_conversion() {
    let v = vector_result(vector_match("/p/A.kt", 0, 0.25));
    assert_eq!(v.score, 0.75);
    assert_eq!(v.source, MatchSource::Vector);

    // Distances above 1 give negative similarity, which simply ranks low
    assert!(vector_result(vector_match("/p/A.kt", 0, 1.5)).score < 0.0);

    assert_eq!(lexical_result(lexical_hit("/p/A.kt", 0, 4.0), 10.0).score, 0.4);
    assert_eq!(lexical_result(lexical_hit("/p/A.kt", 0, 25.0), 10.0).score, 1.0);
}

#[test]
fn test_fuse_keeps_vector_score_for_duplicates() {
    let vector = vec![scored("/p/A.kt", 0, 0.3, MatchSource::Vector)];
    let lexical = vec![
        scored("/p/A.kt", 0, 0.9, MatchSource::Lexical),
        scored("/p/B.kt", 0, 0.5, MatchSource::Lexical),
    ];

    let fused = fuse(vector, lexical, 10);
    assert_eq!(files(&fused), vec![("/p/B.kt", 0), ("/p/A.kt", 0)]);
    assert_eq!(fused[1].score, 0.3);
    assert_eq!(fused[1].source, MatchSource::Vector);
}

#[test]
fn test_fuse_ties_keep_concatenation_order() {
    let vector = vec![
        scored("/p/Z.kt", 0, 0.5, MatchSource::Vector),
        scored("/p/Y.kt", 0, 0.5, MatchSource::Vector),
    ];
    let lexical = vec![scored("/p/A.kt", 0, 0.5, MatchSource::Lexical)];

    let fused = fuse(vector, lexical, 10);
    assert_eq!(
        files(&fused),
        vec![("/p/Z.kt", 0), ("/p/Y.kt", 0), ("/p/A.kt", 0)]
    );
}

#[test]
fn test_fuse_truncates() {
    let vector = (0..5)
        .map(|i| scored("/p/A.kt", i, 1.0 - i as f32 * 0.1, MatchSource::Vector))
        .collect();
    let fused = fuse(vector, Vec::new(), 3);
    assert_eq!(files(&fused), vec![("/p/A.kt", 0), ("/p/A.kt", 1), ("/p/A.kt", 2)]);
    assert!(fuse(Vec::new(), Vec::new(), 3).is_empty());
}

#[tokio::test]
async fn test_search_fuses_both_paths() {
    let retriever = retriever(
        Some(vec![
            vector_match("/p/A.kt", 0, 0.1),
            vector_match("/p/B.kt", 0, 0.6),
        ]),
        Some(vec![
            lexical_hit("/p/C.kt", 0, 8.0),
            lexical_hit("/p/A.kt", 0, 30.0),
        ]),
    );

    let results = retriever.search("room dao", 3).await.unwrap();
    assert_eq!(
        files(&results),
        vec![("/p/A.kt", 0), ("/p/C.kt", 0), ("/p/B.kt", 0)]
    );
    assert!((results[0].score - 0.9).abs() < 1e-6);
    assert_eq!(results[0].source, MatchSource::Vector);
    assert!((results[1].score - 0.8).abs() < 1e-6);
}

#[tokio::test]
async fn test_search_is_deterministic() {
    let retriever = retriever(
        Some(vec![
            vector_match("/p/A.kt", 0, 0.5),
            vector_match("/p/B.kt", 0, 0.5),
        ]),
        Some(vec![
            lexical_hit("/p/C.kt", 0, 5.0),
            lexical_hit("/p/B.kt", 0, 5.0),
        ]),
    );

    let first = retriever.search("query", 10).await.unwrap();
    for _ in 0..5 {
        assert_eq!(retriever.search("query", 10).await.unwrap(), first);
    }
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn test_vector_failure_degrades_to_lexical() {
    let retriever = retriever(None, Some(vec![lexical_hit("/p/A.kt", 0, 5.0)]));
    let results = retriever.search("hilt", 5).await.unwrap();
    assert_eq!(files(&results), vec![("/p/A.kt", 0)]);
    assert_eq!(results[0].source, MatchSource::Lexical);
}

#[tokio::test]
async fn test_embedding_failure_degrades_to_lexical() {
    let retriever = HybridRetriever::new(
        Arc::new(BrokenEmbedder),
        Arc::new(CannedStore {
            matches: Some(vec![vector_match("/p/B.kt", 0, 0.0)]),
        }),
        Arc::new(CannedKeyword {
            hits: Some(vec![lexical_hit("/p/A.kt", 0, 5.0)]),
        }),
        10.0,
    );
    let results = retriever.search("hilt", 5).await.unwrap();
    assert_eq!(files(&results), vec![("/p/A.kt", 0)]);
}

#[tokio::test]
async fn test_lexical_failure_degrades_to_vector() {
    let retriever = retriever(Some(vec![vector_match("/p/A.kt", 0, 0.2)]), None);
    let results = retriever.search("hilt", 5).await.unwrap();
    assert_eq!(files(&results), vec![("/p/A.kt", 0)]);
}

#[tokio::test]
async fn test_both_failing_is_unavailable() {
    let retriever = retriever(None, None);
    match retriever.search("hilt", 5).await {
        Err(RetrievalError::Unavailable { vector, lexical }) => {
            assert!(vector.contains("vector store offline"));
            assert!(lexical.contains("lexical index offline"));
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_matches_is_empty_success() {
    let retriever = retriever(Some(Vec::new()), Some(Vec::new()));
    assert!(retriever.search("anything", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_query_and_zero_k() {
    let retriever = retriever(Some(Vec::new()), Some(Vec::new()));
    assert_eq!(
        retriever.search("   ", 5).await.unwrap_err(),
        RetrievalError::EmptyQuery
    );
    assert!(retriever.search("query", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retrieve_groups_by_file() {
    let retriever = retriever(
        Some(vec![
            vector_match("/p/A.kt", 0, 0.1),
            vector_match("/p/B.kt", 0, 0.2),
            vector_match("/p/A.kt", 1, 0.3),
        ]),
        Some(Vec::new()),
    );

    let context = retriever.retrieve("Where is the Hilt module", 10).await.unwrap();
    assert_eq!(context.category, QueryCategory::DependencyInjection);
    assert_eq!(context.results.len(), 3);
    assert_eq!(context.files.len(), 2);
    assert_eq!(context.files[0].file_path, "/p/A.kt");
    assert_eq!(context.files[0].results.len(), 2);
    assert_eq!(context.files[1].file_path, "/p/B.kt");
}

#[tokio::test]
async fn test_with_real_lexical_index() {
    let index = Arc::new(LexicalIndex::default());
    index.add_documents(vec![crate::bm25_search::LexicalDocument {
        id: id("/p/A.kt", 0),
        text: "class UserRepository uses Room".to_string(),
        metadata: metadata("/p/A.kt", 0),
    }]);

    let retriever = HybridRetriever::new(
        Arc::new(UnitEmbedder),
        Arc::new(CannedStore { matches: None }),
        index,
        10.0,
    );
    let results = retriever.search("Room", 5).await.unwrap();
    assert_eq!(files(&results), vec![("/p/A.kt", 0)]);
    assert!(results[0].score > 0.0 && results[0].score <= 1.0);
}
