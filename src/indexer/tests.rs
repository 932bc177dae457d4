use super::*;
use crate::chunker::DefaultChunker;
use crate::chunker::ast::CLASS;
use crate::config::ChunkingConfig;
use crate::graph::IMPORTS;
use crate::vector_db::{USearchStore, VectorMatch};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

const DIM: usize = 8;

fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIM];
    for (i, byte) in text.bytes().enumerate() {
        vector[(byte as usize + i) % DIM] += 1.0;
    }
    vector
}

struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}

/// Fails any batch containing the marker text
struct MarkerFailingEmbedder;

impl Embedder for MarkerFailingEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("EMBED_FAILS")) {
            anyhow::bail!("model unavailable");
        }
        HashEmbedder.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "marker"
    }
}

struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn embed_batch(&self, _texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(Vec::new())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "short"
    }
}

/// Store whose writes can be made to fail. `partial_upserts` keeps the first
/// record of a batch before failing.
#[derive(Default)]
struct FailingStore {
    inner: USearchStore,
    fail_delete: AtomicBool,
    fail_upsert: AtomicBool,
    partial_upserts: AtomicBool,
    fail_flush: AtomicBool,
}

impl FailingStore {
    fn heal(&self) {
        for flag in [
            &self.fail_delete,
            &self.fail_upsert,
            &self.partial_upserts,
            &self.fail_flush,
        ] {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl VectorStore for FailingStore {
    async fn upsert(&self, mut records: Vec<VectorRecord>) -> anyhow::Result<usize> {
        if self.partial_upserts.load(Ordering::SeqCst) {
            records.truncate(1);
            self.inner.upsert(records).await?;
            anyhow::bail!("disk full after first record");
        }
        if self.fail_upsert.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.upsert(records).await
    }

    async fn query(&self, vector: &[f32], limit: usize) -> anyhow::Result<Vec<VectorMatch>> {
        self.inner.query(vector, limit).await
    }

    async fn delete_by_file(&self, file_path: &str) -> anyhow::Result<usize> {
        if self.fail_delete.load(Ordering::SeqCst) {
            anyhow::bail!("store is read-only");
        }
        self.inner.delete_by_file(file_path).await
    }

    async fn records(&self) -> anyhow::Result<Vec<VectorRecord>> {
        self.inner.records().await
    }

    async fn len(&self) -> anyhow::Result<usize> {
        self.inner.len().await
    }

    async fn flush(&self) -> anyhow::Result<()> {
        if self.fail_flush.load(Ordering::SeqCst) {
            anyhow::bail!("flush interrupted");
        }
        self.inner.flush().await
    }
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    graph_path: PathBuf,
    graph: Arc<RwLock<DependencyGraph>>,
    store: Arc<dyn VectorStore>,
    lexical: Arc<LexicalIndex>,
    indexer: Indexer,
}

impl Fixture {
    fn new() -> Self {
        Self::with(Arc::new(HashEmbedder), |_| {})
    }

    fn with(embedder: Arc<dyn Embedder>, configure: impl FnOnce(&mut Config)) -> Self {
        Self::with_store(embedder, Arc::new(USearchStore::new()), configure)
    }

    fn with_store(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();

        let mut config = Config::default();
        config.storage.graph_path = dir.path().join("state").join("graph.json");
        config.chunking = ChunkingConfig {
            max_chunk_size: 40,
            min_chunk_size: 1,
        };
        configure(&mut config);

        let graph = Arc::new(RwLock::new(DependencyGraph::new()));
        let lexical = Arc::new(LexicalIndex::default());
        let indexer = Indexer::new(
            &config,
            graph.clone(),
            Arc::new(DefaultChunker::new(&config.chunking)),
            embedder,
            store.clone(),
            lexical.clone(),
        );

        Self {
            _dir: dir,
            root,
            graph_path: config.storage.graph_path,
            graph,
            store,
            lexical,
            indexer,
        }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    async fn run(&self, mode: IndexingMode) -> IndexResponse {
        self.indexer
            .index(&self.root, mode, CancellationToken::new())
            .await
            .unwrap()
    }

    async fn stored_ids(&self) -> Vec<ChunkId> {
        let mut ids: Vec<ChunkId> = self
            .store
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    fn lexical_ids(&self) -> Vec<ChunkId> {
        let mut ids = self.lexical.ids();
        ids.sort();
        ids
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_full_index_stores_chunks_and_edges() {
    let fx = Fixture::new();
    let a = fx.write("A.kt", "import B\n\nclass A");
    let b = fx.write("B.kt", "class B");

    let response = fx.run(IndexingMode::Full).await;
    assert_eq!(response.files_scanned, 2);
    assert_eq!(response.files_indexed, 2);
    assert_eq!(response.files_failed, 0);
    assert_eq!(response.chunks_created, 2);
    assert_eq!(response.embeddings_generated, 2);

    let graph = fx.graph.read().await;
    assert_eq!(graph.related_files(&a, 1), vec![b.clone()]);
    assert_eq!(graph.edges()[0].kind, IMPORTS);
    assert!(!graph.has_changed(&a));
    assert!(!graph.has_changed(&b));

    let expected = vec![
        ChunkId::derive(&key(&a), CLASS, 0),
        ChunkId::derive(&key(&b), CLASS, 0),
    ];
    let mut expected_sorted = expected.clone();
    expected_sorted.sort();
    assert_eq!(fx.stored_ids().await, expected_sorted);
    assert_eq!(fx.lexical.ids(), expected);
}

#[tokio::test]
async fn test_full_index_twice_is_idempotent() {
    let fx = Fixture::new();
    fx.write("A.kt", "class A\nfun one() = 1\nfun two() = 2\nfun three() = 3");
    fx.write("B.kt", "class B");

    fx.run(IndexingMode::Full).await;
    let first = fx.stored_ids().await;
    let response = fx.run(IndexingMode::Full).await;

    assert_eq!(response.files_indexed, 2);
    assert_eq!(fx.stored_ids().await, first);
    assert_eq!(fx.lexical_ids(), first);
    assert_eq!(fx.store.len().await.unwrap(), first.len());
}

#[tokio::test]
async fn test_incremental_processes_only_changed_files() {
    let fx = Fixture::new();
    let a = fx.write("A.kt", "import B\n\nclass A");
    let b = fx.write("B.kt", "class B");
    fx.run(IndexingMode::Full).await;
    let a_before = fx.graph.read().await.node(&a).cloned().unwrap();

    let untouched = fx.run(IndexingMode::Incremental).await;
    assert_eq!(untouched.files_indexed, 0);
    assert_eq!(untouched.files_unchanged, 2);

    fs::write(&b, "class B {\n  val edited = true\n}").unwrap();
    assert!(fx.graph.read().await.has_changed(&b));

    let response = fx.run(IndexingMode::Incremental).await;
    assert_eq!(response.mode, IndexingMode::Incremental);
    assert_eq!(response.files_indexed, 1);
    assert_eq!(response.files_unchanged, 1);

    let graph = fx.graph.read().await;
    assert_eq!(graph.node(&a), Some(&a_before));
    assert!(!graph.has_changed(&b));
    assert_eq!(graph.related_files(&a, 1), vec![b.clone()]);

    let hits = fx.lexical.search("edited", 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.file_path, key(&b));
}

#[tokio::test]
async fn test_incremental_matches_full_after_edit() {
    let incremental = Fixture::new();
    let full = Fixture::new();
    let long = "class A\nfun one() = 1\nfun two() = 2\nfun three() = 3";
    let short = "class A";

    for fx in [&incremental, &full] {
        fx.write("B.kt", "class B");
    }
    incremental.write("A.kt", long);
    incremental.run(IndexingMode::Full).await;
    let before = incremental.store.len().await.unwrap();
    incremental.write("A.kt", short);
    incremental.run(IndexingMode::Incremental).await;

    full.write("A.kt", short);
    full.run(IndexingMode::Full).await;

    // Same relative layout, different roots: compare by (file name, tag, ordinal, text)
    async fn contents(fx: &Fixture) -> Vec<(String, String, usize, String)> {
        let mut rows: Vec<_> = fx
            .store
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| {
                let name = Path::new(&r.metadata.file_path)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                (name, r.metadata.chunk_type, r.metadata.ordinal, r.document)
            })
            .collect();
        rows.sort();
        rows
    }

    assert!(before > incremental.store.len().await.unwrap());
    assert_eq!(contents(&incremental).await, contents(&full).await);
    assert_eq!(incremental.lexical.len(), full.lexical.len());
    assert_eq!(incremental.lexical.len(), incremental.store.len().await.unwrap());
}

#[tokio::test]
async fn test_embedding_failure_keeps_file_changed() {
    let fx = Fixture::with(Arc::new(MarkerFailingEmbedder), |_| {});
    let good = fx.write("Good.kt", "class Good");
    let bad = fx.write("Bad.kt", "class Bad { val EMBED_FAILS = 1 }");

    let response = fx.run(IndexingMode::Full).await;
    assert_eq!(response.files_indexed, 1);
    assert_eq!(response.files_failed, 1);
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].contains("Bad.kt"));

    let graph = fx.graph.read().await;
    assert!(!graph.has_changed(&good));
    assert!(graph.has_changed(&bad));
    drop(graph);

    // Retried on the next incremental pass
    let retry = fx.run(IndexingMode::Incremental).await;
    assert_eq!(retry.files_failed, 1);
    assert_eq!(retry.files_unchanged, 1);
}

#[tokio::test]
async fn test_count_mismatch_fails_file() {
    let fx = Fixture::with(Arc::new(ShortEmbedder), |_| {});
    let a = fx.write("A.kt", "class A");

    let response = fx.run(IndexingMode::Full).await;
    assert_eq!(response.files_failed, 1);
    assert!(response.errors[0].contains("1 inputs"));
    assert!(fx.graph.read().await.has_changed(&a));
    assert_eq!(fx.store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_utf8_is_isolated() {
    let fx = Fixture::new();
    fx.write("A.kt", "class A");
    fs::write(fx.root.join("Bin.kt"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

    let response = fx.run(IndexingMode::Full).await;
    assert_eq!(response.files_indexed, 1);
    assert_eq!(response.files_failed, 1);
    assert!(response.errors[0].contains("UTF-8"));
}

#[tokio::test]
async fn test_empty_file_is_marked_indexed() {
    let fx = Fixture::new();
    let empty = fx.write("Empty.kt", "");

    let response = fx.run(IndexingMode::Full).await;
    assert_eq!(response.files_indexed, 1);
    assert_eq!(response.chunks_created, 0);
    assert!(!fx.graph.read().await.has_changed(&empty));
}

#[tokio::test]
async fn test_removed_import_drops_edge() {
    let fx = Fixture::new();
    let a = fx.write("A.kt", "import B\n\nclass A");
    fx.write("B.kt", "class B");
    fx.run(IndexingMode::Full).await;
    assert_eq!(fx.graph.read().await.edge_count(), 1);

    fs::write(&a, "class A").unwrap();
    fx.run(IndexingMode::Incremental).await;
    assert_eq!(fx.graph.read().await.edge_count(), 0);
}

#[tokio::test]
async fn test_graph_is_persisted() {
    let fx = Fixture::new();
    let a = fx.write("A.kt", "import B\n\nclass A");
    let b = fx.write("B.kt", "class B");
    fx.run(IndexingMode::Full).await;

    let loaded = DependencyGraph::load(&fx.graph_path).unwrap();
    assert_eq!(loaded.related_files(&a, 1), vec![b.clone()]);
    assert!(!loaded.has_changed(&a));
    assert!(!loaded.has_changed(&b));
}

#[tokio::test]
async fn test_cancelled_run_errors() {
    let fx = Fixture::new();
    fx.write("A.kt", "class A");
    let token = CancellationToken::new();
    token.cancel();

    let err = fx
        .indexer
        .index(&fx.root, IndexingMode::Full, token)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexingError>(),
        Some(IndexingError::Cancelled)
    ));
    assert_eq!(fx.graph.read().await.indexed_file_count(), 0);
}

#[tokio::test]
async fn test_missing_root_errors() {
    let fx = Fixture::new();
    let err = fx
        .indexer
        .index(&fx.root.join("nope"), IndexingMode::Full, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexingError>(),
        Some(IndexingError::DirectoryNotFound(_))
    ));
}

#[tokio::test]
async fn test_prune_deleted_files() {
    let fx = Fixture::with(Arc::new(HashEmbedder), |config| {
        config.indexing.prune_deleted = true;
    });
    fx.write("A.kt", "class A");
    let gone = fx.write("Gone.kt", "class Gone");
    fx.run(IndexingMode::Full).await;
    assert_eq!(fx.store.len().await.unwrap(), 2);

    fs::remove_file(&gone).unwrap();
    let response = fx.run(IndexingMode::Incremental).await;

    assert_eq!(response.files_removed, 1);
    assert!(!fx.graph.read().await.contains(&gone));
    assert_eq!(fx.store.len().await.unwrap(), 1);
    assert_eq!(fx.lexical.len(), 1);
}

#[tokio::test]
async fn test_deleted_files_kept_without_pruning() {
    let fx = Fixture::new();
    let gone = fx.write("Gone.kt", "class Gone");
    fx.run(IndexingMode::Full).await;

    fs::remove_file(&gone).unwrap();
    let response = fx.run(IndexingMode::Incremental).await;

    assert_eq!(response.files_removed, 0);
    assert!(fx.graph.read().await.contains(&gone));
    assert_eq!(fx.store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_sequential_chunking_matches_parallel() {
    let parallel = Fixture::new();
    let sequential = Fixture::with(Arc::new(HashEmbedder), |config| {
        config.indexing.parallel_chunking = false;
    });
    for fx in [&parallel, &sequential] {
        fx.write("A.kt", "class A\nfun one() = 1\nfun two() = 2");
        fx.write("B.kt", "class B");
        fx.run(IndexingMode::Full).await;
    }
    assert_eq!(parallel.lexical.len(), sequential.lexical.len());
    assert_eq!(parallel.store.len().await.unwrap(), sequential.store.len().await.unwrap());
}

const EDITED_A: &str = "class A\nfun one() = 1\nfun two() = 2";

/// Fully indexed A.kt (two chunks) and B.kt on a store that can fail
async fn failing_fixture() -> (Fixture, Arc<FailingStore>, PathBuf, PathBuf) {
    let store = Arc::new(FailingStore::default());
    let fx = Fixture::with_store(Arc::new(HashEmbedder), store.clone(), |_| {});
    let a = fx.write("A.kt", "class A\nfun one() = 1");
    let b = fx.write("B.kt", "class B");
    let response = fx.run(IndexingMode::Full).await;
    assert_eq!(response.files_indexed, 2);
    (fx, store, a, b)
}

async fn chunks_of(fx: &Fixture, path: &Path) -> Vec<String> {
    fx.store
        .records()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.metadata.file_path == key(path))
        .map(|r| r.document)
        .collect()
}

#[tokio::test]
async fn test_failed_upsert_leaves_file_absent_until_retry() {
    let (fx, store, a, b) = failing_fixture().await;
    fs::write(&a, EDITED_A).unwrap();
    store.fail_upsert.store(true, Ordering::SeqCst);

    let response = fx.run(IndexingMode::Incremental).await;
    assert_eq!(response.files_indexed, 0);
    assert_eq!(response.files_failed, 1);
    assert!(response.errors[0].contains("Failed to store embeddings"));
    {
        let graph = fx.graph.read().await;
        assert!(graph.has_changed(&a));
        assert!(!graph.has_changed(&b));
    }
    // Old chunks are removed before new ones are written
    assert!(chunks_of(&fx, &a).await.is_empty());
    assert_eq!(chunks_of(&fx, &b).await, vec!["class B"]);
    assert_eq!(fx.lexical_ids(), fx.stored_ids().await);
    assert!(fx.lexical.search("one()", 5).is_empty());

    store.heal();
    let retry = fx.run(IndexingMode::Incremental).await;
    assert_eq!(retry.files_indexed, 1);
    assert_eq!(retry.files_failed, 0);
    assert!(!fx.graph.read().await.has_changed(&a));
    assert_eq!(chunks_of(&fx, &a).await.len(), 3);
    assert_eq!(fx.lexical_ids(), fx.stored_ids().await);
}

#[tokio::test]
async fn test_partial_upsert_keeps_stores_aligned() {
    let (fx, store, a, _) = failing_fixture().await;
    fs::write(&a, EDITED_A).unwrap();
    store.partial_upserts.store(true, Ordering::SeqCst);

    let response = fx.run(IndexingMode::Incremental).await;
    assert_eq!(response.files_failed, 1);
    assert!(fx.graph.read().await.has_changed(&a));
    assert_eq!(chunks_of(&fx, &a).await, vec!["class A"]);
    assert_eq!(fx.lexical_ids(), fx.stored_ids().await);
    assert_eq!(fx.lexical.len(), 2);
}

#[tokio::test]
async fn test_failed_delete_keeps_previous_chunks() {
    let (fx, store, a, _) = failing_fixture().await;
    let before = chunks_of(&fx, &a).await;
    fs::write(&a, EDITED_A).unwrap();
    store.fail_delete.store(true, Ordering::SeqCst);

    let response = fx.run(IndexingMode::Incremental).await;
    assert_eq!(response.files_failed, 1);
    assert!(response.errors[0].contains("Failed to remove previous chunks"));
    assert!(fx.graph.read().await.has_changed(&a));
    assert_eq!(chunks_of(&fx, &a).await, before);
    assert_eq!(fx.lexical_ids(), fx.stored_ids().await);
    assert!(fx.lexical.search("two()", 5).is_empty());
}

#[tokio::test]
async fn test_failed_flush_leaves_file_changed() {
    let (fx, store, a, _) = failing_fixture().await;
    fs::write(&a, EDITED_A).unwrap();
    store.fail_flush.store(true, Ordering::SeqCst);

    let response = fx.run(IndexingMode::Incremental).await;
    assert_eq!(response.files_failed, 1);
    assert!(response.errors[0].contains("Failed to flush vector store"));
    assert!(fx.graph.read().await.has_changed(&a));
    // Written but not durable: both stores agree and the next run redoes it
    assert_eq!(chunks_of(&fx, &a).await.len(), 3);
    assert_eq!(fx.lexical_ids(), fx.stored_ids().await);

    store.heal();
    let retry = fx.run(IndexingMode::Incremental).await;
    assert_eq!(retry.files_indexed, 1);
    assert!(!fx.graph.read().await.has_changed(&a));
    assert_eq!(fx.lexical_ids(), fx.stored_ids().await);
}

#[tokio::test]
async fn test_incremental_ranking_matches_full_index() {
    let incremental = Fixture::new();
    incremental.write("A.kt", "class A");
    incremental.write("B.kt", "class B");
    incremental.run(IndexingMode::Full).await;
    // Same tokens, different bytes
    incremental.write("A.kt", "class  A");
    let response = incremental.run(IndexingMode::Incremental).await;
    assert_eq!(response.files_indexed, 1);

    let full = Fixture::new();
    full.write("A.kt", "class  A");
    full.write("B.kt", "class B");
    full.run(IndexingMode::Full).await;

    let ranking = |fx: &Fixture| -> Vec<String> {
        fx.lexical
            .search("class", 10)
            .into_iter()
            .map(|hit| {
                Path::new(&hit.metadata.file_path)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    };
    assert_eq!(ranking(&incremental), vec!["A.kt", "B.kt"]);
    assert_eq!(ranking(&incremental), ranking(&full));
}

#[test]
fn test_describe_chunks_numbers_each_tag() {
    let path = Path::new("/p/A.kt");
    let chunks = vec![
        Chunk::new("class", path, "a"),
        Chunk::new("function", path, "b"),
        Chunk::new("class", path, "c"),
        Chunk::new("di_module", path, "d").with_framework("hilt"),
    ];

    let described = describe_chunks("/p/A.kt", "hash", &chunks);
    let ordinals: Vec<usize> = described.iter().map(|(_, m)| m.ordinal).collect();
    assert_eq!(ordinals, vec![0, 0, 1, 0]);
    assert_eq!(described[2].0, ChunkId::derive("/p/A.kt", "class", 1));
    assert_eq!(described[3].1.framework.as_deref(), Some("hilt"));
    assert_eq!(described[0].1.language.as_deref(), Some("Kotlin"));
    assert_eq!(described[0].1.file_hash, "hash");
}
