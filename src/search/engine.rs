//! Retrieval engine - ranks catalog tables against a free-text query
//!
//! Vector search over the loaded index first; keyword overlap when that
//! fails or finds nothing.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::embedding::{load_embedder, Embedder};
use super::error::{Result, SearchError};
use super::index::{FlatIndex, IndexOrigin, IndexStore};
use crate::core::catalog::{render_schema_context, CatalogSnapshot, RawSchema};
use crate::core::config::Settings;

/// Tables returned when the caller does not ask for a count
pub const DEFAULT_TOP_K: usize = 5;

const NAME_MATCH_SCORE: u32 = 10;
const WORD_MATCH_SCORE: u32 = 3;
const MIN_WORD_CHARS: usize = 3;

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Reloading,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
            Self::Reloading => write!(f, "reloading"),
        }
    }
}

/// A ranked table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub table_name: String,
    pub similarity_score: f32,
    pub description: String,
}

/// Which path produced a result; scores are only comparable within one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Vector,
    Keyword,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub hits: Vec<SearchHit>,
}

/// Result of a schema (re)load
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub tables: usize,
    pub origin: IndexOrigin,
    pub duration_ms: u128,
}

/// Schema, catalog and index that were loaded together
struct LoadedCatalog {
    schema: RawSchema,
    snapshot: CatalogSnapshot,
    index: FlatIndex,
}

struct Inner {
    state: EngineState,
    current: Option<Arc<LoadedCatalog>>,
}

/// Shared, read-mostly retrieval engine.
///
/// Searches clone the current catalog/index pair out of the lock, so a reload
/// swaps the whole pair at once and in-flight searches finish on the pair
/// they started with.
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
    inner: RwLock<Inner>,
    reload_guard: Mutex<()>,
}

impl RetrievalEngine {
    /// Load the configured embedding model. An unknown model is fatal here.
    pub fn new(settings: &Settings) -> Result<Self> {
        let embedder = load_embedder(&settings.embedding_model)?;
        Ok(Self::with_embedder(IndexStore::new(&settings.paths()), embedder))
    }

    pub fn with_embedder(store: IndexStore, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            store,
            inner: RwLock::new(Inner {
                state: EngineState::Uninitialized,
                current: None,
            }),
            reload_guard: Mutex::new(()),
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.read().state
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn index_store(&self) -> &IndexStore {
        &self.store
    }

    pub fn table_count(&self) -> usize {
        self.inner
            .read()
            .current
            .as_ref()
            .map(|c| c.snapshot.len())
            .unwrap_or(0)
    }

    /// Table names of the loaded catalog, in catalog order
    pub fn table_names(&self) -> Vec<String> {
        self.inner
            .read()
            .current
            .as_ref()
            .map(|c| c.snapshot.names().to_vec())
            .unwrap_or_default()
    }

    /// Rebuild the catalog from `raw` and reload or rebuild the index.
    ///
    /// Reloads are serialized. On failure the previous pair stays in service;
    /// a failed first load leaves the engine uninitialized.
    pub fn reload(&self, raw: &RawSchema) -> Result<ReloadReport> {
        let _guard = self.reload_guard.lock();
        let start = Instant::now();

        {
            let mut inner = self.inner.write();
            inner.state = if inner.current.is_some() {
                EngineState::Reloading
            } else {
                EngineState::Loading
            };
        }

        let snapshot = CatalogSnapshot::build(raw);
        match self.store.load_or_rebuild(&snapshot, self.embedder.as_ref()) {
            Ok((index, origin)) => {
                let tables = snapshot.len();
                let loaded = Arc::new(LoadedCatalog {
                    schema: raw.clone(),
                    snapshot,
                    index,
                });
                {
                    let mut inner = self.inner.write();
                    inner.current = Some(loaded);
                    inner.state = EngineState::Ready;
                }

                let duration_ms = start.elapsed().as_millis();
                info!(tables, %origin, duration_ms = duration_ms as u64, "schema catalog loaded");
                Ok(ReloadReport {
                    tables,
                    origin,
                    duration_ms,
                })
            }
            Err(e) => {
                let mut inner = self.inner.write();
                inner.state = if inner.current.is_some() {
                    EngineState::Ready
                } else {
                    EngineState::Uninitialized
                };
                warn!(error = %e, state = %inner.state, "schema reload failed");
                Err(e)
            }
        }
    }

    /// Up to `top_k` relevant tables, best first.
    ///
    /// Only fails when no catalog has been loaded yet; an empty result means
    /// no relevant tables.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        Ok(self.search_detailed(query, top_k)?.hits)
    }

    /// Like [`search`](Self::search), also reporting which path answered
    pub fn search_detailed(&self, query: &str, top_k: usize) -> Result<SearchOutcome> {
        let catalog = self.current()?;
        Ok(self.rank(&catalog, query, top_k))
    }

    /// Search plus the column listing of every hit, rendered from the schema
    /// the hits were ranked against
    pub fn search_with_context(&self, query: &str, top_k: usize) -> Result<(SearchOutcome, String)> {
        let catalog = self.current()?;
        let outcome = self.rank(&catalog, query, top_k);
        let context = render_schema_context(
            &catalog.schema,
            outcome.hits.iter().map(|h| h.table_name.as_str()),
        );
        Ok((outcome, context))
    }

    fn rank(&self, catalog: &LoadedCatalog, query: &str, top_k: usize) -> SearchOutcome {
        match self.vector_search(catalog, query, top_k) {
            Ok(hits) if !hits.is_empty() => {
                return SearchOutcome {
                    mode: SearchMode::Vector,
                    hits,
                }
            }
            Ok(_) => debug!("no vector hits, falling back to keyword search"),
            Err(e) => warn!(error = %e, "vector search failed, falling back to keyword search"),
        }

        SearchOutcome {
            mode: SearchMode::Keyword,
            hits: keyword_search(&catalog.snapshot, query, top_k),
        }
    }

    /// Keyword ranking only, skipping the vector path
    pub fn search_keywords(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let catalog = self.current()?;
        Ok(keyword_search(&catalog.snapshot, query, top_k))
    }

    fn current(&self) -> Result<Arc<LoadedCatalog>> {
        let inner = self.inner.read();
        match &inner.current {
            Some(catalog) => Ok(Arc::clone(catalog)),
            None => Err(SearchError::NotReady(inner.state)),
        }
    }

    fn vector_search(&self, catalog: &LoadedCatalog, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if catalog.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query)?;
        let neighbors = catalog.index.query(&embedding, top_k)?;

        let mut hits: Vec<SearchHit> = neighbors
            .into_iter()
            .filter(|n| n.score > 0.0)
            .filter_map(|n| {
                let (name, text) = catalog.snapshot.entry(n.position)?;
                Some(SearchHit {
                    table_name: name.to_string(),
                    similarity_score: n.score,
                    description: text.to_string(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        Ok(hits)
    }
}

/// Keyword-overlap ranking used when vector search has nothing to offer.
///
/// Per table: +10 when the table name and the query contain one another
/// (a query word inside the name counts), +3 for each query word of three or
/// more characters found in the description. Zero scores are dropped.
///
/// A blank query matches no table name, even though the empty string is a
/// substring of every name; an empty question yields no hits.
pub fn keyword_search(snapshot: &CatalogSnapshot, query: &str, top_k: usize) -> Vec<SearchHit> {
    let query_lower = query.to_lowercase();
    let words: Vec<&str> = query_lower
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
        .collect();

    let mut scored: Vec<(u32, usize)> = snapshot
        .names()
        .iter()
        .zip(snapshot.texts())
        .enumerate()
        .filter_map(|(position, (name, text))| {
            let mut score = 0;
            if name_matches(&name.to_lowercase(), &query_lower, &words) {
                score += NAME_MATCH_SCORE;
            }
            let text_lower = text.to_lowercase();
            score += WORD_MATCH_SCORE * words.iter().filter(|w| text_lower.contains(*w)).count() as u32;
            (score > 0).then_some((score, position))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(top_k);

    scored
        .into_iter()
        .filter_map(|(score, position)| {
            let (name, text) = snapshot.entry(position)?;
            Some(SearchHit {
                table_name: name.to_string(),
                similarity_score: score as f32,
                description: text.to_string(),
            })
        })
        .collect()
}

/// Substring match in either direction, plus query words inside the name.
/// Blank queries and empty names never match.
fn name_matches(name: &str, query: &str, words: &[&str]) -> bool {
    if name.is_empty() || query.trim().is_empty() {
        return false;
    }
    name.contains(query) || query.contains(name) || words.iter().any(|w| name.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths::DataPaths;
    use crate::search::embedding::l2_normalize;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const DIM: usize = 256;

    /// Hashes lowercase words into buckets; shared words mean positive scores
    struct BagOfWords;

    impl Embedder for BagOfWords {
        fn id(&self) -> &str {
            "bag-of-words"
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0; DIM];
            for word in text
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let bucket = word
                    .bytes()
                    .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
                v[bucket as usize % DIM] += 1.0;
            }
            l2_normalize(&mut v);
            Ok(v)
        }
    }

    /// Embeds like [`BagOfWords`] until switched off
    struct Flaky {
        failing: AtomicBool,
    }

    impl Flaky {
        fn new() -> Self {
            Self {
                failing: AtomicBool::new(false),
            }
        }

        fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl Embedder for Flaky {
        fn id(&self) -> &str {
            "bag-of-words"
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SearchError::Embedding("model offline".to_string()));
            }
            BagOfWords.embed(text)
        }
    }

    const USERS_ORDERS: &str = r#"{
        "USERS": [
            {"column_name": "id", "data_type": "NUMBER", "nullable": "N"},
            {"column_name": "email", "data_type": "VARCHAR2", "nullable": "Y"}
        ],
        "ORDERS": [
            {"column_name": "order_id", "data_type": "NUMBER", "nullable": "N"},
            {"column_name": "user_id", "data_type": "NUMBER", "nullable": "N"}
        ]
    }"#;

    fn raw(json: &str) -> RawSchema {
        RawSchema::from_json_str(json).unwrap()
    }

    fn engine(dir: &TempDir, embedder: Arc<dyn Embedder>) -> RetrievalEngine {
        let store = IndexStore::new(&DataPaths::from_root(dir.path().to_path_buf()));
        RetrievalEngine::with_embedder(store, embedder)
    }

    #[test]
    fn test_keyword_users_orders() {
        let snapshot = CatalogSnapshot::build(&raw(USERS_ORDERS));
        let hits = keyword_search(&snapshot, "find user email", 5);

        assert_eq!(hits[0].table_name, "USERS");
        assert!(hits[0].similarity_score >= 10.0);
        assert_eq!(hits[0].similarity_score, 16.0);
        assert_eq!(hits[1].table_name, "ORDERS");
        assert_eq!(hits[1].similarity_score, 3.0);
    }

    #[test]
    fn test_keyword_name_contains_query() {
        let snapshot = CatalogSnapshot::build(&raw(USERS_ORDERS));
        let hits = keyword_search(&snapshot, "ord", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].table_name, "ORDERS");
        assert_eq!(hits[0].similarity_score, 13.0);
    }

    #[test]
    fn test_keyword_short_words_ignored() {
        let snapshot = CatalogSnapshot::build(&raw(USERS_ORDERS));
        assert!(keyword_search(&snapshot, "id of", 5).is_empty());
    }

    #[test]
    fn test_keyword_blank_query_matches_nothing() {
        let snapshot = CatalogSnapshot::build(&raw(USERS_ORDERS));
        assert!(keyword_search(&snapshot, "", 5).is_empty());
        assert!(keyword_search(&snapshot, "   ", 5).is_empty());
    }

    #[test]
    fn test_keyword_top_k() {
        let snapshot = CatalogSnapshot::build(&raw(USERS_ORDERS));
        assert_eq!(keyword_search(&snapshot, "number", 1).len(), 1);
        assert!(keyword_search(&snapshot, "number", 0).is_empty());
    }

    #[test]
    fn test_keyword_ties_keep_catalog_order() {
        let snapshot = CatalogSnapshot::build(&raw(USERS_ORDERS));
        let hits = keyword_search(&snapshot, "number", 5);
        let names: Vec<&str> = hits.iter().map(|h| h.table_name.as_str()).collect();
        assert_eq!(names, vec!["USERS", "ORDERS"]);
    }

    #[test]
    fn test_search_before_load_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(matches!(
            engine.search("users", 5),
            Err(SearchError::NotReady(EngineState::Uninitialized))
        ));
    }

    #[test]
    fn test_vector_search_ranks_users_first() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        let report = engine.reload(&raw(USERS_ORDERS)).unwrap();
        assert_eq!(report.tables, 2);
        assert_eq!(report.origin, IndexOrigin::Rebuilt);
        assert_eq!(engine.state(), EngineState::Ready);

        let outcome = engine.search_detailed("find users email", 5).unwrap();
        assert_eq!(outcome.mode, SearchMode::Vector);
        assert_eq!(outcome.hits[0].table_name, "USERS");
        assert!(outcome.hits.iter().all(|h| h.similarity_score > 0.0));
        assert!(outcome
            .hits
            .windows(2)
            .all(|w| w[0].similarity_score >= w[1].similarity_score));
    }

    #[test]
    fn test_failing_embedder_falls_back_to_keywords() {
        let dir = TempDir::new().unwrap();
        let flaky = Arc::new(Flaky::new());
        let engine = engine(&dir, flaky.clone());
        engine.reload(&raw(USERS_ORDERS)).unwrap();

        flaky.fail(true);
        let outcome = engine.search_detailed("find user email", 5).unwrap();
        assert_eq!(outcome.mode, SearchMode::Keyword);
        assert_eq!(outcome.hits[0].table_name, "USERS");
        assert!(outcome.hits[0].similarity_score >= 10.0);
    }

    #[test]
    fn test_unrelated_query_uses_fallback_and_may_be_empty() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        engine.reload(&raw(USERS_ORDERS)).unwrap();

        let outcome = engine.search_detailed("zzqx", 5).unwrap();
        assert_eq!(outcome.mode, SearchMode::Keyword);
        assert!(outcome.hits.is_empty());
        assert!(engine.search("", 5).unwrap().is_empty());
    }

    #[test]
    fn test_top_k_zero_is_empty() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        engine.reload(&raw(USERS_ORDERS)).unwrap();
        assert!(engine.search("users", 0).unwrap().is_empty());
        assert!(engine.search("users", 1).unwrap().len() <= 1);
    }

    #[test]
    fn test_failed_first_load_stays_uninitialized() {
        let dir = TempDir::new().unwrap();
        let flaky = Arc::new(Flaky::new());
        flaky.fail(true);
        let engine = engine(&dir, flaky);

        assert!(engine.reload(&raw(USERS_ORDERS)).is_err());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(engine.search("users", 5).is_err());
    }

    #[test]
    fn test_failed_reload_keeps_previous_catalog() {
        let dir = TempDir::new().unwrap();
        let flaky = Arc::new(Flaky::new());
        let engine = engine(&dir, flaky.clone());
        engine.reload(&raw(USERS_ORDERS)).unwrap();

        flaky.fail(true);
        let bigger = raw(
            r#"{
                "USERS": [{"column_name": "id", "data_type": "NUMBER", "nullable": "N"}],
                "ORDERS": [{"column_name": "order_id", "data_type": "NUMBER", "nullable": "N"}],
                "PAYMENTS": [{"column_name": "amount", "data_type": "NUMBER", "nullable": "Y"}]
            }"#,
        );
        assert!(engine.reload(&bigger).is_err());
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.table_names(), vec!["USERS", "ORDERS"]);
    }

    #[test]
    fn test_reload_unchanged_schema_reuses_index() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        assert_eq!(engine.reload(&raw(USERS_ORDERS)).unwrap().origin, IndexOrigin::Rebuilt);
        assert_eq!(engine.reload(&raw(USERS_ORDERS)).unwrap().origin, IndexOrigin::Reloaded);
        assert_eq!(engine.reload(&raw(USERS_ORDERS)).unwrap().origin, IndexOrigin::Reloaded);
    }

    const USERS_PAYMENTS: &str = r#"{
        "USERS": [
            {"column_name": "id", "data_type": "NUMBER", "nullable": "N"},
            {"column_name": "user_name", "data_type": "VARCHAR2", "nullable": "Y"}
        ],
        "PAYMENTS": [
            {"column_name": "payment_id", "data_type": "NUMBER", "nullable": "N"},
            {"column_name": "user_id", "data_type": "NUMBER", "nullable": "N"}
        ]
    }"#;

    /// Every hit appears in the context with the columns its description lists
    fn assert_context_matches_hits(outcome: &SearchOutcome, context: &str) {
        assert_eq!(context.matches("Table: ").count(), outcome.hits.len());
        for hit in &outcome.hits {
            assert!(context.contains(&format!("Table: {}\n", hit.table_name)));
            if hit.table_name == "USERS" {
                let has_email = hit.description.contains("email");
                assert_eq!(context.contains("- email (VARCHAR2, NULL)"), has_email);
                assert_eq!(context.contains("- user_name (VARCHAR2, NULL)"), !has_email);
            }
        }
    }

    #[test]
    fn test_context_comes_from_latest_reload() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        engine.reload(&raw(USERS_ORDERS)).unwrap();
        engine.reload(&raw(USERS_PAYMENTS)).unwrap();

        let (outcome, context) = engine.search_with_context("users payments number id", 5).unwrap();
        assert!(!outcome.hits.is_empty());
        let names = engine.table_names();
        assert!(outcome.hits.iter().all(|h| names.contains(&h.table_name)));
        assert!(context.contains("Table: PAYMENTS\n"));
        assert!(!context.contains("ORDERS"));
        assert_context_matches_hits(&outcome, &context);
    }

    #[test]
    fn test_context_stays_paired_across_concurrent_reloads() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        let first = raw(USERS_ORDERS);
        let second = raw(USERS_PAYMENTS);
        engine.reload(&first).unwrap();

        std::thread::scope(|s| {
            for offset in 0..2 {
                let (engine, first, second) = (&engine, &first, &second);
                s.spawn(move || {
                    for i in 0..6 {
                        let schema = if (i + offset) % 2 == 0 { first } else { second };
                        engine.reload(schema).unwrap();
                    }
                });
            }
            for _ in 0..3 {
                s.spawn(|| {
                    for _ in 0..40 {
                        let (outcome, context) =
                            engine.search_with_context("users orders payments number id", 5).unwrap();
                        assert_context_matches_hits(&outcome, &context);
                    }
                });
            }
        });

        let (outcome, context) = engine.search_with_context("users number id", 5).unwrap();
        let names = engine.table_names();
        assert!(outcome.hits.iter().all(|h| names.contains(&h.table_name)));
        assert_context_matches_hits(&outcome, &context);
    }

    #[test]
    fn test_empty_catalog_searches_empty() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(BagOfWords));
        engine.reload(&RawSchema::new()).unwrap();
        assert_eq!(engine.table_count(), 0);
        assert!(engine.search("users", 5).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_model_is_fatal() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            embedding_model: "no-such-model".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            RetrievalEngine::new(&settings),
            Err(SearchError::ModelUnavailable { .. })
        ));
    }
}
