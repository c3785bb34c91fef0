//! Flat inner-product index and its persisted form.
//!
//! The index file is a SQLite database with one embedding BLOB per catalog
//! position plus build metadata. Two JSON sidecars record the table names and
//! descriptions the index was built from; staleness is judged against them,
//! never re-derived from the vectors.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::embedding::{inner_product, Embedder};
use super::error::{Result, SearchError};
use crate::core::catalog::CatalogSnapshot;
use crate::core::paths::DataPaths;

/// A candidate returned by [`FlatIndex::query`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// Exact nearest-neighbor search by inner product over row-major vectors
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored vectors in position order
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dimension.max(1))
    }

    /// Up to `min(k, len)` neighbors by descending score.
    ///
    /// Equal scores keep position order. An empty index answers every query
    /// with no neighbors.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .iter()
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                score: inner_product(query, vector),
            })
            .collect();

        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score));
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

/// Build metadata stored next to the vectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub embedder: String,
    pub dimension: usize,
    pub count: usize,
    /// SHA-256 of the sidecar contents the vectors were built from
    pub fingerprint: String,
    pub built_at: i64,
}

/// An index read back from disk
#[derive(Debug, Clone)]
pub struct PersistedIndex {
    pub index: FlatIndex,
    pub meta: IndexMeta,
}

/// Whether `load_or_rebuild` reused the files or re-embedded the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    Reloaded,
    Rebuilt,
}

impl fmt::Display for IndexOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reloaded => write!(f, "reloaded"),
            Self::Rebuilt => write!(f, "rebuilt"),
        }
    }
}

/// Why a persisted index cannot be reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Missing(PathBuf),
    TableSetChanged,
    DescriptionsChanged,
    SidecarMismatch,
    CountMismatch { persisted: usize, expected: usize },
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "{} is missing", path.display()),
            Self::TableSetChanged => write!(f, "table set changed"),
            Self::DescriptionsChanged => write!(f, "table descriptions changed"),
            Self::SidecarMismatch => write!(f, "index does not match its sidecars"),
            Self::CountMismatch {
                persisted,
                expected,
            } => write!(f, "index holds {} vectors, catalog has {} tables", persisted, expected),
        }
    }
}

enum Inspection {
    Valid(PersistedIndex),
    Stale(Staleness),
}

/// Index statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: usize,
    pub embedder: String,
    pub built_at: Option<String>,
    pub file_size_bytes: u64,
}

/// The index file and its two sidecars
#[derive(Debug, Clone)]
pub struct IndexStore {
    index_file: PathBuf,
    names_file: PathBuf,
    descriptions_file: PathBuf,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS vectors (
        position INTEGER PRIMARY KEY,
        embedding BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );
"#;

impl IndexStore {
    pub fn new(paths: &DataPaths) -> Self {
        Self::with_files(
            paths.index_file.clone(),
            paths.names_file.clone(),
            paths.descriptions_file.clone(),
        )
    }

    pub fn with_files(index_file: PathBuf, names_file: PathBuf, descriptions_file: PathBuf) -> Self {
        Self {
            index_file,
            names_file,
            descriptions_file,
        }
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    pub fn names_file(&self) -> &Path {
        &self.names_file
    }

    pub fn descriptions_file(&self) -> &Path {
        &self.descriptions_file
    }

    /// Embed every description, then persist vectors and sidecars together
    pub fn build(&self, snapshot: &CatalogSnapshot, embedder: &dyn Embedder) -> Result<FlatIndex> {
        let texts: Vec<&str> = snapshot.texts().iter().map(String::as_str).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(SearchError::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let mut index = FlatIndex::new(embedder.dimension());
        for vector in &vectors {
            index.add(vector)?;
        }

        self.persist(&index, snapshot, embedder.id())?;
        info!(tables = index.len(), embedder = embedder.id(), "built schema index");
        Ok(index)
    }

    /// Whether the files on disk can serve `candidate` as-is.
    ///
    /// Names are compared as a set, descriptions in order. Read and parse
    /// failures count as invalid.
    pub fn is_valid(&self, candidate: &CatalogSnapshot) -> bool {
        match self.inspect(candidate) {
            Ok(Inspection::Valid(_)) => true,
            Ok(Inspection::Stale(reason)) => {
                debug!(%reason, "persisted index is stale");
                false
            }
            Err(e) => {
                warn!(error = %e, "persisted index is unreadable");
                false
            }
        }
    }

    /// [`is_valid`](Self::is_valid), and built by the embedder named
    /// `embedder_id`; exactly when `load_or_rebuild` would reuse the files
    pub fn is_valid_for(&self, candidate: &CatalogSnapshot, embedder_id: &str) -> bool {
        match self.inspect(candidate) {
            Ok(Inspection::Valid(persisted)) if persisted.meta.embedder == embedder_id => true,
            Ok(Inspection::Valid(persisted)) => {
                debug!(persisted = %persisted.meta.embedder, current = embedder_id, "persisted index was built by another embedder");
                false
            }
            Ok(Inspection::Stale(reason)) => {
                debug!(%reason, "persisted index is stale");
                false
            }
            Err(e) => {
                warn!(error = %e, "persisted index is unreadable");
                false
            }
        }
    }

    /// Reload the persisted index when it is valid for `snapshot` and was
    /// built by the same embedder; rebuild otherwise
    pub fn load_or_rebuild(
        &self,
        snapshot: &CatalogSnapshot,
        embedder: &dyn Embedder,
    ) -> Result<(FlatIndex, IndexOrigin)> {
        match self.inspect(snapshot) {
            Ok(Inspection::Valid(persisted))
                if persisted.meta.embedder == embedder.id()
                    && persisted.meta.dimension == embedder.dimension() =>
            {
                info!(tables = persisted.index.len(), "reusing persisted schema index");
                return Ok((persisted.index, IndexOrigin::Reloaded));
            }
            Ok(Inspection::Valid(persisted)) => info!(
                persisted = %persisted.meta.embedder,
                current = embedder.id(),
                "embedder changed, rebuilding schema index"
            ),
            Ok(Inspection::Stale(reason)) => info!(%reason, "rebuilding schema index"),
            Err(e) => warn!(error = %e, "persisted index unreadable, rebuilding"),
        }

        let index = self.build(snapshot, embedder)?;
        Ok((index, IndexOrigin::Rebuilt))
    }

    /// Read the index file without checking it against a catalog
    pub fn load(&self) -> Result<PersistedIndex> {
        read_index_file(&self.index_file)
    }

    pub fn stats(&self) -> Result<Option<IndexStats>> {
        if !self.index_file.is_file() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(&self.index_file, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let meta = read_meta(&conn)?;
        let vector_count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;
        let file_size_bytes = fs::metadata(&self.index_file)
            .map(|m| m.len())
            .unwrap_or(0);
        let built_at = chrono::DateTime::from_timestamp(meta.built_at, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string());

        Ok(Some(IndexStats {
            vector_count: vector_count as usize,
            dimension: meta.dimension,
            embedder: meta.embedder,
            built_at,
            file_size_bytes,
        }))
    }

    /// Delete the index and both sidecars
    pub fn remove(&self) -> Result<()> {
        for path in self.artifacts() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SearchError::io(path, e)),
            }
        }
        Ok(())
    }

    fn artifacts(&self) -> [&Path; 3] {
        [
            self.index_file.as_path(),
            self.names_file.as_path(),
            self.descriptions_file.as_path(),
        ]
    }

    fn inspect(&self, candidate: &CatalogSnapshot) -> Result<Inspection> {
        for path in self.artifacts() {
            if !path.is_file() {
                return Ok(Inspection::Stale(Staleness::Missing(path.to_path_buf())));
            }
        }

        let names: Vec<String> = read_json(&self.names_file)?;
        let texts: Vec<String> = read_json(&self.descriptions_file)?;

        let persisted_set: HashSet<&str> = names.iter().map(String::as_str).collect();
        let candidate_set: HashSet<&str> = candidate.names().iter().map(String::as_str).collect();
        if names.len() != candidate.len() || persisted_set != candidate_set {
            return Ok(Inspection::Stale(Staleness::TableSetChanged));
        }
        if texts.as_slice() != candidate.texts() {
            return Ok(Inspection::Stale(Staleness::DescriptionsChanged));
        }

        let persisted = read_index_file(&self.index_file)?;
        if persisted.meta.fingerprint != fingerprint(&names, &texts)? {
            return Ok(Inspection::Stale(Staleness::SidecarMismatch));
        }
        if persisted.index.len() != candidate.len() {
            return Ok(Inspection::Stale(Staleness::CountMismatch {
                persisted: persisted.index.len(),
                expected: candidate.len(),
            }));
        }

        Ok(Inspection::Valid(persisted))
    }

    /// Stage all three files, then move them into place.
    ///
    /// Sidecars are renamed before the index; an interrupted commit leaves a
    /// fingerprint mismatch, which reads as stale.
    fn persist(&self, index: &FlatIndex, snapshot: &CatalogSnapshot, embedder_id: &str) -> Result<()> {
        let parent = parent_dir(&self.index_file);
        fs::create_dir_all(parent).map_err(|e| SearchError::io(parent, e))?;

        let meta = IndexMeta {
            embedder: embedder_id.to_string(),
            dimension: index.dimension(),
            count: index.len(),
            fingerprint: fingerprint(snapshot.names(), snapshot.texts())?,
            built_at: chrono::Utc::now().timestamp(),
        };

        let index_tmp = temp_path(&self.index_file);
        let names_tmp = temp_path(&self.names_file);
        let descriptions_tmp = temp_path(&self.descriptions_file);

        write_index_file(&index_tmp, index, &meta)?;
        write_json(&names_tmp, snapshot.names())?;
        write_json(&descriptions_tmp, snapshot.texts())?;

        for (tmp, path) in [
            (&names_tmp, &self.names_file),
            (&descriptions_tmp, &self.descriptions_file),
            (&index_tmp, &self.index_file),
        ] {
            fs::rename(tmp, path).map_err(|e| SearchError::io(path, e))?;
        }
        sync_dir(parent).map_err(|e| SearchError::io(parent, e))?;

        debug!(file = %self.index_file.display(), vectors = meta.count, "persisted schema index");
        Ok(())
    }
}

fn write_index_file(path: &Path, index: &FlatIndex, meta: &IndexMeta) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| SearchError::io(path, e))?;
    }

    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO vectors (position, embedding) VALUES (?1, ?2)")?;
        for (position, vector) in index.iter().enumerate() {
            stmt.execute(params![position as i64, embedding_to_blob(vector)])?;
        }
    }
    set_meta(&tx, "embedder", &meta.embedder)?;
    set_meta(&tx, "dimension", &meta.dimension.to_string())?;
    set_meta(&tx, "count", &meta.count.to_string())?;
    set_meta(&tx, "fingerprint", &meta.fingerprint)?;
    set_meta(&tx, "built_at", &meta.built_at.to_string())?;
    tx.commit()?;

    conn.close().map_err(|(_, e)| SearchError::Storage(e))?;
    Ok(())
}

fn read_index_file(path: &Path) -> Result<PersistedIndex> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let meta = read_meta(&conn)?;

    let mut index = FlatIndex::new(meta.dimension);
    let mut stmt = conn.prepare("SELECT position, embedding FROM vectors ORDER BY position")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    for (expected, row) in rows.enumerate() {
        let (position, blob) = row?;
        if position != expected as i64 {
            return Err(SearchError::Corrupt(format!(
                "vector positions are not contiguous at {}",
                expected
            )));
        }
        index.add(&blob_to_embedding(&blob)?)?;
    }

    if index.len() != meta.count {
        return Err(SearchError::Corrupt(format!(
            "metadata records {} vectors, file holds {}",
            meta.count,
            index.len()
        )));
    }

    Ok(PersistedIndex { index, meta })
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO index_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row(
        "SELECT value FROM index_meta WHERE key = ?1",
        params![key],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()?
    .flatten()
    .ok_or_else(|| SearchError::Corrupt(format!("missing index metadata '{}'", key)))
}

fn get_meta_number<T: std::str::FromStr>(conn: &Connection, key: &str) -> Result<T> {
    let raw = get_meta(conn, key)?;
    raw.parse()
        .map_err(|_| SearchError::Corrupt(format!("index metadata '{}' is not a number: {}", key, raw)))
}

fn read_meta(conn: &Connection) -> Result<IndexMeta> {
    Ok(IndexMeta {
        embedder: get_meta(conn, "embedder")?,
        dimension: get_meta_number(conn, "dimension")?,
        count: get_meta_number(conn, "count")?,
        fingerprint: get_meta(conn, "fingerprint")?,
        built_at: get_meta_number(conn, "built_at")?,
    })
}

fn fingerprint(names: &[String], texts: &[String]) -> Result<String> {
    let json = serde_json::to_string(&(names, texts))?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path).map_err(|e| SearchError::io(path, e))?;
    Ok(serde_json::from_slice(&content)?)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| SearchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush().map_err(|e| SearchError::io(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| SearchError::io(path, e))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> std::io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Convert f32 embedding to BLOB
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 embedding
fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(SearchError::Corrupt(format!(
            "embedding blob of {} bytes is not a whole number of f32s",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::RawSchema;
    use crate::search::embedding::{HtpEmbedder, EMBEDDING_DIM};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> IndexStore {
        IndexStore::new(&DataPaths::from_root(dir.path().join("data")))
    }

    fn snapshot(json: &str) -> CatalogSnapshot {
        CatalogSnapshot::build(&RawSchema::from_json_str(json).unwrap())
    }

    const TWO_TABLES: &str = r#"{
        "USERS": [{"column_name": "id", "data_type": "NUMBER", "nullable": "N"}],
        "ORDERS": [{"column_name": "order_id", "data_type": "NUMBER", "nullable": "N"}]
    }"#;

    #[test]
    fn test_blob_conversion() {
        let embedding = vec![1.0, 2.0, 3.0, -0.5];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob_to_embedding(&blob).unwrap(), embedding);
        assert!(blob_to_embedding(&blob[..5]).is_err());
    }

    #[test]
    fn test_query_orders_by_score() {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[0.6, 0.8]).unwrap();

        let hits = index.query(&[0.0, 1.0], 10).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        assert_eq!(index.query(&[0.0, 1.0], 2).unwrap().len(), 2);
        assert!(index.query(&[0.0, 1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_ties_keep_position_order() {
        let mut index = FlatIndex::new(1);
        for _ in 0..3 {
            index.add(&[1.0]).unwrap();
        }
        let positions: Vec<usize> = index.query(&[1.0], 3).unwrap().iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = FlatIndex::new(4);
        assert!(index.query(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(2);
        assert!(index.add(&[1.0]).is_err());
        index.add(&[1.0, 0.0]).unwrap();
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 1),
            Err(SearchError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_build_then_valid_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let snap = snapshot(TWO_TABLES);
        let embedder = HtpEmbedder::new();

        assert!(!store.is_valid(&snap));
        let built = store.build(&snap, &embedder).unwrap();
        assert_eq!(built.len(), 2);
        assert!(store.is_valid(&snap));

        let (reloaded, origin) = store.load_or_rebuild(&snap, &embedder).unwrap();
        assert_eq!(origin, IndexOrigin::Reloaded);
        assert_eq!(reloaded, built);
        assert!(store.is_valid(&snap));

        let meta = store.load().unwrap().meta;
        assert_eq!(meta.embedder, "htp-384");
        assert_eq!(meta.dimension, EMBEDDING_DIM);
    }

    #[test]
    fn test_name_order_does_not_matter_but_text_order_does() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let snap = snapshot(TWO_TABLES);
        store.build(&snap, &HtpEmbedder::new()).unwrap();

        let same_names_swapped_texts = CatalogSnapshot::from_parts(
            vec!["USERS".into(), "ORDERS".into()],
            vec![snap.texts()[1].clone(), snap.texts()[0].clone()],
        )
        .unwrap();
        assert!(!store.is_valid(&same_names_swapped_texts));

        let swapped_names_same_texts = CatalogSnapshot::from_parts(
            vec!["ORDERS".into(), "USERS".into()],
            snap.texts().to_vec(),
        )
        .unwrap();
        assert!(store.is_valid(&swapped_names_same_texts));
    }

    #[test]
    fn test_validity_for_other_embedder() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let snap = snapshot(TWO_TABLES);
        store.build(&snap, &HtpEmbedder::new()).unwrap();

        assert!(store.is_valid(&snap));
        assert!(store.is_valid_for(&snap, "htp-384"));
        assert!(!store.is_valid_for(&snap, "some-other-model"));
    }

    #[test]
    fn test_changed_description_is_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.build(&snapshot(TWO_TABLES), &HtpEmbedder::new()).unwrap();

        let changed = snapshot(
            r#"{
                "USERS": [{"column_name": "id", "data_type": "NUMBER", "nullable": "Y"}],
                "ORDERS": [{"column_name": "order_id", "data_type": "NUMBER", "nullable": "N"}]
            }"#,
        );
        assert!(!store.is_valid(&changed));
    }

    #[test]
    fn test_deleted_sidecar_is_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let snap = snapshot(TWO_TABLES);
        store.build(&snap, &HtpEmbedder::new()).unwrap();

        fs::remove_file(store.descriptions_file()).unwrap();
        assert!(!store.is_valid(&snap));
    }

    #[test]
    fn test_corrupt_files_are_invalid_not_errors() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let snap = snapshot(TWO_TABLES);
        store.build(&snap, &HtpEmbedder::new()).unwrap();

        fs::write(store.names_file(), "[not json").unwrap();
        assert!(!store.is_valid(&snap));

        store.build(&snap, &HtpEmbedder::new()).unwrap();
        fs::write(store.index_file(), b"garbage").unwrap();
        assert!(!store.is_valid(&snap));

        let (index, origin) = store.load_or_rebuild(&snap, &HtpEmbedder::new()).unwrap();
        assert_eq!(origin, IndexOrigin::Rebuilt);
        assert_eq!(index.len(), 2);
        assert!(store.is_valid(&snap));
    }

    #[test]
    fn test_sidecars_from_another_build_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let snap = snapshot(TWO_TABLES);
        store.build(&snap, &HtpEmbedder::new()).unwrap();
        let stale_index = fs::read(store.index_file()).unwrap();

        let one = snapshot(r#"{"USERS": [{"column_name": "id", "data_type": "NUMBER", "nullable": "N"}]}"#);
        store.build(&one, &HtpEmbedder::new()).unwrap();
        // index from the first build, sidecars from the second
        fs::write(store.index_file(), stale_index).unwrap();

        assert!(!store.is_valid(&one));
    }

    #[test]
    fn test_added_table_triggers_rebuild() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let embedder = HtpEmbedder::new();
        let one = snapshot(r#"{"A": [{"column_name": "x", "data_type": "NUMBER", "nullable": "N"}]}"#);
        store.build(&one, &embedder).unwrap();

        let two = snapshot(
            r#"{
                "A": [{"column_name": "x", "data_type": "NUMBER", "nullable": "N"}],
                "B": [{"column_name": "y", "data_type": "DATE", "nullable": "Y"}]
            }"#,
        );
        assert!(!store.is_valid(&two));

        let (index, origin) = store.load_or_rebuild(&two, &embedder).unwrap();
        assert_eq!(origin, IndexOrigin::Rebuilt);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_catalog_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let empty = CatalogSnapshot::default();

        let index = store.build(&empty, &HtpEmbedder::new()).unwrap();
        assert!(index.is_empty());
        assert!(store.is_valid(&empty));
    }

    #[test]
    fn test_stats_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.stats().unwrap().is_none());

        store.build(&snapshot(TWO_TABLES), &HtpEmbedder::new()).unwrap();
        let stats = store.stats().unwrap().unwrap();
        assert_eq!(stats.vector_count, 2);
        assert_eq!(stats.dimension, EMBEDDING_DIM);
        assert!(stats.file_size_bytes > 0);

        store.remove().unwrap();
        assert!(!store.index_file().exists());
        assert!(!store.names_file().exists());
        store.remove().unwrap();
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.build(&snapshot(TWO_TABLES), &HtpEmbedder::new()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("data"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
