//! Where schema metadata comes from and where it is cached.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use super::catalog::{CatalogError, RawSchema};
use super::paths::DataPaths;

/// A metadata source that can produce the full table catalog
pub trait SchemaSource: Send + Sync {
    /// Human-readable origin, used in logs and errors
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<RawSchema, CatalogError>;
}

/// Reads a `{table_name -> columns}` metadata export from disk
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchemaSource for JsonFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<RawSchema, CatalogError> {
        let schema = read_schema_file(&self.path)?;
        if schema.is_empty() {
            return Err(CatalogError::Empty(self.describe()));
        }
        info!(source = %self.describe(), tables = schema.len(), "fetched schema");
        Ok(schema)
    }
}

/// Cached copy of the last fetched schema plus its fetch time
#[derive(Debug, Clone)]
pub struct SchemaStore {
    schema_file: PathBuf,
    last_fetch_file: PathBuf,
}

impl SchemaStore {
    pub fn new(paths: &DataPaths) -> Self {
        Self {
            schema_file: paths.schema_file.clone(),
            last_fetch_file: paths.last_fetch_file.clone(),
        }
    }

    pub fn schema_file(&self) -> &Path {
        &self.schema_file
    }

    pub fn exists(&self) -> bool {
        self.schema_file.exists()
    }

    pub fn load(&self) -> Result<RawSchema, CatalogError> {
        read_schema_file(&self.schema_file)
    }

    /// Write the schema and stamp the fetch time
    pub fn save(&self, schema: &RawSchema) -> Result<(), CatalogError> {
        if let Some(parent) = self.schema_file.parent() {
            fs::create_dir_all(parent).map_err(|source| CatalogError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = schema.to_json_pretty()?;
        fs::write(&self.schema_file, json).map_err(|source| CatalogError::Write {
            path: self.schema_file.clone(),
            source,
        })?;
        fs::write(&self.last_fetch_file, Local::now().to_rfc3339()).map_err(|source| {
            CatalogError::Write {
                path: self.last_fetch_file.clone(),
                source,
            }
        })?;
        Ok(())
    }

    /// Time of the last successful fetch, if recorded and parseable
    pub fn last_fetch(&self) -> Option<DateTime<Local>> {
        let raw = fs::read_to_string(&self.last_fetch_file).ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Local))
    }
}

/// Which path produced the schema at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOrigin {
    Cache,
    Source,
}

/// Load the schema the way startup does: cached file first, then the source.
///
/// A schema fetched from the source is cached for the next start; failing to
/// cache it is logged, not fatal.
pub fn load_schema(
    store: &SchemaStore,
    source: Option<&dyn SchemaSource>,
) -> Result<(RawSchema, SchemaOrigin), CatalogError> {
    if store.exists() {
        match store.load() {
            Ok(schema) => {
                info!(file = %store.schema_file().display(), tables = schema.len(), "loaded cached schema");
                return Ok((schema, SchemaOrigin::Cache));
            }
            Err(e) => warn!(error = %e, "failed to load cached schema"),
        }
    }

    let fetched = match source {
        Some(source) => source.fetch(),
        None => Err(CatalogError::Unavailable(
            "no schema source configured".to_string(),
        )),
    };

    match fetched {
        Ok(schema) => {
            if let Err(e) = store.save(&schema) {
                warn!(error = %e, "fetched schema but failed to cache it");
            }
            Ok((schema, SchemaOrigin::Source))
        }
        Err(e) if store.exists() => Err(CatalogError::Unavailable(format!(
            "{}. Cached schema file {} exists but failed to load",
            e,
            store.schema_file().display()
        ))),
        Err(e) => Err(CatalogError::Unavailable(format!(
            "{}. Provide a valid {} or configure a schema source",
            e,
            store.schema_file().display()
        ))),
    }
}

fn read_schema_file(path: &Path) -> Result<RawSchema, CatalogError> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    RawSchema::from_json_str(&content)
}
