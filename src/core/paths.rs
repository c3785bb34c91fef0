use std::path::PathBuf;

pub const SCHEMA_FILE: &str = "table_details.json";
pub const LAST_FETCH_FILE: &str = "last_fetch.txt";
pub const INDEX_FILE: &str = "schema_index.db";
pub const NAMES_FILE: &str = "table_names.json";
pub const DESCRIPTIONS_FILE: &str = "table_descriptions.json";

/// Locations of every artifact kept in the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub schema_file: PathBuf,
    pub last_fetch_file: PathBuf,
    pub index_file: PathBuf,
    pub names_file: PathBuf,
    pub descriptions_file: PathBuf,
}

impl DataPaths {
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            schema_file: root.join(SCHEMA_FILE),
            last_fetch_file: root.join(LAST_FETCH_FILE),
            index_file: root.join(INDEX_FILE),
            names_file: root.join(NAMES_FILE),
            descriptions_file: root.join(DESCRIPTIONS_FILE),
            root,
        }
    }
}
