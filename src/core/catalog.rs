//! Table catalog: raw column metadata and the searchable text derived from it.
//!
//! A [`RawSchema`] is the `{table_name -> columns}` export produced by the
//! metadata source. [`CatalogSnapshot::build`] turns it into the index-aligned
//! name/description pair that gets embedded and shown to the user.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised while reading, parsing or storing schema metadata
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate table name: {0}")]
    DuplicateTable(String),

    #[error("no tables found in {0}")]
    Empty(String),

    #[error("schema not available: {0}")]
    Unavailable(String),

    #[error("{names} table names but {texts} descriptions")]
    Misaligned { names: usize, texts: usize },
}

/// One column as reported by the metadata source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub data_type: String,
    /// Oracle `NULLABLE` flag; `"Y"` on the wire means nullable
    #[serde(default, with = "nullable_flag")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_length: Option<u64>,
}

impl ColumnDescriptor {
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            nullable,
            data_length: None,
        }
    }

    pub fn nullability(&self) -> &'static str {
        if self.nullable {
            "NULL"
        } else {
            "NOT NULL"
        }
    }

    /// `<column_name> (<data_type>, NULL|NOT NULL)`
    pub fn describe(&self) -> String {
        format!(
            "{} ({}, {})",
            self.column_name,
            self.data_type,
            self.nullability()
        )
    }
}

mod nullable_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(nullable: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *nullable { "Y" } else { "N" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Text(String),
            Bool(bool),
        }

        Ok(match Option::<Flag>::deserialize(deserializer)? {
            Some(Flag::Text(flag)) => flag == "Y",
            Some(Flag::Bool(b)) => b,
            None => false,
        })
    }
}

/// A table and its columns in metadata order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    /// `Table <name> with columns: <c1>, <c2>, ...`
    pub fn describe(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnDescriptor::describe).collect();
        format!(
            "Table {} with columns: {}",
            self.table_name,
            columns.join(", ")
        )
    }
}

/// Ordered `{table_name -> columns}` metadata.
///
/// Serialized as a JSON object; the object's document order is the catalog
/// order. Duplicate table names are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSchema {
    tables: Vec<TableDescriptor>,
}

impl RawSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table, keeping catalog order
    pub fn push(&mut self, table: TableDescriptor) -> Result<(), CatalogError> {
        if self.get(&table.table_name).is_some() {
            return Err(CatalogError::DuplicateTable(table.table_name));
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn get(&self, table_name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.table_name == table_name)
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for RawSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for table in &self.tables {
            map.serialize_entry(&table.table_name, &table.columns)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = RawSchema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping table names to column lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawSchema, A::Error> {
                let mut schema = RawSchema::new();
                while let Some((name, columns)) =
                    access.next_entry::<String, Vec<ColumnDescriptor>>()?
                {
                    schema
                        .push(TableDescriptor::new(name, columns))
                        .map_err(<A::Error as de::Error>::custom)?;
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

/// Index-aligned table names and descriptions.
///
/// `names()[i]` is described by exactly `texts()[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    table_names: Vec<String>,
    table_texts: Vec<String>,
}

impl CatalogSnapshot {
    /// Render one description per table, in schema order
    pub fn build(raw: &RawSchema) -> Self {
        let mut table_names = Vec::with_capacity(raw.len());
        let mut table_texts = Vec::with_capacity(raw.len());

        for table in raw.tables() {
            table_names.push(table.table_name.clone());
            table_texts.push(table.describe());
        }

        Self {
            table_names,
            table_texts,
        }
    }

    /// Assemble a snapshot from already-rendered parts
    pub fn from_parts(table_names: Vec<String>, table_texts: Vec<String>) -> Result<Self, CatalogError> {
        if table_names.len() != table_texts.len() {
            return Err(CatalogError::Misaligned {
                names: table_names.len(),
                texts: table_texts.len(),
            });
        }
        let mut seen = HashSet::new();
        for name in &table_names {
            if !seen.insert(name.as_str()) {
                return Err(CatalogError::DuplicateTable(name.clone()));
            }
        }
        Ok(Self {
            table_names,
            table_texts,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.table_names
    }

    pub fn texts(&self) -> &[String] {
        &self.table_texts
    }

    /// `(table_name, description)` at a catalog position
    pub fn entry(&self, position: usize) -> Option<(&str, &str)> {
        let name = self.table_names.get(position)?;
        let text = self.table_texts.get(position)?;
        Some((name.as_str(), text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.table_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table_names.is_empty()
    }
}

/// Shorthand for [`CatalogSnapshot::build`]
pub fn build_snapshot(raw: &RawSchema) -> CatalogSnapshot {
    CatalogSnapshot::build(raw)
}

/// Render the schema block handed to SQL generation for the given tables.
///
/// Tables unknown to `raw` are skipped.
pub fn render_schema_context<'a, I>(raw: &RawSchema, table_names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for name in table_names {
        let Some(table) = raw.get(name) else {
            continue;
        };
        out.push_str(&format!("Table: {}\nColumns:\n", table.table_name));
        for col in &table.columns {
            out.push_str(&format!("- {}\n", col.describe()));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "USERS": [
                {"column_name": "id", "data_type": "NUMBER", "nullable": "N"},
                {"column_name": "email", "data_type": "VARCHAR2", "nullable": "Y", "data_length": 255}
            ],
            "ORDERS": [
                {"column_name": "order_id", "data_type": "NUMBER", "nullable": "N"},
                {"column_name": "user_id", "data_type": "NUMBER", "nullable": "N"}
            ]
        }"#
    }

    #[test]
    fn test_parse_keeps_document_order() {
        let raw = RawSchema::from_json_str(sample_json()).unwrap();
        let names: Vec<&str> = raw.tables().iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["USERS", "ORDERS"]);
        assert!(raw.get("USERS").unwrap().columns[1].nullable);
        assert_eq!(raw.get("USERS").unwrap().columns[1].data_length, Some(255));
    }

    #[test]
    fn test_description_format() {
        let raw = RawSchema::from_json_str(sample_json()).unwrap();
        let snapshot = CatalogSnapshot::build(&raw);
        assert_eq!(
            snapshot.texts()[0],
            "Table USERS with columns: id (NUMBER, NOT NULL), email (VARCHAR2, NULL)"
        );
        assert_eq!(snapshot.entry(1).unwrap().0, "ORDERS");
        assert!(snapshot.entry(2).is_none());
    }

    #[test]
    fn test_nullable_flag_other_than_y_is_not_null() {
        let json = r#"{"T": [
            {"column_name": "a", "data_type": "DATE", "nullable": "y"},
            {"column_name": "b", "data_type": "DATE", "nullable": "YES"},
            {"column_name": "c", "data_type": "DATE"}
        ]}"#;
        let raw = RawSchema::from_json_str(json).unwrap();
        assert!(raw.tables()[0].columns.iter().all(|c| !c.nullable));
    }

    #[test]
    fn test_build_snapshot_is_deterministic() {
        let raw = RawSchema::from_json_str(sample_json()).unwrap();
        let a = build_snapshot(&raw);
        let b = build_snapshot(&RawSchema::from_json_str(sample_json()).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.names().len(), a.texts().len());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let json = r#"{"T": [], "T": []}"#;
        assert!(RawSchema::from_json_str(json).is_err());

        let mut raw = RawSchema::new();
        raw.push(TableDescriptor::new("T", vec![])).unwrap();
        assert!(matches!(
            raw.push(TableDescriptor::new("T", vec![])),
            Err(CatalogError::DuplicateTable(_))
        ));
    }

    #[test]
    fn test_json_round_trip_preserves_flags_and_order() {
        let raw = RawSchema::from_json_str(sample_json()).unwrap();
        let json = raw.to_json_pretty().unwrap();
        assert!(json.contains("\"nullable\": \"Y\""));
        assert!(json.find("USERS").unwrap() < json.find("ORDERS").unwrap());
        assert_eq!(RawSchema::from_json_str(&json).unwrap(), raw);
    }

    #[test]
    fn test_from_parts_checks_alignment() {
        assert!(matches!(
            CatalogSnapshot::from_parts(vec!["A".into()], vec![]),
            Err(CatalogError::Misaligned { names: 1, texts: 0 })
        ));
        assert!(matches!(
            CatalogSnapshot::from_parts(vec!["A".into(), "A".into()], vec!["x".into(), "y".into()]),
            Err(CatalogError::DuplicateTable(name)) if name == "A"
        ));
    }

    #[test]
    fn test_render_schema_context_skips_unknown() {
        let raw = RawSchema::from_json_str(sample_json()).unwrap();
        let text = render_schema_context(&raw, ["ORDERS", "MISSING"]);
        assert_eq!(
            text,
            "Table: ORDERS\nColumns:\n- order_id (NUMBER, NOT NULL)\n- user_id (NUMBER, NOT NULL)\n\n"
        );
    }
}
