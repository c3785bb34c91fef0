use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::catalog::RawSchema;

lazy_static! {
    /// Unquoted Oracle identifier
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]{0,127}$").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    EmptyTableName,
    NoColumns(String),
    EmptyColumnName { table: String, position: usize },
    EmptyDataType { table: String, column: String },
    DuplicateColumn { table: String, column: String },
    QuotedIdentifier(String),
}

impl SchemaViolation {
    /// Quoted identifiers are legal, just unusual
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::QuotedIdentifier(_))
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTableName => write!(f, "Table with empty name"),
            Self::NoColumns(t) => write!(f, "Table {} has no columns", t),
            Self::EmptyColumnName { table, position } => {
                write!(f, "Column #{} of {} has an empty name", position + 1, table)
            }
            Self::EmptyDataType { table, column } => {
                write!(f, "Column {}.{} has no data type", table, column)
            }
            Self::DuplicateColumn { table, column } => {
                write!(f, "Column {} appears more than once in {}", column, table)
            }
            Self::QuotedIdentifier(name) => {
                write!(f, "'{}' is not a plain identifier (needs quoting in SQL)", name)
            }
        }
    }
}

/// Check a schema export for problems that degrade descriptions or SQL
pub fn validate_schema(raw: &RawSchema) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();

    for table in raw.tables() {
        let name = &table.table_name;
        if name.trim().is_empty() {
            violations.push(SchemaViolation::EmptyTableName);
            continue;
        }
        if !IDENTIFIER.is_match(name) {
            violations.push(SchemaViolation::QuotedIdentifier(name.clone()));
        }
        if table.columns.is_empty() {
            violations.push(SchemaViolation::NoColumns(name.clone()));
        }

        let mut seen = HashSet::new();
        for (position, col) in table.columns.iter().enumerate() {
            if col.column_name.trim().is_empty() {
                violations.push(SchemaViolation::EmptyColumnName {
                    table: name.clone(),
                    position,
                });
                continue;
            }
            if !seen.insert(col.column_name.as_str()) {
                violations.push(SchemaViolation::DuplicateColumn {
                    table: name.clone(),
                    column: col.column_name.clone(),
                });
            }
            if col.data_type.trim().is_empty() {
                violations.push(SchemaViolation::EmptyDataType {
                    table: name.clone(),
                    column: col.column_name.clone(),
                });
            }
            if !IDENTIFIER.is_match(&col.column_name) {
                violations.push(SchemaViolation::QuotedIdentifier(format!(
                    "{}.{}",
                    name, col.column_name
                )));
            }
        }
    }

    violations
}
