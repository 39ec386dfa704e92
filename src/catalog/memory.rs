use std::collections::HashMap;

use super::types::{ColumnMeta, ColumnType, ForeignKeyConstraint, TableMeta};
use super::Catalog;

/// In-memory catalog keyed by (schema, table).
///
/// Callers load it once before compiling; the compiler treats it as
/// immutable for the duration of a build.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    tables: HashMap<(String, String), TableMeta>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableMeta) {
        self.tables
            .insert((table.schema.clone(), table.name.clone()), table);
    }

    /// Convenience constructor for a table whose columns all share one type.
    /// Primary keys and foreign keys are added separately.
    pub fn table(
        schema: &str,
        name: &str,
        columns: &[(&str, ColumnType)],
        primary_keys: &[&str],
        foreign_keys: Vec<ForeignKeyConstraint>,
    ) -> TableMeta {
        TableMeta {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, t)| ColumnMeta {
                    name: n.to_string(),
                    data_type: t.clone(),
                })
                .collect(),
            primary_keys: primary_keys.iter().map(|s| s.to_string()).collect(),
            foreign_keys,
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Catalog for MemoryCatalog {
    fn table(&self, schema: &str, name: &str) -> Option<&TableMeta> {
        self.tables.get(&(schema.to_string(), name.to_string()))
    }
}

/// Shorthand for a single foreign-key column pair.
pub fn fk(
    column: &str,
    referred_schema: &str,
    referred_table: &str,
    referred_column: &str,
) -> ForeignKeyConstraint {
    ForeignKeyConstraint {
        column: column.to_string(),
        referred_schema: referred_schema.to_string(),
        referred_table: referred_table.to_string(),
        referred_column: referred_column.to_string(),
    }
}
