use serde::{Deserialize, Serialize};

/// SQL column type, reduced to the categories the compiler cares about.
///
/// Only `Uuid` changes compiler behavior (the strict dialect elides mixed
/// UUID/non-UUID equality predicates); the remaining variants exist so a
/// loaded catalog round-trips without loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    BigInt,
    Integer,
    Text,
    Uuid,
    Boolean,
    Numeric,
    Timestamp,
    Json,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: ColumnType,
}

/// One declared foreign-key constraint column pair, as reflected from the
/// catalog: `column` on the owning table references `referred_column` on
/// `referred_schema.referred_table`. Composite constraints appear as one
/// entry per column pair, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub column: String,
    pub referred_schema: String,
    pub referred_table: String,
    pub referred_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
}

impl TableMeta {
    /// Schema-qualified name, e.g. `public.book`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// True when `column` is UUID-typed. Unknown columns count as non-UUID.
    pub fn is_uuid_column(&self, column: &str) -> bool {
        matches!(
            self.column(column),
            Some(ColumnMeta {
                data_type: ColumnType::Uuid,
                ..
            })
        )
    }
}
