use thiserror::Error;

/// Failures raised while compiling a schema tree into a query.
///
/// All variants are structural and non-retryable: they reflect a schema,
/// configuration or dialect defect, not a transient condition. A failure for
/// any node fails the whole build - there is no partial-success mode.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryBuilderError {
    /// No declared foreign-key constraint links the two tables in either
    /// direction. Reflects a schema/config defect; aborts the build.
    #[error("No foreign key relationship between '{left}' and '{right}'")]
    MissingForeignKey { left: String, right: String },

    /// The resolved foreign-key column count on the node side differs from
    /// the parent side. Emitting the join anyway would silently drop the
    /// correlating predicate and return an unbounded scan, so the build
    /// fails instead.
    #[error(
        "Foreign key column count mismatch joining '{node}' to '{parent}': \
         {node_count} column(s) vs {parent_count} (check the declared foreign keys)"
    )]
    ForeignKeyCountMismatch {
        node: String,
        parent: String,
        node_count: usize,
        parent_count: usize,
    },

    /// Join planning produced zero correlating predicates. An empty ON
    /// clause would be a cross join; the build fails before one is emitted.
    #[error("Empty join predicate joining '{child}' to '{parent}' (would emit a cross join)")]
    EmptyJoinPredicate { child: String, parent: String },

    /// The active SQL dialect cannot express the requested operation.
    #[error("Dialect '{dialect}' does not support {operation}")]
    UnsupportedByDialect {
        dialect: &'static str,
        operation: String,
    },

    /// A tree node references a table the catalog does not know.
    #[error("Table '{schema}.{table}' not found in catalog")]
    UnknownTable { schema: String, table: String },
}

impl QueryBuilderError {
    pub(crate) fn unknown_table(schema: &str, table: &str) -> Self {
        QueryBuilderError::UnknownTable {
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }
}
