//! Catalog provider boundary.
//!
//! The compiler never performs I/O; it expects catalog metadata (columns,
//! primary keys, declared foreign-key constraints) to already be resident
//! behind the [`Catalog`] trait. Schema discovery itself is a collaborator
//! concern - [`MemoryCatalog`] is the reference implementation used by tests
//! and by callers that pre-load the catalog before compiling.

mod memory;
mod types;

pub use memory::{fk, MemoryCatalog};
pub use types::{ColumnMeta, ColumnType, ForeignKeyConstraint, TableMeta};

/// Read access to catalog metadata for one database.
///
/// Implementations must expose, per table, its column list, primary-key
/// columns and declared foreign-key constraints. Lookups are assumed cheap
/// and the catalog immutable for the duration of a build.
pub trait Catalog {
    /// Look up a table by schema and name. `None` means the table does not
    /// exist as far as this catalog knows.
    fn table(&self, schema: &str, name: &str) -> Option<&TableMeta>;
}
