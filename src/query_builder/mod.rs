//! Query compilation.
//!
//! [`QueryBuilder`] turns a [`SchemaTree`](crate::schema_tree::SchemaTree)
//! into one composed query whose rows are nested JSON documents with `_keys`
//! identity envelopes. One builder instance serves one logical execution
//! context: concurrent builds on independent trees get independent
//! instances. Each `build()` call carries its own foreign-key cache, so
//! nothing is shared across invocations either.

mod assembler;
mod errors;
pub mod dialect;
pub mod filters;
pub mod fk_resolver;
pub mod sql;

pub use errors::QueryBuilderError;
pub use filters::{FilterSpec, RowLocations, Watermark};
pub use fk_resolver::{select_relevant_columns, FkResolver, ForeignKeyMap};

use crate::catalog::Catalog;
use crate::config::CompilerConfig;
use crate::schema_tree::SchemaTree;

use assembler::{Assembler, BuildContext};
use dialect::{dialect_for, Dialect};

/// Per-build inputs beyond the tree itself: user filters, the change-capture
/// watermark, and an optional physical row-location bound for resumable
/// scans.
#[derive(Debug, Clone, Default)]
pub struct BuildParams {
    pub filters: FilterSpec,
    pub watermark: Watermark,
    pub locations: RowLocations,
}

impl BuildParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, filters: FilterSpec) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_locations(mut self, locations: RowLocations) -> Self {
        self.locations = locations;
        self
    }
}

/// The executable artifact: one SQL statement and the names of its output
/// columns (`_keys`, `_doc`, then the root's primary keys). Literal values
/// are inlined; execution-time bounds belong to the caller's execution
/// layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub columns: Vec<String>,
}

/// Compiles schema trees against one catalog and one dialect.
///
/// Compilation is synchronous and CPU-bound; the only external access is
/// catalog lookups, assumed resident. The builder holds no per-build state -
/// an explicit context (with the foreign-key cache) is created inside each
/// [`QueryBuilder::build`] call.
pub struct QueryBuilder<'a> {
    catalog: &'a dyn Catalog,
    dialect: Box<dyn Dialect>,
    config: CompilerConfig,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: CompilerConfig) -> Self {
        let dialect = dialect_for(config.dialect);
        Self {
            catalog,
            dialect,
            config,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile the tree into one executable query. Any node failure fails
    /// the whole build; there is no partial result.
    pub fn build(
        &self,
        tree: &SchemaTree,
        params: &BuildParams,
    ) -> Result<CompiledQuery, QueryBuilderError> {
        let mut ctx = BuildContext::new();
        let assembler = Assembler {
            catalog: self.catalog,
            dialect: self.dialect.as_ref(),
            config: &self.config,
            tree,
            params,
        };
        let root = assembler.compile(&mut ctx)?;

        if self.config.verbose {
            log::debug!("compiled root query:\n{}", root.body);
        }

        Ok(CompiledQuery {
            sql: root.body,
            columns: root.columns,
        })
    }
}
