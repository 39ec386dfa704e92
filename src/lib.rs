//! docsync - Relational schema tree to nested-JSON query compiler
//!
//! This crate turns a declared schema tree (one root table plus arbitrarily
//! nested child relationships, including many-to-many relationships reached
//! through a junction table) into a single composed SQL query whose result
//! rows are nested JSON documents mirroring the tree. Every row carries a
//! `_keys` identity envelope holding the primary keys of each contributing
//! row, so an incremental change at any depth can be resolved back to the
//! documents it affects.
//!
//! The crate is a compiler only:
//! - catalog metadata arrives through the [`catalog::Catalog`] trait
//! - the tree is built once with [`schema_tree::TreeBuilder`]
//! - [`query_builder::QueryBuilder`] produces a [`query_builder::CompiledQuery`]
//!   that an external execution layer runs
//!
//! Query execution, change capture and document indexing live elsewhere.

pub mod catalog;
pub mod config;
pub mod query_builder;
pub mod schema_tree;

pub use catalog::{Catalog, MemoryCatalog};
pub use config::{CompilerConfig, DialectKind};
pub use query_builder::{BuildParams, CompiledQuery, QueryBuilder, QueryBuilderError, Watermark};
pub use schema_tree::{Cardinality, NodeId, SchemaTree, TreeBuilder, Variant};
