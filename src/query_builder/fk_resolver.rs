//! Catalog-driven foreign-key inference.
//!
//! [`FkResolver::resolve`] inspects declared constraints in both directions
//! between two tables and produces a [`ForeignKeyMap`]: for any resolved
//! pair, the i-th column under one table's key corresponds positionally to
//! the i-th column under the other's. That positional correspondence is the
//! load-bearing invariant every join predicate is built on. Results are
//! cached per build, keyed by the unordered node pair.

use std::collections::HashMap;

use crate::catalog::{Catalog, TableMeta};
use crate::schema_tree::{NodeId, SchemaTree};

use super::errors::QueryBuilderError;

/// Mapping from schema-qualified table name to an ordered column sequence.
///
/// Backed by a vector rather than a hash map because both orders matter:
/// columns pair positionally across entries, and the table-omitted scan in
/// [`select_relevant_columns`] returns the first subset match in first-seen
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeignKeyMap {
    entries: Vec<(String, Vec<String>)>,
}

impl ForeignKeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `column` under `table`, deduplicating per table and keeping
    /// first-seen order.
    pub fn add(&mut self, table: &str, column: &str) {
        if let Some((_, columns)) = self.entries.iter_mut().find(|(t, _)| t == table) {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        } else {
            self.entries
                .push((table.to_string(), vec![column.to_string()]));
        }
    }

    pub fn get(&self, table: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, columns)| columns.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(t, c)| (t.as_str(), c.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Extend already-present table keys with `other`'s columns, uniquely,
    /// preserving order. Tables absent from `self` are ignored - this is the
    /// merge the through strategy performs between the junction's two maps.
    pub fn merge_existing(&mut self, other: &ForeignKeyMap) {
        for (table, columns) in &other.entries {
            if let Some((_, dst)) = self.entries.iter_mut().find(|(t, _)| t == table) {
                for column in columns {
                    if !dst.iter().any(|c| c == column) {
                        dst.push(column.clone());
                    }
                }
            }
        }
    }
}

/// Per-build foreign-key cache. One resolver per build; the catalog is
/// assumed immutable for its lifetime.
#[derive(Debug, Default)]
pub struct FkResolver {
    cache: HashMap<(NodeId, NodeId), ForeignKeyMap>,
}

impl FkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve all foreign-key column pairs between the tables of two nodes,
    /// in both directions, first-seen order, deduplicated. `resolve(a, b)`
    /// and `resolve(b, a)` share one cache entry.
    pub fn resolve(
        &mut self,
        catalog: &dyn Catalog,
        tree: &SchemaTree,
        a: NodeId,
        b: NodeId,
    ) -> Result<ForeignKeyMap, QueryBuilderError> {
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let node_a = tree.node(a);
        let node_b = tree.node(b);
        let table_a = lookup(catalog, &node_a.schema, &node_a.table)?;
        let table_b = lookup(catalog, &node_b.schema, &node_b.table)?;

        let mut map = ForeignKeyMap::new();
        collect_constraints(&mut map, table_a, table_b);
        collect_constraints(&mut map, table_b, table_a);

        if map.is_empty() {
            return Err(QueryBuilderError::MissingForeignKey {
                left: table_a.qualified_name(),
                right: table_b.qualified_name(),
            });
        }

        self.cache.insert(key, map.clone());
        Ok(map)
    }
}

fn lookup<'a>(
    catalog: &'a dyn Catalog,
    schema: &str,
    table: &str,
) -> Result<&'a TableMeta, QueryBuilderError> {
    catalog
        .table(schema, table)
        .ok_or_else(|| QueryBuilderError::unknown_table(schema, table))
}

/// Accumulate `owner`'s constraints pointing at `target` under both tables'
/// qualified names.
fn collect_constraints(map: &mut ForeignKeyMap, owner: &TableMeta, target: &TableMeta) {
    for constraint in &owner.foreign_keys {
        if constraint.referred_schema == target.schema && constraint.referred_table == target.name {
            map.add(&owner.qualified_name(), &constraint.column);
            map.add(&target.qualified_name(), &constraint.referred_column);
        }
    }
}

/// Given the columns actually present in a derived table, pick out the ones
/// that are foreign-key columns relating to a specific other table.
///
/// With `table` given, intersect the candidates with that table's entry; a
/// missing key or empty intersection yields an empty sequence, never an
/// error - callers treat "no correlation available" as significant on its
/// own. With `table` omitted, scan entries in first-seen order and return
/// the first whose full column set is a subset of the candidates. That scan
/// is ambiguous when several tables' column sets qualify under overlapping
/// column names; callers that know the table should pass it.
pub fn select_relevant_columns(
    candidates: &[String],
    fk_map: &ForeignKeyMap,
    table: Option<&str>,
    schema: Option<&str>,
) -> Vec<String> {
    match table {
        Some(table) => {
            let qualified = match schema {
                Some(schema) if !table.starts_with(&format!("{schema}.")) => {
                    format!("{schema}.{table}")
                }
                _ => table.to_string(),
            };
            match fk_map.get(&qualified) {
                Some(columns) => columns
                    .iter()
                    .filter(|c| candidates.contains(c))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        }
        None => {
            for (_, columns) in fk_map.iter() {
                if columns.iter().all(|c| candidates.contains(c)) {
                    return columns.to_vec();
                }
            }
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{fk, ColumnType, MemoryCatalog};
    use crate::schema_tree::{Cardinality, NodeSpec, TreeBuilder, Variant};

    fn fixture() -> (MemoryCatalog, SchemaTree, NodeId, NodeId) {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(MemoryCatalog::table(
            "public",
            "book",
            &[("id", ColumnType::BigInt), ("title", ColumnType::Text)],
            &["id"],
            vec![],
        ));
        catalog.add_table(MemoryCatalog::table(
            "public",
            "review",
            &[
                ("id", ColumnType::BigInt),
                ("book_id", ColumnType::BigInt),
                ("body", ColumnType::Text),
            ],
            &["id"],
            vec![fk("book_id", "public", "book", "id")],
        ));
        let mut builder = TreeBuilder::new(&catalog);
        let root = builder.root(NodeSpec::new("public", "book")).unwrap();
        let child = builder
            .child(
                root,
                NodeSpec::new("public", "review"),
                Cardinality::OneToMany,
                Variant::Object,
            )
            .unwrap();
        let tree = builder.build().unwrap();
        (catalog, tree, root, child)
    }

    #[test]
    fn test_resolve_is_symmetric() {
        let (catalog, tree, root, child) = fixture();
        let mut resolver = FkResolver::new();
        let forward = resolver.resolve(&catalog, &tree, root, child).unwrap();
        let backward = resolver.resolve(&catalog, &tree, child, root).unwrap();
        assert_eq!(forward, backward);

        let review_cols = forward.get("public.review").unwrap();
        let book_cols = forward.get("public.book").unwrap();
        assert_eq!(review_cols.len(), book_cols.len());
        // positional correspondence: review.book_id pairs with book.id
        assert_eq!(review_cols[0], "book_id");
        assert_eq!(book_cols[0], "id");
    }

    #[test]
    fn test_resolve_missing_relationship() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(MemoryCatalog::table(
            "public",
            "book",
            &[("id", ColumnType::BigInt)],
            &["id"],
            vec![],
        ));
        catalog.add_table(MemoryCatalog::table(
            "public",
            "city",
            &[("id", ColumnType::BigInt)],
            &["id"],
            vec![],
        ));
        let mut builder = TreeBuilder::new(&catalog);
        let root = builder.root(NodeSpec::new("public", "book")).unwrap();
        let child = builder
            .child(
                root,
                NodeSpec::new("public", "city"),
                Cardinality::OneToOne,
                Variant::Object,
            )
            .unwrap();
        let tree = builder.build().unwrap();

        let mut resolver = FkResolver::new();
        let err = resolver.resolve(&catalog, &tree, root, child).unwrap_err();
        assert!(matches!(err, QueryBuilderError::MissingForeignKey { .. }));
    }

    #[test]
    fn test_dedup_and_order() {
        let mut map = ForeignKeyMap::new();
        map.add("public.a", "x");
        map.add("public.a", "y");
        map.add("public.a", "x");
        map.add("public.b", "z");
        assert_eq!(map.get("public.a").unwrap(), ["x", "y"]);
        let tables: Vec<&str> = map.iter().map(|(t, _)| t).collect();
        assert_eq!(tables, ["public.a", "public.b"]);
    }

    #[test]
    fn test_merge_existing_only() {
        let mut base = ForeignKeyMap::new();
        base.add("public.a", "x");
        let mut other = ForeignKeyMap::new();
        other.add("public.a", "y");
        other.add("public.c", "w");
        base.merge_existing(&other);
        assert_eq!(base.get("public.a").unwrap(), ["x", "y"]);
        assert!(base.get("public.c").is_none());
    }

    #[test]
    fn test_select_with_table() {
        let mut map = ForeignKeyMap::new();
        map.add("public.review", "book_id");
        map.add("public.book", "id");

        let candidates = vec!["_keys".to_string(), "book_id".to_string()];
        let cols = select_relevant_columns(&candidates, &map, Some("review"), Some("public"));
        assert_eq!(cols, ["book_id"]);

        // missing table key or no intersection: empty, never an error
        assert!(select_relevant_columns(&candidates, &map, Some("other"), Some("public")).is_empty());
        let unrelated = vec!["_keys".to_string()];
        assert!(select_relevant_columns(&unrelated, &map, Some("review"), Some("public")).is_empty());
    }

    #[test]
    fn test_select_auto_detect_first_subset() {
        let mut map = ForeignKeyMap::new();
        map.add("public.a", "col_a");
        map.add("public.a", "col_b");
        map.add("public.b", "col_x");

        let candidates = vec!["col_a".to_string(), "col_b".to_string()];
        let cols = select_relevant_columns(&candidates, &map, None, None);
        assert_eq!(cols, ["col_a", "col_b"]);

        // both qualify: the first-seen entry wins deterministically
        let wide = vec![
            "col_a".to_string(),
            "col_b".to_string(),
            "col_x".to_string(),
        ];
        assert_eq!(select_relevant_columns(&wide, &map, None, None), ["col_a", "col_b"]);
    }

    #[test]
    fn test_cache_shares_unordered_pair() {
        let (catalog, tree, root, child) = fixture();
        let mut resolver = FkResolver::new();
        resolver.resolve(&catalog, &tree, root, child).unwrap();
        resolver.resolve(&catalog, &tree, child, root).unwrap();
        assert_eq!(resolver.cache.len(), 1);
    }
}
