//! Recursive, bottom-up subquery assembly.
//!
//! Children compile before parents (strict post order). Each non-root node
//! becomes an aliased derived table exposing three things: its `_keys`
//! identity envelope, its payload column (named by the node label), and the
//! foreign-key columns its parent correlates on. The root assembles every
//! direct child into the final, non-correlated query.
//!
//! Two invariants are enforced rather than worked around:
//! - a foreign-key column-count mismatch between a node and its parent fails
//!   the build instead of dropping the correlating predicate (an omitted
//!   predicate would return an unbounded scan)
//! - an empty join-predicate set fails the build instead of emitting a
//!   cross join

use crate::catalog::{Catalog, TableMeta};
use crate::config::CompilerConfig;
use crate::schema_tree::{Cardinality, NodeId, SchemaTree, TableNode, Variant};

use super::dialect::{build_json_object, string_literal, Dialect};
use super::errors::QueryBuilderError;
use super::filters::{
    compile_filters, row_location_predicate, watermark_predicates,
};
use super::fk_resolver::{select_relevant_columns, FkResolver};
use super::sql::{derived_table, Join, SelectStatement, ToSql};
use super::BuildParams;

/// Per-build mutable state: the foreign-key cache lives exactly as long as
/// one `build()` call and assumes the catalog is immutable for its duration.
#[derive(Debug, Default)]
pub(crate) struct BuildContext {
    pub resolver: FkResolver,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Immutable result of compiling one node.
#[derive(Debug, Clone)]
pub(crate) struct CompiledSubquery {
    pub alias: String,
    pub body: String,
    /// Output column names of the derived table, `_keys` first.
    pub columns: Vec<String>,
    pub lateral: bool,
}

impl CompiledSubquery {
    fn rendered(&self, dialect: &dyn Dialect) -> String {
        derived_table(&self.body, &dialect.quote(&self.alias), self.lateral)
    }

    fn column_ref(&self, dialect: &dyn Dialect, column: &str) -> String {
        format!("{}.{}", dialect.quote(&self.alias), dialect.quote(column))
    }
}

/// One tree build. Holds the immutable collaborators; mutable state lives in
/// the [`BuildContext`] threaded through each call.
pub(crate) struct Assembler<'a> {
    pub catalog: &'a dyn Catalog,
    pub dialect: &'a dyn Dialect,
    pub config: &'a CompilerConfig,
    pub tree: &'a SchemaTree,
    pub params: &'a BuildParams,
}

impl Assembler<'_> {
    pub fn compile(&self, ctx: &mut BuildContext) -> Result<CompiledSubquery, QueryBuilderError> {
        self.compile_node(ctx, self.tree.root())
    }

    fn compile_node(
        &self,
        ctx: &mut BuildContext,
        id: NodeId,
    ) -> Result<CompiledSubquery, QueryBuilderError> {
        let node = self.tree.node(id);

        let mut children = Vec::with_capacity(node.children.len());
        for &child_id in &node.children {
            children.push((child_id, self.compile_node(ctx, child_id)?));
        }

        let compiled = match node.parent {
            None => self.compile_root(ctx, id, &children)?,
            Some(parent_id) if node.relationship.throughs.is_empty() => {
                self.compile_direct(ctx, id, parent_id, &children)?
            }
            Some(parent_id) => self.compile_through(ctx, id, parent_id, &children)?,
        };

        if self.config.verbose {
            log::debug!("compiled subquery for {}:\n{}", node.table, compiled.body);
        }
        Ok(compiled)
    }

    /// Terminal, non-correlated query: the concatenation of every direct
    /// child's identity envelope, the document payload object, and the
    /// root's primary keys, bounded by the watermark / row-location / user
    /// filter predicates.
    fn compile_root(
        &self,
        ctx: &mut BuildContext,
        id: NodeId,
        children: &[(NodeId, CompiledSubquery)],
    ) -> Result<CompiledSubquery, QueryBuilderError> {
        let node = self.tree.node(id);
        let meta = self.table_meta(id)?;
        let d = self.dialect;

        let mut stmt = SelectStatement::new();
        stmt.from = Some(self.table_ref(node));

        for (child_id, child_sub) in children {
            let on = self.plan_child_join(ctx, id, *child_id, child_sub)?;
            stmt.joins.push(Join {
                target: child_sub.rendered(d),
                on,
                outer: self.config.outer_joins,
            });
        }

        let mut keys = d.json_cast(&d.json_object(&[
            string_literal(&node.table),
            self.primary_key_snapshot(node),
        ]));
        for (_, child_sub) in children {
            keys = d.json_concat(&keys, &d.json_cast(&child_sub.column_ref(d, "_keys")));
        }
        stmt.columns.push(format!("{} AS {}", keys, d.quote("_keys")));

        let mut pairs = self.payload_pairs(node);
        for (child_id, child_sub) in children {
            let child = self.tree.node(*child_id);
            pairs.push((
                string_literal(&child.label),
                child_sub.column_ref(d, &child.label),
            ));
        }
        stmt.columns.push(format!(
            "{} AS {}",
            build_json_object(d, &pairs),
            d.quote("_doc")
        ));

        let mut exposed = vec!["_keys".to_string(), "_doc".to_string()];
        for pk in &node.primary_keys {
            stmt.columns
                .push(format!("{} AS {}", self.col(&node.table, pk), d.quote(pk)));
            exposed.push(pk.clone());
        }

        if let Some(predicate) = compile_filters(&self.params.filters, meta, d) {
            stmt.filters.push(predicate);
        }
        stmt.filters.extend(watermark_predicates(
            d,
            &node.table,
            &self.config.tx_column,
            &self.params.watermark,
        ));
        if let Some(predicate) =
            row_location_predicate(d, &node.table, &self.params.locations)?
        {
            stmt.filters.push(predicate);
        }

        Ok(CompiledSubquery {
            alias: format!("{}_{}", node.table, id.0),
            body: stmt.to_sql(),
            columns: exposed,
            lateral: false,
        })
    }

    /// Direct foreign-key node: joins its own children, aggregates its
    /// payload per cardinality, and filters itself against the parent via
    /// its foreign-key columns.
    fn compile_direct(
        &self,
        ctx: &mut BuildContext,
        id: NodeId,
        parent_id: NodeId,
        children: &[(NodeId, CompiledSubquery)],
    ) -> Result<CompiledSubquery, QueryBuilderError> {
        let node = self.tree.node(id);
        let parent = self.tree.node(parent_id);
        let meta = self.table_meta(id)?;
        let parent_meta = self.table_meta(parent_id)?;
        let d = self.dialect;

        let mut stmt = SelectStatement::new();
        stmt.from = Some(self.table_ref(node));

        for (child_id, child_sub) in children {
            let on = self.plan_child_join(ctx, id, *child_id, child_sub)?;
            stmt.joins.push(Join {
                target: child_sub.rendered(d),
                on,
                outer: self.config.outer_joins,
            });
        }

        let fk_map = ctx.resolver.resolve(self.catalog, self.tree, parent_id, id)?;
        let fk_cols = select_relevant_columns(
            &meta.column_names(),
            &fk_map,
            Some(&node.table),
            Some(&node.schema),
        );
        let parent_fk_cols = select_relevant_columns(
            &parent_meta.column_names(),
            &fk_map,
            Some(&parent.table),
            Some(&parent.schema),
        );
        if fk_cols.len() != parent_fk_cols.len() {
            return Err(QueryBuilderError::ForeignKeyCountMismatch {
                node: node.qualified_name(),
                parent: parent.qualified_name(),
                node_count: fk_cols.len(),
                parent_count: parent_fk_cols.len(),
            });
        }
        if fk_cols.is_empty() {
            return Err(QueryBuilderError::EmptyJoinPredicate {
                child: node.qualified_name(),
                parent: parent.qualified_name(),
            });
        }

        // Correlation travels with the derived table: under a
        // LATERAL-capable dialect the predicates go into this node's own
        // WHERE, referencing the parent table to its left. Skipped for
        // self-referential nodes, where the unaliased inner reference would
        // collapse to a tautology; there the OR-combined ON clause carries
        // the correlation.
        let self_referential = node.table == parent.table && node.schema == parent.schema;
        if d.supports_lateral() && !self_referential {
            for (own, theirs) in fk_cols.iter().zip(&parent_fk_cols) {
                stmt.filters.push(format!(
                    "{} = {}",
                    self.col(&node.table, own),
                    self.col(&parent.table, theirs)
                ));
            }
        }

        if let Some(predicate) = compile_filters(&self.params.filters, meta, d) {
            stmt.filters.push(predicate);
        }

        // _keys: pk snapshot merged with every child envelope, aggregated
        // when this node is one-to-many (the parent then sees one
        // already-arrayed envelope per correlated key).
        let mut value = d.json_cast(&self.primary_key_snapshot(node));
        for (_, child_sub) in children {
            value = d.json_concat(&value, &d.json_cast(&child_sub.column_ref(d, "_keys")));
        }
        let keyed = match node.relationship.cardinality {
            Cardinality::OneToMany => {
                d.json_object(&[string_literal(&node.table), d.json_agg(&value)])
            }
            Cardinality::OneToOne => d.json_object(&[string_literal(&node.table), value]),
        };
        stmt.columns
            .push(format!("{} AS {}", d.json_cast(&keyed), d.quote("_keys")));

        let payload = self.payload_expr(node, children);
        stmt.columns
            .push(format!("{} AS {}", payload, d.quote(&node.label)));

        let mut exposed = vec!["_keys".to_string(), node.label.clone()];
        for column in &fk_cols {
            stmt.columns.push(format!(
                "{} AS {}",
                self.col(&node.table, column),
                d.quote(column)
            ));
            exposed.push(column.clone());
        }

        if node.relationship.cardinality == Cardinality::OneToMany {
            stmt.group_by = fk_cols
                .iter()
                .map(|column| self.col(&node.table, column))
                .collect();
        }

        Ok(CompiledSubquery {
            alias: format!("{}_{}", node.table, id.0),
            body: stmt.to_sql(),
            columns: exposed,
            lateral: d.supports_lateral(),
        })
    }

    /// Many-to-many node reached through a junction table: two-stage
    /// compile. Stage 1 joins the node to its own children and emits one
    /// row per matched combination; stage 2 joins that to the junction
    /// table, grouping by the junction's parent-facing foreign keys and
    /// JSON-aggregating stage-1 payloads and envelopes.
    fn compile_through(
        &self,
        ctx: &mut BuildContext,
        id: NodeId,
        parent_id: NodeId,
        children: &[(NodeId, CompiledSubquery)],
    ) -> Result<CompiledSubquery, QueryBuilderError> {
        let node = self.tree.node(id);
        let parent = self.tree.node(parent_id);
        let through_id = node.relationship.throughs[0];
        let through = self.tree.node(through_id);
        let meta = self.table_meta(id)?;
        let through_meta = self.table_meta(through_id)?;
        let parent_meta = self.table_meta(parent_id)?;
        let d = self.dialect;

        // junction <-> node pairs, extended (on already-present tables) with
        // the junction <-> parent pairs
        let base = ctx
            .resolver
            .resolve(self.catalog, self.tree, through_id, id)?;
        let mut combined = base.clone();
        combined.merge_existing(&ctx.resolver.resolve(
            self.catalog,
            self.tree,
            through_id,
            parent_id,
        )?);

        let fk_cols = select_relevant_columns(
            &meta.column_names(),
            &combined,
            Some(&node.table),
            Some(&node.schema),
        );
        let junction_node_cols = select_relevant_columns(
            &through_meta.column_names(),
            &base,
            Some(&through.table),
            Some(&through.schema),
        );
        if fk_cols.len() != junction_node_cols.len() {
            return Err(QueryBuilderError::ForeignKeyCountMismatch {
                node: node.qualified_name(),
                parent: through.qualified_name(),
                node_count: fk_cols.len(),
                parent_count: junction_node_cols.len(),
            });
        }
        if fk_cols.is_empty() {
            return Err(QueryBuilderError::EmptyJoinPredicate {
                child: node.qualified_name(),
                parent: through.qualified_name(),
            });
        }

        // ---- stage 1: the node joined to its own children ----
        let mut stage1 = SelectStatement::new();
        stage1.from = Some(self.table_ref(node));
        for (child_id, child_sub) in children {
            let on = self.plan_child_join(ctx, id, *child_id, child_sub)?;
            stage1.joins.push(Join {
                target: child_sub.rendered(d),
                on,
                outer: self.config.outer_joins,
            });
        }

        let mut value = d.json_cast(&self.primary_key_snapshot(node));
        for (_, child_sub) in children {
            value = d.json_concat(&value, &d.json_cast(&child_sub.column_ref(d, "_keys")));
        }
        stage1
            .columns
            .push(format!("{} AS {}", value, d.quote("_keys")));

        let payload = match node.relationship.variant {
            // builder guarantees a payload column for scalar nodes
            Variant::Scalar => self.col(
                &node.table,
                node.columns.first().map(String::as_str).unwrap_or_default(),
            ),
            Variant::Object => {
                let mut pairs = self.payload_pairs(node);
                for (child_id, child_sub) in children {
                    let child = self.tree.node(*child_id);
                    pairs.push((
                        string_literal(&child.label),
                        child_sub.column_ref(d, &child.label),
                    ));
                }
                build_json_object(d, &pairs)
            }
        };
        stage1
            .columns
            .push(format!("{} AS {}", payload, d.quote("_payload")));

        let mut stage1_exposed = vec!["_keys".to_string(), "_payload".to_string()];
        for column in &fk_cols {
            stage1.columns.push(format!(
                "{} AS {}",
                self.col(&node.table, column),
                d.quote(column)
            ));
            stage1_exposed.push(column.clone());
        }

        if d.supports_lateral() {
            for (own, theirs) in fk_cols.iter().zip(&junction_node_cols) {
                stage1.filters.push(format!(
                    "{} = {}",
                    self.col(&node.table, own),
                    self.col(&through.table, theirs)
                ));
            }
        }
        if let Some(predicate) = compile_filters(&self.params.filters, meta, d) {
            stage1.filters.push(predicate);
        }

        let stage1_sub = CompiledSubquery {
            alias: format!("{}_rows_{}", node.table, id.0),
            body: stage1.to_sql(),
            columns: stage1_exposed,
            lateral: d.supports_lateral(),
        };

        // ---- stage 2: junction table grouped toward the parent ----
        let mut stage2 = SelectStatement::new();
        stage2.from = Some(self.table_ref(through));

        let mut on_predicates = Vec::with_capacity(fk_cols.len());
        for (own, theirs) in fk_cols.iter().zip(&junction_node_cols) {
            on_predicates.push(format!(
                "{} = {}",
                stage1_sub.column_ref(d, own),
                self.col(&through.table, theirs)
            ));
        }
        let self_referential = node.table == parent.table && node.schema == parent.schema;
        stage2.joins.push(Join {
            target: stage1_sub.rendered(d),
            on: combine_predicates(on_predicates, self_referential),
            outer: self.config.outer_joins,
        });

        // every aggregated element carries the junction row's own identity
        let mut junction_snapshot_items = Vec::with_capacity(through_meta.primary_keys.len());
        for pk in &through_meta.primary_keys {
            junction_snapshot_items.push(d.json_object(&[
                string_literal(pk),
                d.json_array(&[self.col(&through.table, pk)]),
            ]));
        }
        let through_keys = d.json_cast(&d.json_object(&[
            string_literal(&through.table),
            d.json_array(&junction_snapshot_items),
        ]));
        let entry = d.json_concat(
            &d.json_cast(&stage1_sub.column_ref(d, "_keys")),
            &through_keys,
        );
        let keyed = d.json_object(&[string_literal(&node.table), d.json_agg(&entry)]);
        stage2
            .columns
            .push(format!("{} AS {}", d.json_cast(&keyed), d.quote("_keys")));
        stage2.columns.push(format!(
            "{} AS {}",
            d.json_agg(&stage1_sub.column_ref(d, "_payload")),
            d.quote(&node.label)
        ));

        let parent_fk_map =
            ctx.resolver
                .resolve(self.catalog, self.tree, parent_id, through_id)?;
        let junction_parent_cols = select_relevant_columns(
            &through_meta.column_names(),
            &parent_fk_map,
            Some(&through.table),
            Some(&through.schema),
        );
        let parent_side_cols = select_relevant_columns(
            &parent_meta.column_names(),
            &parent_fk_map,
            Some(&parent.table),
            Some(&parent.schema),
        );
        if junction_parent_cols.len() != parent_side_cols.len() {
            return Err(QueryBuilderError::ForeignKeyCountMismatch {
                node: through.qualified_name(),
                parent: parent.qualified_name(),
                node_count: junction_parent_cols.len(),
                parent_count: parent_side_cols.len(),
            });
        }
        if junction_parent_cols.is_empty() {
            return Err(QueryBuilderError::EmptyJoinPredicate {
                child: through.qualified_name(),
                parent: parent.qualified_name(),
            });
        }

        let mut exposed = vec!["_keys".to_string(), node.label.clone()];
        for column in &junction_parent_cols {
            stage2.columns.push(format!(
                "{} AS {}",
                self.col(&through.table, column),
                d.quote(column)
            ));
            stage2.group_by.push(self.col(&through.table, column));
            exposed.push(column.clone());
        }

        if d.supports_lateral() && !self_referential {
            for (own, theirs) in junction_parent_cols.iter().zip(&parent_side_cols) {
                stage2.filters.push(format!(
                    "{} = {}",
                    self.col(&through.table, own),
                    self.col(&parent.table, theirs)
                ));
            }
        }

        Ok(CompiledSubquery {
            alias: format!("{}_{}", node.table, id.0),
            body: stage2.to_sql(),
            columns: exposed,
            lateral: d.supports_lateral(),
        })
    }

    /// Determine the correlating column pairs between a compiled child and
    /// its parent and build the join ON clause. Junction-reached children
    /// correlate on the junction's foreign keys; everything else resolves
    /// directly. Never returns an empty clause.
    fn plan_child_join(
        &self,
        ctx: &mut BuildContext,
        parent_id: NodeId,
        child_id: NodeId,
        child_sub: &CompiledSubquery,
    ) -> Result<String, QueryBuilderError> {
        let parent = self.tree.node(parent_id);
        let child = self.tree.node(child_id);
        let parent_meta = self.table_meta(parent_id)?;
        let d = self.dialect;

        let (left, right) = match child.relationship.throughs.first() {
            Some(&through_id) => {
                let through = self.tree.node(through_id);
                let fk_map =
                    ctx.resolver
                        .resolve(self.catalog, self.tree, parent_id, through_id)?;
                let left = select_relevant_columns(
                    &child_sub.columns,
                    &fk_map,
                    Some(&through.table),
                    Some(&through.schema),
                );
                let right =
                    select_relevant_columns(&parent_meta.column_names(), &fk_map, None, None);
                (left, right)
            }
            None => {
                let fk_map = ctx
                    .resolver
                    .resolve(self.catalog, self.tree, parent_id, child_id)?;
                let left = select_relevant_columns(&child_sub.columns, &fk_map, None, None);
                let right =
                    select_relevant_columns(&parent_meta.column_names(), &fk_map, None, None);
                (left, right)
            }
        };

        if left.len() != right.len() {
            return Err(QueryBuilderError::ForeignKeyCountMismatch {
                node: child.qualified_name(),
                parent: parent.qualified_name(),
                node_count: left.len(),
                parent_count: right.len(),
            });
        }
        if left.is_empty() {
            return Err(QueryBuilderError::EmptyJoinPredicate {
                child: child.qualified_name(),
                parent: parent.qualified_name(),
            });
        }

        let predicates = left
            .iter()
            .zip(&right)
            .map(|(l, r)| {
                format!(
                    "{} = {}",
                    child_sub.column_ref(d, l),
                    self.col(&parent.table, r)
                )
            })
            .collect();

        let self_referential = child.table == parent.table && child.schema == parent.schema;
        Ok(combine_predicates(predicates, self_referential))
    }

    fn table_meta(&self, id: NodeId) -> Result<&TableMeta, QueryBuilderError> {
        let node = self.tree.node(id);
        self.catalog
            .table(&node.schema, &node.table)
            .ok_or_else(|| QueryBuilderError::unknown_table(&node.schema, &node.table))
    }

    fn table_ref(&self, node: &TableNode) -> String {
        format!(
            "{}.{}",
            self.dialect.quote(&node.schema),
            self.dialect.quote(&node.table)
        )
    }

    fn col(&self, table: &str, column: &str) -> String {
        format!(
            "{}.{}",
            self.dialect.quote(table),
            self.dialect.quote(column)
        )
    }

    /// JSON object of the node's primary keys, each value array-wrapped:
    /// `{"id": [1]}`.
    fn primary_key_snapshot(&self, node: &TableNode) -> String {
        let d = self.dialect;
        let mut args = Vec::with_capacity(node.primary_keys.len() * 2);
        for pk in &node.primary_keys {
            args.push(string_literal(pk));
            args.push(d.json_array(&[self.col(&node.table, pk)]));
        }
        d.json_object(&args)
    }

    fn payload_pairs(&self, node: &TableNode) -> Vec<(String, String)> {
        node.columns
            .iter()
            .map(|column| (string_literal(column), self.col(&node.table, column)))
            .collect()
    }

    /// Payload for a direct node, shaped by variant and cardinality:
    /// scalar column vs object, single row vs JSON-aggregated array.
    fn payload_expr(
        &self,
        node: &TableNode,
        children: &[(NodeId, CompiledSubquery)],
    ) -> String {
        let d = self.dialect;
        let expr = match node.relationship.variant {
            // builder guarantees a payload column for scalar nodes
            Variant::Scalar => self.col(
                &node.table,
                node.columns.first().map(String::as_str).unwrap_or_default(),
            ),
            Variant::Object => {
                let mut pairs = self.payload_pairs(node);
                for (child_id, child_sub) in children {
                    let child = self.tree.node(*child_id);
                    pairs.push((
                        string_literal(&child.label),
                        child_sub.column_ref(d, &child.label),
                    ));
                }
                build_json_object(d, &pairs)
            }
        };
        match node.relationship.cardinality {
            Cardinality::OneToMany => d.json_agg(&expr),
            Cardinality::OneToOne => expr,
        }
    }
}

/// AND-combine join predicates, except for self-referential relationships
/// (child and parent over the same table), which combine with OR.
pub(crate) fn combine_predicates(predicates: Vec<String>, self_referential: bool) -> String {
    let separator = if self_referential { " OR " } else { " AND " };
    predicates.join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_predicates() {
        let predicates = vec!["a = b".to_string(), "c = d".to_string()];
        assert_eq!(combine_predicates(predicates.clone(), false), "a = b AND c = d");
        assert_eq!(combine_predicates(predicates, true), "a = b OR c = d");
    }
}
