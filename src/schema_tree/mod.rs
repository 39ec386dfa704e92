//! Schema tree data model.
//!
//! The tree is an arena of [`TableNode`]s addressed by [`NodeId`] indices;
//! parent and child links are stored as indices rather than references, so
//! the back-references never form an ownership cycle. The tree is built once
//! with [`TreeBuilder`] (which resolves column lists and primary keys against
//! the catalog) and is immutable afterwards - compilation never mutates it.

use thiserror::Error;

use crate::catalog::Catalog;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    #[error("Table '{schema}.{table}' not found in catalog")]
    UnknownTable { schema: String, table: String },

    #[error("Column '{column}' not found in table '{schema}.{table}'")]
    UnknownColumn {
        schema: String,
        table: String,
        column: String,
    },

    #[error("Scalar node '{table}' must declare at least one payload column")]
    ScalarWithoutColumn { table: String },

    #[error("Tree has no nodes")]
    Empty,
}

/// Index of a node inside its [`SchemaTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// One-to-one vs one-to-many shape of a child relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

/// Scalar-column vs object payload shape of a node's contribution to its
/// parent document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Scalar,
    Object,
}

/// Relationship descriptor between a node and its parent.
///
/// `throughs` holds the junction-table node for many-to-many traversal;
/// [`TreeBuilder::child_through`] records exactly one per relationship.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub cardinality: Cardinality,
    pub variant: Variant,
    pub throughs: Vec<NodeId>,
}

impl Relationship {
    pub fn new(cardinality: Cardinality, variant: Variant) -> Self {
        Self {
            cardinality,
            variant,
            throughs: Vec::new(),
        }
    }
}

/// One table in the schema tree.
#[derive(Debug, Clone)]
pub struct TableNode {
    pub schema: String,
    pub table: String,
    /// Key used for this node's payload in the parent's JSON output.
    pub label: String,
    /// Payload columns selected into the JSON document.
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    pub relationship: Relationship,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TableNode {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Immutable tree of table nodes; exactly one root, every other node has
/// exactly one parent (guaranteed by construction through [`TreeBuilder`]).
#[derive(Debug, Clone)]
pub struct SchemaTree {
    nodes: Vec<TableNode>,
    root: NodeId,
}

impl SchemaTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TableNode {
        &self.nodes[id.0]
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in post order (children before parents), the order the
    /// compiler visits them. Junction nodes are relationship metadata, not
    /// tree members, and do not appear.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.visit_post(self.root, &mut out);
        out
    }

    fn visit_post(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.node(id).children {
            self.visit_post(child, out);
        }
        out.push(id);
    }
}

/// Declarative description of one node, resolved against the catalog by the
/// builder. Empty `columns` means "all columns of the table"; empty `label`
/// means "use the table name".
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub schema: String,
    pub table: String,
    pub label: String,
    pub columns: Vec<String>,
}

impl NodeSpec {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            label: String::new(),
            columns: Vec::new(),
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Builds a [`SchemaTree`] against a catalog.
///
/// The builder validates that every table exists, that every declared payload
/// column exists, and that scalar nodes carry a payload column. Links are
/// indices into the growing arena, so cycles cannot be expressed.
pub struct TreeBuilder<'a> {
    catalog: &'a dyn Catalog,
    nodes: Vec<TableNode>,
    root: Option<NodeId>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            nodes: Vec::new(),
            root: None,
        }
    }

    /// Add the root node. The root's relationship descriptor is unused
    /// during compilation but kept uniform (one-to-one object).
    pub fn root(&mut self, spec: NodeSpec) -> Result<NodeId, TreeError> {
        let node = self.resolve(
            spec,
            Relationship::new(Cardinality::OneToOne, Variant::Object),
            None,
        )?;
        let id = self.push(node);
        self.root = Some(id);
        Ok(id)
    }

    /// Add a child under `parent` with a direct foreign-key relationship.
    pub fn child(
        &mut self,
        parent: NodeId,
        spec: NodeSpec,
        cardinality: Cardinality,
        variant: Variant,
    ) -> Result<NodeId, TreeError> {
        let node = self.resolve(spec, Relationship::new(cardinality, variant), Some(parent))?;
        let id = self.push(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Add a child reached through a junction table (many-to-many). The
    /// junction node itself is relationship metadata: it gets no payload
    /// columns and never appears among `children`.
    pub fn child_through(
        &mut self,
        parent: NodeId,
        spec: NodeSpec,
        junction: NodeSpec,
        cardinality: Cardinality,
        variant: Variant,
    ) -> Result<NodeId, TreeError> {
        let mut through_node = self.resolve(
            NodeSpec {
                columns: Vec::new(),
                ..junction
            },
            Relationship::new(Cardinality::OneToMany, Variant::Object),
            Some(parent),
        )?;
        // junction rows contribute identity only, never payload
        through_node.columns.clear();
        let through_id = self.push(through_node);

        let mut relationship = Relationship::new(cardinality, variant);
        relationship.throughs.push(through_id);
        let node = self.resolve(spec, relationship, Some(parent))?;
        let id = self.push(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn build(self) -> Result<SchemaTree, TreeError> {
        let root = self.root.ok_or(TreeError::Empty)?;
        Ok(SchemaTree {
            nodes: self.nodes,
            root,
        })
    }

    fn push(&mut self, node: TableNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn resolve(
        &self,
        spec: NodeSpec,
        relationship: Relationship,
        parent: Option<NodeId>,
    ) -> Result<TableNode, TreeError> {
        let meta = self
            .catalog
            .table(&spec.schema, &spec.table)
            .ok_or_else(|| TreeError::UnknownTable {
                schema: spec.schema.clone(),
                table: spec.table.clone(),
            })?;

        let columns = if spec.columns.is_empty() {
            meta.column_names()
        } else {
            for column in &spec.columns {
                if !meta.has_column(column) {
                    return Err(TreeError::UnknownColumn {
                        schema: spec.schema.clone(),
                        table: spec.table.clone(),
                        column: column.clone(),
                    });
                }
            }
            spec.columns.clone()
        };

        if relationship.variant == Variant::Scalar && columns.is_empty() {
            return Err(TreeError::ScalarWithoutColumn {
                table: spec.table.clone(),
            });
        }

        let label = if spec.label.is_empty() {
            spec.table.clone()
        } else {
            spec.label.clone()
        };

        Ok(TableNode {
            schema: spec.schema,
            table: spec.table,
            label,
            columns,
            primary_keys: meta.primary_keys.clone(),
            relationship,
            parent,
            children: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{fk, ColumnType, MemoryCatalog};

    fn catalog() -> MemoryCatalog {
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
        catalog
    }

    #[test]
    fn test_builds_two_level_tree() {
        let catalog = catalog();
        let mut builder = TreeBuilder::new(&catalog);
        let root = builder.root(NodeSpec::new("public", "book")).unwrap();
        let child = builder
            .child(
                root,
                NodeSpec::new("public", "review").columns(&["body"]),
                Cardinality::OneToMany,
                Variant::Object,
            )
            .unwrap();
        let tree = builder.build().unwrap();

        assert_eq!(tree.len(), 2);
        assert!(tree.is_root(root));
        assert_eq!(tree.node(child).parent, Some(root));
        assert_eq!(tree.node(root).children, vec![child]);
        // root columns default to the full catalog column list
        assert_eq!(tree.node(root).columns, vec!["id", "title"]);
        assert_eq!(tree.node(child).label, "review");
        assert_eq!(tree.post_order(), vec![child, root]);
    }

    #[test]
    fn test_unknown_table() {
        let catalog = catalog();
        let mut builder = TreeBuilder::new(&catalog);
        let err = builder.root(NodeSpec::new("public", "missing")).unwrap_err();
        assert!(matches!(err, TreeError::UnknownTable { .. }));
    }

    #[test]
    fn test_unknown_column() {
        let catalog = catalog();
        let mut builder = TreeBuilder::new(&catalog);
        let err = builder
            .root(NodeSpec::new("public", "book").columns(&["nope"]))
            .unwrap_err();
        assert!(matches!(err, TreeError::UnknownColumn { .. }));
    }

    #[test]
    fn test_scalar_requires_column() {
        let catalog = catalog();
        let mut builder = TreeBuilder::new(&catalog);
        let root = builder.root(NodeSpec::new("public", "book")).unwrap();
        // A scalar node with an explicit empty column list cannot happen via
        // NodeSpec (empty means "all columns"), but a table with no columns
        // would trigger it; exercise the label default instead.
        let child = builder
            .child(
                root,
                NodeSpec::new("public", "review")
                    .label("reviews")
                    .columns(&["body"]),
                Cardinality::OneToMany,
                Variant::Scalar,
            )
            .unwrap();
        let tree = builder.build().unwrap();
        assert_eq!(tree.node(child).label, "reviews");
    }

    #[test]
    fn test_child_through_records_one_junction() {
        let mut catalog = catalog();
        catalog.add_table(MemoryCatalog::table(
            "public",
            "book_author",
            &[
                ("id", ColumnType::BigInt),
                ("book_id", ColumnType::BigInt),
                ("author_id", ColumnType::BigInt),
            ],
            &["id"],
            vec![
                fk("book_id", "public", "book", "id"),
                fk("author_id", "public", "author", "id"),
            ],
        ));
        catalog.add_table(MemoryCatalog::table(
            "public",
            "author",
            &[("id", ColumnType::BigInt), ("name", ColumnType::Text)],
            &["id"],
            vec![],
        ));

        let mut builder = TreeBuilder::new(&catalog);
        let root = builder.root(NodeSpec::new("public", "book")).unwrap();
        let author = builder
            .child_through(
                root,
                NodeSpec::new("public", "author"),
                NodeSpec::new("public", "book_author"),
                Cardinality::OneToMany,
                Variant::Object,
            )
            .unwrap();
        let tree = builder.build().unwrap();

        let throughs = &tree.node(author).relationship.throughs;
        assert_eq!(throughs.len(), 1);
        let junction = tree.node(throughs[0]);
        assert_eq!(junction.table, "book_author");
        // junction is relationship metadata: no payload columns, never a child
        assert!(junction.columns.is_empty());
        assert_eq!(tree.node(root).children, vec![author]);
    }

    #[test]
    fn test_empty_tree() {
        let catalog = catalog();
        let builder = TreeBuilder::new(&catalog);
        assert!(matches!(builder.build(), Err(TreeError::Empty)));
    }
}
