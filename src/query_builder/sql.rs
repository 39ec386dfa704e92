//! Minimal SELECT assembly.
//!
//! The compiler renders SQL as text the whole way down; this module holds
//! the one structured piece - a SELECT statement with joins, filters and
//! grouping - and the [`ToSql`] trait that turns it into a string.

/// Render a plan fragment as SQL text.
pub trait ToSql {
    fn to_sql(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct Join {
    /// Rendered join target, e.g. an aliased (possibly LATERAL) derived
    /// table or a plain table reference.
    pub target: String,
    pub on: String,
    pub outer: bool,
}

/// One SELECT statement under assembly. Filters AND together; everything is
/// already-rendered SQL text.
#[derive(Debug, Clone, Default)]
pub struct SelectStatement {
    pub columns: Vec<String>,
    pub from: Option<String>,
    pub joins: Vec<Join>,
    pub filters: Vec<String>,
    pub group_by: Vec<String>,
}

impl SelectStatement {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToSql for SelectStatement {
    fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        sql.push_str(&self.columns.join(", "));

        if let Some(from) = &self.from {
            sql.push_str("\nFROM ");
            sql.push_str(from);
        }

        for join in &self.joins {
            sql.push_str(if join.outer {
                "\nLEFT OUTER JOIN "
            } else {
                "\nJOIN "
            });
            sql.push_str(&join.target);
            sql.push_str(" ON ");
            sql.push_str(&join.on);
        }

        if !self.filters.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&self.filters.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        sql
    }
}

/// Wrap a statement body as an aliased derived table, optionally LATERAL.
pub fn derived_table(body: &str, alias: &str, lateral: bool) -> String {
    let keyword = if lateral { "LATERAL " } else { "" };
    format!("{keyword}(\n{body}\n) AS {alias}")
}
