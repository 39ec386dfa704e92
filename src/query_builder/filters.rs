//! Filter compilation.
//!
//! Three predicate sources attach to nodes before subquery assembly: user
//! filter maps (outer list = OR across row alternatives, inner map = AND
//! across columns, supporting composite keys), the transaction watermark
//! bounds stamped by the change-capture mechanism, and physical row-location
//! sets used to bound a resumable full scan.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::catalog::TableMeta;

use super::dialect::{string_literal, Dialect};
use super::errors::QueryBuilderError;

/// Filter specification: table name -> OR-list of AND-maps.
///
/// ```text
/// {
///   "book": [ {"id": 1, "uid": "001"}, {"id": 2, "uid": "002"} ],
///   "city": [ {"id": 1}, {"id": 2} ]
/// }
/// ```
pub type FilterSpec = HashMap<String, Vec<BTreeMap<String, Value>>>;

/// Transaction-identifier bounds: lower inclusive, upper exclusive. Rows are
/// selected when `txmin <= tx_id < txmax` after casting the stamped column
/// to a wide integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub txmin: Option<u64>,
    pub txmax: Option<u64>,
}

impl Watermark {
    pub fn new(txmin: Option<u64>, txmax: Option<u64>) -> Self {
        Self { txmin, txmax }
    }

    pub fn is_empty(&self) -> bool {
        self.txmin.is_none() && self.txmax.is_none()
    }
}

/// Physical row locations grouped by storage page: page -> row offsets.
pub type RowLocations = BTreeMap<u32, Vec<u32>>;

/// Compile the filter entry for one node into a single boolean predicate,
/// or `None` when the spec has no entry for the table (or every predicate
/// was elided).
///
/// Under a strictly UUID-typed dialect, an equality whose column and literal
/// disagree on UUID-ness is elided rather than emitted - the operator would
/// not exist server-side. This reproduces a deliberate, documented gap in
/// the predicate set, not an optimization. An AND group that loses all of
/// its members drops out of the OR list entirely.
pub fn compile_filters(
    spec: &FilterSpec,
    table: &TableMeta,
    dialect: &dyn Dialect,
) -> Option<String> {
    let alternatives = spec.get(&table.name)?;

    let mut groups: Vec<String> = Vec::new();
    for values in alternatives {
        let mut conjuncts: Vec<String> = Vec::new();
        for (column, value) in values {
            match equality_predicate(table, column, value, dialect) {
                Some(predicate) => conjuncts.push(predicate),
                None => {
                    log::debug!(
                        "eliding UUID-mismatched equality on {}.{}",
                        table.name,
                        column
                    );
                }
            }
        }
        if conjuncts.is_empty() {
            continue;
        }
        groups.push(if conjuncts.len() == 1 {
            conjuncts.remove(0)
        } else {
            format!("({})", conjuncts.join(" AND "))
        });
    }

    match groups.len() {
        0 => None,
        1 => Some(groups.remove(0)),
        _ => Some(format!("({})", groups.join(" OR "))),
    }
}

fn equality_predicate(
    table: &TableMeta,
    column: &str,
    value: &Value,
    dialect: &dyn Dialect,
) -> Option<String> {
    if dialect.strict_uuid_typing() {
        let column_is_uuid = table.is_uuid_column(column);
        let value_is_uuid = matches!(value, Value::String(s) if uuid::Uuid::parse_str(s).is_ok());
        if column_is_uuid != value_is_uuid {
            return None;
        }
    }
    Some(format!(
        "{}.{} = {}",
        dialect.quote(&table.name),
        dialect.quote(column),
        value_literal(value)
    ))
}

/// Render a filter value as an inline SQL literal.
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string_literal(s),
        // arrays/objects arrive as JSON text
        other => string_literal(&other.to_string()),
    }
}

/// Watermark predicates against the committing-transaction column of
/// `table`: lower bound inclusive, upper bound exclusive.
pub fn watermark_predicates(
    dialect: &dyn Dialect,
    table: &str,
    tx_column: &str,
    watermark: &Watermark,
) -> Vec<String> {
    let mut predicates = Vec::new();
    if let Some(txmin) = watermark.txmin {
        predicates.push(format!(
            "{} >= {txmin}",
            dialect.tx_id_as_bigint(table, tx_column)
        ));
    }
    if let Some(txmax) = watermark.txmax {
        predicates.push(format!(
            "{} < {txmax}",
            dialect.tx_id_as_bigint(table, tx_column)
        ));
    }
    predicates
}

/// Bound a scan to a known set of physical rows: one disjunct per storage
/// page, each matching the page's row offsets. Only dialects with a physical
/// row-address type can express this.
pub fn row_location_predicate(
    dialect: &dyn Dialect,
    table: &str,
    locations: &RowLocations,
) -> Result<Option<String>, QueryBuilderError> {
    if locations.is_empty() {
        return Ok(None);
    }
    if !dialect.supports_row_locations() {
        return Err(QueryBuilderError::UnsupportedByDialect {
            dialect: dialect.name(),
            operation: "physical row-location scans".to_string(),
        });
    }

    let mut disjuncts = Vec::with_capacity(locations.len());
    for (page, rows) in locations {
        let values = rows
            .iter()
            .map(|row| format!("({row})"))
            .collect::<Vec<_>>()
            .join(", ");
        disjuncts.push(format!(
            "{}.{} = ANY (ARRAY(SELECT CAST('({page},' || s.i || ')' AS TID) \
             FROM (VALUES {values}) AS s (i)))",
            dialect.quote(table),
            dialect.quote("ctid"),
        ));
    }

    Ok(Some(if disjuncts.len() == 1 {
        disjuncts.remove(0)
    } else {
        format!("({})", disjuncts.join(" OR "))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnType, MemoryCatalog};
    use crate::query_builder::dialect::{MysqlCompat, Postgres};
    use serde_json::json;

    fn book() -> TableMeta {
        MemoryCatalog::table(
            "public",
            "book",
            &[
                ("id", ColumnType::BigInt),
                ("uid", ColumnType::Uuid),
                ("title", ColumnType::Text),
            ],
            &["id"],
            vec![],
        )
    }

    fn spec_for(table: &str, alternatives: Vec<BTreeMap<String, Value>>) -> FilterSpec {
        let mut spec = FilterSpec::new();
        spec.insert(table.to_string(), alternatives);
        spec
    }

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_or_of_ands() {
        let spec = spec_for(
            "book",
            vec![
                row(&[("id", json!(1)), ("title", json!("dune"))]),
                row(&[("id", json!(2))]),
            ],
        );
        let sql = compile_filters(&spec, &book(), &Postgres).unwrap();
        assert_eq!(
            sql,
            "((\"book\".\"id\" = 1 AND \"book\".\"title\" = 'dune') OR \"book\".\"id\" = 2)"
        );
    }

    #[test]
    fn test_no_entry_for_table() {
        let spec = spec_for("city", vec![row(&[("id", json!(1))])]);
        assert!(compile_filters(&spec, &book(), &Postgres).is_none());
    }

    #[test]
    fn test_uuid_mismatch_elided_on_strict_dialect() {
        // uid is UUID-typed but 42 is not UUID-shaped: strict dialect drops
        // the predicate, keeping only the id equality.
        let spec = spec_for("book", vec![row(&[("id", json!(1)), ("uid", json!(42))])]);
        let sql = compile_filters(&spec, &book(), &Postgres).unwrap();
        assert_eq!(sql, "\"book\".\"id\" = 1");

        // the permissive dialect emits it untouched
        let sql = compile_filters(&spec, &book(), &MysqlCompat).unwrap();
        assert!(sql.contains("`book`.`uid` = 42"));
    }

    #[test]
    fn test_uuid_match_kept() {
        let uid = "4f1c4c2e-33a5-4b0a-9a6f-0a7b6d4f5e6a";
        let spec = spec_for("book", vec![row(&[("uid", json!(uid))])]);
        let sql = compile_filters(&spec, &book(), &Postgres).unwrap();
        assert_eq!(sql, format!("\"book\".\"uid\" = '{uid}'"));
    }

    #[test]
    fn test_group_fully_elided_drops_out() {
        let spec = spec_for(
            "book",
            vec![row(&[("uid", json!(42))]), row(&[("id", json!(7))])],
        );
        let sql = compile_filters(&spec, &book(), &Postgres).unwrap();
        assert_eq!(sql, "\"book\".\"id\" = 7");

        let all_elided = spec_for("book", vec![row(&[("uid", json!(42))])]);
        assert!(compile_filters(&all_elided, &book(), &Postgres).is_none());
    }

    #[test]
    fn test_watermark_bounds() {
        let wm = Watermark::new(Some(100), Some(200));
        let predicates = watermark_predicates(&Postgres, "book", "xmin", &wm);
        assert_eq!(
            predicates,
            vec![
                "CAST(CAST(\"book\".\"xmin\" AS TEXT) AS BIGINT) >= 100",
                "CAST(CAST(\"book\".\"xmin\" AS TEXT) AS BIGINT) < 200",
            ]
        );

        let open_ended = Watermark::new(Some(5), None);
        assert_eq!(watermark_predicates(&Postgres, "book", "xmin", &open_ended).len(), 1);
    }

    #[test]
    fn test_row_locations() {
        let mut locations = RowLocations::new();
        locations.insert(0, vec![1, 2]);
        locations.insert(3, vec![7]);
        let sql = row_location_predicate(&Postgres, "book", &locations)
            .unwrap()
            .unwrap();
        assert!(sql.contains("'(0,' || s.i || ')'"));
        assert!(sql.contains("(VALUES (1), (2))"));
        assert!(sql.contains("'(3,' || s.i || ')'"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn test_row_locations_unsupported_dialect() {
        let mut locations = RowLocations::new();
        locations.insert(0, vec![1]);
        let err = row_location_predicate(&MysqlCompat, "book", &locations).unwrap_err();
        assert!(matches!(err, QueryBuilderError::UnsupportedByDialect { .. }));
    }

    #[test]
    fn test_value_literals() {
        assert_eq!(value_literal(&json!(null)), "NULL");
        assert_eq!(value_literal(&json!(true)), "TRUE");
        assert_eq!(value_literal(&json!(1.5)), "1.5");
        assert_eq!(value_literal(&json!("o'brien")), "'o''brien'");
    }
}
