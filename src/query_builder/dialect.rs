//! Dialect strategy.
//!
//! Five JSON construction primitives (object, array, aggregate, cast, merge)
//! plus the handful of dialect properties the compiler consults (identifier
//! quoting, LATERAL support, UUID typing strictness, transaction-id cast).
//! One implementation per target dialect, injected at compiler construction
//! time.

use crate::config::DialectKind;

/// Hard cap on positional arguments the object-constructor function accepts
/// in the wild (100 arguments = 50 key/value pairs). [`build_json_object`]
/// chunks below this and merges the partial objects.
pub const JSON_OBJECT_ARG_CAP: usize = 100;

/// JSON construction primitives and dialect properties.
///
/// `args` to [`Dialect::json_object`] alternate key and value SQL fragments;
/// callers that may exceed the argument cap must go through
/// [`build_json_object`] instead of calling the primitive directly.
pub trait Dialect: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn json_object(&self, args: &[String]) -> String;

    fn json_array(&self, args: &[String]) -> String;

    fn json_agg(&self, expr: &str) -> String;

    /// Cast/annotate an expression as the dialect's JSON type.
    fn json_cast(&self, expr: &str) -> String;

    /// Merge two JSON values (object merge / array append).
    fn json_concat(&self, left: &str, right: &str) -> String;

    /// Whether derived tables may be marked LATERAL and reference columns to
    /// their left.
    fn supports_lateral(&self) -> bool;

    /// Whether the dialect rejects equality between a UUID-typed column and
    /// a non-UUID operand (drives the filter elision rule).
    fn strict_uuid_typing(&self) -> bool;

    fn quote(&self, ident: &str) -> String;

    /// Render the committing-transaction identifier column as a wide integer
    /// for watermark comparison.
    fn tx_id_as_bigint(&self, table: &str, column: &str) -> String;

    /// Whether the dialect exposes a physical row address type (page/offset)
    /// usable for bounded scans.
    fn supports_row_locations(&self) -> bool;
}

/// Strict dialect: JSONB, LATERAL, enforced UUID typing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn json_object(&self, args: &[String]) -> String {
        format!("JSON_BUILD_OBJECT({})", args.join(", "))
    }

    fn json_array(&self, args: &[String]) -> String {
        format!("JSON_BUILD_ARRAY({})", args.join(", "))
    }

    fn json_agg(&self, expr: &str) -> String {
        format!("JSON_AGG({expr})")
    }

    fn json_cast(&self, expr: &str) -> String {
        format!("CAST({expr} AS JSONB)")
    }

    fn json_concat(&self, left: &str, right: &str) -> String {
        format!("({left} || {right})")
    }

    fn supports_lateral(&self) -> bool {
        true
    }

    fn strict_uuid_typing(&self) -> bool {
        true
    }

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn tx_id_as_bigint(&self, table: &str, column: &str) -> String {
        // System columns like xmin only cast to an integer via text.
        format!(
            "CAST(CAST({}.{} AS TEXT) AS BIGINT)",
            self.quote(table),
            self.quote(column)
        )
    }

    fn supports_row_locations(&self) -> bool {
        true
    }
}

/// Permissive dialect: MySQL/MariaDB-compatible JSON functions, no LATERAL
/// marking, loose operand typing.
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlCompat;

impl Dialect for MysqlCompat {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn json_object(&self, args: &[String]) -> String {
        format!("JSON_OBJECT({})", args.join(", "))
    }

    fn json_array(&self, args: &[String]) -> String {
        format!("JSON_ARRAY({})", args.join(", "))
    }

    fn json_agg(&self, expr: &str) -> String {
        format!("JSON_ARRAYAGG(DISTINCT {expr})")
    }

    fn json_cast(&self, expr: &str) -> String {
        // Type annotation only; an explicit CAST trips up JSON_MERGE_PRESERVE.
        expr.to_string()
    }

    fn json_concat(&self, left: &str, right: &str) -> String {
        format!("JSON_MERGE_PRESERVE({left}, {right})")
    }

    fn supports_lateral(&self) -> bool {
        false
    }

    fn strict_uuid_typing(&self) -> bool {
        false
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn tx_id_as_bigint(&self, table: &str, column: &str) -> String {
        format!(
            "CAST({}.{} AS UNSIGNED)",
            self.quote(table),
            self.quote(column)
        )
    }

    fn supports_row_locations(&self) -> bool {
        false
    }
}

pub fn dialect_for(kind: DialectKind) -> Box<dyn Dialect> {
    match kind {
        DialectKind::Postgres => Box::new(Postgres),
        DialectKind::Mysql => Box::new(MysqlCompat),
    }
}

/// Build a JSON object from key/value pairs, chunking below the positional
/// argument cap and merging the partial objects.
///
/// The underlying object-constructor function cannot take more than
/// [`JSON_OBJECT_ARG_CAP`] arguments, so 50 pairs per call is the most a
/// single invocation may carry; anything larger is split and folded together
/// with the merge primitive.
pub fn build_json_object(dialect: &dyn Dialect, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return dialect.json_cast(&dialect.json_object(&[]));
    }

    let pairs_per_chunk = JSON_OBJECT_ARG_CAP / 2;
    let mut expression: Option<String> = None;
    for chunk in pairs.chunks(pairs_per_chunk) {
        let mut args = Vec::with_capacity(chunk.len() * 2);
        for (key, value) in chunk {
            args.push(key.clone());
            args.push(value.clone());
        }
        let piece = dialect.json_cast(&dialect.json_object(&args));
        expression = Some(match expression {
            None => piece,
            Some(acc) => dialect.json_concat(&acc, &piece),
        });
    }
    expression.unwrap_or_default()
}

/// Quote a string literal for embedding in SQL (single quotes doubled).
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
