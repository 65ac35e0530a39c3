//! Translation of record queries into SQL over the JSON `data` column.
//!
//! Every field expression is wrapped in `COALESCE(json_type(...), 'null')`
//! so that a missing field behaves exactly like an explicit JSON `null`, and
//! no predicate ever evaluates to SQL `NULL`. That keeps `NOT (...)` sound for
//! inequality and matches [`values_equal`](crate::types::values_equal).

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::error::TombstoneResult;
use crate::types::{Aggregate, Condition, RecordQuery, SortDirection, StoredRecord};

/// A SQL fragment and its positional parameters, in text order.
#[derive(Debug, Default)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

fn json_path(field: &str) -> SqlValue {
    SqlValue::Text(format!("$.\"{}\"", field.replace('"', "\\\"")))
}

fn number_param(n: &serde_json::Number) -> SqlValue {
    match n.as_i64() {
        Some(i) => SqlValue::Integer(i),
        None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Null-safe equality between a field and a JSON value.
fn equals(field: &str, value: &Value, params: &mut Vec<SqlValue>) -> String {
    let kind = "COALESCE(json_type(data, ?), 'null')";
    params.push(json_path(field));
    match value {
        Value::Null => format!("{kind} = 'null'"),
        Value::Bool(true) => format!("{kind} = 'true'"),
        Value::Bool(false) => format!("{kind} = 'false'"),
        Value::Number(n) => {
            params.push(json_path(field));
            params.push(number_param(n));
            format!("({kind} IN ('integer', 'real') AND json_extract(data, ?) = ?)")
        }
        Value::String(s) => {
            params.push(json_path(field));
            params.push(SqlValue::Text(s.clone()));
            format!("({kind} = 'text' AND json_extract(data, ?) = ?)")
        }
        Value::Array(_) | Value::Object(_) => {
            params.push(json_path(field));
            params.push(SqlValue::Text(value.to_string()));
            format!("({kind} IN ('array', 'object') AND json_extract(data, ?) = json(?))")
        }
    }
}

fn condition(condition: &Condition, params: &mut Vec<SqlValue>) -> String {
    match condition {
        Condition::Eq { field, value } => equals(field, value, params),
        Condition::NotEq { field, value } => format!("NOT ({})", equals(field, value, params)),
        Condition::In { values, .. } if values.is_empty() => "0".to_string(),
        Condition::In { field, values } => {
            let parts: Vec<String> = values.iter().map(|v| equals(field, v, params)).collect();
            format!("({})", parts.join(" OR "))
        }
    }
}

/// `WHERE` clause selecting the query's entity type and conditions.
pub(crate) fn where_clause(query: &RecordQuery, params: &mut Vec<SqlValue>) -> String {
    params.push(SqlValue::Text(query.entity_type().to_string()));
    let mut clauses = vec!["entity_type = ?".to_string()];
    clauses.extend(query.conditions().iter().map(|c| condition(c, params)));
    format!("WHERE {}", clauses.join(" AND "))
}

/// `ORDER BY` clause. Values rank null, boolean, number, text, composite;
/// insertion order breaks ties.
fn order_clause(query: &RecordQuery, params: &mut Vec<SqlValue>) -> String {
    let mut keys = Vec::new();
    for key in query.sort() {
        let direction = match key.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        params.push(json_path(&key.field));
        params.push(json_path(&key.field));
        keys.push(format!(
            "CASE COALESCE(json_type(data, ?), 'null') \
             WHEN 'null' THEN 0 WHEN 'true' THEN 1 WHEN 'false' THEN 1 \
             WHEN 'integer' THEN 2 WHEN 'real' THEN 2 WHEN 'text' THEN 3 ELSE 4 END {direction}, \
             json_extract(data, ?) {direction}"
        ));
    }
    keys.push("seq ASC".to_string());
    format!("ORDER BY {}", keys.join(", "))
}

fn page_clause(query: &RecordQuery) -> String {
    match (query.limit(), query.offset()) {
        (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        (Some(limit), None) => format!(" LIMIT {limit}"),
        (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
        (None, None) => String::new(),
    }
}

/// Full `SELECT` for a query.
pub(crate) fn select(query: &RecordQuery) -> Statement {
    let mut params = Vec::new();
    let filter = where_clause(query, &mut params);
    let order = order_clause(query, &mut params);
    Statement {
        sql: format!(
            "SELECT entity_type, id, data FROM records {filter} {order}{}",
            page_clause(query)
        ),
        params,
    }
}

/// `SELECT COUNT(*)` for a query. Paging is ignored.
pub(crate) fn count(query: &RecordQuery) -> Statement {
    let mut params = Vec::new();
    let filter = where_clause(query, &mut params);
    Statement {
        sql: format!("SELECT COUNT(*) FROM records {filter}"),
        params,
    }
}

/// Aggregate over the numeric values of a field. Non-numeric values are skipped.
pub(crate) fn aggregate(query: &RecordQuery, aggregate: &Aggregate) -> Statement {
    let function = match aggregate {
        Aggregate::Sum(_) => "TOTAL",
        Aggregate::Average(_) => "AVG",
        Aggregate::Minimum(_) => "MIN",
        Aggregate::Maximum(_) => "MAX",
    };
    let mut params = vec![json_path(aggregate.field()), json_path(aggregate.field())];
    let filter = where_clause(query, &mut params);
    Statement {
        sql: format!(
            "SELECT {function}(CASE WHEN COALESCE(json_type(data, ?), 'null') IN ('integer', 'real') \
             THEN json_extract(data, ?) END) FROM records {filter}"
        ),
        params,
    }
}

/// `DELETE` for a query's conditions. Paging is ignored.
pub(crate) fn delete(query: &RecordQuery) -> Statement {
    let mut params = Vec::new();
    let filter = where_clause(query, &mut params);
    Statement {
        sql: format!("DELETE FROM records {filter}"),
        params,
    }
}

/// Builds a record from a `(entity_type, id, data)` row.
pub(crate) fn record_from_row(entity_type: String, id: String, data: &str) -> TombstoneResult<StoredRecord> {
    let value: Value = serde_json::from_str(data)?;
    Ok(StoredRecord::from_value(entity_type, id, value))
}
