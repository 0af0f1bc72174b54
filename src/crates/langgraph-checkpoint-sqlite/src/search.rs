//! `WHERE` clause construction for checkpoint listing
//!
//! Metadata filters follow JSON containment: every key of the filter must be
//! present in the stored metadata with a containing value. Objects contain
//! sub-objects, arrays contain every element of the filter array, and scalars
//! must be equal. Most filters compile to SQLite JSON functions. Parts that
//! cannot be expressed that way leave a residual filter, which the caller
//! checks with [`metadata_contains`] after fetching rows.

use langgraph_checkpoint::CheckpointConfig;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use std::collections::HashMap;

/// A value bound to a numbered placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Real(f64),
}

/// Accumulated predicates and their bound parameters
#[derive(Debug, Default)]
pub struct SearchWhere {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
    residual: Option<Value>,
}

impl SearchWhere {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicates for a `list` call
    pub fn for_list(
        config: Option<&CheckpointConfig>,
        filter: Option<&HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
    ) -> Self {
        let mut search = Self::new();

        if let Some(config) = config {
            if let Some(thread_id) = config.thread_id.as_ref().filter(|s| !s.is_empty()) {
                let p = search.bind(SqlParam::Text(thread_id.clone()));
                search.clauses.push(format!("thread_id = {}", p));
            }
            // An explicit empty namespace still filters to the root namespace
            if let Some(ns) = &config.checkpoint_ns {
                let p = search.bind(SqlParam::Text(ns.clone()));
                search.clauses.push(format!("checkpoint_ns = {}", p));
            }
            if let Some(checkpoint_id) = config.checkpoint_id.as_ref().filter(|s| !s.is_empty()) {
                let p = search.bind(SqlParam::Text(checkpoint_id.clone()));
                search.clauses.push(format!("checkpoint_id = {}", p));
            }
        }

        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            let filter: Map<String, Value> =
                filter.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let mut path = vec![];
            if !search.push_object(&mut path, &filter) {
                search.residual = Some(Value::Object(filter));
            }
        }

        if let Some(before_id) = before
            .and_then(|b| b.checkpoint_id.as_ref())
            .filter(|s| !s.is_empty())
        {
            let p = search.bind(SqlParam::Text(before_id.clone()));
            search.clauses.push(format!("checkpoint_id < {}", p));
        }

        search
    }

    /// `WHERE ...` for the accumulated predicates, empty when there are none
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Filter the SQL could not fully express
    pub fn residual(&self) -> Option<&Value> {
        self.residual.as_ref()
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Append a parameter and return its placeholder
    pub fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    /// Emit predicates for every key of `filter` under `path`.
    /// Returns `false` when some part was left to the residual check.
    fn push_object(&mut self, path: &mut Vec<String>, filter: &Map<String, Value>) -> bool {
        let mut exact = true;
        for (key, expected) in filter {
            if key.contains('"') || key.contains('\\') {
                exact = false;
                continue;
            }
            path.push(key.clone());
            exact &= self.push_value(path, expected);
            path.pop();
        }
        exact
    }

    fn push_value(&mut self, path: &mut Vec<String>, expected: &Value) -> bool {
        let p = self.bind(SqlParam::Text(json_path(path)));
        match expected {
            Value::Null => {
                self.clauses
                    .push(format!("json_type(metadata, {}) = 'null'", p));
                true
            }
            Value::Bool(b) => {
                self.clauses
                    .push(format!("json_type(metadata, {}) = '{}'", p, b));
                true
            }
            Value::Number(_) | Value::String(_) => {
                let (types, v) = self.bind_scalar(expected);
                self.clauses.push(format!(
                    "json_type(metadata, {p}) IN ({types}) AND json_extract(metadata, {p}) = {v}"
                ));
                true
            }
            Value::Object(map) if map.is_empty() => {
                self.clauses
                    .push(format!("json_type(metadata, {}) = 'object'", p));
                true
            }
            Value::Object(map) => self.push_object(path, map),
            Value::Array(items) => {
                self.clauses
                    .push(format!("json_type(metadata, {}) = 'array'", p));
                let mut exact = true;
                for item in items {
                    match item {
                        Value::Array(_) | Value::Object(_) => exact = false,
                        Value::Null | Value::Bool(_) => self.clauses.push(format!(
                            "EXISTS (SELECT 1 FROM json_each(metadata, {}) AS el WHERE el.type = '{}')",
                            p,
                            json_type_name(item)
                        )),
                        Value::Number(_) | Value::String(_) => {
                            let (types, v) = self.bind_scalar(item);
                            self.clauses.push(format!(
                                "EXISTS (SELECT 1 FROM json_each(metadata, {p}) AS el \
                                 WHERE el.type IN ({types}) AND el.atom = {v})"
                            ));
                        }
                    }
                }
                exact
            }
        }
    }

    /// Bind a number or string, returning the SQLite JSON type names it may
    /// have and the placeholder of its value
    fn bind_scalar(&mut self, value: &Value) -> (&'static str, String) {
        match value {
            Value::String(s) => ("'text'", self.bind(SqlParam::Text(s.clone()))),
            Value::Number(n) => {
                let param = match n.as_i64() {
                    Some(i) => SqlParam::Int(i),
                    None => SqlParam::Real(n.as_f64().unwrap_or_default()),
                };
                ("'integer', 'real'", self.bind(param))
            }
            _ => ("'null'", self.bind(SqlParam::Text(String::new()))),
        }
    }
}

/// Bind `params` to `query` in placeholder order
pub fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.as_str()),
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::Real(f) => query.bind(*f),
        };
    }
    query
}

fn json_path(keys: &[String]) -> String {
    let mut path = String::from("$");
    for key in keys {
        path.push_str(".\"");
        path.push_str(key);
        path.push('"');
    }
    path
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(true) => "true",
        Value::Bool(false) => "false",
        Value::Number(n) if n.is_f64() => "real",
        Value::Number(_) => "integer",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether `stored` contains `filter`
pub fn metadata_contains(stored: &Value, filter: &Value) -> bool {
    match (stored, filter) {
        (Value::Object(stored), Value::Object(filter)) => filter.iter().all(|(key, expected)| {
            stored
                .get(key)
                .is_some_and(|actual| metadata_contains(actual, expected))
        }),
        (Value::Array(stored), Value::Array(filter)) => filter
            .iter()
            .all(|expected| stored.iter().any(|actual| metadata_contains(actual, expected))),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (actual, expected) => actual == expected,
    }
}
