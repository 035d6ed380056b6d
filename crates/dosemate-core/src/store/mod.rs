//! Entity Store
//!
//! Durable, queryable persistence for the domain entities. The rest of the
//! core only talks to the [`EntityStore`] trait:
//! - predicate-filtered, sorted, limited fetches
//! - staged inserts and deletes
//! - one transactional save

mod entities;
mod sqlite;

pub use sqlite::{SqliteStore, SyncMode};
pub(crate) use sqlite::{apply_key, configure_connection};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use std::marker::PhantomData;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Column payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Query referenced a column the entity does not have
    #[error("Unknown field {field} on {kind}")]
    UnknownField { kind: &'static str, field: &'static str },
    /// Invalid timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// ENTITY
// ============================================================================

/// A domain record persisted as one row of one table
pub trait Entity: Sized {
    /// Table holding this entity
    const KIND: &'static str;
    /// Columns in the order `from_row` reads and `to_values` writes them.
    /// The first column is always `id`.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> Uuid;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;

    fn to_values(&self) -> Result<Vec<Value>>;
}

// ============================================================================
// QUERIES
// ============================================================================

/// Row filter; field names must be columns of the fetched entity
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    Eq(&'static str, Value),
    Gt(&'static str, Value),
    Ge(&'static str, Value),
    Lt(&'static str, Value),
    Le(&'static str, Value),
    In(&'static str, Vec<Value>),
    And(Vec<Predicate>),
}

impl Predicate {
    /// `start <= field < end`
    pub fn between(field: &'static str, start: Value, end: Value) -> Self {
        Predicate::And(vec![Predicate::Ge(field, start), Predicate::Lt(field, end)])
    }

    fn render(&self, params: &mut Vec<Value>) -> String {
        fn bind(params: &mut Vec<Value>, field: &str, op: &str, value: &Value) -> String {
            params.push(value.clone());
            format!("{} {} ?{}", field, op, params.len())
        }

        match self {
            Predicate::All => "1 = 1".to_string(),
            Predicate::Eq(f, v) => bind(params, f, "=", v),
            Predicate::Gt(f, v) => bind(params, f, ">", v),
            Predicate::Ge(f, v) => bind(params, f, ">=", v),
            Predicate::Lt(f, v) => bind(params, f, "<", v),
            Predicate::Le(f, v) => bind(params, f, "<=", v),
            Predicate::In(f, values) => {
                if values.is_empty() {
                    return "0 = 1".to_string();
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        params.push(v.clone());
                        format!("?{}", params.len())
                    })
                    .collect();
                format!("{} IN ({})", f, placeholders.join(", "))
            }
            Predicate::And(parts) => {
                if parts.is_empty() {
                    return "1 = 1".to_string();
                }
                parts
                    .iter()
                    .map(|p| format!("({})", p.render(params)))
                    .collect::<Vec<_>>()
                    .join(" AND ")
            }
        }
    }

    fn fields(&self, out: &mut Vec<&'static str>) {
        match self {
            Predicate::All => {}
            Predicate::Eq(f, _)
            | Predicate::Gt(f, _)
            | Predicate::Ge(f, _)
            | Predicate::Lt(f, _)
            | Predicate::Le(f, _)
            | Predicate::In(f, _) => out.push(*f),
            Predicate::And(parts) => parts.iter().for_each(|p| p.fields(out)),
        }
    }
}

/// One ORDER BY key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(field: &'static str) -> Self {
        Self { field, descending: false }
    }

    pub fn descending(field: &'static str) -> Self {
        Self { field, descending: true }
    }
}

/// Typed fetch request: which rows, in which order, how many
#[derive(Debug, Clone)]
pub struct FetchDescriptor<E> {
    pub predicate: Predicate,
    pub sort_by: Vec<SortKey>,
    pub limit: Option<usize>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for FetchDescriptor<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> FetchDescriptor<E> {
    pub fn new() -> Self {
        Self {
            predicate: Predicate::All,
            sort_by: Vec::new(),
            limit: None,
            _entity: PhantomData,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort_by.push(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject fields that are not columns of `E`
    fn validate(&self) -> Result<()> {
        let mut fields = Vec::new();
        self.predicate.fields(&mut fields);
        fields.extend(self.sort_by.iter().map(|k| k.field));
        match fields.into_iter().find(|f| !E::COLUMNS.contains(f)) {
            Some(field) => Err(StoreError::UnknownField { kind: E::KIND, field }),
            None => Ok(()),
        }
    }

    /// Render to SQL plus positional parameters
    fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        self.validate()?;
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            E::COLUMNS.join(", "),
            E::KIND,
            self.predicate.render(&mut params)
        );
        if !self.sort_by.is_empty() {
            let keys: Vec<String> = self
                .sort_by
                .iter()
                .map(|k| format!("{} {}", k.field, if k.descending { "DESC" } else { "ASC" }))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok((sql, params))
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Persistence capability the core depends on
///
/// Inserts and deletes are staged; nothing is visible to `fetch` until
/// `save` commits them atomically.
pub trait EntityStore {
    fn fetch<E: Entity>(&self, descriptor: &FetchDescriptor<E>) -> Result<Vec<E>>;

    /// Stage an insert (or update of an existing id)
    fn insert<E: Entity>(&mut self, entity: &E) -> Result<()>;

    /// Stage a delete
    fn delete<E: Entity>(&mut self, entity: &E);

    /// Commit all staged changes in one transaction
    fn save(&mut self) -> Result<()>;

    fn has_changes(&self) -> bool;
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// order equals time order.
pub fn encode_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidTimestamp(format!("{}: {}", raw, e)))
}

/// Predicate value for a timestamp column
pub fn timestamp_value(dt: &DateTime<Utc>) -> Value {
    Value::Text(encode_timestamp(dt))
}

/// Predicate value for a uuid column
pub fn uuid_value(id: &Uuid) -> Value {
    Value::Text(id.to_string())
}
