//! Backend-neutral parameter and column values
//!
//! Statements carry their parameters as [`SqlValue`]s and every backend
//! returns rows as column → [`SqlValue`] maps, so repositories decode rows
//! the same way whether they came from Postgres or the in-memory store.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::error::QueryError;

/// Column type, kept on NULLs so backends can bind a typed NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    Timestamp,
    Date,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlType),
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Ordering used for ORDER BY emulation. NULLs sort last.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        use SqlValue::*;
        match (self, other) {
            (Null(_), Null(_)) => Ordering::Equal,
            (Null(_), _) => Ordering::Greater,
            (_, Null(_)) => Ordering::Less,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.cmp(b),
            (Uuid(a), Uuid(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Rust value that can be bound as a statement parameter.
pub trait ToSql {
    const TYPE: SqlType;

    fn to_sql(self) -> SqlValue;
}

/// Rust value that can be read back out of a column.
pub trait FromSql: Sized {
    fn from_sql(value: &SqlValue) -> Option<Self>;
}

macro_rules! sql_scalar {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl ToSql for $ty {
            const TYPE: SqlType = SqlType::$kind;

            fn to_sql(self) -> SqlValue {
                SqlValue::$variant(self.into())
            }
        }
    };
}

sql_scalar!(bool, Bool, Bool);
sql_scalar!(i64, Int, Int);
sql_scalar!(i32, Int, Int);
sql_scalar!(f64, Float, Float);
sql_scalar!(String, Text, Text);
sql_scalar!(Uuid, Uuid, Uuid);
sql_scalar!(DateTime<Utc>, Timestamp, Timestamp);
sql_scalar!(NaiveDate, Date, Date);
sql_scalar!(serde_json::Value, Json, Json);

impl ToSql for &str {
    const TYPE: SqlType = SqlType::Text;

    fn to_sql(self) -> SqlValue {
        SqlValue::Text(self.to_owned())
    }
}

impl ToSql for u32 {
    const TYPE: SqlType = SqlType::Int;

    fn to_sql(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSql for u64 {
    const TYPE: SqlType = SqlType::Int;

    fn to_sql(self) -> SqlValue {
        SqlValue::Int(i64::try_from(self).unwrap_or(i64::MAX))
    }
}

impl<T: ToSql> ToSql for Option<T> {
    const TYPE: SqlType = T::TYPE;

    fn to_sql(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql(),
            None => SqlValue::Null(T::TYPE),
        }
    }
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromSql for i64 {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromSql for Uuid {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }
}

impl FromSql for DateTime<Utc> {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl FromSql for NaiveDate {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl FromSql for serde_json::Value {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Json(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null(_) => Some(None),
            other => T::from_sql(other).map(Some),
        }
    }
}

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn with(mut self, column: impl Into<String>, value: impl ToSql) -> Self {
        self.insert(column, value.to_sql());
        self
    }

    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    /// Typed column access; a missing column or a type mismatch is a query error.
    pub fn get<T: FromSql>(&self, column: &str) -> Result<T, QueryError> {
        let value = self
            .columns
            .get(column)
            .ok_or_else(|| QueryError::other(format!("missing column '{}'", column)))?;
        T::from_sql(value)
            .ok_or_else(|| QueryError::other(format!("column '{}' has unexpected type: {:?}", column, value)))
    }
}

/// Outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows_affected: rows.len() as u64,
            rows,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn into_first(self) -> Option<Row> {
        self.rows.into_iter().next()
    }
}
