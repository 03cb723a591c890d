//! PostgreSQL backend on top of sqlx
//!
//! Each pooled connection is one `sqlx::PgConnection`; pooling, timeouts and
//! transaction boundaries are handled by our own pool and coordinator, so
//! sqlx's pool is not used here.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dsenvios_core::DatabaseConfig;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection as _, Decode, Postgres, Row as _, Type, TypeInfo};
use uuid::Uuid;

use super::connection::{Connection, Connector};
use super::error::{QueryError, QueryErrorKind};
use super::statement::Statement;
use super::value::{QueryResult, Row, SqlType, SqlValue};

/// Opens `PgConnection`s from database settings.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .application_name("dsenvios")
            .options([("statement_timeout", config.statement_timeout_ms.to_string())]);
        Self::in_utc(options)
    }

    /// Day filters compare `created_at` against dates, so sessions run in UTC
    /// like the in-memory backend.
    fn in_utc(options: PgConnectOptions) -> Self {
        Self {
            options: options.options([("timezone", "UTC")]),
        }
    }

    /// Connect using a `postgres://` URL instead of discrete settings.
    pub fn from_url(url: &str) -> Result<Self, QueryError> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| QueryError::other(format!("invalid database url: {}", e)))?;
        Ok(Self::in_utc(options))
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, QueryError> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Box::new(PgSession { conn }))
    }
}

struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl Connection for PgSession {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, QueryError> {
        let query = statement
            .params()
            .iter()
            .fold(sqlx::query(statement.sql()), bind_value);

        if statement.returns_rows() {
            let rows = query.fetch_all(&mut self.conn).await.map_err(map_sqlx_error)?;
            let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
            Ok(QueryResult::from_rows(rows))
        } else {
            let done = query.execute(&mut self.conn).await.map_err(map_sqlx_error)?;
            Ok(QueryResult::affected(done.rows_affected()))
        }
    }

    async fn begin(&mut self) -> Result<(), QueryError> {
        sqlx::query("BEGIN")
            .execute(&mut self.conn)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn commit(&mut self) -> Result<(), QueryError> {
        sqlx::query("COMMIT")
            .execute(&mut self.conn)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn rollback(&mut self) -> Result<(), QueryError> {
        sqlx::query("ROLLBACK")
            .execute(&mut self.conn)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn ping(&mut self) -> bool {
        self.conn.ping().await.is_ok()
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            tracing::debug!(error = %e, "error while closing connection");
        }
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null(ty) => match ty {
            SqlType::Bool => query.bind(None::<bool>),
            SqlType::Int => query.bind(None::<i64>),
            SqlType::Float => query.bind(None::<f64>),
            SqlType::Text => query.bind(None::<String>),
            SqlType::Uuid => query.bind(None::<Uuid>),
            SqlType::Timestamp => query.bind(None::<DateTime<Utc>>),
            SqlType::Date => query.bind(None::<NaiveDate>),
            SqlType::Json => query.bind(None::<serde_json::Value>),
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Uuid(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.clone()),
    }
}

fn column<'r, T>(
    row: &'r PgRow,
    index: usize,
    ty: SqlType,
    wrap: impl FnOnce(T) -> SqlValue,
) -> Result<SqlValue, QueryError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    let value: Option<T> = row.try_get(index).map_err(map_sqlx_error)?;
    Ok(value.map(wrap).unwrap_or(SqlValue::Null(ty)))
}

fn decode_row(row: &PgRow) -> Result<Row, QueryError> {
    let mut out = Row::new();
    for col in row.columns() {
        let i = col.ordinal();
        let value = match col.type_info().name() {
            "BOOL" => column(row, i, SqlType::Bool, SqlValue::Bool)?,
            "INT2" => column(row, i, SqlType::Int, |v: i16| SqlValue::Int(v.into()))?,
            "INT4" => column(row, i, SqlType::Int, |v: i32| SqlValue::Int(v.into()))?,
            "INT8" => column(row, i, SqlType::Int, SqlValue::Int)?,
            "FLOAT4" => column(row, i, SqlType::Float, |v: f32| SqlValue::Float(v.into()))?,
            "FLOAT8" => column(row, i, SqlType::Float, SqlValue::Float)?,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => column(row, i, SqlType::Text, SqlValue::Text)?,
            "UUID" => column(row, i, SqlType::Uuid, SqlValue::Uuid)?,
            "TIMESTAMPTZ" => column(row, i, SqlType::Timestamp, SqlValue::Timestamp)?,
            "TIMESTAMP" => column(row, i, SqlType::Timestamp, |v: NaiveDateTime| {
                SqlValue::Timestamp(v.and_utc())
            })?,
            "DATE" => column(row, i, SqlType::Date, SqlValue::Date)?,
            "JSON" | "JSONB" => column(row, i, SqlType::Json, SqlValue::Json)?,
            other => {
                return Err(QueryError::other(format!(
                    "unsupported type {} for column '{}'",
                    other,
                    col.name()
                )))
            }
        };
        out.insert(col.name(), value);
    }
    Ok(out)
}

/// Collapse sqlx errors into the query error taxonomy.
///
/// SQLSTATE classes: `23` integrity violations, `57014` statement timeout,
/// `08` connection exceptions, `57P01` admin shutdown.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> QueryError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            let kind = if code.starts_with("23") {
                QueryErrorKind::ConstraintViolation
            } else if code == "57014" {
                QueryErrorKind::Timeout
            } else if code.starts_with("08") || code == "57P01" {
                QueryErrorKind::ConnectionLost
            } else {
                QueryErrorKind::Other
            };
            let message = match db.constraint() {
                Some(constraint) => format!("{} ({})", db.message(), constraint),
                None => db.message().to_owned(),
            };
            QueryError::new(kind, message)
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => QueryError::connection_lost(err.to_string()),
        sqlx::Error::PoolTimedOut => QueryError::timeout(err.to_string()),
        _ => QueryError::other(err.to_string()),
    }
}
