//! In-memory backend
//!
//! Implements the same [`Connector`]/[`Connection`] seam as Postgres so the
//! pool, coordinator, engine and HTTP layer can run without a database (tests
//! and `serve --in-memory`). Statements are dispatched on their `/* tag */`.
//!
//! Transactions take a global write lock at BEGIN and stage writes on a copy
//! of the tables; COMMIT publishes the copy, ROLLBACK drops it. Reads outside
//! a transaction see only committed data.
//!
//! Test hooks: one-shot statement faults by tag, failing commits, artificial
//! latency, going offline, and breaking every open connection.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dsenvios_core::ShipmentStatus;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::connection::{Connection, Connector};
use super::error::QueryError;
use super::repos::shipments::{EVENT_COLUMNS, SHIPMENT_COLUMNS};
use super::statement::Statement;
use super::value::{FromSql, QueryResult, Row, SqlType, SqlValue};

#[derive(Debug, Clone, Default)]
struct Tables {
    shipments: BTreeMap<Uuid, Row>,
    events: BTreeMap<(Uuid, i64), Row>,
    documents: BTreeMap<(String, String), Row>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    faults: Mutex<VecDeque<(String, QueryError)>>,
    failing_commits: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    offline: AtomicBool,
    generation: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    executed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared in-memory database. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("opened", &self.connections_opened())
            .field("closed", &self.connections_closed())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock(&self.shared.tables)
    }

    /// Fail the next statement tagged `tag` with `error`.
    pub fn inject_fault(&self, tag: &str, error: QueryError) {
        lock(&self.shared.faults).push_back((tag.to_owned(), error));
    }

    /// Make the next COMMIT fail after the statements succeeded.
    pub fn fail_next_commit(&self) {
        self.shared.failing_commits.fetch_add(1, Ordering::SeqCst);
    }

    /// Delay every statement by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.shared.latency) = latency;
    }

    /// While offline, new connections fail and open ones report lost.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Every connection opened so far becomes dead.
    pub fn break_connections(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connections_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn statements_executed(&self) -> usize {
        self.shared.executed.load(Ordering::SeqCst)
    }

    /// Committed row count of `table`.
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables();
        match table {
            "shipments" => tables.shipments.len(),
            "tracking_events" => tables.events.len(),
            "documents" => tables.documents.len(),
            _ => 0,
        }
    }

    fn take_fault(&self, statement: &Statement) -> Option<QueryError> {
        let tag = statement.tag()?;
        let mut faults = lock(&self.shared.faults);
        let index = faults.iter().position(|(t, _)| t == tag)?;
        faults.remove(index).map(|(_, err)| err)
    }
}

#[async_trait]
impl Connector for MemoryBackend {
    async fn connect(&self) -> Result<Box<dyn Connection>, QueryError> {
        if self.shared.offline.load(Ordering::SeqCst) {
            return Err(QueryError::connection_lost("memory backend is offline"));
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            generation: self.shared.generation.load(Ordering::SeqCst),
            backend: self.clone(),
            txn: None,
        }))
    }
}

struct Txn {
    _guard: OwnedMutexGuard<()>,
    staged: Tables,
}

struct MemoryConnection {
    backend: MemoryBackend,
    generation: u64,
    txn: Option<Txn>,
}

impl MemoryConnection {
    fn check_alive(&self) -> Result<(), QueryError> {
        let shared = &self.backend.shared;
        if shared.offline.load(Ordering::SeqCst)
            || shared.generation.load(Ordering::SeqCst) != self.generation
        {
            return Err(QueryError::connection_lost("connection reset by peer"));
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.backend.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, QueryError> {
        self.check_alive()?;
        self.backend.shared.executed.fetch_add(1, Ordering::SeqCst);

        let latency = *lock(&self.backend.shared.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.backend.take_fault(statement) {
            return Err(err);
        }

        if let Some(txn) = self.txn.as_mut() {
            return apply(&mut txn.staged, statement);
        }
        if statement.is_select() {
            return apply(&mut self.backend.tables(), statement);
        }

        // Autocommit write: wait for any open transaction to finish.
        let _guard = self.backend.shared.write_lock.lock().await;
        let mut tables = self.backend.tables();
        apply(&mut tables, statement)
    }

    async fn begin(&mut self) -> Result<(), QueryError> {
        self.check_alive()?;
        if self.txn.is_some() {
            return Err(QueryError::other("transaction already in progress"));
        }
        let guard = self.backend.shared.write_lock.clone().lock_owned().await;
        let staged = self.backend.tables().clone();
        self.txn = Some(Txn {
            _guard: guard,
            staged,
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), QueryError> {
        self.check_alive()?;
        let txn = self
            .txn
            .take()
            .ok_or_else(|| QueryError::other("no transaction in progress"))?;

        let failing = &self.backend.shared.failing_commits;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(QueryError::connection_lost("connection lost during commit"));
        }

        *self.backend.tables() = txn.staged;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), QueryError> {
        self.txn = None;
        self.check_alive()
    }

    async fn ping(&mut self) -> bool {
        self.check_alive().is_ok()
    }

    async fn close(self: Box<Self>) {}
}

struct Params<'a>(&'a [SqlValue]);

impl Params<'_> {
    fn get<T: FromSql>(&self, index: usize) -> Result<T, QueryError> {
        self.0
            .get(index)
            .and_then(T::from_sql)
            .ok_or_else(|| QueryError::other(format!("parameter ${} missing or mistyped", index + 1)))
    }
}

fn apply(tables: &mut Tables, statement: &Statement) -> Result<QueryResult, QueryError> {
    let p = Params(statement.params());
    match statement.tag().unwrap_or_default() {
        "health.ping" => Ok(QueryResult::from_rows(vec![Row::new().with("ok", 1_i64)])),
        tag if tag.starts_with("migrate.") => Ok(QueryResult::affected(0)),

        "shipments.insert" => insert_shipment(tables, statement.params()),
        "events.insert" => insert_event(tables, statement.params()),
        "shipments.advance" => advance(tables, &p),
        "shipments.by_tracking" => {
            let tracking: String = p.get(0)?;
            let rows = tables
                .shipments
                .values()
                .filter(|row| text(row, "tracking_number") == Some(tracking.as_str()))
                .map(|row| with_last_event_at(tables, row))
                .collect();
            Ok(QueryResult::from_rows(rows))
        }
        "events.history" => {
            let id: Uuid = p.get(0)?;
            let up_to: i64 = p.get(1)?;
            let rows = tables
                .events
                .range((id, i64::MIN)..=(id, up_to))
                .map(|(_, row)| row.clone())
                .collect();
            Ok(QueryResult::from_rows(rows))
        }
        "events.by_seq" => {
            let key = (p.get::<Uuid>(0)?, p.get::<i64>(1)?);
            Ok(QueryResult::from_rows(tables.events.get(&key).cloned().into_iter().collect()))
        }
        "shipments.count" => {
            let filter = ShipmentFilter::from_params(&p)?;
            let total = tables.shipments.values().filter(|r| filter.matches(r)).count();
            Ok(QueryResult::from_rows(vec![Row::new().with("total", total as i64)]))
        }
        "shipments.list" => list_shipments(tables, statement, &p),

        "documents.count" => {
            let collection: String = p.get(0)?;
            let total = tables.documents.keys().filter(|(c, _)| *c == collection).count();
            Ok(QueryResult::from_rows(vec![Row::new().with("total", total as i64)]))
        }
        "documents.list" => {
            let collection: String = p.get(0)?;
            let mut rows: Vec<Row> = tables
                .documents
                .iter()
                .filter(|((c, _), _)| *c == collection)
                .map(|(_, row)| row.clone())
                .collect();
            rows.sort_by(|a, b| {
                b.value("created_at")
                    .zip(a.value("created_at"))
                    .map(|(b, a)| b.sort_cmp(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| text(a, "id").cmp(&text(b, "id")))
            });
            Ok(QueryResult::from_rows(page(rows, p.get(1)?, p.get(2)?)))
        }
        "documents.get" => {
            let key = (p.get::<String>(0)?, p.get::<String>(1)?);
            Ok(QueryResult::from_rows(tables.documents.get(&key).cloned().into_iter().collect()))
        }
        "documents.insert" => {
            let key = (p.get::<String>(0)?, p.get::<String>(1)?);
            if tables.documents.contains_key(&key) {
                return Err(QueryError::constraint(
                    "duplicate key value violates unique constraint (documents_pkey)",
                ));
            }
            let at: DateTime<Utc> = p.get(3)?;
            let row = Row::new()
                .with("id", key.1.as_str())
                .with("body", p.get::<serde_json::Value>(2)?)
                .with("created_at", at)
                .with("updated_at", at);
            tables.documents.insert(key, row.clone());
            Ok(QueryResult::from_rows(vec![row]))
        }
        "documents.replace" => {
            let key = (p.get::<String>(0)?, p.get::<String>(1)?);
            let body: serde_json::Value = p.get(2)?;
            let at: DateTime<Utc> = p.get(3)?;
            let rows = match tables.documents.get_mut(&key) {
                Some(row) => {
                    row.insert("body", SqlValue::Json(body));
                    row.insert("updated_at", SqlValue::Timestamp(at));
                    vec![row.clone()]
                }
                None => Vec::new(),
            };
            Ok(QueryResult::from_rows(rows))
        }
        "documents.delete" => {
            let key = (p.get::<String>(0)?, p.get::<String>(1)?);
            let removed = tables.documents.remove(&key).is_some();
            Ok(QueryResult::affected(u64::from(removed)))
        }

        "" => Err(QueryError::other("memory backend requires tagged statements")),
        other => Err(QueryError::other(format!(
            "memory backend does not support statement '{}'",
            other
        ))),
    }
}

fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    match row.value(column) {
        Some(SqlValue::Text(s)) => Some(s),
        _ => None,
    }
}

fn row_from(columns: &[&str], params: &[SqlValue]) -> Result<Row, QueryError> {
    if columns.len() != params.len() {
        return Err(QueryError::other(format!(
            "expected {} parameters, got {}",
            columns.len(),
            params.len()
        )));
    }
    let mut row = Row::new();
    for (column, value) in columns.iter().zip(params) {
        row.insert(*column, value.clone());
    }
    Ok(row)
}

fn check_status(value: &str) -> Result<(), QueryError> {
    if ShipmentStatus::ALL.iter().any(|s| s.as_str() == value) {
        Ok(())
    } else {
        Err(QueryError::constraint(format!(
            "new row violates check constraint on status: '{}'",
            value
        )))
    }
}

fn insert_shipment(tables: &mut Tables, params: &[SqlValue]) -> Result<QueryResult, QueryError> {
    let row = row_from(&SHIPMENT_COLUMNS, params)?;
    let id: Uuid = row.get("id")?;
    let tracking: String = row.get("tracking_number")?;
    check_status(&row.get::<String>("status")?)?;

    if tables.shipments.contains_key(&id) {
        return Err(QueryError::constraint(
            "duplicate key value violates unique constraint (shipments_pkey)",
        ));
    }
    if tables
        .shipments
        .values()
        .any(|r| text(r, "tracking_number") == Some(tracking.as_str()))
    {
        return Err(QueryError::constraint(
            "duplicate key value violates unique constraint (shipments_tracking_number_key)",
        ));
    }

    tables.shipments.insert(id, row);
    Ok(QueryResult::affected(1))
}

fn insert_event(tables: &mut Tables, params: &[SqlValue]) -> Result<QueryResult, QueryError> {
    let row = row_from(&EVENT_COLUMNS, params)?;
    let key = (row.get::<Uuid>("shipment_id")?, row.get::<i64>("seq")?);
    check_status(&row.get::<String>("status")?)?;

    if !tables.shipments.contains_key(&key.0) {
        return Err(QueryError::constraint(
            "insert violates foreign key constraint (tracking_events_shipment_id_fkey)",
        ));
    }
    if tables.events.contains_key(&key) {
        return Err(QueryError::constraint(
            "duplicate key value violates unique constraint (tracking_events_pkey)",
        ));
    }

    tables.events.insert(key, row);
    Ok(QueryResult::affected(1))
}

fn advance(tables: &mut Tables, p: &Params<'_>) -> Result<QueryResult, QueryError> {
    let status: String = p.get(0)?;
    let seq: i64 = p.get(1)?;
    let at: DateTime<Utc> = p.get(2)?;
    let id: Uuid = p.get(3)?;
    let expected_status: String = p.get(4)?;
    let expected_seq: i64 = p.get(5)?;
    check_status(&status)?;

    let Some(row) = tables.shipments.get_mut(&id) else {
        return Ok(QueryResult::affected(0));
    };
    let matches = text(row, "status") == Some(expected_status.as_str())
        && row.get::<i64>("last_seq")? == expected_seq;
    if !matches {
        return Ok(QueryResult::affected(0));
    }

    row.insert("status", SqlValue::Text(status));
    row.insert("last_seq", SqlValue::Int(seq));
    row.insert("updated_at", SqlValue::Timestamp(at));
    Ok(QueryResult::affected(1))
}

fn with_last_event_at(tables: &Tables, row: &Row) -> Row {
    let mut row = row.clone();
    let last_event_at = match (row.get::<Uuid>("id"), row.get::<i64>("last_seq")) {
        (Ok(id), Ok(seq)) => tables
            .events
            .get(&(id, seq))
            .and_then(|e| e.value("recorded_at").cloned()),
        _ => None,
    };
    row.insert(
        "last_event_at",
        last_event_at.unwrap_or(SqlValue::Null(SqlType::Timestamp)),
    );
    row
}

struct ShipmentFilter {
    tracking_contains: Option<String>,
    service_type: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    status: Option<String>,
}

impl ShipmentFilter {
    fn from_params(p: &Params<'_>) -> Result<Self, QueryError> {
        Ok(Self {
            tracking_contains: p.get::<Option<String>>(0)?.map(|s| s.to_uppercase()),
            service_type: p.get(1)?,
            from: p.get(2)?,
            to: p.get(3)?,
            status: p.get(4)?,
        })
    }

    fn matches(&self, row: &Row) -> bool {
        // UTC days; Postgres sessions are pinned to UTC as well.
        let created = row
            .get::<DateTime<Utc>>("created_at")
            .map(|t| t.date_naive())
            .ok();
        self.tracking_contains.as_deref().map_or(true, |needle| {
            text(row, "tracking_number").is_some_and(|t| t.to_uppercase().contains(needle))
        }) && self
            .service_type
            .as_deref()
            .map_or(true, |s| text(row, "service_type") == Some(s))
            && self.from.map_or(true, |d| created.is_some_and(|c| c >= d))
            && self.to.map_or(true, |d| created.is_some_and(|c| c <= d))
            && self
                .status
                .as_deref()
                .map_or(true, |s| text(row, "status") == Some(s))
    }
}

/// `ORDER BY s.<column> <ASC|DESC>` from the statement text.
fn order_by(sql: &str) -> Option<(&str, bool)> {
    const MARKER: &str = "ORDER BY s.";
    let rest = &sql[sql.find(MARKER)? + MARKER.len()..];
    let mut parts = rest.split_whitespace();
    let column = parts.next()?;
    let descending = parts
        .next()
        .is_some_and(|d| d.trim_end_matches(',').eq_ignore_ascii_case("DESC"));
    Some((column, descending))
}

fn page(rows: Vec<Row>, limit: i64, offset: i64) -> Vec<Row> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn list_shipments(tables: &Tables, statement: &Statement, p: &Params<'_>) -> Result<QueryResult, QueryError> {
    let filter = ShipmentFilter::from_params(p)?;
    let (column, descending) = order_by(statement.sql()).unwrap_or(("created_at", true));

    let mut rows: Vec<Row> = tables
        .shipments
        .values()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    rows.sort_by(|a, b| {
        let null = SqlValue::Null(SqlType::Text);
        let ord = a
            .value(column)
            .unwrap_or(&null)
            .sort_cmp(b.value(column).unwrap_or(&null));
        let ord = if descending { ord.reverse() } else { ord };
        ord.then_with(|| a.value("id").unwrap_or(&null).sort_cmp(b.value("id").unwrap_or(&null)))
    });

    Ok(QueryResult::from_rows(page(rows, p.get(5)?, p.get(6)?)))
}
