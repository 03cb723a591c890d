//! Parameterized statements
//!
//! A statement is a SQL template with positional `$n` placeholders plus the
//! ordered parameter values. Values are never spliced into the template.
//! Templates may start with a `/* tag */` comment naming the statement; the
//! tag shows up in logs and is how the in-memory backend dispatches.

use std::borrow::Cow;
use std::time::Duration;

use super::value::{SqlValue, ToSql};

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: Cow<'static, str>,
    params: Vec<SqlValue>,
    expected_rows: Option<u64>,
    timeout: Option<Duration>,
}

impl Statement {
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            expected_rows: None,
            timeout: None,
        }
    }

    /// Append the next positional parameter.
    pub fn bind(mut self, value: impl ToSql) -> Self {
        self.params.push(value.to_sql());
        self
    }

    /// Inside a transaction, fail unless exactly `n` rows are affected.
    pub fn expect_rows(mut self, n: u64) -> Self {
        self.expected_rows = Some(n);
        self
    }

    /// Override the pool's per-statement timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn expected_rows(&self) -> Option<u64> {
        self.expected_rows
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn tag(&self) -> Option<&str> {
        let rest = self.sql.trim_start().strip_prefix("/*")?;
        let end = rest.find("*/")?;
        Some(rest[..end].trim())
    }

    /// Template without the leading tag comment.
    fn body(&self) -> &str {
        let sql = self.sql.trim_start();
        match sql.strip_prefix("/*").and_then(|rest| rest.find("*/").map(|end| &rest[end + 2..])) {
            Some(body) => body.trim_start(),
            None => sql,
        }
    }

    fn leading_keyword(&self) -> String {
        self.body()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase()
    }

    /// Plain read with no side effects.
    pub fn is_select(&self) -> bool {
        matches!(self.leading_keyword().as_str(), "SELECT" | "WITH")
    }

    /// Whether the backend should fetch rows rather than just a row count.
    pub fn returns_rows(&self) -> bool {
        self.is_select() || self.body().to_ascii_uppercase().contains("RETURNING")
    }
}
