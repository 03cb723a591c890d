//! Guide listing: filtered, sorted, paginated reads over shipments
//!
//! Sort columns come from a fixed allowlist and are mapped to SQL fragments
//! here; user input never reaches the ORDER BY clause.

use chrono::NaiveDate;
use dsenvios_core::{Shipment, ShipmentStatus, ValidationError};
use serde::Deserialize;

use super::shipments::shipment_from_row;
use crate::db::{DbError, Pool, QueryError, QueryExecutor, Statement};
use crate::models::{Paginated, Pagination, PaginationParams};

const FILTER: &str = r#"WHERE ($1::text IS NULL OR s.tracking_number ILIKE '%' || $1 || '%')
  AND ($2::text IS NULL OR s.service_type = $2)
  AND ($3::date IS NULL OR s.created_at >= $3::date)
  AND ($4::date IS NULL OR s.created_at < $4::date + 1)
  AND ($5::text IS NULL OR s.status = $5)"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    TrackingNumber,
    #[default]
    CreatedAt,
    ServiceType,
    Status,
    Cost,
    Weight,
}

impl SortColumn {
    pub fn column(self) -> &'static str {
        match self {
            Self::TrackingNumber => "tracking_number",
            Self::CreatedAt => "created_at",
            Self::ServiceType => "service_type",
            Self::Status => "status",
            Self::Cost => "cost",
            Self::Weight => "weight_kg",
        }
    }

    /// Accepts the names the front end sends (`numero_guia`, `tipo_envio`, ...).
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim() {
            "numero_guia" | "tracking_number" => Ok(Self::TrackingNumber),
            "created_at" | "fecha" | "fecha_creacion" => Ok(Self::CreatedAt),
            "tipo_envio" | "service_type" => Ok(Self::ServiceType),
            "status" | "estado" => Ok(Self::Status),
            "costo" | "cost" => Ok(Self::Cost),
            "peso" | "weight_kg" => Ok(Self::Weight),
            other => Err(ValidationError::InvalidVariant {
                field: "sortBy",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(ValidationError::InvalidVariant {
                field: "sortOrder",
                value: s.to_owned(),
            }),
        }
    }
}

/// Validated listing filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuideFilter {
    /// Substring of the tracking number
    pub tracking_contains: Option<String>,
    pub service_type: Option<String>,
    /// Inclusive day bounds on `created_at`
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub status: Option<ShipmentStatus>,
    pub sort: SortColumn,
    pub order: SortOrder,
}

/// Raw query string for `GET /api/guias`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuideQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<String>,
    pub numero_guia: Option<String>,
    pub tipo_envio: Option<String>,
    pub fecha_inicio: Option<String>,
    pub fecha_fin: Option<String>,
    #[serde(alias = "estado")]
    pub status: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn parse_day(field: &'static str, value: Option<String>) -> Result<Option<NaiveDate>, ValidationError> {
    non_blank(value)
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|_| ValidationError::InvalidFormat {
                field,
                reason: "expected a date as YYYY-MM-DD",
            })
        })
        .transpose()
}

impl GuideQuery {
    pub fn into_parts(self) -> Result<(GuideFilter, Pagination), ValidationError> {
        let page = Pagination::from(PaginationParams {
            page: self.page,
            limit: self.limit,
        });

        let tracking_contains = non_blank(self.numero_guia)
            .map(|v| {
                let v = v.to_ascii_uppercase();
                if v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    Ok(v)
                } else {
                    Err(ValidationError::InvalidFormat {
                        field: "numero_guia",
                        reason: "may only contain letters, digits or hyphens",
                    })
                }
            })
            .transpose()?;

        let created_from = parse_day("fecha_inicio", self.fecha_inicio)?;
        let created_to = parse_day("fecha_fin", self.fecha_fin)?;
        if let (Some(from), Some(to)) = (created_from, created_to) {
            if from > to {
                return Err(ValidationError::OutOfRange {
                    field: "fecha_inicio",
                    reason: format!("{} is after fecha_fin {}", from, to),
                });
            }
        }

        let filter = GuideFilter {
            tracking_contains,
            service_type: non_blank(self.tipo_envio).map(|v| v.to_ascii_uppercase()),
            created_from,
            created_to,
            status: non_blank(self.status).map(|s| s.parse()).transpose()?,
            sort: non_blank(self.sort_by)
                .map(|s| SortColumn::parse(&s))
                .transpose()?
                .unwrap_or_default(),
            order: non_blank(self.sort_order)
                .map(|s| SortOrder::parse(&s))
                .transpose()?
                .unwrap_or_default(),
        };

        Ok((filter, page))
    }
}

impl GuideFilter {
    fn bind(&self, stmt: Statement) -> Statement {
        stmt.bind(self.tracking_contains.as_deref())
            .bind(self.service_type.as_deref())
            .bind(self.created_from)
            .bind(self.created_to)
            .bind(self.status.map(|s| s.as_str()))
    }

    pub(crate) fn count_statement(&self) -> Statement {
        self.bind(Statement::new(format!(
            "/* shipments.count */\nSELECT COUNT(*) AS total FROM shipments s\n{}",
            FILTER
        )))
    }

    pub(crate) fn page_statement(&self, page: Pagination) -> Statement {
        let sql = format!(
            "/* shipments.list */\nSELECT s.* FROM shipments s\n{}\nORDER BY s.{} {}, s.id ASC\nLIMIT $6 OFFSET $7",
            FILTER,
            self.sort.column(),
            self.order.keyword()
        );
        self.bind(Statement::new(sql))
            .bind(page.limit)
            .bind(page.offset())
    }
}

pub struct GuideRepo<'a> {
    pool: &'a Pool,
}

impl<'a> GuideRepo<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &GuideFilter, page: Pagination) -> Result<Paginated<Shipment>, DbError> {
        let executor = QueryExecutor::new(self.pool);

        let total: i64 = executor
            .fetch_optional(&filter.count_statement())
            .await?
            .ok_or_else(|| QueryError::other("count returned no rows"))?
            .get("total")?;

        let rows = executor.fetch_all(&filter.page_statement(page)).await?;
        let data = rows
            .iter()
            .map(shipment_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated::new(data, total, page))
    }
}
