//! Database migrations for shipment, tracking, and document tables

use dsenvios_core::ShipmentStatus;

use super::{Pool, Statement, TransactionCoordinator, TransactionError};

fn status_check(column: &str) -> String {
    let allowed = ShipmentStatus::ALL
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CHECK ({} IN ({}))", column, allowed)
}

/// DDL in application order. Every statement is idempotent.
pub fn statements() -> Vec<Statement> {
    vec![
        Statement::new(format!(
            r#"/* migrate.shipments */
            CREATE TABLE IF NOT EXISTS shipments (
                id UUID PRIMARY KEY,
                tracking_number TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL {},
                last_seq BIGINT NOT NULL CHECK (last_seq >= 1),
                sender_name TEXT NOT NULL,
                sender_phone TEXT,
                recipient_name TEXT NOT NULL,
                recipient_phone TEXT,
                origin_warehouse TEXT,
                destination_warehouse TEXT,
                service_type TEXT NOT NULL,
                weight_kg DOUBLE PRECISION NOT NULL CHECK (weight_kg > 0),
                declared_value DOUBLE PRECISION,
                cost DOUBLE PRECISION NOT NULL CHECK (cost >= 0),
                description TEXT,
                notes TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"#,
            status_check("status")
        )),
        Statement::new(
            "/* migrate.shipments_created_at_idx */ \
             CREATE INDEX IF NOT EXISTS shipments_created_at_idx ON shipments (created_at DESC)",
        ),
        Statement::new(format!(
            r#"/* migrate.tracking_events */
            CREATE TABLE IF NOT EXISTS tracking_events (
                shipment_id UUID NOT NULL REFERENCES shipments(id),
                seq BIGINT NOT NULL CHECK (seq >= 1),
                status TEXT NOT NULL {},
                recorded_at TIMESTAMPTZ NOT NULL,
                location TEXT,
                actor TEXT,
                notes TEXT,
                PRIMARY KEY (shipment_id, seq)
            )"#,
            status_check("status")
        )),
        Statement::new(
            r#"/* migrate.tracking_events_append_only_fn */
            CREATE OR REPLACE FUNCTION tracking_events_append_only() RETURNS trigger AS $$
            BEGIN
                RAISE EXCEPTION 'tracking_events is append-only';
            END;
            $$ LANGUAGE plpgsql"#,
        ),
        Statement::new(
            "/* migrate.tracking_events_append_only_drop */ \
             DROP TRIGGER IF EXISTS tracking_events_append_only ON tracking_events",
        ),
        Statement::new(
            "/* migrate.tracking_events_append_only */ \
             CREATE TRIGGER tracking_events_append_only BEFORE UPDATE OR DELETE ON tracking_events \
             FOR EACH ROW EXECUTE FUNCTION tracking_events_append_only()",
        ),
        Statement::new(
            r#"/* migrate.documents */
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (collection, id)
            )"#,
        ),
    ]
}

/// Run all migrations in one transaction.
pub async fn run(pool: &Pool) -> Result<(), TransactionError> {
    tracing::info!("Running database migrations...");
    let statements = statements();
    TransactionCoordinator::new(pool).run(&statements).await?;
    tracing::info!(applied = statements.len(), "Migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_statement_is_tagged() {
        for stmt in statements() {
            let tag = stmt.tag().unwrap_or_default();
            assert!(tag.starts_with("migrate."), "untagged migration: {}", stmt.sql());
            assert!(!stmt.returns_rows());
        }
    }

    #[test]
    fn status_check_lists_every_status() {
        let check = status_check("status");
        for status in ShipmentStatus::ALL {
            assert!(check.contains(&format!("'{}'", status.as_str())));
        }
    }
}
