//! Truncate-and-reload helpers for the relational sink.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Rows appended per INSERT statement, bounding per-statement payload.
pub const BATCH_SIZE: usize = 1000;

/// Clears the destination table and resets its identity sequence. The
/// subsequent append is a separate statement: a failure between the two
/// leaves the table truncated-and-partial (known limitation of the
/// full-refresh strategy).
pub async fn truncate_table(pool: &PgPool, table: &str) -> Result<()> {
    let sql = format!("TRUNCATE TABLE {table} RESTART IDENTITY CASCADE");
    sqlx::query(&sql)
        .execute(pool)
        .await
        .with_context(|| format!("Falha ao truncar a tabela {table}"))?;
    info!("Tabela {table} truncada com sucesso");
    Ok(())
}
