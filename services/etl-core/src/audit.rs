//! Null/validity reporting over a finalized table.
//!
//! Purely observational: the report never mutates the dataset and no
//! threshold halts the pipeline.

use tracing::info;

pub fn report(table: &str, total: usize, null_counts: &[(&str, usize)]) {
    info!("Auditoria de qualidade da {table}");
    info!("Total registros: {total}");
    for (column, nulls) in null_counts {
        info!("Registros com {column} nulo: {nulls}");
    }
}
