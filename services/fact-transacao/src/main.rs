//! Fact Transacao pipeline - carts collection → fact_transacao
//!
//! Responsibilities:
//! - Extract the carts collection from MongoDB
//! - Deduplicate carts by id, keeping the first occurrence
//! - Decode the embedded products list (native or stringified)
//! - Resolve one sale-level transaction date per cart
//! - Expand each cart into one fact row per line item, carrying the
//!   sale-level date onto every line
//! - Audit null counts, then full-refresh fact_transacao
//!
//! A cart with an unresolvable date still contributes its rows with a
//! null transaction_date; the post-expansion re-check is advisory only.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use etl_core::audit;
use etl_core::config::{MongoConfig, PostgresConfig};
use etl_core::dates::resolve_instant;
use etl_core::extract::MongoSource;
use etl_core::load::{truncate_table, BATCH_SIZE};
use etl_core::normalize::{coerce_f64, coerce_i64};
use etl_core::structured::expect_list;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fact-transacao", about = "Carga full da fato de transações")]
struct Args {
    /// Dry run - transform and audit only, skip the warehouse load
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

/// One transaction line. sale_id repeats across the lines of a cart;
/// the five measures are coerced independently and may be individually
/// null without discarding the row.
#[derive(Debug, Clone, PartialEq)]
struct FactTransacaoRow {
    sale_id: i64,
    user_id: Option<i64>,
    product_id: Option<i64>,
    transaction_date: Option<DateTime<Utc>>,
    quantity: Option<f64>,
    unit_price: Option<f64>,
    total_price: Option<f64>,
    discount_pct: Option<f64>,
    final_price: Option<f64>,
}

/// Measure extraction: an absent key defaults to zero before coercion;
/// a present but unparseable value stays null.
fn measure(line: &Map<String, Value>, key: &str) -> Option<f64> {
    match line.get(key) {
        None => Some(0.0),
        Some(value) => coerce_f64(Some(value)),
    }
}

/// Expands deduplicated carts into transaction-line fact rows.
fn build_fact_transacao(docs: &[Value]) -> Vec<FactTransacaoRow> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut rows = Vec::new();
    let mut duplicates = 0usize;
    let empty_line = Map::new();

    for doc in docs {
        let Some(obj) = doc.as_object() else {
            warn!("Documento de carrinho ignorado: não é um mapa");
            continue;
        };
        let Some(sale_id) = coerce_i64(obj.get("id")) else {
            warn!("Carrinho sem id válido ignorado");
            continue;
        };
        if !seen.insert(sale_id) {
            duplicates += 1;
            continue;
        }

        let context = format!("sale_id={sale_id}");
        let user_id = coerce_i64(obj.get("userid"));
        let products = expect_list(obj.get("products"), "products");

        // Sale-level date: resolved once per cart and carried onto
        // every expanded line
        let sale_date = resolve_instant(obj.get("transaction_date"), &context);

        for line in &products {
            let line = line.as_object().unwrap_or(&empty_line);
            rows.push(FactTransacaoRow {
                sale_id,
                user_id,
                product_id: coerce_i64(line.get("id")),
                transaction_date: sale_date,
                quantity: measure(line, "quantity"),
                unit_price: measure(line, "price"),
                total_price: measure(line, "total"),
                discount_pct: measure(line, "discountPercentage"),
                final_price: measure(line, "discountedTotal"),
            });
        }

        // Advisory re-check after expansion: rows already emitted for
        // this cart are kept even when the date cannot be resolved
        if resolve_instant(obj.get("transaction_date"), &context).is_none() {
            warn!("Data da venda não resolvida | sale_id={sale_id}");
        }
    }

    info!("Removidos {duplicates} carrinhos duplicados");
    rows
}

async fn extract_carrinhos(config: &MongoConfig) -> Result<Vec<Value>> {
    let source = MongoSource::connect(config).await?;
    source.fetch_collection("carts").await
}

async fn insert_chunk(pool: &PgPool, rows: &[FactTransacaoRow]) -> Result<()> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO fact_transacao \
         (sale_id, user_id, product_id, transaction_date, quantity, unit_price, \
          total_price, discount_pct, final_price) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.sale_id)
            .push_bind(row.user_id)
            .push_bind(row.product_id)
            .push_bind(row.transaction_date)
            .push_bind(row.quantity)
            .push_bind(row.unit_price)
            .push_bind(row.total_price)
            .push_bind(row.discount_pct)
            .push_bind(row.final_price);
    });
    builder
        .build()
        .execute(pool)
        .await
        .context("Falha no INSERT em lote da fact_transacao")?;
    Ok(())
}

async fn load_fact_transacao(config: &PostgresConfig, rows: &[FactTransacaoRow]) -> Result<()> {
    let pool = config.connect().await?;
    truncate_table(&pool, "fact_transacao").await?;
    for chunk in rows.chunks(BATCH_SIZE) {
        insert_chunk(&pool, chunk).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    // EXTRACT
    let mongo_config = MongoConfig::from_env()?;
    let docs = match extract_carrinhos(&mongo_config).await {
        Ok(docs) => docs,
        Err(e) => {
            error!("Falha ao extrair carrinhos do MongoDB: {e:#}");
            return Err(e);
        }
    };
    info!("Extraídos {} carrinhos do MongoDB", docs.len());

    // TRANSFORM
    let rows = build_fact_transacao(&docs);

    // AUDIT
    audit::report(
        "fact_transacao",
        rows.len(),
        &[("product_id", rows.iter().filter(|r| r.product_id.is_none()).count())],
    );

    // LOAD
    if args.dry_run {
        info!("Dry run - fact_transacao não foi carregada");
        return Ok(());
    }
    let pg_config = PostgresConfig::from_env()?;
    match load_fact_transacao(&pg_config, &rows).await {
        Ok(()) => info!("fact_transacao carregada com sucesso"),
        Err(e) => {
            error!("Erro na carga da fact_transacao: {e:#}");
            return Err(e);
        }
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_cart() -> Value {
        json!({
            "id": 1,
            "userid": 7,
            "transaction_date": "1690000000",
            "products": [
                {"id": 5, "quantity": 2, "price": 10, "total": 20,
                 "discountPercentage": 0, "discountedTotal": 20}
            ]
        })
    }

    // -------------------------------------------------------------------------
    // EXPANSION
    // -------------------------------------------------------------------------

    #[test]
    fn test_single_line_cart_expansion() {
        let rows = build_fact_transacao(&[sample_cart()]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.sale_id, 1);
        assert_eq!(row.user_id, Some(7));
        assert_eq!(row.product_id, Some(5));
        assert_eq!(
            row.transaction_date,
            Some(Utc.with_ymd_and_hms(2023, 7, 22, 4, 26, 40).unwrap())
        );
        assert_eq!(row.quantity, Some(2.0));
        assert_eq!(row.unit_price, Some(10.0));
        assert_eq!(row.total_price, Some(20.0));
        assert_eq!(row.discount_pct, Some(0.0));
        assert_eq!(row.final_price, Some(20.0));
    }

    #[test]
    fn test_expansion_cardinality() {
        let cart = json!({
            "id": 2,
            "userid": 9,
            "transaction_date": 1690000000,
            "products": [
                {"id": 1, "quantity": 1},
                {"id": 2, "quantity": 2},
                {"id": 3, "quantity": 3}
            ]
        });
        let rows = build_fact_transacao(&[cart]);
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.sale_id, 2);
            assert_eq!(row.transaction_date, rows[0].transaction_date);
        }
    }

    #[test]
    fn test_empty_product_list_contributes_no_rows() {
        let cart = json!({"id": 3, "userid": 1, "transaction_date": 1690000000, "products": []});
        assert!(build_fact_transacao(&[cart]).is_empty());
    }

    #[test]
    fn test_non_list_products_normalizes_to_empty() {
        let carts = vec![
            json!({"id": 4, "products": null}),
            json!({"id": 5, "products": "garbage"}),
            json!({"id": 6, "products": {"id": 1}}),
            json!({"id": 7}),
        ];
        assert!(build_fact_transacao(&carts).is_empty());
    }

    #[test]
    fn test_stringified_product_list_is_decoded() {
        let cart = json!({
            "id": 8,
            "userid": 2,
            "transaction_date": 1690000000,
            "products": "[{'id': 5, 'quantity': 2, 'price': 10}]"
        });
        let rows = build_fact_transacao(&[cart]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, Some(5));
        assert_eq!(rows[0].quantity, Some(2.0));
    }

    // -------------------------------------------------------------------------
    // MEASURES
    // -------------------------------------------------------------------------

    #[test]
    fn test_absent_measure_defaults_to_zero() {
        let cart = json!({"id": 9, "products": [{"id": 1}]});
        let rows = build_fact_transacao(&[cart]);
        assert_eq!(rows[0].quantity, Some(0.0));
        assert_eq!(rows[0].unit_price, Some(0.0));
        assert_eq!(rows[0].total_price, Some(0.0));
        assert_eq!(rows[0].discount_pct, Some(0.0));
        assert_eq!(rows[0].final_price, Some(0.0));
    }

    #[test]
    fn test_unparseable_measure_stays_null() {
        let cart = json!({
            "id": 10,
            "products": [{"id": 1, "quantity": "dois", "price": null, "total": 20}]
        });
        let rows = build_fact_transacao(&[cart]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity, None);
        assert_eq!(rows[0].unit_price, None);
        assert_eq!(rows[0].total_price, Some(20.0));
    }

    #[test]
    fn test_line_without_id_is_kept() {
        let cart = json!({"id": 11, "products": [{"quantity": 1, "price": 5}]});
        let rows = build_fact_transacao(&[cart]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, None);
    }

    // -------------------------------------------------------------------------
    // SALE-LEVEL DATE
    // -------------------------------------------------------------------------

    #[test]
    fn test_unresolvable_date_keeps_rows_with_null_date() {
        let cart = json!({
            "id": 12,
            "userid": 3,
            "transaction_date": "amanhã",
            "products": [{"id": 1}, {"id": 2}]
        });
        let rows = build_fact_transacao(&[cart]);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.transaction_date.is_none()));
    }

    #[test]
    fn test_iso_sale_date() {
        let cart = json!({
            "id": 13,
            "transaction_date": "2023-07-22T04:26:40Z",
            "products": [{"id": 1}]
        });
        let rows = build_fact_transacao(&[cart]);
        assert_eq!(
            rows[0].transaction_date,
            Some(Utc.with_ymd_and_hms(2023, 7, 22, 4, 26, 40).unwrap())
        );
    }

    // -------------------------------------------------------------------------
    // DEDUPLICATION / DETERMINISM
    // -------------------------------------------------------------------------

    #[test]
    fn test_duplicate_carts_keep_first() {
        let first = json!({"id": 1, "products": [{"id": 10}]});
        let second = json!({"id": 1, "products": [{"id": 20}, {"id": 30}]});
        let rows = build_fact_transacao(&[first, second]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, Some(10));
    }

    #[test]
    fn test_build_determinism() {
        let docs = vec![
            sample_cart(),
            json!({"id": 2, "transaction_date": "25/12/2023", "products": [{"id": 1}]}),
            json!({"id": 1, "products": []}),
        ];
        let baseline = build_fact_transacao(&docs);
        for _ in 0..10 {
            assert_eq!(build_fact_transacao(&docs), baseline);
        }
    }
}
