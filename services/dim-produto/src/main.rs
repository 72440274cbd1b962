//! Dim Produto pipeline - products collection → dim_produto
//!
//! Responsibilities:
//! - Extract the products collection from MongoDB
//! - Deduplicate by natural key, keeping the first occurrence
//! - Normalize text/numeric fields into the DW column contract
//! - Extract barcode and created_at from the embedded meta structure
//! - Audit null counts, then full-refresh dim_produto (truncate + append)
//!
//! The transform is a pure batch function: same snapshot in, same rows
//! out, so a rerun against unchanged source data is byte-identical.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use etl_core::audit;
use etl_core::config::{MongoConfig, PostgresConfig};
use etl_core::dates::normalize_date;
use etl_core::extract::MongoSource;
use etl_core::load::{truncate_table, BATCH_SIZE};
use etl_core::normalize::{coerce_f64, coerce_i64, normalize_code, normalize_display};
use etl_core::structured::expect_map;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dim-produto", about = "Carga full da dimensão de produtos")]
struct Args {
    /// Dry run - transform and audit only, skip the warehouse load
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

/// The dim_produto column contract. Sensitive and non-analytical source
/// fields (description, images, thumbnail) have no slot here and are
/// dropped by construction.
#[derive(Debug, Clone, PartialEq)]
struct DimProdutoRow {
    product_id: i64,
    sku: Option<String>,
    product_name: Option<String>,
    category: Option<String>,
    brand: Option<String>,
    price: Option<f64>,
    rating: Option<f64>,
    stock: Option<f64>,
    barcode: Option<String>,
    created_at: Option<NaiveDate>,
}

/// barcode may arrive as text or as a bare number; either way the column
/// is text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Maps one raw snapshot to the finalized dimension, one row per
/// distinct product_id.
fn build_dim_produto(docs: &[Value]) -> Vec<DimProdutoRow> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut rows = Vec::new();
    let mut duplicates = 0usize;

    for doc in docs {
        let Some(obj) = doc.as_object() else {
            warn!("Documento de produto ignorado: não é um mapa");
            continue;
        };
        let Some(product_id) = coerce_i64(obj.get("id")) else {
            warn!("Produto sem id válido ignorado");
            continue;
        };
        if !seen.insert(product_id) {
            duplicates += 1;
            continue;
        }

        let meta = expect_map(obj.get("meta"), "meta");

        rows.push(DimProdutoRow {
            product_id,
            sku: normalize_code(obj.get("sku")),
            product_name: normalize_display(obj.get("title")),
            category: normalize_display(obj.get("category")),
            brand: normalize_display(obj.get("brand")),
            price: coerce_f64(obj.get("price")),
            rating: coerce_f64(obj.get("rating")),
            stock: coerce_f64(obj.get("stock")),
            barcode: meta.get("barcode").and_then(scalar_text),
            created_at: normalize_date(meta.get("createdAt")),
        });
    }

    info!("Removidos {duplicates} produtos duplicados");
    rows
}

async fn extract_produtos(config: &MongoConfig) -> Result<Vec<Value>> {
    let source = MongoSource::connect(config).await?;
    source.fetch_collection("products").await
}

async fn insert_chunk(pool: &PgPool, rows: &[DimProdutoRow]) -> Result<()> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO dim_produto \
         (product_id, sku, product_name, category, brand, price, rating, stock, barcode, created_at) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.product_id)
            .push_bind(row.sku.as_deref())
            .push_bind(row.product_name.as_deref())
            .push_bind(row.category.as_deref())
            .push_bind(row.brand.as_deref())
            .push_bind(row.price)
            .push_bind(row.rating)
            .push_bind(row.stock)
            .push_bind(row.barcode.as_deref())
            .push_bind(row.created_at);
    });
    builder
        .build()
        .execute(pool)
        .await
        .context("Falha no INSERT em lote da dim_produto")?;
    Ok(())
}

async fn load_dim_produto(config: &PostgresConfig, rows: &[DimProdutoRow]) -> Result<()> {
    let pool = config.connect().await?;
    truncate_table(&pool, "dim_produto").await?;
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
    let docs = match extract_produtos(&mongo_config).await {
        Ok(docs) => docs,
        Err(e) => {
            error!("Falha ao extrair produtos do MongoDB: {e:#}");
            return Err(e);
        }
    };
    info!("Extraídos {} produtos do MongoDB", docs.len());

    // TRANSFORM
    let rows = build_dim_produto(&docs);

    // AUDIT
    audit::report(
        "dim_produto",
        rows.len(),
        &[
            ("price", rows.iter().filter(|r| r.price.is_none()).count()),
            ("category", rows.iter().filter(|r| r.category.is_none()).count()),
        ],
    );

    // LOAD
    if args.dry_run {
        info!("Dry run - dim_produto não foi carregada");
        return Ok(());
    }
    let pg_config = PostgresConfig::from_env()?;
    match load_dim_produto(&pg_config, &rows).await {
        Ok(()) => info!("dim_produto carregada com sucesso"),
        Err(e) => {
            error!("Erro na carga da dim_produto: {e:#}");
            return Err(e);
        }
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
