//! Dim Usuario pipeline - users collection → dim_usuario
//!
//! Responsibilities:
//! - Extract the users collection from MongoDB
//! - Deduplicate by natural key, keeping the first occurrence
//! - Derive the unified analytical name and normalize email/gender/dates
//! - Extract city/state/country from the embedded address structure
//! - Drop every sensitive field (password, documents, bank, cards) by
//!   never giving it a slot in the output contract
//! - Audit null counts, then full-refresh dim_usuario (truncate + append)

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use etl_core::audit;
use etl_core::config::{MongoConfig, PostgresConfig};
use etl_core::dates::normalize_date;
use etl_core::extract::MongoSource;
use etl_core::load::{truncate_table, BATCH_SIZE};
use etl_core::normalize::{
    coerce_f64, coerce_i64, normalize_bounded, normalize_display, normalize_gender,
    normalize_identifier, normalize_text,
};
use etl_core::structured::expect_map;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Valid age interval; anything outside is kept as NULL, never rejected.
const AGE_MIN: f64 = 0.0;
const AGE_MAX: f64 = 120.0;

#[derive(Parser, Debug)]
#[command(name = "dim-usuario", about = "Carga full da dimensão de usuários")]
struct Args {
    /// Dry run - transform and audit only, skip the warehouse load
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

/// The dim_usuario column contract. Sensitive source fields (password,
/// cpf, cnpj, bank, company, crypto, card data) have no slot here.
#[derive(Debug, Clone, PartialEq)]
struct DimUsuarioRow {
    user_id: i64,
    name: String,
    email: Option<String>,
    gender: String,
    birthdate: Option<NaiveDate>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

/// Unified analytical name: first name, then maiden name when present,
/// else last name; empty parts are skipped.
fn build_name(first: Option<String>, maiden: Option<String>, last: Option<String>) -> String {
    let mut parts = Vec::new();
    if let Some(first) = first {
        parts.push(first);
    }
    if let Some(maiden) = maiden {
        parts.push(maiden);
    } else if let Some(last) = last {
        parts.push(last);
    }
    parts.join(" ")
}

/// Maps one raw snapshot to the finalized dimension, one row per
/// distinct user_id.
fn build_dim_usuario(docs: &[Value]) -> Vec<DimUsuarioRow> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut rows = Vec::new();
    let mut duplicates = 0usize;
    let mut invalid_ages = 0usize;

    for doc in docs {
        let Some(obj) = doc.as_object() else {
            warn!("Documento de usuário ignorado: não é um mapa");
            continue;
        };
        let Some(user_id) = coerce_i64(obj.get("id")) else {
            warn!("Usuário sem id válido ignorado");
            continue;
        };
        if !seen.insert(user_id) {
            duplicates += 1;
            continue;
        }

        // age is validated for the audit trail but is not part of the
        // final column set
        if coerce_f64(obj.get("age")).is_some()
            && normalize_bounded(obj.get("age"), AGE_MIN, AGE_MAX).is_none()
        {
            invalid_ages += 1;
        }

        let address = expect_map(obj.get("address"), "address");

        rows.push(DimUsuarioRow {
            user_id,
            name: build_name(
                normalize_display(obj.get("firstname")),
                normalize_display(obj.get("maidenname")),
                normalize_display(obj.get("lastname")),
            ),
            email: normalize_identifier(obj.get("email")),
            gender: normalize_gender(obj.get("gender")),
            birthdate: normalize_date(obj.get("birthdate")),
            city: normalize_text(address.get("city")),
            state: normalize_text(address.get("state")),
            country: normalize_text(address.get("country")),
        });
    }

    info!("Removidos {duplicates} usuários duplicados (chave user_id)");
    info!("{invalid_ages} idades fora do intervalo [0,120] mantidas como NULL");
    rows
}

async fn extract_usuarios(config: &MongoConfig) -> Result<Vec<Value>> {
    let source = MongoSource::connect(config).await?;
    source.fetch_collection("users").await
}

async fn insert_chunk(pool: &PgPool, rows: &[DimUsuarioRow]) -> Result<()> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO dim_usuario \
         (user_id, name, email, gender, birthdate, city, state, country) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.user_id)
            .push_bind(row.name.as_str())
            .push_bind(row.email.as_deref())
            .push_bind(row.gender.as_str())
            .push_bind(row.birthdate)
            .push_bind(row.city.as_deref())
            .push_bind(row.state.as_deref())
            .push_bind(row.country.as_deref());
    });
    builder
        .build()
        .execute(pool)
        .await
        .context("Falha no INSERT em lote da dim_usuario")?;
    Ok(())
}

async fn load_dim_usuario(config: &PostgresConfig, rows: &[DimUsuarioRow]) -> Result<()> {
    let pool = config.connect().await?;
    truncate_table(&pool, "dim_usuario").await?;
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
    let docs = match extract_usuarios(&mongo_config).await {
        Ok(docs) => docs,
        Err(e) => {
            error!("Falha ao extrair usuários do MongoDB: {e:#}");
            return Err(e);
        }
    };
    info!("Extraídos {} usuários do MongoDB", docs.len());

    // TRANSFORM
    let rows = build_dim_usuario(&docs);

    // AUDIT
    audit::report(
        "dim_usuario",
        rows.len(),
        &[
            ("email", rows.iter().filter(|r| r.email.is_none()).count()),
            ("city", rows.iter().filter(|r| r.city.is_none()).count()),
        ],
    );

    // LOAD
    if args.dry_run {
        info!("Dry run - dim_usuario não foi carregada");
        return Ok(());
    }
    let pg_config = PostgresConfig::from_env()?;
    match load_dim_usuario(&pg_config, &rows).await {
        Ok(()) => info!("dim_usuario carregada com sucesso"),
        Err(e) => {
            error!("Erro na carga da dim_usuario: {e:#}");
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
    use serde_json::json;

    fn sample_user() -> Value {
        json!({
            "id": 3,
            "firstname": "ana",
            "lastname": "silva",
            "maidenname": null,
            "email": " ANA@X.com ",
            "birthdate": "1996-5-30",
            "age": 200,
            "gender": "x",
            "address": {"city": "Recife", "state": "Pernambuco", "country": "Brazil"},
            "password": "hunter2",
            "cpf": "111.222.333-44",
            "bank": {"cardnumber": "4111111111111111"}
        })
    }

    // -------------------------------------------------------------------------
    // COLUMN CONTRACT
    // -------------------------------------------------------------------------

    #[test]
    fn test_build_normalizes_fields() {
        let rows = build_dim_usuario(&[sample_user()]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.user_id, 3);
        assert_eq!(row.name, "Ana Silva");
        assert_eq!(row.email.as_deref(), Some("ana@x.com"));
        assert_eq!(row.gender, "unknown");
        assert_eq!(row.birthdate, NaiveDate::from_ymd_opt(1996, 5, 30));
        assert_eq!(row.city.as_deref(), Some("Recife"));
        assert_eq!(row.state.as_deref(), Some("Pernambuco"));
        assert_eq!(row.country.as_deref(), Some("Brazil"));
    }

    #[test]
    fn test_gender_enumeration_closed() {
        let docs = vec![
            json!({"id": 1, "gender": "male"}),
            json!({"id": 2, "gender": "female"}),
            json!({"id": 3, "gender": "MALE"}),
            json!({"id": 4, "gender": null}),
            json!({"id": 5}),
        ];
        let rows = build_dim_usuario(&docs);
        let genders: Vec<&str> = rows.iter().map(|r| r.gender.as_str()).collect();
        assert_eq!(genders, vec!["male", "female", "unknown", "unknown", "unknown"]);
    }

    #[test]
    fn test_address_as_stringified_literal() {
        let doc = json!({"id": 7, "address": "{'city': 'Natal', 'state': 'RN'}"});
        let rows = build_dim_usuario(&[doc]);
        assert_eq!(rows[0].city.as_deref(), Some("Natal"));
        assert_eq!(rows[0].state.as_deref(), Some("RN"));
        assert_eq!(rows[0].country, None);
    }

    #[test]
    fn test_malformed_address_yields_null_location() {
        let doc = json!({"id": 8, "address": "not a map"});
        let rows = build_dim_usuario(&[doc]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].city, None);
        assert_eq!(rows[0].state, None);
        assert_eq!(rows[0].country, None);
    }

    #[test]
    fn test_invalid_birthdate_is_null() {
        let doc = json!({"id": 9, "birthdate": "soon"});
        let rows = build_dim_usuario(&[doc]);
        assert_eq!(rows[0].birthdate, None);
    }

    // -------------------------------------------------------------------------
    // NAME DERIVATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_name_prefers_maiden_name() {
        let doc = json!({"id": 1, "firstname": "maria", "maidenname": "costa", "lastname": "souza"});
        let rows = build_dim_usuario(&[doc]);
        assert_eq!(rows[0].name, "Maria Costa");
    }

    #[test]
    fn test_name_falls_back_to_last_name() {
        let doc = json!({"id": 2, "firstname": "joão", "maidenname": "nan", "lastname": "pereira"});
        let rows = build_dim_usuario(&[doc]);
        assert_eq!(rows[0].name, "João Pereira");
    }

    #[test]
    fn test_name_skips_empty_parts() {
        let doc = json!({"id": 3, "lastname": "sousa"});
        let rows = build_dim_usuario(&[doc]);
        assert_eq!(rows[0].name, "Sousa");

        let doc = json!({"id": 4});
        let rows = build_dim_usuario(&[doc]);
        assert_eq!(rows[0].name, "");
    }

    // -------------------------------------------------------------------------
    // SENSITIVE-FIELD EXCLUSION
    // -------------------------------------------------------------------------

    #[test]
    fn test_sensitive_fields_never_reach_the_row() {
        // The contract is the struct itself; a record carrying every
        // sensitive field produces exactly the same row as one without.
        let mut with_sensitive = sample_user();
        let clean = {
            let obj = with_sensitive.as_object_mut().unwrap();
            obj.remove("password");
            obj.remove("cpf");
            obj.remove("bank");
            with_sensitive.clone()
        };
        assert_eq!(
            build_dim_usuario(&[sample_user()]),
            build_dim_usuario(&[clean])
        );
    }

    // -------------------------------------------------------------------------
    // DEDUPLICATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let docs = vec![
            json!({"id": 1, "firstname": "first"}),
            json!({"id": 1, "firstname": "second"}),
        ];
        let rows = build_dim_usuario(&docs);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "First");
    }
}
