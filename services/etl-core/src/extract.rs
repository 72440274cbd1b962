//! Document-store adapter: fetches whole collections as JSON values.
//!
//! The per-document system identity field (`_id`) is excluded at the
//! query by projection, so it never reaches the transform layer. BSON
//! scalars are converted to plain JSON on the way out; BSON datetimes
//! become RFC 3339 text and flow through the same date resolution as
//! textual timestamps.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Database};
use serde_json::{Number, Value};

use crate::config::MongoConfig;

pub struct MongoSource {
    db: Database,
}

impl MongoSource {
    /// Connects and runs a ping health check before first use.
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        let client = Client::with_uri_str(config.uri())
            .await
            .context("Falha ao conectar no MongoDB")?;
        let db = client.database(&config.database);
        db.run_command(doc! { "ping": 1 })
            .await
            .context("Health check do MongoDB falhou")?;
        Ok(Self { db })
    }

    /// Fetches an entire collection snapshot, `_id` excluded.
    pub async fn fetch_collection(&self, name: &str) -> Result<Vec<Value>> {
        let cursor = self
            .db
            .collection::<Document>(name)
            .find(doc! {})
            .projection(doc! { "_id": 0 })
            .await
            .with_context(|| format!("Falha na consulta da collection {name}"))?;
        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .with_context(|| format!("Falha ao ler a collection {name}"))?;
        Ok(docs.into_iter().map(document_to_value).collect())
    }
}

pub fn document_to_value(doc: Document) -> Value {
    Value::Object(doc.into_iter().map(|(key, value)| (key, bson_to_value(value))).collect())
}

fn bson_to_value(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Number(i.into()),
        Bson::Int64(i) => Value::Number(i.into()),
        // NaN/inf doubles have no JSON form and count as missing
        Bson::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_value).collect()),
        Bson::Document(nested) => document_to_value(nested),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map(Value::String)
            .unwrap_or(Value::Null),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Timestamp(ts) => Value::Number(u64::from(ts.time).into()),
        _ => Value::Null,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_to_value_scalars() {
        let doc = doc! {
            "id": 1_i32,
            "price": 9.99_f64,
            "stock": 99_i64,
            "title": "Essence Mascara",
            "active": true,
            "brand": Bson::Null,
        };
        let value = document_to_value(doc);
        assert_eq!(
            value,
            json!({
                "id": 1,
                "price": 9.99,
                "stock": 99,
                "title": "Essence Mascara",
                "active": true,
                "brand": null,
            })
        );
    }

    #[test]
    fn test_document_to_value_nested() {
        let doc = doc! {
            "meta": { "barcode": "123" },
            "products": [ { "id": 5_i32, "quantity": 2_i32 } ],
        };
        let value = document_to_value(doc);
        assert_eq!(value["meta"]["barcode"], json!("123"));
        assert_eq!(value["products"][0]["quantity"], json!(2));
    }

    #[test]
    fn test_bson_datetime_becomes_iso_text() {
        let dt = mongodb::bson::DateTime::from_millis(1_690_000_000_000);
        let doc = doc! { "transaction_date": dt };
        let value = document_to_value(doc);
        let text = value["transaction_date"].as_str().expect("should be text");
        assert!(text.starts_with("2023-07-22T04:26:40"), "got {text}");
    }

    #[test]
    fn test_nan_double_becomes_null() {
        let doc = doc! { "rating": f64::NAN };
        let value = document_to_value(doc);
        assert_eq!(value["rating"], Value::Null);
    }
}
