//! Shared engine for the Mongo → Postgres dimensional ETL.
//!
//! The three table pipelines (dim_produto, dim_usuario, fact_transacao)
//! are independent binaries; everything they have in common lives here:
//!
//! - `config`: connection parameters for both stores, read from env
//! - `extract`: document-store adapter (fetch a collection as JSON values)
//! - `normalize`: per-field coercion into the analytical column types
//! - `structured`: total decoding of embedded map/list fields
//! - `dates`: resolution of ambiguously-represented timestamps
//! - `load`: truncate-and-reload helpers for the relational sink
//! - `audit`: null/validity reporting over a finalized table
//!
//! Transforms are pure batch functions over in-memory record sets; only
//! extract and load touch the network.

pub mod audit;
pub mod config;
pub mod dates;
pub mod extract;
pub mod load;
pub mod normalize;
pub mod structured;
