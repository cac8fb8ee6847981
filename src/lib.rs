//! Plant-care backend: identify plants and diagnose plant diseases from photos.
//!
//! A photo goes through a fixed pipeline: it is written to a temp file, classified
//! by a local ONNX model, and the predicted label is matched against a SQLite
//! catalog of plants and diseases. Labels the catalog does not know are sent to an
//! LLM, whose answer is parsed and upserted so the catalog grows with use.
//!
//! | Kind | Model | Confidence |
//! |------|-------|------------|
//! | **Plant** | Zero-shot CLIP similarity over a fixed label list | `[0, 1]` |
//! | **Disease** | Single-label image classifier | `[0, 100]` |
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization, schema, migrations, and health checks
//! - [`catalog`] — Plant and disease records, label matching, listings, seeding
//! - [`inference`] — ONNX image classifiers behind a lazily loaded adapter
//! - [`enrichment`] — LLM fallback for labels missing from the catalog
//! - [`identify`] — The end-to-end identification pipeline
//! - [`server`] — HTTP API

pub mod catalog;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod identify;
pub mod inference;
pub mod server;
