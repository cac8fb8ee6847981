//! LLM enrichment for labels the catalog does not know yet.
//!
//! When a predicted label has no catalog match, [`Enricher`] asks a chat-completions
//! endpoint for structured details, parses them leniently ([`parse`]) and upserts
//! the result so the next identification of the same label is a plain catalog hit.
//!
//! Every failure on this path (network, status, malformed reply, database) is
//! logged here and surfaces to callers as `None`.

pub mod client;
pub mod parse;
pub mod prompts;

use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::catalog::{matcher, store};
use crate::catalog::types::{Disease, NewDisease, NewPlant, Plant};
use crate::config::EnrichmentConfig;
use crate::db::SharedDb;

pub use client::LlmClient;
pub use parse::{DiseasePayload, PlantPayload};

pub struct Enricher {
    client: LlmClient,
    plant_timeout: Duration,
    disease_timeout: Duration,
}

impl Enricher {
    pub fn new(client: LlmClient, plant_timeout: Duration, disease_timeout: Duration) -> Self {
        Self {
            client,
            plant_timeout,
            disease_timeout,
        }
    }

    /// `None` when enrichment is disabled or has no credential.
    pub fn from_config(config: &EnrichmentConfig) -> Option<Self> {
        let client = LlmClient::from_config(config)?;
        Some(Self::new(
            client,
            Duration::from_secs(config.plant_timeout_secs),
            Duration::from_secs(config.disease_timeout_secs),
        ))
    }

    async fn fetch_object(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
        label: &str,
    ) -> Option<Map<String, Value>> {
        let content = match self.client.complete(system, user, timeout).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(label, error = %format!("{e:#}"), "enrichment request failed");
                return None;
            }
        };

        match parse::parse_object(&content) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!(label, error = %format!("{e:#}"), reply = ?content, "unusable enrichment reply");
                None
            }
        }
    }

    pub async fn fetch_plant(&self, label: &str) -> Option<PlantPayload> {
        let map = self
            .fetch_object(
                prompts::PLANT_SYSTEM_PROMPT,
                &prompts::plant_user_prompt(label),
                self.plant_timeout,
                label,
            )
            .await?;
        Some(PlantPayload::from_object(&map))
    }

    /// Disease details without touching the catalog.
    pub async fn fetch_disease_details(
        &self,
        label: &str,
        plant: Option<&str>,
    ) -> Option<DiseasePayload> {
        let map = self
            .fetch_object(
                &prompts::disease_system_prompt(plant),
                &prompts::disease_user_prompt(label),
                self.disease_timeout,
                label,
            )
            .await?;
        Some(DiseasePayload::from_object(&map))
    }

    /// Fetch details for `label` and upsert them as a plant.
    pub async fn enrich_plant(&self, db: &SharedDb, label: &str) -> Option<Plant> {
        let payload = self.fetch_plant(label).await?;
        let db = SharedDb::clone(db);
        let label_owned = label.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            upsert_plant(&mut conn, &label_owned, &payload)
        })
        .await;

        log_upsert(label, "plant", result)
    }

    /// Fetch details for `label` and upsert them as a disease keyed by the label.
    ///
    /// The prompt names the host plant when the label carries one.
    pub async fn enrich_disease(
        &self,
        db: &SharedDb,
        label: &str,
    ) -> Option<(Disease, DiseasePayload)> {
        let host = matcher::host_plant(label);
        let payload = self.fetch_disease_details(label, host.as_deref()).await?;
        let db = SharedDb::clone(db);
        let label_owned = label.to_string();
        let for_upsert = payload.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            upsert_disease(&mut conn, &label_owned, &for_upsert)
        })
        .await;

        log_upsert(label, "disease", result).map(|disease| (disease, payload))
    }
}

fn log_upsert<R>(
    label: &str,
    kind: &str,
    result: std::result::Result<Result<R>, tokio::task::JoinError>,
) -> Option<R> {
    match result {
        Ok(Ok(record)) => {
            tracing::info!(label, kind, "catalog enriched");
            Some(record)
        }
        Ok(Err(e)) => {
            tracing::error!(label, kind, error = %format!("{e:#}"), "enrichment upsert failed");
            None
        }
        Err(e) => {
            tracing::error!(label, kind, error = %e, "enrichment upsert task failed");
            None
        }
    }
}

/// Create or update the plant keyed by the payload's `farsi_name` (or `label`).
///
/// Existing records keep any field the payload does not carry.
pub fn upsert_plant(conn: &mut Connection, label: &str, payload: &PlantPayload) -> Result<Plant> {
    let key = payload.farsi_name.as_deref().unwrap_or(label);
    let tx = conn.transaction()?;

    let plant = match store::find_plant_by_name(&tx, key)? {
        Some(existing) => {
            let mut fields = NewPlant::from(&existing);
            payload.apply_to(&mut fields);
            store::update_plant(&tx, existing.id, &fields)?
        }
        None => {
            let mut fields = NewPlant {
                farsi_name: key.to_string(),
                ..NewPlant::default()
            };
            payload.apply_to(&mut fields);
            store::insert_plant(&tx, &fields)?
        }
    };

    tx.commit()?;
    Ok(plant)
}

/// Create or update the disease named `label`.
pub fn upsert_disease(
    conn: &mut Connection,
    label: &str,
    payload: &DiseasePayload,
) -> Result<Disease> {
    let tx = conn.transaction()?;

    let disease = match store::find_disease_by_name(&tx, label)? {
        Some(existing) => {
            let mut fields = NewDisease::from(&existing);
            payload.apply_to(&mut fields);
            store::update_disease(&tx, existing.id, &fields)?
        }
        None => {
            let mut fields = NewDisease {
                name: label.to_string(),
                ..NewDisease::default()
            };
            payload.apply_to(&mut fields);
            store::insert_disease(&tx, &fields)?
        }
    };

    tx.commit()?;
    Ok(disease)
}
