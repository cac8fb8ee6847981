//! The identification pipeline.
//!
//! [`Identifier`] drives one request end to end:
//!
//! 1. [`image_input::normalize`] writes the input to a temp file.
//! 2. The relevant [`InferenceAdapter`] classifies it on a blocking thread.
//! 3. [`matcher`] resolves the label to a catalog record.
//! 4. On a miss, the [`Enricher`] asks the LLM and upserts a new record.
//! 5. Plant uploads are kept in the image store and linked to the returned plant.
//!
//! When the model cannot be loaded the pipeline runs in degraded mode and returns
//! a random catalog record, flagged with `source: "degraded"`.

pub mod image_input;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::matcher::{self, MatchOutcome, MatchStrategy};
use crate::catalog::store;
use crate::catalog::types::{CatalogKind, Disease, Plant};
use crate::config::PlantcareConfig;
use crate::db::SharedDb;
use crate::enrichment::{DiseasePayload, Enricher};
use crate::inference::{Classification, InferenceAdapter};

pub use image_input::{normalize, ImageInput, TempImage};

/// Errors that reach the caller. Everything else is absorbed and logged.
#[derive(Debug, thiserror::Error)]
pub enum IdentifyError {
    #[error("invalid image input: {0}")]
    InvalidInput(String),
    #[error("no catalog record could be produced")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Where the returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Catalog,
    Enrichment,
    /// Model unavailable; the record was picked at random.
    Degraded,
}

/// A catalog record plus how it was found.
#[derive(Debug, Clone, Serialize)]
pub struct Identification<R> {
    #[serde(flatten)]
    pub record: R,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchStrategy>,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_analysis: Option<DiseasePayload>,
}

impl<R> Identification<R> {
    fn degraded(record: R) -> Self {
        Self {
            record,
            confidence: None,
            detected_name: None,
            matched_by: None,
            source: Source::Degraded,
            llm_analysis: None,
        }
    }
}

pub struct Identifier {
    db: SharedDb,
    plant_model: Arc<InferenceAdapter>,
    disease_model: Arc<InferenceAdapter>,
    enricher: Option<Arc<Enricher>>,
    attach_disease_details: bool,
    image_store: Option<PathBuf>,
}

impl Identifier {
    pub fn new(
        db: SharedDb,
        plant_model: Arc<InferenceAdapter>,
        disease_model: Arc<InferenceAdapter>,
        enricher: Option<Enricher>,
        attach_disease_details: bool,
    ) -> Self {
        Self {
            db,
            plant_model,
            disease_model,
            enricher: enricher.map(Arc::new),
            attach_disease_details,
            image_store: None,
        }
    }

    /// Keep plant uploads under `dir` and record them in `plant_images`.
    pub fn with_image_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_store = Some(dir.into());
        self
    }

    pub fn from_config(db: SharedDb, config: &PlantcareConfig) -> Self {
        Self::new(
            db,
            Arc::new(InferenceAdapter::plant(&config.models)),
            Arc::new(InferenceAdapter::disease(&config.models)),
            Enricher::from_config(&config.enrichment),
            config.enrichment.attach_disease_details,
        )
        .with_image_store(config.resolved_images_dir())
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    /// Load both models now instead of on the first request.
    pub async fn warm_up(&self) {
        let plant = Arc::clone(&self.plant_model);
        let disease = Arc::clone(&self.disease_model);
        let loaded =
            tokio::task::spawn_blocking(move || (plant.ensure_loaded(), disease.ensure_loaded()))
                .await;
        match loaded {
            Ok((plant, disease)) => tracing::info!(plant, disease, "model warm-up finished"),
            Err(e) => tracing::error!(error = %e, "model warm-up task failed"),
        }
    }

    /// Identify the plant in `input`. On success the upload is stored against the
    /// returned plant, as its primary photo when enrichment created the record.
    /// Run [`warm_up`](Self::warm_up) on its own task and return immediately.
    pub fn spawn_warm_up(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let identifier = Arc::clone(self);
        tokio::spawn(async move { identifier.warm_up().await })
    }

    pub async fn identify_plant(
        &self,
        input: ImageInput,
    ) -> Result<Identification<Plant>, IdentifyError> {
        let (classification, upload) = classify(&self.plant_model, input).await?;
        let found = self.resolve_plant(classification).await?;
        self.keep_upload(upload, &found).await;
        Ok(found)
    }

    async fn resolve_plant(
        &self,
        classification: Classification,
    ) -> Result<Identification<Plant>, IdentifyError> {
        let result = match classification {
            Classification::Predicted(result) => result,
            Classification::ModelUnavailable => {
                return self.random_record(CatalogKind::Plant, store::get_plant).await;
            }
            Classification::NoResult => return Err(IdentifyError::NotFound),
        };

        let label = result.label.clone();
        let outcome = self
            .with_db(move |conn| matcher::match_plant(conn, &label))
            .await?;

        if let MatchOutcome {
            record: Some(plant),
            matched_by,
        } = outcome
        {
            return Ok(Identification {
                record: plant,
                confidence: Some(result.confidence),
                detected_name: Some(result.label),
                matched_by,
                source: Source::Catalog,
                llm_analysis: None,
            });
        }

        tracing::info!(label = %result.label, "no catalog match for plant, trying enrichment");
        let enricher = self.enricher.as_ref().ok_or(IdentifyError::NotFound)?;
        let plant = enricher
            .enrich_plant(&self.db, &result.label)
            .await
            .ok_or(IdentifyError::NotFound)?;

        Ok(Identification {
            record: plant,
            confidence: Some(result.confidence),
            detected_name: Some(result.label),
            matched_by: None,
            source: Source::Enrichment,
            llm_analysis: None,
        })
    }

    /// Copy the upload into the image store and link it to the plant. Failures
    /// are logged; the identification itself already succeeded.
    async fn keep_upload(&self, upload: TempImage, found: &Identification<Plant>) {
        let Some(dir) = self.image_store.clone() else {
            return;
        };
        let db = Arc::clone(&self.db);
        let plant_id = found.record.id;
        let (is_primary, caption) = match found.source {
            Source::Enrichment => (true, "Primary image from identification upload"),
            Source::Catalog | Source::Degraded => (false, "Uploaded for identification"),
        };

        let stored = tokio::task::spawn_blocking(move || {
            let path = store_upload_file(&dir, plant_id, upload.path())?;
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            store::add_plant_image(
                &conn,
                plant_id,
                &path.to_string_lossy(),
                Some(caption),
                is_primary,
            )
        })
        .await;

        match stored {
            Ok(Ok(image)) => {
                tracing::info!(plant_id, image_id = image.id, is_primary, "upload stored")
            }
            Ok(Err(e)) => {
                tracing::error!(plant_id, error = %format!("{e:#}"), "failed to store upload")
            }
            Err(e) => tracing::error!(plant_id, error = %e, "upload store task failed"),
        }
    }

    pub async fn diagnose_disease(
        &self,
        input: ImageInput,
    ) -> Result<Identification<Disease>, IdentifyError> {
        let (classification, _upload) = classify(&self.disease_model, input).await?;
        let result = match classification {
            Classification::Predicted(result) => result,
            Classification::ModelUnavailable => {
                return self.random_record(CatalogKind::Disease, store::get_disease).await;
            }
            Classification::NoResult => return Err(IdentifyError::NotFound),
        };

        let label = result.label.clone();
        let outcome = self
            .with_db(move |conn| matcher::match_disease(conn, &label))
            .await?;

        if let MatchOutcome {
            record: Some(disease),
            matched_by,
        } = outcome
        {
            let llm_analysis = match (&self.enricher, self.attach_disease_details) {
                (Some(enricher), true) => {
                    let plant = self.affected_plant_name(disease.id, &result.label).await;
                    enricher
                        .fetch_disease_details(&result.label, plant.as_deref())
                        .await
                }
                _ => None,
            };
            return Ok(Identification {
                record: disease,
                confidence: Some(result.confidence),
                detected_name: Some(result.label),
                matched_by,
                source: Source::Catalog,
                llm_analysis,
            });
        }

        tracing::info!(label = %result.label, "no catalog match for disease, trying enrichment");
        let enricher = self.enricher.as_ref().ok_or(IdentifyError::NotFound)?;
        let (disease, payload) = enricher
            .enrich_disease(&self.db, &result.label)
            .await
            .ok_or(IdentifyError::NotFound)?;

        Ok(Identification {
            record: disease,
            confidence: Some(result.confidence),
            detected_name: Some(result.label),
            matched_by: None,
            source: Source::Enrichment,
            llm_analysis: Some(payload),
        })
    }

    /// Plant to name in the disease prompt: the first catalog plant linked to the
    /// disease, else the host named by the class label.
    async fn affected_plant_name(&self, disease_id: i64, label: &str) -> Option<String> {
        let db = Arc::clone(&self.db);
        let linked = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            store::affected_plants(&conn, disease_id)
        })
        .await;

        let first = match linked {
            Ok(Ok(plants)) => plants.into_iter().next().map(|p| p.farsi_name),
            Ok(Err(e)) => {
                tracing::warn!(disease_id, error = %format!("{e:#}"), "affected plant lookup failed");
                None
            }
            Err(e) => {
                tracing::warn!(disease_id, error = %e, "affected plant lookup task failed");
                None
            }
        };
        first.or_else(|| matcher::host_plant(label))
    }

    /// Run a matcher query on a blocking thread. Query errors count as no match.
    async fn with_db<R, F>(&self, query: F) -> Result<MatchOutcome<R>, IdentifyError>
    where
        R: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> anyhow::Result<MatchOutcome<R>> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let outcome = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| IdentifyError::Internal(format!("db lock poisoned: {e}")))?;
            Ok::<_, IdentifyError>(query(&conn))
        })
        .await
        .map_err(|e| IdentifyError::Internal(format!("match task failed: {e}")))??;

        Ok(outcome.unwrap_or_else(|e| {
            tracing::error!(error = %format!("{e:#}"), "catalog lookup failed");
            MatchOutcome::none()
        }))
    }

    async fn random_record<R, G>(
        &self,
        kind: CatalogKind,
        get: G,
    ) -> Result<Identification<R>, IdentifyError>
    where
        R: Send + 'static,
        G: Fn(&rusqlite::Connection, i64) -> anyhow::Result<Option<R>> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let record = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| IdentifyError::Internal(format!("db lock poisoned: {e}")))?;
            let lookup = store::random_id(&conn, kind)
                .and_then(|id| id.map(|id| get(&conn, id)).transpose().map(Option::flatten));
            lookup.map_err(|e| IdentifyError::Internal(format!("{e:#}")))
        })
        .await
        .map_err(|e| IdentifyError::Internal(format!("lookup task failed: {e}")))??;

        match record {
            Some(record) => {
                tracing::warn!(kind = %kind, "returning random record in degraded mode");
                Ok(Identification::degraded(record))
            }
            None => Err(IdentifyError::NotFound),
        }
    }
}

/// Normalize and classify on a blocking thread. The temp file is handed back so
/// the caller decides how long it lives.
async fn classify(
    adapter: &Arc<InferenceAdapter>,
    input: ImageInput,
) -> Result<(Classification, TempImage), IdentifyError> {
    let adapter = Arc::clone(adapter);
    tokio::task::spawn_blocking(move || {
        let image = normalize(&input)?;
        let classification = adapter.classify(image.path());
        Ok((classification, image))
    })
    .await
    .map_err(|e| IdentifyError::Internal(format!("inference task failed: {e}")))?
}

/// Copy `source` into `dir` under a unique `plant-<id>-*.<ext>` name.
fn store_upload_file(dir: &Path, plant_id: i64, source: &Path) -> anyhow::Result<PathBuf> {
    use anyhow::Context;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create image dir {}", dir.display()))?;
    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg");
    let bytes = std::fs::read(source)
        .with_context(|| format!("failed to read upload {}", source.display()))?;

    let mut file = tempfile::Builder::new()
        .prefix(&format!("plant-{plant_id}-"))
        .suffix(&format!(".{extension}"))
        .tempfile_in(dir)
        .context("failed to create image file")?;
    file.write_all(&bytes).context("failed to write image file")?;
    let (_, path) = file.keep().context("failed to keep image file")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::NewPlant;

    #[test]
    fn identification_flattens_record() {
        let conn = crate::db::open_memory_database().unwrap();
        let plant = store::insert_plant(
            &conn,
            &NewPlant {
                farsi_name: "رز".into(),
                ..NewPlant::default()
            },
        )
        .unwrap();

        let json = serde_json::to_value(Identification {
            record: plant,
            confidence: Some(0.5),
            detected_name: Some("Rosa (Rose)".into()),
            matched_by: Some(MatchStrategy::CommonPartInName),
            source: Source::Catalog,
            llm_analysis: None,
        })
        .unwrap();

        assert_eq!(json["farsi_name"], "رز");
        assert_eq!(json["confidence"], 0.5);
        assert_eq!(json["matched_by"], "common_part_in_name");
        assert_eq!(json["source"], "catalog");
        assert!(json.get("llm_analysis").is_none());
    }

    #[test]
    fn stored_upload_keeps_bytes_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let upload = normalize(&ImageInput::upload(Some("leaf.png".into()), b"pixels".to_vec()))
            .unwrap();

        let path = store_upload_file(&dir.path().join("images"), 7, upload.path()).unwrap();
        drop(upload);

        assert!(path.starts_with(dir.path().join("images")));
        assert_eq!(path.extension().unwrap(), "png");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("plant-7-"));
        assert_eq!(std::fs::read(&path).unwrap(), b"pixels");
    }

    #[test]
    fn degraded_identification_omits_prediction_fields() {
        let json = serde_json::to_value(Identification::degraded(serde_json::json!({"id": 3})))
            .unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["source"], "degraded");
        assert!(json.get("confidence").is_none());
    }
}
