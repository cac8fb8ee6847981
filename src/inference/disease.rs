//! Single-label disease classifier.
//!
//! Expects a Hugging Face image-classification export in the model directory:
//! `model.onnx` (input `pixel_values`, output `logits`) and `config.json` carrying
//! the `id2label` table.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::ArrayView1;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;

use super::preprocess::{self, IMAGENET, INPUT_SIZE};
use super::{argmax, softmax, ImageClassifier, InferenceResult};

#[derive(Deserialize)]
struct HfConfig {
    id2label: BTreeMap<String, String>,
}

/// ONNX disease classifier with its label table.
pub struct DiseaseModel {
    session: Mutex<Session>,
    labels: Vec<String>,
}

impl DiseaseModel {
    pub fn load(dir: &Path, intra_threads: usize) -> Result<Self> {
        let model_path = dir.join("model.onnx");
        let config_path = dir.join("config.json");

        anyhow::ensure!(
            model_path.exists(),
            "disease model not found at {}",
            model_path.display()
        );
        anyhow::ensure!(
            config_path.exists(),
            "disease model config not found at {}",
            config_path.display()
        );

        let labels = read_labels(&config_path)?;

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(&model_path)
            .context("failed to load disease ONNX model")?;

        tracing::info!(model = %model_path.display(), labels = labels.len(), "disease model loaded");

        Ok(Self {
            session: Mutex::new(session),
            labels,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Read `id2label` into a dense, index-ordered label list.
fn read_labels(config_path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    labels_from_config(&contents)
}

fn labels_from_config(contents: &str) -> Result<Vec<String>> {
    let config: HfConfig = serde_json::from_str(contents).context("invalid model config.json")?;

    let mut indexed = config
        .id2label
        .into_iter()
        .map(|(id, label)| {
            id.parse::<usize>()
                .map(|i| (i, label))
                .with_context(|| format!("non-numeric label id: {id}"))
        })
        .collect::<Result<Vec<_>>>()?;
    indexed.sort_by_key(|(i, _)| *i);

    for (expected, (actual, _)) in indexed.iter().enumerate() {
        anyhow::ensure!(expected == *actual, "id2label has a gap at {expected}");
    }
    anyhow::ensure!(!indexed.is_empty(), "id2label is empty");

    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

impl ImageClassifier for DiseaseModel {
    fn classify(&self, image: &DynamicImage) -> Result<InferenceResult> {
        let (shape, pixels) = preprocess::to_nchw(image, INPUT_SIZE, IMAGENET);
        let input = Tensor::from_array((shape, pixels.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "pixel_values" => input,
        })?;

        let logits_value = outputs.get("logits").unwrap_or_else(|| &outputs[0]);
        let (shape, logits) = logits_value
            .try_extract_tensor::<f32>()
            .context("failed to extract logits tensor")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 2 && dims[1] as usize == self.labels.len(),
            "unexpected logits shape: {dims:?}, expected [1, {}]",
            self.labels.len()
        );

        let probs = softmax(ArrayView1::from(&logits[..self.labels.len()]));
        let scores = probs.to_vec();
        let (idx, prob) = argmax(&scores).context("empty probability vector")?;

        Ok(InferenceResult {
            label: self.labels[idx].clone(),
            confidence: prob * 100.0,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_ordered_by_numeric_id() {
        // BTreeMap orders "10" before "2"; the dense list must not.
        let mut map = serde_json::Map::new();
        for i in 0..12 {
            map.insert(i.to_string(), serde_json::Value::String(format!("label-{i}")));
        }
        let config = serde_json::json!({ "id2label": map }).to_string();

        let labels = labels_from_config(&config).unwrap();
        assert_eq!(labels.len(), 12);
        assert_eq!(labels[2], "label-2");
        assert_eq!(labels[10], "label-10");
    }

    #[test]
    fn gap_in_ids_is_rejected() {
        let config = r#"{"id2label": {"0": "healthy", "2": "rust"}}"#;
        assert!(labels_from_config(config).is_err());
    }

    #[test]
    fn missing_files_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DiseaseModel::load(dir.path(), 1).is_err());
    }

    #[test]
    #[ignore] // Requires model files under ~/.plantcare/models/disease
    fn classifies_a_leaf() {
        let config = crate::config::ModelConfig::default();
        let model = DiseaseModel::load(&config.disease_dir(), 2).unwrap();
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            300,
            300,
            image::Rgb([40, 140, 40]),
        ));
        let result = model.classify(&image).unwrap();
        assert!(model.labels().contains(&result.label));
        assert!((0.0..=100.0).contains(&result.confidence));
    }
}
