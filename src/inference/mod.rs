//! Image classification behind a uniform contract.
//!
//! [`ImageClassifier`] is the capability a loaded model provides. [`LazyModel`]
//! owns the process-wide, load-once slot for a model, and [`InferenceAdapter`]
//! turns a file on disk into a [`Classification`] without ever returning an
//! error: failures are logged and reduced to sentinels.
//!
//! Two models exist: [`disease::DiseaseModel`] (single-label ONNX classifier) and
//! [`plant::PlantModel`] (zero-shot CLIP similarity over [`plant::PLANT_LABELS`]).
//! Both run synchronously; async callers should use `tokio::task::spawn_blocking`.

pub mod disease;
pub mod plant;
pub mod preprocess;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::{Array1, ArrayView1};

/// One classification. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub label: String,
    /// Diseases report `[0, 100]`, plants `[0, 1]`.
    pub confidence: f32,
    /// Full probability distribution over the model's labels.
    pub scores: Vec<f32>,
}

/// What the adapter produced for one image.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Predicted(InferenceResult),
    /// The model could not be loaded; callers fall back to degraded mode.
    ModelUnavailable,
    /// The image could not be decoded or inference failed.
    NoResult,
}

/// A loaded model that can label a decoded image.
pub trait ImageClassifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Result<InferenceResult>;
}

type Loader<M> = Box<dyn Fn() -> Result<Arc<M>> + Send + Sync>;

/// A model loaded on first use and shared read-only afterwards.
///
/// Loading happens under the slot mutex, so concurrent first callers wait for a
/// single load instead of racing. A failed load leaves the slot empty and the
/// next call tries again.
pub struct LazyModel<M: ?Sized> {
    name: &'static str,
    loader: Loader<M>,
    slot: Mutex<Option<Arc<M>>>,
}

impl<M: ?Sized> LazyModel<M> {
    pub fn new(
        name: &'static str,
        loader: impl Fn() -> Result<Arc<M>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            loader: Box::new(loader),
            slot: Mutex::new(None),
        }
    }

    /// Return the loaded model, loading it now if needed. `None` when loading fails.
    pub fn ensure_loaded(&self) -> Option<Arc<M>> {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(model) = slot.as_ref() {
            return Some(Arc::clone(model));
        }

        tracing::info!(model = self.name, "loading model");
        match (self.loader)() {
            Ok(model) => {
                tracing::info!(model = self.name, "model loaded");
                *slot = Some(Arc::clone(&model));
                Some(model)
            }
            Err(e) => {
                tracing::error!(model = self.name, error = %format!("{e:#}"), "model failed to load");
                None
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Runs a lazily loaded classifier against image files.
pub struct InferenceAdapter {
    model: LazyModel<dyn ImageClassifier>,
}

impl InferenceAdapter {
    pub fn new(model: LazyModel<dyn ImageClassifier>) -> Self {
        Self { model }
    }

    /// Adapter over the ONNX disease classifier in `config.disease_dir()`.
    pub fn disease(config: &crate::config::ModelConfig) -> Self {
        let config = config.clone();
        Self::new(LazyModel::new("disease", move || {
            let model = disease::DiseaseModel::load(&config.disease_dir(), config.intra_threads)?;
            Ok(Arc::new(model) as Arc<dyn ImageClassifier>)
        }))
    }

    /// Adapter over the CLIP plant model in `config.plant_dir()`.
    pub fn plant(config: &crate::config::ModelConfig) -> Self {
        let config = config.clone();
        Self::new(LazyModel::new("plant", move || {
            let model = plant::PlantModel::load(&config.plant_dir(), config.intra_threads)?;
            Ok(Arc::new(model) as Arc<dyn ImageClassifier>)
        }))
    }

    pub fn ensure_loaded(&self) -> bool {
        self.model.ensure_loaded().is_some()
    }

    /// Classify the image at `path`. Never fails; see [`Classification`].
    pub fn classify(&self, path: &Path) -> Classification {
        let Some(model) = self.model.ensure_loaded() else {
            tracing::warn!(model = self.model.name(), "model unavailable, using degraded mode");
            return Classification::ModelUnavailable;
        };

        let result = open_image(path).and_then(|image| model.classify(&image));
        match result {
            Ok(result) => {
                tracing::info!(
                    model = self.model.name(),
                    label = %result.label,
                    confidence = result.confidence,
                    "image classified"
                );
                Classification::Predicted(result)
            }
            Err(e) => {
                tracing::error!(
                    model = self.model.name(),
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "classification failed"
                );
                Classification::NoResult
            }
        }
    }
}

/// Decode an image by content, not by extension.
fn open_image(path: &Path) -> Result<DynamicImage> {
    image::ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .context("failed to sniff image format")?
        .decode()
        .context("failed to decode image")
}

/// Numerically stable softmax.
pub fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Index and value of the largest element. `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLabel(&'static str);

    impl ImageClassifier for FixedLabel {
        fn classify(&self, _image: &DynamicImage) -> Result<InferenceResult> {
            Ok(InferenceResult {
                label: self.0.to_string(),
                confidence: 0.9,
                scores: vec![0.9, 0.1],
            })
        }
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(array![1.0f32, 2.0, 3.0].view());
        assert!((probs.sum() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn softmax_handles_large_logits() {
        let probs = softmax(array![1000.0f32, 1000.0].view());
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn lazy_model_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let model: LazyModel<dyn ImageClassifier> = LazyModel::new("fixed", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FixedLabel("Rose")) as Arc<dyn ImageClassifier>)
        });

        assert!(!model.is_loaded());
        assert!(model.ensure_loaded().is_some());
        assert!(model.ensure_loaded().is_some());
        assert!(model.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_model_retries_after_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let model: LazyModel<dyn ImageClassifier> = LazyModel::new("flaky", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("weights missing");
            }
            Ok(Arc::new(FixedLabel("Rose")) as Arc<dyn ImageClassifier>)
        });

        assert!(model.ensure_loaded().is_none());
        assert!(model.ensure_loaded().is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_use_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let model: Arc<LazyModel<dyn ImageClassifier>> = Arc::new(LazyModel::new("slow", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Arc::new(FixedLabel("Rose")) as Arc<dyn ImageClassifier>)
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let model = Arc::clone(&model);
                std::thread::spawn(move || model.ensure_loaded().is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unavailable_model_reports_degraded() {
        let adapter = InferenceAdapter::new(LazyModel::new("missing", || {
            anyhow::bail!("no weights on disk")
        }));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(adapter.classify(tmp.path()), Classification::ModelUnavailable);
    }

    #[test]
    fn undecodable_image_is_no_result() {
        let adapter = InferenceAdapter::new(LazyModel::new("fixed", || {
            Ok(Arc::new(FixedLabel("Rose")) as Arc<dyn ImageClassifier>)
        }));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"definitely not a png").unwrap();
        assert_eq!(adapter.classify(tmp.path()), Classification::NoResult);
    }

    #[test]
    fn decodable_image_is_predicted() {
        let adapter = InferenceAdapter::new(LazyModel::new("fixed", || {
            Ok(Arc::new(FixedLabel("Rosa (Rose)")) as Arc<dyn ImageClassifier>)
        }));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        image::RgbImage::from_pixel(8, 8, image::Rgb([20, 160, 40]))
            .save(&path)
            .unwrap();

        match adapter.classify(&path) {
            Classification::Predicted(result) => assert_eq!(result.label, "Rosa (Rose)"),
            other => panic!("expected prediction, got {other:?}"),
        }
    }
}
