//! Zero-shot plant classifier over a fixed label vocabulary.
//!
//! A CLIP-style model split into two ONNX graphs: `text_encoder.onnx` embeds every
//! entry of [`PLANT_LABELS`] once at load time, `image_encoder.onnx` embeds each
//! query image. The label whose embedding is closest (scaled cosine similarity,
//! then softmax) wins. Confidence is a probability in `[0, 1]`.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::{Array1, Array2};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::preprocess::{self, CLIP, INPUT_SIZE};
use super::{argmax, softmax, ImageClassifier, InferenceResult};

/// CLIP context length.
const MAX_TEXT_LEN: usize = 77;

/// Temperature applied to cosine similarities before softmax.
const LOGIT_SCALE: f32 = 100.0;

/// Label vocabulary, mostly `"Scientific name (Common name)"`.
pub const PLANT_LABELS: &[&str] = &[
    "Anthurium andraeanum (Flamingo Flower)",
    "Spathiphyllum (Peace Lily)",
    "Monstera deliciosa (Swiss Cheese Plant)",
    "Philodendron hederaceum",
    "Epipremnum aureum (Pothos)",
    "Sansevieria trifasciata (Snake Plant)",
    "Zamioculcas zamiifolia (ZZ Plant)",
    "Ficus elastica (Rubber Plant)",
    "Ficus lyrata (Fiddle Leaf Fig)",
    "Dracaena marginata",
    "Chlorophytum comosum (Spider Plant)",
    "Crassula ovata (Jade Plant)",
    "Calathea orbifolia",
    "Aglaonema (Chinese Evergreen)",
    "Dieffenbachia (Dumb Cane)",
    "Syngonium podophyllum",
    "Tradescantia zebrina",
    "Peperomia obtusifolia",
    "Hoya carnosa",
    "Orchidaceae (Orchid)",
    "Rosa (Rose)",
    "Tulipa (Tulip)",
    "Helianthus (Sunflower)",
    "Lavandula (Lavender)",
    "Mentha (Mint)",
    "Ocimum basilicum (Basil)",
    "Rosmarinus officinalis (Rosemary)",
    "Cactus",
    "Succulent",
    "Fern",
    "Bamboo",
    "Bonsai",
    "Begonia maculata",
    "Strelitzia reginae (Bird of Paradise)",
    "Alocasia (Elephant Ear)",
    "Yucca",
    "Schefflera",
    "Croton",
    "Pilea peperomioides",
    "Cyclamen",
    "Kalanchoe",
    "Saintpaulia (African Violet)",
    "Hydrangea",
    "Geranium",
    "Petunia",
    "Hibiscus",
    "Jasminum (Jasmine)",
    "Bougainvillea",
    "Gardenia",
    "Magnolia",
    "Chrysanthemum",
    "Dahlia",
    "Gladiolus",
    "Iris",
    "Lilium (Lily)",
    "Narcissus (Daffodil)",
];

pub struct PlantModel {
    image_session: Mutex<Session>,
    /// `[labels, dim]`, rows L2-normalized.
    label_embeddings: Array2<f32>,
}

impl PlantModel {
    pub fn load(dir: &Path, intra_threads: usize) -> Result<Self> {
        let image_path = dir.join("image_encoder.onnx");
        let text_path = dir.join("text_encoder.onnx");
        let tokenizer_path = dir.join("tokenizer.json");

        for path in [&image_path, &text_path, &tokenizer_path] {
            anyhow::ensure!(path.exists(), "plant model file not found at {}", path.display());
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TEXT_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::Fixed(MAX_TEXT_LEN),
            ..Default::default()
        }));

        let mut text_session = build_session(&text_path, intra_threads)?;
        let label_embeddings = embed_labels(&mut text_session, &tokenizer, PLANT_LABELS)?;
        drop(text_session);

        let image_session = build_session(&image_path, intra_threads)?;

        tracing::info!(
            model = %dir.display(),
            labels = PLANT_LABELS.len(),
            dim = label_embeddings.ncols(),
            "plant model loaded"
        );

        Ok(Self {
            image_session: Mutex::new(image_session),
            label_embeddings,
        })
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Array1<f32>> {
        let (shape, pixels) = preprocess::to_nchw(image, INPUT_SIZE, CLIP);
        let input = Tensor::from_array((shape, pixels.into_boxed_slice()))?;

        let mut session = self
            .image_session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "pixel_values" => input,
        })?;

        let value = outputs.get("image_embeds").unwrap_or_else(|| &outputs[0]);
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract image_embeds tensor")?;
        let dims: &[i64] = &shape;
        let dim = self.label_embeddings.ncols();
        anyhow::ensure!(
            dims.len() == 2 && dims[1] as usize == dim,
            "unexpected image_embeds shape: {dims:?}, expected [1, {dim}]"
        );

        Ok(l2_normalize(Array1::from(data[..dim].to_vec())))
    }
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load ONNX model {}", path.display()))
}

/// Run every label through the text encoder in one batch.
fn embed_labels(session: &mut Session, tokenizer: &Tokenizer, labels: &[&str]) -> Result<Array2<f32>> {
    let encodings = tokenizer
        .encode_batch(labels.to_vec(), true)
        .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

    let batch = encodings.len();
    let mut input_ids = Vec::with_capacity(batch * MAX_TEXT_LEN);
    let mut attention_mask = Vec::with_capacity(batch * MAX_TEXT_LEN);
    for encoding in &encodings {
        input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
        attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
    }

    let shape = vec![batch as i64, MAX_TEXT_LEN as i64];
    let ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))?;
    let mask_tensor = Tensor::from_array((shape, attention_mask.into_boxed_slice()))?;

    let outputs = session.run(ort::inputs! {
        "input_ids" => ids_tensor,
        "attention_mask" => mask_tensor,
    })?;

    let value = outputs.get("text_embeds").unwrap_or_else(|| &outputs[0]);
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .context("failed to extract text_embeds tensor")?;
    let dims: &[i64] = &shape;
    anyhow::ensure!(
        dims.len() == 2 && dims[0] as usize == batch,
        "unexpected text_embeds shape: {dims:?}, expected [{batch}, dim]"
    );

    let embeddings = Array2::from_shape_vec((batch, dims[1] as usize), data.to_vec())?;
    Ok(normalize_rows(embeddings))
}

/// L2-normalize a vector. A zero vector is returned unchanged.
fn l2_normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm > 0.0 {
        v / norm
    } else {
        v
    }
}

fn normalize_rows(mut m: Array2<f32>) -> Array2<f32> {
    for mut row in m.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
    m
}

/// Probability per label for one normalized image embedding.
fn label_probabilities(label_embeddings: &Array2<f32>, image_embedding: &Array1<f32>) -> Array1<f32> {
    let logits = label_embeddings.dot(image_embedding) * LOGIT_SCALE;
    softmax(logits.view())
}

impl ImageClassifier for PlantModel {
    fn classify(&self, image: &DynamicImage) -> Result<InferenceResult> {
        let embedding = self.embed_image(image)?;
        let scores = label_probabilities(&self.label_embeddings, &embedding).to_vec();
        let (idx, prob) = argmax(&scores).context("empty probability vector")?;

        Ok(InferenceResult {
            label: PLANT_LABELS[idx].to_string(),
            confidence: prob,
            scores,
        })
    }
}
