#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use plantcare::catalog::store;
use plantcare::catalog::types::{Disease, NewDisease, NewPlant, Plant};
use plantcare::db::{self, SharedDb};
use plantcare::enrichment::{Enricher, LlmClient};
use plantcare::inference::{ImageClassifier, InferenceAdapter, InferenceResult, LazyModel};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn shared(conn: Connection) -> SharedDb {
    Arc::new(Mutex::new(conn))
}

pub fn insert_plant(conn: &Connection, farsi_name: &str, scientific_name: Option<&str>) -> Plant {
    store::insert_plant(
        conn,
        &NewPlant {
            farsi_name: farsi_name.to_string(),
            scientific_name: scientific_name.map(str::to_string),
            description: format!("{farsi_name} description"),
            ..NewPlant::default()
        },
    )
    .unwrap()
}

pub fn insert_disease(conn: &Connection, name: &str) -> Disease {
    store::insert_disease(
        conn,
        &NewDisease {
            name: name.to_string(),
            description: format!("{name} description"),
            ..NewDisease::default()
        },
    )
    .unwrap()
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(16, 16, image::Rgb([34, 139, 34]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

struct FixedLabel {
    label: String,
    confidence: f32,
}

impl ImageClassifier for FixedLabel {
    fn classify(&self, _image: &image::DynamicImage) -> anyhow::Result<InferenceResult> {
        Ok(InferenceResult {
            label: self.label.clone(),
            confidence: self.confidence,
            scores: vec![self.confidence],
        })
    }
}

/// Adapter whose model always predicts `label`.
pub fn fixed_adapter(label: &str, confidence: f32) -> Arc<InferenceAdapter> {
    let label = label.to_string();
    Arc::new(InferenceAdapter::new(LazyModel::new("fixed", move || {
        Ok(Arc::new(FixedLabel {
            label: label.clone(),
            confidence,
        }) as Arc<dyn ImageClassifier>)
    })))
}

/// Adapter whose model never loads.
pub fn unavailable_adapter() -> Arc<InferenceAdapter> {
    Arc::new(InferenceAdapter::new(LazyModel::new("missing", || {
        anyhow::bail!("model files not present")
    })))
}

/// A local stand-in for the chat-completions endpoint.
pub struct MockLlm {
    pub base_url: String,
    pub hits: Arc<AtomicUsize>,
    pub last_request: Arc<Mutex<Option<(HeaderMap, Value)>>>,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    content: String,
    hits: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<(HeaderMap, Value)>>>,
}

async fn completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_request.lock().unwrap() = Some((headers, body));
    if !state.status.is_success() {
        return (state.status, Json(json!({ "error": { "message": "upstream failure" } })));
    }
    (
        state.status,
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": state.content } }]
        })),
    )
}

impl MockLlm {
    /// Serve `content` as the assistant message with the given status.
    pub async fn start(status: u16, content: &str) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(Mutex::new(None));
        let state = MockState {
            status: StatusCode::from_u16(status).unwrap(),
            content: content.to_string(),
            hits: Arc::clone(&hits),
            last_request: Arc::clone(&last_request),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/v1"),
            hits,
            last_request,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn enricher(&self) -> Enricher {
        Enricher::new(
            LlmClient::new(&self.base_url, "test-model", "test-key"),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }
}
