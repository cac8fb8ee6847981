//! HTTP API over the identification pipeline and the catalog.
//!
//! [`router`] builds the axum app for a given [`AppState`]; [`serve`] wires the
//! database, models and enrichment client from config and runs it until ctrl-c.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::catalog::search::{self, DiseaseFilter, PlantFilter};
use crate::catalog::store;
use crate::config::PlantcareConfig;
use crate::db;
use crate::identify::{IdentifyError, ImageInput, Identifier};

const MISSING_IMAGE: &str = "Image file not provided.";
const PLANT_NOT_FOUND: &str = "Could not identify the plant.";
const DISEASE_NOT_FOUND: &str = "Could not diagnose the disease.";

#[derive(Clone)]
pub struct AppState {
    pub identifier: Arc<Identifier>,
}

/// `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MISSING_IMAGE)
    }

    fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
    }

    fn from_identify(e: IdentifyError, not_found: &str) -> Self {
        match e {
            IdentifyError::InvalidInput(reason) => {
                tracing::info!(%reason, "rejected image input");
                Self::bad_request()
            }
            IdentifyError::NotFound => Self::not_found(not_found),
            IdentifyError::Internal(reason) => Self::internal(reason),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/plants", get(list_plants))
        .route("/api/plants/identify", post(identify_plant))
        .route("/api/plants/{id}", get(get_plant))
        .route("/api/diseases", get(list_diseases))
        .route("/api/diseases/diagnose", post(diagnose_disease))
        .route("/api/diseases/{id}", get(get_disease))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the catalog, build the pipeline and serve until ctrl-c. Models warm up in
/// the background while the listener is already accepting requests.
pub async fn serve(config: PlantcareConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let identifier = Arc::new(Identifier::from_config(
        Arc::new(std::sync::Mutex::new(conn)),
        &config,
    ));
    let _warm_up = identifier.spawn_warm_up();

    let app = router(AppState { identifier }, config.server.max_upload_bytes);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "plantcare API listening at http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Pull the image out of a multipart form (`image` field) or a JSON body
/// (`{"image": "data:..."}`). Paths are not accepted over HTTP.
async fn image_from_request(req: Request) -> Result<ImageInput, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|_| ApiError::bad_request())?;

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|_| ApiError::bad_request())?
        {
            if field.name() != Some("image") {
                continue;
            }
            let filename = field.file_name().map(str::to_string);
            let mut chunks = Vec::new();
            while let Some(chunk) = field.chunk().await.map_err(|_| ApiError::bad_request())? {
                chunks.push(chunk.to_vec());
            }
            if filename.is_none() {
                if let Some(url) = data_url_value(&chunks) {
                    return ImageInput::from_text(&url).map_err(|_| ApiError::bad_request());
                }
            }
            return Ok(ImageInput::Stream { filename, chunks });
        }
        Err(ApiError::bad_request())
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<Value>::from_request(req, &())
            .await
            .map_err(|_| ApiError::bad_request())?;
        match ImageInput::from_json(body.get("image")) {
            Ok(ImageInput::FilePath(_)) | Err(_) => Err(ApiError::bad_request()),
            Ok(input) => Ok(input),
        }
    } else {
        Err(ApiError::bad_request())
    }
}

/// A plain form value holding a data URL, as opposed to file bytes.
fn data_url_value(chunks: &[Vec<u8>]) -> Option<String> {
    let text = std::str::from_utf8(&chunks.concat()).ok()?.trim().to_string();
    text.starts_with("data:").then_some(text)
}

async fn identify_plant(State(state): State<AppState>, req: Request) -> Result<Response, ApiError> {
    let input = image_from_request(req).await?;
    let found = state
        .identifier
        .identify_plant(input)
        .await
        .map_err(|e| ApiError::from_identify(e, PLANT_NOT_FOUND))?;
    Ok(Json(found).into_response())
}

async fn diagnose_disease(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, ApiError> {
    let input = image_from_request(req).await?;
    let found = state
        .identifier
        .diagnose_disease(input)
        .await
        .map_err(|e| ApiError::from_identify(e, DISEASE_NOT_FOUND))?;
    Ok(Json(found).into_response())
}

/// Run a catalog read on a blocking thread.
async fn read_catalog<T, F>(state: &AppState, read: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> anyhow::Result<T> + Send + 'static,
{
    let db = Arc::clone(state.identifier.db());
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        read(&conn)
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(|e| ApiError::internal(format!("{e:#}")))
}

async fn list_plants(
    State(state): State<AppState>,
    Query(filter): Query<PlantFilter>,
) -> Result<Response, ApiError> {
    let plants = read_catalog(&state, move |conn| search::search_plants(conn, &filter)).await?;
    Ok(Json(plants).into_response())
}

async fn get_plant(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let plant = read_catalog(&state, move |conn| store::plant_detail(conn, id))
        .await?
        .ok_or_else(|| ApiError::not_found("Plant not found."))?;
    Ok(Json(plant).into_response())
}

async fn list_diseases(
    State(state): State<AppState>,
    Query(filter): Query<DiseaseFilter>,
) -> Result<Response, ApiError> {
    let diseases = read_catalog(&state, move |conn| search::search_diseases(conn, &filter)).await?;
    Ok(Json(diseases).into_response())
}

async fn get_disease(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let disease = read_catalog(&state, move |conn| store::disease_detail(conn, id))
        .await?
        .ok_or_else(|| ApiError::not_found("Disease not found."))?;
    Ok(Json(disease).into_response())
}
