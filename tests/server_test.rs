mod helpers;

use std::sync::Arc;

use base64::Engine;
use plantcare::catalog::store;
use plantcare::identify::Identifier;
use plantcare::inference::InferenceAdapter;
use plantcare::server::{router, AppState};
use rusqlite::Connection;
use serde_json::{json, Value};

const BOUNDARY: &str = "plantcare-test-boundary";

/// Serve the API on an ephemeral port and return its base URL.
async fn spawn_app(conn: Connection, plant: Arc<InferenceAdapter>, disease: Arc<InferenceAdapter>) -> String {
    let identifier = Identifier::new(helpers::shared(conn), plant, disease, None, false);
    let app = router(
        AppState {
            identifier: Arc::new(identifier),
        },
        1024 * 1024,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn multipart_body(field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// A form field without a filename, as browsers send plain text values.
fn multipart_text_body(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
    )
    .into_bytes()
}

async fn post_multipart(url: &str, field: &str, bytes: &[u8]) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_body(field, "leaf.png", bytes))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let base = spawn_app(
        helpers::test_db(),
        helpers::unavailable_adapter(),
        helpers::unavailable_adapter(),
    )
    .await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn missing_image_is_bad_request() {
    let base = spawn_app(
        helpers::test_db(),
        helpers::fixed_adapter("Rosa (Rose)", 0.9),
        helpers::unavailable_adapter(),
    )
    .await;
    let client = reqwest::Client::new();

    let empty_json = client
        .post(format!("{base}/api/plants/identify"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty_json.status(), 400);
    let body: Value = empty_json.json().await.unwrap();
    assert_eq!(body, json!({"error": "Image file not provided."}));

    let wrong_field = post_multipart(&format!("{base}/api/plants/identify"), "photo", b"abc").await;
    assert_eq!(wrong_field.status(), 400);

    let empty_upload = post_multipart(&format!("{base}/api/diseases/diagnose"), "image", b"").await;
    assert_eq!(empty_upload.status(), 400);
}

#[tokio::test]
async fn file_paths_are_rejected_over_http() {
    let base = spawn_app(
        helpers::test_db(),
        helpers::fixed_adapter("Rosa (Rose)", 0.9),
        helpers::unavailable_adapter(),
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/plants/identify"))
        .json(&json!({"image": "/etc/hostname"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn multipart_upload_identifies_plant() {
    let conn = helpers::test_db();
    let rose = helpers::insert_plant(&conn, "Rose", Some("Rosa damascena"));
    let base = spawn_app(
        conn,
        helpers::fixed_adapter("Rosa damascena (Rose)", 0.9),
        helpers::unavailable_adapter(),
    )
    .await;

    let response = post_multipart(
        &format!("{base}/api/plants/identify"),
        "image",
        &helpers::png_bytes(),
    )
    .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], rose.id);
    assert_eq!(body["farsi_name"], "Rose");
    assert_eq!(body["detected_name"], "Rosa damascena (Rose)");
    assert_eq!(body["matched_by"], "scientific_part");
    assert_eq!(body["source"], "catalog");
}

#[tokio::test]
async fn unmatched_diagnosis_is_not_found() {
    let base = spawn_app(
        helpers::test_db(),
        helpers::unavailable_adapter(),
        helpers::fixed_adapter("Tomato___Late_blight", 91.0),
    )
    .await;

    let encoded = base64::engine::general_purpose::STANDARD.encode(helpers::png_bytes());
    let response = reqwest::Client::new()
        .post(format!("{base}/api/diseases/diagnose"))
        .json(&json!({"image": format!("data:image/png;base64,{encoded}")}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Could not diagnose the disease."}));
}

#[tokio::test]
async fn listings_filter_and_detail_lookups() {
    let conn = helpers::test_db();
    let rose = helpers::insert_plant(&conn, "Rose", Some("Rosa damascena"));
    helpers::insert_plant(&conn, "Mint", Some("Mentha spicata"));
    let mildew = helpers::insert_disease(&conn, "Powdery Mildew");
    let base = spawn_app(
        conn,
        helpers::unavailable_adapter(),
        helpers::unavailable_adapter(),
    )
    .await;

    let plants: Value = reqwest::get(format!("{base}/api/plants?search=rosa"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plants.as_array().unwrap().len(), 1);
    assert_eq!(plants[0]["id"], rose.id);

    let all: Value = reqwest::get(format!("{base}/api/plants"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let disease: Value = reqwest::get(format!("{base}/api/diseases/{}", mildew.id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(disease["name"], "Powdery Mildew");

    let missing = reqwest::get(format!("{base}/api/plants/9999")).await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn data_url_form_value_is_decoded() {
    let conn = helpers::test_db();
    let rose = helpers::insert_plant(&conn, "Rose", Some("Rosa damascena"));
    let base = spawn_app(
        conn,
        helpers::fixed_adapter("Rosa damascena (Rose)", 0.9),
        helpers::unavailable_adapter(),
    )
    .await;

    let encoded = base64::engine::general_purpose::STANDARD.encode(helpers::png_bytes());
    let response = reqwest::Client::new()
        .post(format!("{base}/api/plants/identify"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_text_body(
            "image",
            &format!("data:image/png;base64,{encoded}"),
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], rose.id);
}

#[tokio::test]
async fn detail_views_include_relations() {
    let conn = helpers::test_db();
    let tomato = helpers::insert_plant(&conn, "Tomato", Some("Solanum lycopersicum"));
    let blight = helpers::insert_disease(&conn, "Late blight");
    store::link_affected_plant(&conn, blight.id, tomato.id).unwrap();
    store::add_plant_image(&conn, tomato.id, "/srv/images/tomato.jpg", None, true).unwrap();
    let base = spawn_app(
        conn,
        helpers::unavailable_adapter(),
        helpers::unavailable_adapter(),
    )
    .await;

    let plant: Value = reqwest::get(format!("{base}/api/plants/{}", tomato.id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plant["farsi_name"], "Tomato");
    assert_eq!(plant["images"][0]["path"], "/srv/images/tomato.jpg");
    assert_eq!(plant["images"][0]["is_primary"], true);

    let disease: Value = reqwest::get(format!("{base}/api/diseases/{}", blight.id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(disease["affected_plants"][0]["id"], tomato.id);
}

#[tokio::test]
async fn toxic_filter_accepts_any_letter_case() {
    let conn = helpers::test_db();
    let mut oleander = plantcare::catalog::types::NewPlant {
        farsi_name: "Oleander".into(),
        ..Default::default()
    };
    oleander.is_toxic = true;
    store::insert_plant(&conn, &oleander).unwrap();
    helpers::insert_plant(&conn, "Mint", None);
    let base = spawn_app(
        conn,
        helpers::unavailable_adapter(),
        helpers::unavailable_adapter(),
    )
    .await;

    let response = reqwest::get(format!("{base}/api/plants?is_toxic=True")).await.unwrap();
    assert_eq!(response.status(), 200);
    let plants: Value = response.json().await.unwrap();
    assert_eq!(plants.as_array().unwrap().len(), 1);
    assert_eq!(plants[0]["farsi_name"], "Oleander");
}
