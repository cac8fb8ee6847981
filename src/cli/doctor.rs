//! CLI `doctor` command — check the database and the model cache, print a report.

use std::path::Path;

use anyhow::{Context, Result};

use plantcare::config::PlantcareConfig;
use plantcare::db;

use super::format_bytes;

const DISEASE_FILES: &[&str] = &["model.onnx", "config.json"];
const PLANT_FILES: &[&str] = &["image_encoder.onnx", "text_encoder.onnx", "tokenizer.json"];

/// Run database and model diagnostics and print a health report.
pub fn doctor(config: &PlantcareConfig) -> Result<()> {
    println!("Plantcare Health Report");
    println!("=======================");
    println!();

    report_database(config)?;
    println!();

    println!("Models ({}):", config.models.cache_dir);
    let models = &config.models;
    let disease_ok = report_model(
        &format!("Disease ({})", models.disease_model),
        &models.disease_dir(),
        DISEASE_FILES,
    );
    let plant_ok = report_model(
        &format!("Plant ({})", models.plant_model),
        &models.plant_dir(),
        PLANT_FILES,
    );
    if !(disease_ok && plant_ok) {
        println!("  Missing models put the pipeline in degraded mode (random catalog records).");
    }
    println!();

    println!("Enrichment:");
    if !config.enrichment.enabled {
        println!("  Status:          disabled");
    } else if config.enrichment.api_key.is_some() {
        println!("  Status:          enabled ({})", config.enrichment.model);
        println!("  Endpoint:        {}", config.enrichment.base_url);
    } else {
        println!("  Status:          no API key (set PLANTCARE_LLM_API_KEY)");
    }

    Ok(())
}

fn report_database(config: &PlantcareConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `plantcare seed <file>` or `plantcare serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("Row counts:");
    println!("  Plants:          {}", report.plant_count);
    println!("  Diseases:        {}", report.disease_count);
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery: restore the database from a backup, or delete it and re-run `plantcare seed`.");
    }

    Ok(())
}

/// Print one line per expected artifact. Returns whether all are present.
fn report_model(name: &str, dir: &Path, files: &[&str]) -> bool {
    println!("  {name}:");
    let mut all_present = true;
    for file in files {
        let path = dir.join(file);
        match std::fs::metadata(&path) {
            Ok(meta) => println!("    {file:<20} {}", format_bytes(meta.len())),
            Err(_) => {
                all_present = false;
                println!("    {file:<20} MISSING ({})", path.display());
            }
        }
    }
    all_present
}
