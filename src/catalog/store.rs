//! Catalog persistence — row mapping, inserts, updates, and the lookup queries
//! the matcher and the degraded-mode fallback rely on.
//!
//! All containment lookups are case-insensitive (`instr(lower(col), lower(?))`)
//! and return the record with the lowest id, so "first match" is stable.

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{
    CatalogKind, Disease, DiseaseDetail, NewDisease, NewPlant, Plant, PlantDetail, PlantImage,
};

const PLANT_COLUMNS: &str = "id, farsi_name, scientific_name, description, is_toxic, \
     watering_frequency, light_requirements, fertilizer_schedule, temperature_range, \
     humidity_level, soil_type, pruning_info, propagation_methods, care_difficulty, \
     created_at, updated_at";

const DISEASE_COLUMNS: &str = "id, name, description, symptoms, solution, severity_level, \
     prevention_methods, treatment_duration, spread_rate, is_infectious, treatment_steps, \
     created_at, updated_at";

/// Plant columns the matcher is allowed to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantField {
    FarsiName,
    ScientificName,
}

impl PlantField {
    fn column(&self) -> &'static str {
        match self {
            Self::FarsiName => "farsi_name",
            Self::ScientificName => "scientific_name",
        }
    }
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub(crate) fn row_to_plant(row: &Row) -> rusqlite::Result<Plant> {
    Ok(Plant {
        id: row.get(0)?,
        farsi_name: row.get(1)?,
        scientific_name: row.get(2)?,
        description: row.get(3)?,
        is_toxic: row.get(4)?,
        watering_frequency: row.get(5)?,
        light_requirements: row.get(6)?,
        fertilizer_schedule: row.get(7)?,
        temperature_range: row.get(8)?,
        humidity_level: row.get(9)?,
        soil_type: row.get(10)?,
        pruning_info: row.get(11)?,
        propagation_methods: row.get(12)?,
        care_difficulty: parse_column(row, 13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub(crate) fn row_to_disease(row: &Row) -> rusqlite::Result<Disease> {
    let steps_json: String = row.get(10)?;
    let treatment_steps: Vec<String> = serde_json::from_str(&steps_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    Ok(Disease {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        symptoms: row.get(3)?,
        solution: row.get(4)?,
        severity_level: parse_column(row, 5)?,
        prevention_methods: row.get(6)?,
        treatment_duration: row.get(7)?,
        spread_rate: parse_column(row, 8)?,
        is_infectious: row.get(9)?,
        treatment_steps,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub(crate) fn plant_select() -> String {
    format!("SELECT {PLANT_COLUMNS} FROM plants")
}

pub(crate) fn disease_select() -> String {
    format!("SELECT {DISEASE_COLUMNS} FROM diseases")
}

// ── Plants ──────────────────────────────────────────────────────────────────

/// Insert a new plant. Fails on a duplicate `farsi_name` or `scientific_name`.
pub fn insert_plant(conn: &Connection, plant: &NewPlant) -> Result<Plant> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO plants (farsi_name, scientific_name, description, is_toxic, \
         watering_frequency, light_requirements, fertilizer_schedule, temperature_range, \
         humidity_level, soil_type, pruning_info, propagation_methods, care_difficulty, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        params![
            plant.farsi_name,
            plant.scientific_name,
            plant.description,
            plant.is_toxic,
            plant.watering_frequency,
            plant.light_requirements,
            plant.fertilizer_schedule,
            plant.temperature_range,
            plant.humidity_level,
            plant.soil_type,
            plant.pruning_info,
            plant.propagation_methods,
            plant.care_difficulty.as_str(),
            now,
        ],
    )
    .with_context(|| format!("failed to insert plant {:?}", plant.farsi_name))?;

    let id = conn.last_insert_rowid();
    get_plant(conn, id)?.context("inserted plant vanished")
}

/// Overwrite every column except the key and `created_at`.
pub fn update_plant(conn: &Connection, id: i64, plant: &NewPlant) -> Result<Plant> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE plants SET scientific_name = ?1, description = ?2, is_toxic = ?3, \
         watering_frequency = ?4, light_requirements = ?5, fertilizer_schedule = ?6, \
         temperature_range = ?7, humidity_level = ?8, soil_type = ?9, pruning_info = ?10, \
         propagation_methods = ?11, care_difficulty = ?12, updated_at = ?13 WHERE id = ?14",
        params![
            plant.scientific_name,
            plant.description,
            plant.is_toxic,
            plant.watering_frequency,
            plant.light_requirements,
            plant.fertilizer_schedule,
            plant.temperature_range,
            plant.humidity_level,
            plant.soil_type,
            plant.pruning_info,
            plant.propagation_methods,
            plant.care_difficulty.as_str(),
            now,
            id,
        ],
    )?;
    anyhow::ensure!(rows == 1, "plant not found: {id}");
    get_plant(conn, id)?.context("updated plant vanished")
}

pub fn get_plant(conn: &Connection, id: i64) -> Result<Option<Plant>> {
    let sql = format!("{} WHERE id = ?1", plant_select());
    Ok(conn.query_row(&sql, params![id], row_to_plant).optional()?)
}

/// Exact lookup by the primary display name.
pub fn find_plant_by_name(conn: &Connection, farsi_name: &str) -> Result<Option<Plant>> {
    let sql = format!("{} WHERE farsi_name = ?1", plant_select());
    Ok(conn.query_row(&sql, params![farsi_name], row_to_plant).optional()?)
}

/// Create the plant unless one with the same `farsi_name` exists.
/// Returns the record and whether it was created.
pub fn get_or_create_plant(conn: &Connection, plant: &NewPlant) -> Result<(Plant, bool)> {
    match find_plant_by_name(conn, &plant.farsi_name)? {
        Some(existing) => Ok((existing, false)),
        None => Ok((insert_plant(conn, plant)?, true)),
    }
}

/// First plant (lowest id) whose `field` contains `needle`, ignoring case.
pub fn first_plant_containing(
    conn: &Connection,
    field: PlantField,
    needle: &str,
) -> Result<Option<Plant>> {
    let col = field.column();
    let sql = format!(
        "{} WHERE instr(lower({col}), lower(?1)) > 0 ORDER BY id LIMIT 1",
        plant_select()
    );
    Ok(conn.query_row(&sql, params![needle], row_to_plant).optional()?)
}

/// First plant whose `farsi_name` or `scientific_name` contains `needle`.
pub fn first_plant_containing_either(conn: &Connection, needle: &str) -> Result<Option<Plant>> {
    let sql = format!(
        "{} WHERE instr(lower(farsi_name), lower(?1)) > 0 \
         OR instr(lower(scientific_name), lower(?1)) > 0 ORDER BY id LIMIT 1",
        plant_select()
    );
    Ok(conn.query_row(&sql, params![needle], row_to_plant).optional()?)
}

// ── Diseases ────────────────────────────────────────────────────────────────

pub fn insert_disease(conn: &Connection, disease: &NewDisease) -> Result<Disease> {
    let now = chrono::Utc::now().to_rfc3339();
    let steps = serde_json::to_string(&disease.treatment_steps)?;
    conn.execute(
        "INSERT INTO diseases (name, description, symptoms, solution, severity_level, \
         prevention_methods, treatment_duration, spread_rate, is_infectious, treatment_steps, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            disease.name,
            disease.description,
            disease.symptoms,
            disease.solution,
            disease.severity_level.as_str(),
            disease.prevention_methods,
            disease.treatment_duration,
            disease.spread_rate.as_str(),
            disease.is_infectious,
            steps,
            now,
        ],
    )
    .with_context(|| format!("failed to insert disease {:?}", disease.name))?;

    let id = conn.last_insert_rowid();
    get_disease(conn, id)?.context("inserted disease vanished")
}

/// Overwrite every column except the key and `created_at`.
pub fn update_disease(conn: &Connection, id: i64, disease: &NewDisease) -> Result<Disease> {
    let now = chrono::Utc::now().to_rfc3339();
    let steps = serde_json::to_string(&disease.treatment_steps)?;
    let rows = conn.execute(
        "UPDATE diseases SET description = ?1, symptoms = ?2, solution = ?3, \
         severity_level = ?4, prevention_methods = ?5, treatment_duration = ?6, \
         spread_rate = ?7, is_infectious = ?8, treatment_steps = ?9, updated_at = ?10 \
         WHERE id = ?11",
        params![
            disease.description,
            disease.symptoms,
            disease.solution,
            disease.severity_level.as_str(),
            disease.prevention_methods,
            disease.treatment_duration,
            disease.spread_rate.as_str(),
            disease.is_infectious,
            steps,
            now,
            id,
        ],
    )?;
    anyhow::ensure!(rows == 1, "disease not found: {id}");
    get_disease(conn, id)?.context("updated disease vanished")
}

pub fn get_disease(conn: &Connection, id: i64) -> Result<Option<Disease>> {
    let sql = format!("{} WHERE id = ?1", disease_select());
    Ok(conn.query_row(&sql, params![id], row_to_disease).optional()?)
}

pub fn find_disease_by_name(conn: &Connection, name: &str) -> Result<Option<Disease>> {
    let sql = format!("{} WHERE name = ?1", disease_select());
    Ok(conn.query_row(&sql, params![name], row_to_disease).optional()?)
}

pub fn get_or_create_disease(conn: &Connection, disease: &NewDisease) -> Result<(Disease, bool)> {
    match find_disease_by_name(conn, &disease.name)? {
        Some(existing) => Ok((existing, false)),
        None => Ok((insert_disease(conn, disease)?, true)),
    }
}

/// Case-insensitive exact name lookup.
pub fn find_disease_by_name_ci(conn: &Connection, name: &str) -> Result<Option<Disease>> {
    let sql = format!(
        "{} WHERE lower(name) = lower(?1) ORDER BY id LIMIT 1",
        disease_select()
    );
    Ok(conn.query_row(&sql, params![name], row_to_disease).optional()?)
}

/// All diseases in id order.
pub fn all_diseases(conn: &Connection) -> Result<Vec<Disease>> {
    let sql = format!("{} ORDER BY id", disease_select());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_disease)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Relations ───────────────────────────────────────────────────────────────

fn row_to_image(row: &Row) -> rusqlite::Result<PlantImage> {
    Ok(PlantImage {
        id: row.get(0)?,
        plant_id: row.get(1)?,
        path: row.get(2)?,
        caption: row.get(3)?,
        is_primary: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn add_plant_image(
    conn: &Connection,
    plant_id: i64,
    path: &str,
    caption: Option<&str>,
    is_primary: bool,
) -> Result<PlantImage> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO plant_images (plant_id, path, caption, is_primary, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![plant_id, path, caption, is_primary, now],
    )
    .with_context(|| format!("failed to add image for plant {plant_id}"))?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        "SELECT id, plant_id, path, caption, is_primary, created_at FROM plant_images WHERE id = ?1",
        params![id],
        row_to_image,
    )
    .context("inserted image vanished")
}

/// Photos of a plant, primary first, then oldest first.
pub fn plant_images(conn: &Connection, plant_id: i64) -> Result<Vec<PlantImage>> {
    let mut stmt = conn.prepare(
        "SELECT id, plant_id, path, caption, is_primary, created_at FROM plant_images \
         WHERE plant_id = ?1 ORDER BY is_primary DESC, created_at, id",
    )?;
    let rows = stmt
        .query_map(params![plant_id], row_to_image)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Record that `disease_id` affects `plant_id`. Returns whether the link is new.
pub fn link_affected_plant(conn: &Connection, disease_id: i64, plant_id: i64) -> Result<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO disease_plants (disease_id, plant_id) VALUES (?1, ?2)",
        params![disease_id, plant_id],
    )?;
    Ok(rows == 1)
}

/// Plants linked to a disease, in plant id order.
pub fn affected_plants(conn: &Connection, disease_id: i64) -> Result<Vec<Plant>> {
    let columns = PLANT_COLUMNS
        .split(", ")
        .map(|c| format!("p.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM plants p \
         JOIN disease_plants dp ON dp.plant_id = p.id \
         WHERE dp.disease_id = ?1 ORDER BY p.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![disease_id], row_to_plant)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn plant_detail(conn: &Connection, id: i64) -> Result<Option<PlantDetail>> {
    let Some(plant) = get_plant(conn, id)? else {
        return Ok(None);
    };
    let images = plant_images(conn, id)?;
    Ok(Some(PlantDetail { plant, images }))
}

pub fn disease_detail(conn: &Connection, id: i64) -> Result<Option<DiseaseDetail>> {
    let Some(disease) = get_disease(conn, id)? else {
        return Ok(None);
    };
    let affected_plants = affected_plants(conn, id)?;
    Ok(Some(DiseaseDetail {
        disease,
        affected_plants,
    }))
}

// ── Shared ──────────────────────────────────────────────────────────────────

/// Pick a uniformly random record id, or `None` when the table is empty.
pub fn random_id(conn: &Connection, kind: CatalogKind) -> Result<Option<i64>> {
    let sql = format!("SELECT id FROM {} ORDER BY RANDOM() LIMIT 1", kind.table());
    Ok(conn.query_row(&sql, [], |row| row.get(0)).optional()?)
}

pub fn count(conn: &Connection, kind: CatalogKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}
