//! Filtered catalog listings backing the read-only HTTP surface.

use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::Connection;
use serde::{Deserialize, Deserializer};

use super::store::{disease_select, plant_select, row_to_disease, row_to_plant};
use super::types::{CareDifficulty, Disease, Plant, Severity, SpreadRate};

/// Query parameters for plant listings. All filters are optional and combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlantFilter {
    /// Substring over `farsi_name`, `scientific_name`, and `description`.
    pub search: Option<String>,
    /// `true` in any letter case selects toxic plants; any other value selects non-toxic ones.
    #[serde(deserialize_with = "lenient_bool")]
    pub is_toxic: Option<bool>,
    pub care_difficulty: Option<CareDifficulty>,
    /// Substring over `light_requirements`.
    pub light_requirement: Option<String>,
}

/// Query parameters for disease listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiseaseFilter {
    /// Substring over `name`, `description`, `symptoms`, and `solution`.
    pub search: Option<String>,
    pub severity_level: Option<Severity>,
    pub spread_rate: Option<SpreadRate>,
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|v| v.trim().eq_ignore_ascii_case("true")))
}

fn contains_any(columns: &[&str], idx: usize) -> String {
    let clauses: Vec<String> = columns
        .iter()
        .map(|c| format!("instr(lower({c}), lower(?{idx})) > 0"))
        .collect();
    format!("({})", clauses.join(" OR "))
}

/// Newest first, matching the admin listing order.
pub fn search_plants(conn: &Connection, filter: &PlantFilter) -> Result<Vec<Plant>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        values.push(Box::new(search.to_string()));
        clauses.push(contains_any(
            &["farsi_name", "scientific_name", "description"],
            values.len(),
        ));
    }
    if let Some(is_toxic) = filter.is_toxic {
        values.push(Box::new(is_toxic));
        clauses.push(format!("is_toxic = ?{}", values.len()));
    }
    if let Some(difficulty) = filter.care_difficulty {
        values.push(Box::new(difficulty.as_str()));
        clauses.push(format!("care_difficulty = ?{}", values.len()));
    }
    if let Some(light) = filter.light_requirement.as_deref().filter(|s| !s.is_empty()) {
        values.push(Box::new(light.to_string()));
        clauses.push(contains_any(&["light_requirements"], values.len()));
    }

    let mut sql = plant_select();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let rows = stmt
        .query_map(params.as_slice(), row_to_plant)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn search_diseases(conn: &Connection, filter: &DiseaseFilter) -> Result<Vec<Disease>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        values.push(Box::new(search.to_string()));
        clauses.push(contains_any(
            &["name", "description", "symptoms", "solution"],
            values.len(),
        ));
    }
    if let Some(severity) = filter.severity_level {
        values.push(Box::new(severity.as_str()));
        clauses.push(format!("severity_level = ?{}", values.len()));
    }
    if let Some(rate) = filter.spread_rate {
        values.push(Box::new(rate.as_str()));
        clauses.push(format!("spread_rate = ?{}", values.len()));
    }

    let mut sql = disease_select();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let rows = stmt
        .query_map(params.as_slice(), row_to_disease)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
