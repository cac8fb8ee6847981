//! Catalog record definitions.
//!
//! [`Plant`] and [`Disease`] mirror the `plants` and `diseases` tables. The
//! enumerations ([`CareDifficulty`], [`Severity`], [`SpreadRate`]) are stored as
//! their lowercase names.

use serde::{Deserialize, Serialize};

/// How hard a plant is to keep alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl CareDifficulty {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl std::fmt::Display for CareDifficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CareDifficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            _ => Err(format!("unknown care difficulty: {s}")),
        }
    }
}

/// How dangerous a disease is to the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadRate {
    Slow,
    #[default]
    Moderate,
    Fast,
}

impl SpreadRate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Moderate => "moderate",
            Self::Fast => "fast",
        }
    }
}

impl std::fmt::Display for SpreadRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpreadRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slow" => Ok(Self::Slow),
            "moderate" => Ok(Self::Moderate),
            "fast" => Ok(Self::Fast),
            _ => Err(format!("unknown spread rate: {s}")),
        }
    }
}

/// Which catalog table a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Plant,
    Disease,
}

impl CatalogKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Plant => "plants",
            Self::Disease => "diseases",
        }
    }
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plant => "plant",
            Self::Disease => "disease",
        })
    }
}

/// A plant record, matching the `plants` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: i64,
    /// Primary display name. Unique; the upsert key for enrichment.
    pub farsi_name: String,
    pub scientific_name: Option<String>,
    pub description: String,
    pub is_toxic: bool,
    pub watering_frequency: Option<String>,
    pub light_requirements: Option<String>,
    pub fertilizer_schedule: Option<String>,
    pub temperature_range: Option<String>,
    pub humidity_level: Option<String>,
    pub soil_type: Option<String>,
    pub pruning_info: Option<String>,
    pub propagation_methods: Option<String>,
    pub care_difficulty: CareDifficulty,
    pub created_at: String,
    pub updated_at: String,
}

/// A disease record, matching the `diseases` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disease {
    pub id: i64,
    /// Unique disease name, usually the classifier label.
    pub name: String,
    pub description: String,
    pub symptoms: String,
    pub solution: String,
    pub severity_level: Severity,
    pub prevention_methods: Option<String>,
    pub treatment_duration: Option<String>,
    pub spread_rate: SpreadRate,
    pub is_infectious: bool,
    pub treatment_steps: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A photo stored against a plant. Identification uploads land here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantImage {
    pub id: i64,
    pub plant_id: i64,
    pub path: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub created_at: String,
}

/// A plant with its photos, primary first.
#[derive(Debug, Clone, Serialize)]
pub struct PlantDetail {
    #[serde(flatten)]
    pub plant: Plant,
    pub images: Vec<PlantImage>,
}

/// A disease with the catalog plants it is known to affect.
#[derive(Debug, Clone, Serialize)]
pub struct DiseaseDetail {
    #[serde(flatten)]
    pub disease: Disease,
    pub affected_plants: Vec<Plant>,
}

/// Field values for creating a plant. `id` and timestamps are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPlant {
    pub farsi_name: String,
    pub scientific_name: Option<String>,
    pub description: String,
    pub is_toxic: bool,
    pub watering_frequency: Option<String>,
    pub light_requirements: Option<String>,
    pub fertilizer_schedule: Option<String>,
    pub temperature_range: Option<String>,
    pub humidity_level: Option<String>,
    pub soil_type: Option<String>,
    pub pruning_info: Option<String>,
    pub propagation_methods: Option<String>,
    pub care_difficulty: CareDifficulty,
}

/// Field values for creating a disease.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewDisease {
    pub name: String,
    pub description: String,
    pub symptoms: String,
    pub solution: String,
    pub severity_level: Severity,
    pub prevention_methods: Option<String>,
    pub treatment_duration: Option<String>,
    pub spread_rate: SpreadRate,
    pub is_infectious: bool,
    pub treatment_steps: Vec<String>,
}

impl From<&Plant> for NewPlant {
    fn from(plant: &Plant) -> Self {
        Self {
            farsi_name: plant.farsi_name.clone(),
            scientific_name: plant.scientific_name.clone(),
            description: plant.description.clone(),
            is_toxic: plant.is_toxic,
            watering_frequency: plant.watering_frequency.clone(),
            light_requirements: plant.light_requirements.clone(),
            fertilizer_schedule: plant.fertilizer_schedule.clone(),
            temperature_range: plant.temperature_range.clone(),
            humidity_level: plant.humidity_level.clone(),
            soil_type: plant.soil_type.clone(),
            pruning_info: plant.pruning_info.clone(),
            propagation_methods: plant.propagation_methods.clone(),
            care_difficulty: plant.care_difficulty,
        }
    }
}

impl From<&Disease> for NewDisease {
    fn from(disease: &Disease) -> Self {
        Self {
            name: disease.name.clone(),
            description: disease.description.clone(),
            symptoms: disease.symptoms.clone(),
            solution: disease.solution.clone(),
            severity_level: disease.severity_level,
            prevention_methods: disease.prevention_methods.clone(),
            treatment_duration: disease.treatment_duration.clone(),
            spread_rate: disease.spread_rate,
            is_infectious: disease.is_infectious,
            treatment_steps: disease.treatment_steps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_strings() {
        for d in [CareDifficulty::Easy, CareDifficulty::Medium, CareDifficulty::Hard] {
            assert_eq!(d.as_str().parse::<CareDifficulty>().unwrap(), d);
        }
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("sluggish".parse::<SpreadRate>().is_err());
    }

    #[test]
    fn new_plant_deserializes_with_defaults() {
        let plant: NewPlant =
            serde_json::from_str(r#"{"farsi_name": "رز", "care_difficulty": "easy"}"#).unwrap();
        assert_eq!(plant.farsi_name, "رز");
        assert_eq!(plant.care_difficulty, CareDifficulty::Easy);
        assert!(!plant.is_toxic);
        assert!(plant.scientific_name.is_none());
    }
}
