//! Tolerant parsing of LLM replies.
//!
//! The reply as a whole must be a JSON object; anything else is rejected. Inside
//! the object, individual fields are coerced leniently: strings where lists were
//! asked for, "بله" or "True" where a bool was asked for, and so on.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::types::{CareDifficulty, NewDisease, NewPlant, Severity};

const AFFIRMATIVE: &[&str] = &[
    "true", "yes", "correct", "valid", "1", "active", "positive", "سمی", "بله", "دارد",
];
/// Words that negate the one after them ("non toxic", "غیر سمی"), or prefix it ("nontoxic").
const NEGATION_MARKERS: &[&str] = &["non", "not", "غیر", "بدون"];
const NEGATABLE: &[&str] = &[
    "toxic", "poisonous", "infectious", "contagious", "سمی", "مسری", "عفونی",
];

const EASY: &[&str] = &["آسان", "ساده", "light", "easy"];
const MEDIUM: &[&str] = &["متوسط", "moderate", "medium"];
const HARD: &[&str] = &["سخت", "difficult", "hard"];

const SEVERITY_LOW: &[&str] = &["کم", "low", "mild", "خفیف"];
const SEVERITY_HIGH: &[&str] = &["high", "زیاد", "شدید", "severe"];
const SEVERITY_CRITICAL: &[&str] = &["کشنده", "critical", "fatal", "lethal"];

/// Remove a leading ```` ```json ```` or ```` ``` ```` fence and a trailing ```` ``` ````.
pub fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Decode the reply into a JSON object. Non-JSON and non-object replies fail.
pub fn parse_object(content: &str) -> Result<Map<String, Value>> {
    let value: Value =
        serde_json::from_str(strip_fences(content)).context("reply is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("reply is JSON but not an object: {}", type_name(&other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Lowercased alphanumeric runs. Punctuation, spaces and the zero-width non-joiner split words.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_negated_subject(words: &[String]) -> bool {
    let joined = words.iter().any(|w| {
        NEGATION_MARKERS
            .iter()
            .filter_map(|m| w.strip_prefix(m))
            .any(|rest| NEGATABLE.contains(&rest))
    });
    joined
        || words.windows(2).any(|pair| {
            NEGATION_MARKERS.contains(&pair[0].as_str()) && NEGATABLE.contains(&pair[1].as_str())
        })
}

/// Text for a scalar-ish field. `None` for null; arrays are joined.
pub fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(coerce_text)
                .collect::<Vec<_>>()
                .join("، "),
        ),
        other => Some(other.to_string()),
    }
}

/// A list field. A lone scalar becomes a one-element list; null becomes empty.
pub fn coerce_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(coerce_text).collect(),
        other => coerce_text(other).into_iter().collect(),
    }
}

/// Keyword-based boolean over whole words.
///
/// An explicit negation of the subject ("non-toxic", "غیر سمی") is `false`. Otherwise
/// any affirmative word makes it `true`, and everything else is `false`.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let words = words(s);
            if is_negated_subject(&words) {
                return false;
            }
            words.iter().any(|w| AFFIRMATIVE.contains(&w.as_str()))
        }
        _ => false,
    }
}

pub fn coerce_difficulty(text: &str) -> CareDifficulty {
    let lower = text.trim().to_lowercase();
    if let Ok(exact) = lower.parse() {
        return exact;
    }
    if contains_any(&lower, EASY) {
        CareDifficulty::Easy
    } else if contains_any(&lower, MEDIUM) {
        CareDifficulty::Medium
    } else if contains_any(&lower, HARD) {
        CareDifficulty::Hard
    } else {
        CareDifficulty::default()
    }
}

pub fn coerce_severity(text: &str) -> Severity {
    let lower = text.trim().to_lowercase();
    if let Ok(exact) = lower.parse() {
        return exact;
    }
    if contains_any(&lower, SEVERITY_CRITICAL) {
        Severity::Critical
    } else if contains_any(&lower, SEVERITY_HIGH) {
        Severity::High
    } else if contains_any(&lower, MEDIUM) {
        Severity::Medium
    } else if contains_any(&lower, SEVERITY_LOW) {
        Severity::Low
    } else {
        Severity::default()
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(coerce_text)
}

/// Plant fields carried by an enrichment reply. `None` means "not in the reply".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlantPayload {
    pub farsi_name: Option<String>,
    pub scientific_name: Option<String>,
    pub description: Option<String>,
    pub is_toxic: Option<bool>,
    pub watering_frequency: Option<String>,
    pub light_requirements: Option<String>,
    pub fertilizer_schedule: Option<String>,
    pub temperature_range: Option<String>,
    pub humidity_level: Option<String>,
    pub soil_type: Option<String>,
    pub pruning_info: Option<String>,
    pub propagation_methods: Option<String>,
    pub care_difficulty: Option<CareDifficulty>,
}

impl PlantPayload {
    pub fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            farsi_name: text_field(map, "farsi_name").filter(|s| !s.is_empty()),
            scientific_name: text_field(map, "scientific_name").filter(|s| !s.is_empty()),
            description: text_field(map, "description"),
            is_toxic: map.get("is_toxic").filter(|v| !v.is_null()).map(coerce_bool),
            watering_frequency: text_field(map, "watering_frequency"),
            light_requirements: text_field(map, "light_requirements"),
            fertilizer_schedule: text_field(map, "fertilizer_schedule"),
            temperature_range: text_field(map, "temperature_range"),
            humidity_level: text_field(map, "humidity_level"),
            soil_type: text_field(map, "soil_type"),
            pruning_info: text_field(map, "pruning_info"),
            propagation_methods: text_field(map, "propagation_methods"),
            care_difficulty: text_field(map, "care_difficulty").map(|s| coerce_difficulty(&s)),
        }
    }

    /// Overwrite the fields this payload carries; leave the rest alone.
    pub fn apply_to(&self, plant: &mut NewPlant) {
        fn set(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        set(&mut plant.scientific_name, &self.scientific_name);
        if let Some(description) = &self.description {
            plant.description = description.clone();
        }
        if let Some(is_toxic) = self.is_toxic {
            plant.is_toxic = is_toxic;
        }
        set(&mut plant.watering_frequency, &self.watering_frequency);
        set(&mut plant.light_requirements, &self.light_requirements);
        set(&mut plant.fertilizer_schedule, &self.fertilizer_schedule);
        set(&mut plant.temperature_range, &self.temperature_range);
        set(&mut plant.humidity_level, &self.humidity_level);
        set(&mut plant.soil_type, &self.soil_type);
        set(&mut plant.pruning_info, &self.pruning_info);
        set(&mut plant.propagation_methods, &self.propagation_methods);
        if let Some(difficulty) = self.care_difficulty {
            plant.care_difficulty = difficulty;
        }
    }
}

/// Disease details from an enrichment reply. Also returned to clients as `llm_analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiseasePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disease_name_fa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_infectious: Option<bool>,
    pub treatment_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prevention: Option<String>,
}

impl DiseasePayload {
    pub fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            disease_name_fa: text_field(map, "disease_name_fa").filter(|s| !s.is_empty()),
            description: text_field(map, "description"),
            severity: text_field(map, "severity").map(|s| coerce_severity(&s)),
            is_infectious: map
                .get("is_infectious")
                .filter(|v| !v.is_null())
                .map(coerce_bool),
            treatment_steps: map.get("treatment_steps").map(coerce_list).unwrap_or_default(),
            prevention: text_field(map, "prevention"),
        }
    }

    /// Overwrite the fields this payload carries. Treatment steps also become
    /// the newline-joined `solution`.
    pub fn apply_to(&self, disease: &mut NewDisease) {
        if let Some(description) = &self.description {
            disease.description = description.clone();
        }
        if let Some(severity) = self.severity {
            disease.severity_level = severity;
        }
        if let Some(is_infectious) = self.is_infectious {
            disease.is_infectious = is_infectious;
        }
        if !self.treatment_steps.is_empty() {
            disease.treatment_steps = self.treatment_steps.clone();
            disease.solution = self.treatment_steps.join("\n");
        }
        if let Some(prevention) = &self.prevention {
            disease.prevention_methods = Some(prevention.clone());
        }
    }
}
