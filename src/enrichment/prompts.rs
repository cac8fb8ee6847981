//! Prompt text for the enrichment requests.
//!
//! Answers are requested in Persian to match the catalog's primary display names.

pub const PLANT_SYSTEM_PROMPT: &str = r#"You are an expert botanist. You will be given a plant name.
Provide care instructions for this plant in Persian (Farsi).

Return ONLY a raw JSON object, without markdown fences.
The object must have exactly these keys:
{
    "farsi_name": "common Persian name",
    "scientific_name": "Scientific name",
    "watering_frequency": "how often to water (every N days)",
    "fertilizer_schedule": "how often to fertilize",
    "care_difficulty": "آسان / متوسط / سخت",
    "is_toxic": "whether the plant is toxic to humans (True/False)",
    "light_requirements": "light needs",
    "humidity_level": "humidity needs",
    "temperature_range": "ideal temperature range",
    "soil_type": "ideal soil",
    "propagation_methods": "ways to propagate",
    "description": "general description of the plant and any other care notes"
}"#;

pub fn plant_user_prompt(label: &str) -> String {
    format!("Plant name: {label}")
}

/// System prompt for a disease. `plant` narrows the advice to one host plant.
pub fn disease_system_prompt(plant: Option<&str>) -> String {
    let context = match plant {
        Some(name) => format!("for the plant '{name}'"),
        None => "for plants".to_string(),
    };
    format!(
        r#"You are an expert plant pathologist. You will be given a plant disease name {context}.
Provide a diagnosis, an explanation, and a step-by-step treatment plan in Persian (Farsi).

Return ONLY a raw JSON object, without markdown fences.
The object must have exactly these keys:
{{
    "disease_name_fa": "Persian scientific and common name of the disease",
    "description": "one paragraph on what the disease is, its visible symptoms and its cause",
    "severity": "کم / متوسط / کشنده",
    "is_infectious": "does it spread to other plants? (بله/خیر)",
    "treatment_steps": [
        "first step, e.g. remove affected leaves",
        "second step, e.g. correct watering",
        "third step, e.g. a suitable household or chemical fungicide"
    ],
    "prevention": "one short recommendation to prevent reinfection"
}}
'treatment_steps' MUST be a JSON array of strings."#
    )
}

pub fn disease_user_prompt(label: &str) -> String {
    format!("Disease name: {label}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disease_prompt_mentions_host_plant() {
        assert!(disease_system_prompt(Some("Sansevieria")).contains("for the plant 'Sansevieria'"));
        assert!(disease_system_prompt(None).contains("for plants"));
    }

    #[test]
    fn prompts_escape_braces_correctly() {
        let prompt = disease_system_prompt(None);
        assert!(prompt.contains("{\n    \"disease_name_fa\""));
        assert!(!prompt.contains("{{"));
    }
}
