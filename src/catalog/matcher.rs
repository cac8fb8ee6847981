//! Resolve a predicted label to a catalog record.
//!
//! Strategies run strictly in order and the first one that returns a record wins;
//! looser strategies are never consulted once a stricter one has matched. The
//! order is load-bearing: downstream behaviour and tests depend on it.
//!
//! Plant labels come from the zero-shot label list and look like
//! `"Rosa damascena (Rose)"`. Disease labels are classifier class names.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use super::store::{self, PlantField};
use super::types::{Disease, Plant};

/// Which heuristic produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Scientific part of the label found in `scientific_name`.
    ScientificPart,
    /// Parenthesized common part found in `farsi_name`.
    CommonPartInName,
    /// Parenthesized common part found in `scientific_name`.
    CommonPartInScientific,
    /// Whole label found in `farsi_name`.
    FullLabelInName,
    /// Label without parentheses found in either name field.
    WholeLabel,
    /// Case-insensitive equality with the disease name.
    ExactName,
    /// Label contains the disease name, or the other way round.
    MutualContainment,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScientificPart => "scientific_part",
            Self::CommonPartInName => "common_part_in_name",
            Self::CommonPartInScientific => "common_part_in_scientific",
            Self::FullLabelInName => "full_label_in_name",
            Self::WholeLabel => "whole_label",
            Self::ExactName => "exact_name",
            Self::MutualContainment => "mutual_containment",
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a match attempt. `record` and `matched_by` are both set or both empty.
#[derive(Debug, Clone)]
pub struct MatchOutcome<R> {
    pub record: Option<R>,
    pub matched_by: Option<MatchStrategy>,
}

impl<R> MatchOutcome<R> {
    pub fn none() -> Self {
        Self {
            record: None,
            matched_by: None,
        }
    }

    fn hit(record: R, strategy: MatchStrategy) -> Self {
        Self {
            record: Some(record),
            matched_by: Some(strategy),
        }
    }

    pub fn is_match(&self) -> bool {
        self.record.is_some()
    }
}

/// Split `"Scientific (Common)"` into its parts.
///
/// Returns `None` unless the label contains both `(` and `)`. The scientific part
/// is everything before the first `(`; the common part is everything after the
/// last `(` with every `)` removed. Both are trimmed.
pub fn split_label(label: &str) -> Option<(&str, String)> {
    if !(label.contains('(') && label.contains(')')) {
        return None;
    }
    let scientific = label.split('(').next().unwrap_or_default().trim();
    let common = label
        .rsplit('(')
        .next()
        .unwrap_or_default()
        .replace(')', "")
        .trim()
        .to_string();
    Some((scientific, common))
}

/// Host plant named by a disease class label such as `"Corn_(maize)___Common_rust_"`.
///
/// The host is everything before the `___` separator with underscores turned into
/// spaces. Labels without the separator name no host.
pub fn host_plant(label: &str) -> Option<String> {
    let (host, _) = label.split_once("___")?;
    let host = host.replace('_', " ").trim().to_string();
    (!host.is_empty()).then_some(host)
}

/// Match a plant label against the catalog.
pub fn match_plant(conn: &Connection, label: &str) -> Result<MatchOutcome<Plant>> {
    let Some((scientific, common)) = split_label(label) else {
        return Ok(match store::first_plant_containing_either(conn, label)? {
            Some(plant) => MatchOutcome::hit(plant, MatchStrategy::WholeLabel),
            None => MatchOutcome::none(),
        });
    };

    let attempts: [(PlantField, &str, MatchStrategy); 4] = [
        (PlantField::ScientificName, scientific, MatchStrategy::ScientificPart),
        (PlantField::FarsiName, common.as_str(), MatchStrategy::CommonPartInName),
        (PlantField::ScientificName, common.as_str(), MatchStrategy::CommonPartInScientific),
        (PlantField::FarsiName, label, MatchStrategy::FullLabelInName),
    ];

    for (field, needle, strategy) in attempts {
        if let Some(plant) = store::first_plant_containing(conn, field, needle)? {
            return Ok(MatchOutcome::hit(plant, strategy));
        }
    }

    Ok(MatchOutcome::none())
}

/// Match a disease label against the catalog.
pub fn match_disease(conn: &Connection, label: &str) -> Result<MatchOutcome<Disease>> {
    if let Some(disease) = store::find_disease_by_name_ci(conn, label)? {
        return Ok(MatchOutcome::hit(disease, MatchStrategy::ExactName));
    }

    let predicted = label.to_lowercase();
    for disease in store::all_diseases(conn)? {
        let name = disease.name.to_lowercase();
        if predicted.contains(&name) || name.contains(&predicted) {
            return Ok(MatchOutcome::hit(disease, MatchStrategy::MutualContainment));
        }
    }

    Ok(MatchOutcome::none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{NewDisease, NewPlant};
    use crate::db;

    fn add_plant(conn: &Connection, farsi: &str, scientific: Option<&str>) -> Plant {
        store::insert_plant(
            conn,
            &NewPlant {
                farsi_name: farsi.into(),
                scientific_name: scientific.map(Into::into),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn add_disease(conn: &Connection, name: &str) -> Disease {
        store::insert_disease(
            conn,
            &NewDisease {
                name: name.into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn host_plant_comes_from_the_class_prefix() {
        assert_eq!(host_plant("Tomato___Late_blight").as_deref(), Some("Tomato"));
        assert_eq!(
            host_plant("Corn_(maize)___Common_rust_").as_deref(),
            Some("Corn (maize)")
        );
        assert_eq!(host_plant("Powdery Mildew"), None);
        assert_eq!(host_plant("___blight"), None);
    }

    #[test]
    fn split_label_extracts_parts() {
        let (sci, common) = split_label("Rosa damascena (Rose)").unwrap();
        assert_eq!(sci, "Rosa damascena");
        assert_eq!(common, "Rose");

        let (sci, common) = split_label("Ficus lyrata (Fiddle Leaf Fig)").unwrap();
        assert_eq!(sci, "Ficus lyrata");
        assert_eq!(common, "Fiddle Leaf Fig");

        assert!(split_label("Cactus").is_none());
        assert!(split_label("Odd (label").is_none());
    }

    #[test]
    fn scientific_part_wins_first() {
        let conn = db::open_memory_database().unwrap();
        let rose = add_plant(&conn, "Rose", Some("Rosa damascena"));

        let outcome = match_plant(&conn, "Rosa damascena (Rose)").unwrap();
        assert_eq!(outcome.record.unwrap().id, rose.id);
        assert_eq!(outcome.matched_by, Some(MatchStrategy::ScientificPart));
    }

    #[test]
    fn common_part_against_name_is_second() {
        let conn = db::open_memory_database().unwrap();
        let lily = add_plant(&conn, "Peace Lily", None);

        let outcome = match_plant(&conn, "Spathiphyllum (Peace Lily)").unwrap();
        assert_eq!(outcome.record.unwrap().id, lily.id);
        assert_eq!(outcome.matched_by, Some(MatchStrategy::CommonPartInName));
    }

    #[test]
    fn common_part_against_scientific_is_third() {
        let conn = db::open_memory_database().unwrap();
        let orchid = add_plant(&conn, "ارکیده", Some("Orchid hybrid"));

        let outcome = match_plant(&conn, "Orchidaceae (Orchid)").unwrap();
        assert_eq!(outcome.record.unwrap().id, orchid.id);
        assert_eq!(outcome.matched_by, Some(MatchStrategy::CommonPartInScientific));
    }

    #[test]
    fn scientific_match_outranks_earlier_common_match() {
        let conn = db::open_memory_database().unwrap();
        let mint = add_plant(&conn, "Mint", None);
        let outcome = match_plant(&conn, "Mentha (Mint)").unwrap();
        assert_eq!(outcome.record.unwrap().id, mint.id);

        let mentha = add_plant(&conn, "پونه", Some("Mentha spicata"));
        let outcome = match_plant(&conn, "Mentha (Mint)").unwrap();
        assert_eq!(outcome.record.unwrap().id, mentha.id);
        assert_eq!(outcome.matched_by, Some(MatchStrategy::ScientificPart));
    }

    #[test]
    fn label_without_parentheses_checks_both_fields() {
        let conn = db::open_memory_database().unwrap();
        let cactus = add_plant(&conn, "کاکتوس", Some("Cactus"));

        let outcome = match_plant(&conn, "cactus").unwrap();
        assert_eq!(outcome.record.unwrap().id, cactus.id);
        assert_eq!(outcome.matched_by, Some(MatchStrategy::WholeLabel));
    }

    #[test]
    fn no_overlap_returns_none() {
        let conn = db::open_memory_database().unwrap();
        add_plant(&conn, "Rose", Some("Rosa damascena"));

        let outcome = match_plant(&conn, "Narcissus (Daffodil)").unwrap();
        assert!(!outcome.is_match());
        assert!(outcome.matched_by.is_none());

        let outcome = match_plant(&conn, "Bonsai").unwrap();
        assert!(outcome.record.is_none());
    }

    #[test]
    fn disease_exact_name_ignores_case() {
        let conn = db::open_memory_database().unwrap();
        add_disease(&conn, "Leaf Spot Disease");
        let mites = add_disease(&conn, "Spider Mites");

        let outcome = match_disease(&conn, "spider mites").unwrap();
        assert_eq!(outcome.record.unwrap().id, mites.id);
        assert_eq!(outcome.matched_by, Some(MatchStrategy::ExactName));
    }

    #[test]
    fn disease_mutual_containment_both_directions() {
        let conn = db::open_memory_database().unwrap();
        let scab = add_disease(&conn, "Apple scab");
        let rot = add_disease(&conn, "Tomato Late Blight of leaves");

        let outcome = match_disease(&conn, "Apple___Apple scab").unwrap();
        assert_eq!(outcome.record.unwrap().id, scab.id);
        assert_eq!(outcome.matched_by, Some(MatchStrategy::MutualContainment));

        let outcome = match_disease(&conn, "late blight").unwrap();
        assert_eq!(outcome.record.unwrap().id, rot.id);
    }

    #[test]
    fn disease_without_overlap_is_none() {
        let conn = db::open_memory_database().unwrap();
        add_disease(&conn, "Fusarium Wilt");
        assert!(!match_disease(&conn, "Corn_(maize)___healthy").unwrap().is_match());
    }
}
