//! Catalog seeding from a JSON file of `{"plants": [...], "diseases": [...]}`.
//!
//! Records are get-or-create by key, so seeding the same file twice is a no-op.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use std::path::Path;

use super::store;
use super::types::{NewDisease, NewPlant};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub plants: Vec<NewPlant>,
    pub diseases: Vec<SeedDisease>,
}

/// A disease entry, optionally naming the plants it affects by `farsi_name`.
#[derive(Debug, Default, Deserialize)]
pub struct SeedDisease {
    #[serde(flatten)]
    pub disease: NewDisease,
    #[serde(default)]
    pub affected_plants: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub plants_created: usize,
    pub plants_existing: usize,
    pub diseases_created: usize,
    pub diseases_existing: usize,
}

impl SeedFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        serde_json::from_str(&contents).context("failed to parse seed JSON")
    }

    pub fn len(&self) -> usize {
        self.plants.len() + self.diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply a seed file in one transaction. `on_record` is called after each record
/// with its key and whether it was newly created.
pub fn apply_seed(
    conn: &mut Connection,
    seed: &SeedFile,
    mut on_record: impl FnMut(&str, bool),
) -> Result<SeedReport> {
    let tx = conn.transaction()?;
    let mut report = SeedReport::default();

    for plant in &seed.plants {
        anyhow::ensure!(!plant.farsi_name.trim().is_empty(), "seed plant without farsi_name");
        let (_, created) = store::get_or_create_plant(&tx, plant)?;
        if created {
            report.plants_created += 1;
        } else {
            report.plants_existing += 1;
        }
        on_record(&plant.farsi_name, created);
    }

    for entry in &seed.diseases {
        let disease = &entry.disease;
        anyhow::ensure!(!disease.name.trim().is_empty(), "seed disease without name");
        let (stored, created) = store::get_or_create_disease(&tx, disease)?;
        for farsi_name in &entry.affected_plants {
            let plant = store::find_plant_by_name(&tx, farsi_name)?.with_context(|| {
                format!("disease {} lists unknown plant {farsi_name}", disease.name)
            })?;
            store::link_affected_plant(&tx, stored.id, plant.id)?;
        }
        if created {
            report.diseases_created += 1;
        } else {
            report.diseases_existing += 1;
        }
        on_record(&disease.name, created);
    }

    tx.commit()?;
    Ok(report)
}
