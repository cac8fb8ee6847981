//! CLI `identify` command — run the pipeline on a local image and print the JSON result.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::ValueEnum;

use plantcare::config::PlantcareConfig;
use plantcare::identify::{IdentifyError, ImageInput, Identifier};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Kind {
    Plant,
    Disease,
}

/// `image` is a file path or a `data:` URL.
pub async fn identify(config: &PlantcareConfig, kind: Kind, image: &str) -> Result<()> {
    let input = ImageInput::from_text(image)?;

    let db_path = config.resolved_db_path();
    let conn = plantcare::db::open_database(&db_path)?;
    let identifier = Identifier::from_config(Arc::new(Mutex::new(conn)), config);

    let json = match kind {
        Kind::Plant => identifier
            .identify_plant(input)
            .await
            .map(|found| serde_json::to_string_pretty(&found)),
        Kind::Disease => identifier
            .diagnose_disease(input)
            .await
            .map(|found| serde_json::to_string_pretty(&found)),
    };

    match json {
        Ok(rendered) => {
            println!("{}", rendered.context("failed to serialize result")?);
            Ok(())
        }
        Err(IdentifyError::NotFound) => {
            let what = match kind {
                Kind::Plant => "Could not identify the plant.",
                Kind::Disease => "Could not diagnose the disease.",
            };
            anyhow::bail!(what)
        }
        Err(e) => Err(e.into()),
    }
}
