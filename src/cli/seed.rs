//! CLI `seed` command — load plants and diseases from a JSON file.

use std::path::Path;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use plantcare::catalog::seed::{apply_seed, SeedFile};
use plantcare::config::PlantcareConfig;

pub fn seed(config: &PlantcareConfig, file: &Path) -> Result<()> {
    let seed = SeedFile::load(file)?;
    if seed.is_empty() {
        println!("Nothing to seed in {}", file.display());
        return Ok(());
    }

    let db_path = config.resolved_db_path();
    let mut conn = plantcare::db::open_database(&db_path)?;

    let pb = ProgressBar::new(seed.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.green/white} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let report = apply_seed(&mut conn, &seed, |key, _created| {
        pb.set_message(key.to_string());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    println!("Seeded {} from {}", db_path.display(), file.display());
    println!(
        "  Plants:   {} created, {} already present",
        report.plants_created, report.plants_existing
    );
    println!(
        "  Diseases: {} created, {} already present",
        report.diseases_created, report.diseases_existing
    );
    Ok(())
}
