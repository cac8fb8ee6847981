use anyhow::Result;

use plantcare::catalog::search::{self, DiseaseFilter, PlantFilter};
use plantcare::catalog::types::{CareDifficulty, Severity};
use plantcare::config::PlantcareConfig;

/// Display catalog statistics in the terminal.
pub fn stats(config: &PlantcareConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = plantcare::db::open_database(&db_path)?;

    let plants = search::search_plants(&conn, &PlantFilter::default())?;
    let diseases = search::search_diseases(&conn, &DiseaseFilter::default())?;

    println!("Catalog Statistics");
    println!("{}", "=".repeat(40));
    println!("  Plants:              {}", plants.len());
    println!("  Toxic:               {}", plants.iter().filter(|p| p.is_toxic).count());
    println!("  Diseases:            {}", diseases.len());
    println!("  Infectious:          {}", diseases.iter().filter(|d| d.is_infectious).count());
    println!();

    println!("Plants by care difficulty:");
    for d in [CareDifficulty::Easy, CareDifficulty::Medium, CareDifficulty::Hard] {
        let count = plants.iter().filter(|p| p.care_difficulty == d).count();
        println!("  {:<12} {}", d.as_str(), count);
    }
    println!();

    println!("Diseases by severity:");
    for s in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
        let count = diseases.iter().filter(|d| d.severity_level == s).count();
        println!("  {:<12} {}", s.as_str(), count);
    }
    println!();

    // Listings are newest first.
    if let Some(newest) = plants.first() {
        println!("Newest plant:          {} ({})", newest.farsi_name, newest.created_at);
    }
    if let Some(newest) = diseases.first() {
        println!("Newest disease:        {} ({})", newest.name, newest.created_at);
    }

    Ok(())
}
