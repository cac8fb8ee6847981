//! SQL DDL for the catalog tables.
//!
//! Defines `plants`, `diseases`, and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization. Columns added after v1 live in
//! [`super::migrations`].

use rusqlite::Connection;

/// Version 1 of the catalog schema.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS plants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    farsi_name TEXT NOT NULL UNIQUE,
    scientific_name TEXT UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    is_toxic INTEGER NOT NULL DEFAULT 0,
    watering_frequency TEXT,
    light_requirements TEXT,
    fertilizer_schedule TEXT,
    temperature_range TEXT,
    humidity_level TEXT,
    soil_type TEXT,
    pruning_info TEXT,
    propagation_methods TEXT,
    care_difficulty TEXT NOT NULL DEFAULT 'medium' CHECK(care_difficulty IN ('easy','medium','hard')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_plants_difficulty ON plants(care_difficulty);
CREATE INDEX IF NOT EXISTS idx_plants_toxic ON plants(is_toxic);

CREATE TABLE IF NOT EXISTS diseases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    symptoms TEXT NOT NULL DEFAULT '',
    solution TEXT NOT NULL DEFAULT '',
    severity_level TEXT NOT NULL DEFAULT 'medium' CHECK(severity_level IN ('low','medium','high','critical')),
    prevention_methods TEXT,
    treatment_duration TEXT,
    spread_rate TEXT NOT NULL DEFAULT 'moderate' CHECK(spread_rate IN ('slow','moderate','fast')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_diseases_severity ON diseases(severity_level);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
