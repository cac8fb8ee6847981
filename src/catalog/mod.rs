//! Plant and disease catalog: record types, SQLite persistence, label matching,
//! filtered listings, and seeding.

pub mod matcher;
pub mod search;
pub mod seed;
pub mod store;
pub mod types;
