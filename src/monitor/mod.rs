// Monitoring: per-community polling loops and their tracking tables.

pub mod community;
pub mod probe;
pub mod table;
