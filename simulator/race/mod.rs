// Race Simulator Module

pub mod config;
// the TSV writer is only used by race_runner
#[allow(dead_code)]
pub mod report;
pub mod start_order;

// Re-export commonly used types
pub use config::RaceFile;
pub use start_order::RaceStartOrder;
