//! Output module for reporting on the index
//!
//! Loads and prints the statistics shown by the `--stats` CLI mode.

pub mod stats;

pub use stats::{load_statistics, print_statistics, IndexStatistics};
