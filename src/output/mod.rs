//! Output module
//!
//! File exports of a recorded session:
//! - Flat CSV table for engine data-table import

pub mod csv;

pub use self::csv::CsvExporter;
