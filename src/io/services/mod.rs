//! Top-level import and export entry points.
//!
//! Both services sequence the same steps: pick a format, bind options,
//! start the background operation, block on it, then translate its terminal
//! outcome into success, failure or cancellation.

pub mod export;
pub mod import;

pub use export::ExportService;
pub use import::ImportService;
