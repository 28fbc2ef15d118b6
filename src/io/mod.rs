//! Format-agnostic import and export.
//!
//! # Architecture
//!
//! - **Format plugins** implement [`Importer`] and [`Exporter`] and register
//!   constructors in the [`FormatRegistry`] / [`ExporterRegistry`]
//! - **Detection** samples a bounded prefix of a location through a
//!   [`ResourceReader`] and asks each format in registration order
//! - **Binding** validates an untyped option map against a plugin's options
//!   struct, rejecting unknown names
//! - **Services** sequence detection, binding, background execution and the
//!   blocking wait
//!
//! # Supported Formats
//!
//! | Format | Import | Export | Notes |
//! |--------|--------|--------|-------|
//! | `xyz` | ✓ | ✓ | Extended XYZ comment line, reduced coordinates |
//! | `lammps_dump` | ✓ | ✓ | Text dumps, orthogonal and triclinic boxes |
//!
//! # Examples
//!
//! ```rust,ignore
//! use atomio::{DataSet, ExportService, ImportService, OptionMap};
//! use serde_json::json;
//!
//! let dataset = DataSet::new()?;
//! let node = ImportService::new(&dataset).import_file("in.dump", &OptionMap::new())?;
//!
//! let mut options = OptionMap::new();
//! options.insert("columns".into(), json!(["Position.X", "Position.Y", "Position.Z"]));
//! ExportService::new(&dataset).export_file(&[node], "out.xyz", "xyz", &options)?;
//! ```

pub mod binder;
pub mod columns;
pub mod fetch;
pub mod formats;
pub mod registry;
pub mod services;
pub mod traits;

pub use fetch::{HttpFetcher, RemoteFetcher, ResourceReader};
pub use registry::{
    ExporterRegistry, FormatDescriptor, FormatRegistry, global_exporter_registry,
    global_format_registry,
};
pub use services::{ExportService, ImportService};
pub use traits::{Exporter, ImportHandle, ImportMode, Importer, ImporterRef};
