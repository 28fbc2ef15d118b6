//! # Atomio
//!
//! Format-agnostic import and export of atomistic data files.
//!
//! Atomio lets a caller say "load this file" or "write these nodes to a file"
//! without knowing the concrete file format up front. Loading runs on a
//! background executor so a hosting application stays responsive, while
//! scripts still get a simple blocking call.
//!
//! ## Features
//!
//! - Format autodetection from a bounded prefix of the file
//! - Format-agnostic option passing with strict rejection of unknown options
//! - Multi-frame (trajectory) scanning on request
//! - Blocking, cancellable waits over background load operations
//! - Append-only importer/exporter registries that plugins extend at startup
//!
//! ## Example
//!
//! ```rust,ignore
//! use atomio::{DataSet, ImportService, OptionMap};
//! use serde_json::json;
//!
//! let dataset = DataSet::new()?;
//! let mut options = OptionMap::new();
//! options.insert(
//!     "columns".into(),
//!     json!(["Particle Identifier", "Position.X", "Position.Y", "Position.Z"]),
//! );
//! let node = ImportService::new(&dataset).import_file("a.xyz", &options)?;
//! let data = node.source().data(dataset.current_time())?;
//! println!("{} particles", data.particle_count());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod dataset;
pub mod io;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod scene;

pub use config::AtomioConfig;
pub use dataset::DataSet;
pub use io::{
    ExportService, Exporter, ExporterRegistry, FormatDescriptor, FormatRegistry, ImportMode,
    ImportService, Importer, ImporterRef,
};
pub use models::{
    DataCollection, FrameDescriptor, Location, OptionMap, PipelineStatus, StatusType, TimePoint,
};
pub use pipeline::{FileSource, Outcome, PendingOperation, SourceState, TaskContext, TaskManager};
pub use scene::{NodeId, NodeRef, ObjectNode, Scene};

/// Error type for atomio operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `UnsupportedFormat` | No registered format recognizes the sampled file prefix |
/// | `UnknownOption` | An option name is not a field of the importer/exporter options |
/// | `InvalidOptionValue` | A known option received a value of the wrong shape |
/// | `UnknownFormat` | `export_file` is called with an unregistered format name |
/// | `InvalidExportOptions` | Exporter construction rejects the supplied options |
/// | `Canceled` | The user aborted a long-running operation |
/// | `ImportFailed` / `ExportFailed` | A format plugin reported a data-level error |
/// | `OperationFailed` | I/O or infrastructure failures (thread pools, locks) |
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// Format detection found no matching importer.
    ///
    /// Recoverable: the caller must supply a different file or the format is
    /// genuinely unsupported. Never retried automatically.
    #[error("could not detect the format of '{location}'; the format might not be supported")]
    UnsupportedFormat {
        /// The location that was probed.
        location: String,
    },

    /// An option name does not exist on the target importer or exporter.
    #[error("{target} has no option named '{name}'")]
    UnknownOption {
        /// The importer or exporter that rejected the option.
        target: String,
        /// The offending option name.
        name: String,
    },

    /// A known option was given a value it cannot hold.
    #[error("invalid value for option '{name}': {cause}")]
    InvalidOptionValue {
        /// The option name.
        name: String,
        /// Why the value was rejected.
        cause: String,
    },

    /// No exporter is registered under the requested format name.
    #[error("unknown output file format: {0}")]
    UnknownFormat(String),

    /// The exporter could not be constructed from the supplied options.
    #[error("invalid export options: {0}")]
    InvalidExportOptions(String),

    /// The operation was canceled by the user.
    #[error("operation has been canceled by the user")]
    Canceled,

    /// The importer reported a data-level error. The message is the plugin's.
    #[error("file import failed: {0}")]
    ImportFailed(String),

    /// The exporter reported a data-level error. The message is the plugin's.
    #[error("file export failed: {0}")]
    ExportFailed(String),

    /// Invalid input was provided (malformed location, bad CLI arguments).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An infrastructure operation failed.
    ///
    /// Raised when:
    /// - Filesystem I/O errors occur while sampling or opening a location
    /// - The background executor cannot be started
    /// - A lock was poisoned by a panicking thread
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A registry entry with this name already exists.
    ///
    /// Registries are append-only; existing entries are never replaced.
    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),
}

impl Error {
    /// Creates an `OperationFailed` error from an operation name and a cause.
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true if this error represents a user cancellation.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Result type alias for atomio operations.
pub type Result<T> = std::result::Result<T, Error>;
