//! Importer and exporter registries.
//!
//! Both registries are append-only: plugins register their formats during
//! startup and entries are never replaced or removed. Reads (detection,
//! lookup) take a shared lock and may run concurrently with each other.
//!
//! The process-wide registries returned by [`global_format_registry`] and
//! [`global_exporter_registry`] come pre-populated with the built-in formats.

use super::fetch::ResourceReader;
use super::formats;
use super::traits::{Exporter, Importer, ImporterRef};
use crate::models::{Location, OptionMap};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Static description of a registered format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    /// Registry name, e.g. `xyz`.
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Typical file extensions, lowercase, without the dot.
    pub extensions: &'static [&'static str],
}

/// Signature check over a sampled file prefix.
///
/// Must be a pure function of its inputs.
pub type DetectFn = fn(prefix: &[u8], location: &Location) -> bool;

/// Creates a fresh importer with default options.
pub type ImporterConstructor = fn() -> Box<dyn Importer>;

/// Creates an exporter from an option map.
///
/// Returns `InvalidExportOptions` if the map is rejected.
pub type ExporterConstructor = fn(&OptionMap) -> Result<Box<dyn Exporter>>;

/// One registered importer.
#[derive(Debug, Clone, Copy)]
pub struct ImporterEntry {
    /// Format description.
    pub descriptor: FormatDescriptor,
    /// Signature check.
    pub detect: DetectFn,
    /// Importer factory.
    pub create: ImporterConstructor,
}

/// One registered exporter.
#[derive(Debug, Clone, Copy)]
pub struct ExporterEntry {
    /// Format description.
    pub descriptor: FormatDescriptor,
    /// Exporter factory.
    pub create: ExporterConstructor,
}

/// Registry of importable formats, consulted in registration order.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    entries: RwLock<Vec<ImporterEntry>>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in importers.
    #[must_use]
    pub fn with_builtin_formats() -> Self {
        let registry = Self::new();
        for entry in formats::builtin_importers() {
            // Built-in names are distinct.
            let _ = registry.register(entry);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ImporterEntry>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ImporterEntry>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends an importer.
    ///
    /// Intended for plugin initialization code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRegistered`] if the name is taken.
    pub fn register(&self, entry: ImporterEntry) -> Result<()> {
        let mut entries = self.write();
        if entries.iter().any(|e| e.descriptor.name == entry.descriptor.name) {
            return Err(Error::AlreadyRegistered(entry.descriptor.name.to_string()));
        }
        tracing::debug!(format = entry.descriptor.name, "Registered importer");
        entries.push(entry);
        Ok(())
    }

    /// Descriptors of all registered importers, in registration order.
    #[must_use]
    pub fn formats(&self) -> Vec<FormatDescriptor> {
        self.read().iter().map(|e| e.descriptor).collect()
    }

    /// Looks up an importer by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ImporterEntry> {
        self.read()
            .iter()
            .find(|e| e.descriptor.name.eq_ignore_ascii_case(name))
            .copied()
    }

    /// Classifies a sampled prefix.
    ///
    /// The first format in registration order whose signature matches wins.
    #[must_use]
    pub fn detect_prefix(&self, prefix: &[u8], location: &Location) -> Option<FormatDescriptor> {
        self.read()
            .iter()
            .find(|e| (e.detect)(prefix, location))
            .map(|e| e.descriptor)
    }

    /// Detects the format of a location from a bounded prefix of its bytes.
    ///
    /// Returns `Ok(None)` if no format matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImportFailed`] if the location cannot be read.
    #[tracing::instrument(skip(self, reader), fields(location = %location))]
    pub fn detect(
        &self,
        location: &Location,
        reader: &ResourceReader,
    ) -> Result<Option<FormatDescriptor>> {
        let prefix = reader.sample(location).map_err(|e| match e {
            Error::OperationFailed { cause, .. } => Error::ImportFailed(format!("cannot read {cause}")),
            other => other,
        })?;
        let detected = self.detect_prefix(&prefix, location);
        metrics::counter!(
            "atomio_format_detections_total",
            "result" => detected.map_or("none", |d| d.name)
        )
        .increment(1);
        tracing::debug!(
            format = ?detected.map(|d| d.name),
            bytes = prefix.len(),
            "Format detection finished"
        );
        Ok(detected)
    }

    /// Creates a fresh importer for a registered format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFormat`] if no importer has that name.
    pub fn create_importer(&self, name: &str) -> Result<ImporterRef> {
        let entry = self
            .get(name)
            .ok_or_else(|| Error::UnknownFormat(name.to_string()))?;
        Ok(ImporterRef::new((entry.create)()))
    }
}

/// Registry of export formats.
#[derive(Debug, Default)]
pub struct ExporterRegistry {
    entries: RwLock<Vec<ExporterEntry>>,
}

impl ExporterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in exporters.
    #[must_use]
    pub fn with_builtin_formats() -> Self {
        let registry = Self::new();
        for entry in formats::builtin_exporters() {
            let _ = registry.register(entry);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ExporterEntry>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends an exporter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRegistered`] if the name is taken.
    pub fn register(&self, entry: ExporterEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.iter().any(|e| e.descriptor.name == entry.descriptor.name) {
            return Err(Error::AlreadyRegistered(entry.descriptor.name.to_string()));
        }
        tracing::debug!(format = entry.descriptor.name, "Registered exporter");
        entries.push(entry);
        Ok(())
    }

    /// Descriptors of all registered exporters, in registration order.
    #[must_use]
    pub fn formats(&self) -> Vec<FormatDescriptor> {
        self.read().iter().map(|e| e.descriptor).collect()
    }

    /// Looks up an exporter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ExporterEntry> {
        self.read()
            .iter()
            .find(|e| e.descriptor.name.eq_ignore_ascii_case(name))
            .copied()
    }

    /// Constructs an exporter for `name` from an option map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFormat`] if no exporter has that name, or
    /// [`Error::InvalidExportOptions`] if construction rejects the options.
    pub fn create(&self, name: &str, options: &OptionMap) -> Result<Box<dyn Exporter>> {
        let entry = self
            .get(name)
            .ok_or_else(|| Error::UnknownFormat(name.to_string()))?;
        (entry.create)(options).map_err(|e| match e {
            Error::InvalidExportOptions(_) => e,
            other => Error::InvalidExportOptions(other.to_string()),
        })
    }
}

static GLOBAL_FORMATS: OnceLock<Arc<FormatRegistry>> = OnceLock::new();
static GLOBAL_EXPORTERS: OnceLock<Arc<ExporterRegistry>> = OnceLock::new();

/// The process-wide importer registry.
pub fn global_format_registry() -> Arc<FormatRegistry> {
    Arc::clone(GLOBAL_FORMATS.get_or_init(|| Arc::new(FormatRegistry::with_builtin_formats())))
}

/// The process-wide exporter registry.
pub fn global_exporter_registry() -> Arc<ExporterRegistry> {
    Arc::clone(GLOBAL_EXPORTERS.get_or_init(|| Arc::new(ExporterRegistry::with_builtin_formats())))
}
