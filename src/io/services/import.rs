//! File import service.

use crate::dataset::DataSet;
use crate::io::{ImportMode, ImporterRef};
use crate::models::{Location, OptionMap};
use crate::scene::NodeRef;
use crate::{Error, Result};
use std::time::Instant;
use tracing::instrument;

/// Imports files into a dataset's scene.
#[derive(Debug, Clone, Copy)]
pub struct ImportService<'a> {
    dataset: &'a DataSet,
}

impl<'a> ImportService<'a> {
    /// Creates an import service for a dataset.
    #[must_use]
    pub const fn new(dataset: &'a DataSet) -> Self {
        Self { dataset }
    }

    /// Imports a file as a new scene node and waits for its data.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `location` cannot be parsed
    /// - [`Error::UnsupportedFormat`] if no format recognizes the file
    /// - [`Error::UnknownOption`] / [`Error::InvalidOptionValue`] if an option
    ///   does not fit the detected importer (nothing is read or created)
    /// - [`Error::Canceled`] if the load was canceled (the new node is removed)
    /// - [`Error::ImportFailed`] if the location cannot be read (no node is
    ///   created) or the importer reported a data error (the node stays in
    ///   the scene)
    pub fn import_file(&self, location: &str, options: &OptionMap) -> Result<NodeRef> {
        let location = Location::parse(location)?;
        self.import_location(&location, options, ImportMode::AddToScene)
    }

    /// Imports a location with an explicit import mode.
    ///
    /// # Errors
    ///
    /// See [`import_file`](Self::import_file).
    #[instrument(skip(self, options), fields(location = %location, operation = "import"))]
    pub fn import_location(
        &self,
        location: &Location,
        options: &OptionMap,
        mode: ImportMode,
    ) -> Result<NodeRef> {
        let start = Instant::now();
        let result = self.run_import(location, options, mode);

        let status = match &result {
            Ok(_) => "success",
            Err(Error::Canceled) => "canceled",
            Err(_) => "error",
        };
        metrics::counter!("atomio_imports_total", "status" => status).increment(1);
        metrics::histogram!("atomio_import_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }

    fn run_import(&self, location: &Location, options: &OptionMap, mode: ImportMode) -> Result<NodeRef> {
        let dataset = self.dataset;
        let descriptor = dataset
            .formats()
            .detect(location, dataset.reader())?
            .ok_or_else(|| Error::UnsupportedFormat {
                location: location.display_string(),
            })?;
        tracing::info!(format = descriptor.name, "Detected file format");

        let (importer, previous_options) = self.importer_for(descriptor.name, mode)?;
        importer.bind(options)?;

        let handle = importer.import_into(dataset, location, mode)?;
        match handle.node.wait(dataset.current_time(), true) {
            Ok(true) => {
                tracing::info!(node = %handle.node.id(), "Import finished");
                Ok(handle.node)
            },
            Ok(false) => {
                if handle.created_node {
                    dataset.scene().remove(handle.node.id());
                }
                if let Some(values) = previous_options {
                    if let Err(e) = importer.restore_options(values) {
                        tracing::warn!(error = %e, "Failed to restore importer options");
                    }
                }
                tracing::info!("Import canceled");
                Err(Error::Canceled)
            },
            Err(e) => {
                tracing::warn!(error = %e, "Import failed");
                Err(e)
            },
        }
    }

    /// Importer for a detected format.
    ///
    /// Replacing the selected node's data in the same format keeps that
    /// node's importer and its options; the options it had are returned so
    /// a canceled import can bind them back.
    fn importer_for(
        &self,
        format: &str,
        mode: ImportMode,
    ) -> Result<(ImporterRef, Option<serde_json::Value>)> {
        let current = match mode {
            ImportMode::ReplaceSelected => self
                .dataset
                .scene()
                .selected_node()
                .and_then(|node| node.source().importer()),
            _ => None,
        };
        if let Some(current) = current {
            if current.format_name()? == format {
                tracing::debug!(format, "Reusing the selected node's importer");
                let previous = current.options()?;
                return Ok((current, Some(previous)));
            }
        }
        Ok((self.dataset.formats().create_importer(format)?, None))
    }
}
