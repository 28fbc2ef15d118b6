//! File export service.

use crate::dataset::DataSet;
use crate::io::Exporter;
use crate::models::{Location, OptionMap, PipelineStatus};
use crate::pipeline::{Outcome, PendingOperation};
use crate::scene::NodeRef;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Writes scene nodes to files.
#[derive(Debug, Clone, Copy)]
pub struct ExportService<'a> {
    dataset: &'a DataSet,
}

impl<'a> ExportService<'a> {
    /// Creates an export service for a dataset.
    #[must_use]
    pub const fn new(dataset: &'a DataSet) -> Self {
        Self { dataset }
    }

    /// Exports the current frame of `nodes` to `location` in `format`.
    ///
    /// Every node is evaluated (blocking) before anything is written; an
    /// existing file at `location` is overwritten.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownFormat`] if no exporter is registered as `format`
    /// - [`Error::InvalidExportOptions`] if the exporter rejects `options`
    /// - [`Error::Canceled`] if evaluation or writing was canceled
    /// - [`Error::ExportFailed`] if a node's data has an error status or the
    ///   exporter reported an error
    #[instrument(skip(self, nodes, options), fields(location = %location, format = %format, operation = "export"))]
    pub fn export_file(
        &self,
        nodes: &[NodeRef],
        location: &str,
        format: &str,
        options: &OptionMap,
    ) -> Result<()> {
        let start = Instant::now();
        let result = self.run_export(nodes, location, format, options);

        let status = match &result {
            Ok(()) => "success",
            Err(Error::Canceled) => "canceled",
            Err(_) => "error",
        };
        metrics::counter!("atomio_exports_total", "format" => format.to_string(), "status" => status)
            .increment(1);
        metrics::histogram!("atomio_export_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }

    fn run_export(
        &self,
        nodes: &[NodeRef],
        location: &str,
        format: &str,
        options: &OptionMap,
    ) -> Result<()> {
        let exporter = self.dataset.exporters().create(format, options)?;
        let location = Location::parse(location)?;
        if nodes.is_empty() {
            return Err(Error::ExportFailed("there is nothing to export".to_string()));
        }

        let time = self.dataset.current_time();
        for node in nodes {
            if !node.wait(time, false)? {
                return Err(Error::Canceled);
            }
            if let PipelineStatus::Error(message) = node.source().status() {
                return Err(Error::ExportFailed(format!(
                    "cannot export '{}': {message}",
                    node.name()
                )));
            }
        }

        let operation = self.export_to(Arc::from(exporter), nodes, &location, true)?;
        match operation.wait("Writing output file") {
            Outcome::Completed(Ok(())) => {
                tracing::info!(nodes = nodes.len(), "Export finished");
                Ok(())
            },
            Outcome::Canceled | Outcome::Completed(Err(Error::Canceled)) => Err(Error::Canceled),
            Outcome::Completed(Err(e @ Error::ExportFailed(_))) => Err(e),
            Outcome::Completed(Err(e)) => Err(Error::ExportFailed(e.to_string())),
        }
    }

    /// Starts writing the current data of `nodes` to a local file.
    ///
    /// Returns without waiting; the data is captured before the write starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExportFailed`] if the location is remote, or exists
    /// and `overwrite` is false.
    pub fn export_to(
        &self,
        exporter: Arc<dyn Exporter>,
        nodes: &[NodeRef],
        location: &Location,
        overwrite: bool,
    ) -> Result<PendingOperation<()>> {
        let path = location
            .as_local_path()
            .ok_or_else(|| {
                Error::ExportFailed(format!(
                    "cannot write to remote location {}",
                    location.display_string()
                ))
            })?
            .to_path_buf();
        if !overwrite && path.exists() {
            return Err(Error::ExportFailed(format!(
                "output file {} already exists",
                path.display()
            )));
        }

        let time = self.dataset.current_time();
        let frames: Vec<_> = nodes.iter().map(|node| node.evaluate(time)).collect();
        let label = format!("Exporting {}", location.display_string());

        Ok(self.dataset.executor().spawn(label, move |ctx| {
            ctx.set_progress_maximum(frames.len() as u64);
            let file = File::create(&path)
                .map_err(|e| Error::ExportFailed(format!("{}: {e}", path.display())))?;
            let mut writer = BufWriter::new(file);
            for (index, data) in frames.iter().enumerate() {
                ctx.checkpoint()?;
                exporter.write_frame(data, &mut writer, ctx)?;
                ctx.set_progress_value(index as u64 + 1);
            }
            writer
                .flush()
                .map_err(|e| Error::ExportFailed(format!("{}: {e}", path.display())))
        }))
    }
}
