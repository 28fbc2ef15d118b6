//! Core traits for import/export operations.
//!
//! Defines the [`Importer`] and [`Exporter`] traits that format plugins
//! implement, plus [`ImporterRef`], the shared handle a [`FileSource`] keeps
//! to the importer it loads with.
//!
//! Plugins only parse and serialize. Threading, cancellation and scene
//! bookkeeping are handled by the caller; a plugin sees a reader or writer
//! and a [`TaskContext`] it checks for cancellation.

use crate::dataset::DataSet;
use crate::models::{DataCollection, FrameDescriptor, Location, OptionMap};
use crate::pipeline::{FileSource, LoadResult, PendingOperation, TaskContext};
use crate::scene::{NodeRef, ObjectNode};
use crate::{Error, Result};
use std::fmt;
use std::io::{BufRead, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// How an imported file is inserted into the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Create a new node next to the existing ones.
    #[default]
    AddToScene,
    /// Point the selected node's source at the new file, keeping the node.
    ///
    /// [`ImportService`](crate::ImportService) keeps the node's importer
    /// and its options when the format is unchanged. Falls back to [`AddToScene`](Self::AddToScene) if nothing is selected.
    ReplaceSelected,
    /// Remove every node, then add a new one.
    ResetScene,
}

/// A file format reader.
///
/// # Contract
///
/// - `bind_options` is the only mutating call and is never made while a
///   load with this importer is running.
/// - `scan_frames` and `load_frame` call [`TaskContext::checkpoint`]
///   periodically and return [`Error::Canceled`] when it fails.
/// - Data-level problems (malformed lines, missing columns) are reported as
///   [`Error::ImportFailed`] with a message meant for the user.
pub trait Importer: Send + Sync + fmt::Debug {
    /// Registry name of the format, e.g. `xyz`.
    fn format_name(&self) -> &'static str;

    /// Name used in messages, e.g. `XYZ importer`.
    fn display_name(&self) -> &'static str;

    /// Applies named options.
    ///
    /// Either every option is applied or none is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownOption`] for a name the importer does not
    /// have and [`Error::InvalidOptionValue`] for a value of the wrong shape.
    fn bind_options(&mut self, options: &OptionMap) -> Result<()>;

    /// Current option values as a JSON object.
    fn options(&self) -> serde_json::Value;

    /// Whether the file should be scanned for multiple frames.
    fn multiple_frames(&self) -> bool {
        false
    }

    /// Finds the frames stored in a file.
    ///
    /// The default treats the whole file as one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or
    /// [`Error::Canceled`].
    fn scan_frames(
        &self,
        location: &Location,
        reader: &mut dyn BufRead,
        ctx: &TaskContext,
    ) -> Result<Vec<FrameDescriptor>> {
        let _ = (reader, ctx);
        Ok(vec![FrameDescriptor::whole_file(location.clone())])
    }

    /// Parses one frame.
    ///
    /// `reader` is positioned at `frame.byte_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be read or parsed, or
    /// [`Error::Canceled`].
    fn load_frame(
        &self,
        frame: &FrameDescriptor,
        reader: &mut dyn BufRead,
        ctx: &TaskContext,
    ) -> Result<DataCollection>;
}

/// A file format writer.
///
/// Exporters are built from an option map by their registry constructor and
/// are immutable afterwards.
pub trait Exporter: Send + Sync + fmt::Debug {
    /// Registry name of the format.
    fn format_name(&self) -> &'static str;

    /// Writes one frame of one node.
    ///
    /// Called once per exported node, in order, on the same writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExportFailed`] if the data lacks something the
    /// exporter needs, an I/O error, or [`Error::Canceled`].
    fn write_frame(
        &self,
        data: &DataCollection,
        writer: &mut dyn Write,
        ctx: &TaskContext,
    ) -> Result<()>;
}

/// Shared, lockable handle to an importer.
///
/// The foreground binds options through a write lock; a background load
/// holds a read lock for its whole duration.
#[derive(Clone)]
pub struct ImporterRef(Arc<RwLock<Box<dyn Importer>>>);

impl ImporterRef {
    /// Wraps an importer.
    #[must_use]
    pub fn new(importer: Box<dyn Importer>) -> Self {
        Self(Arc::new(RwLock::new(importer)))
    }

    /// Read access to the importer.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread panicked while binding options.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Box<dyn Importer>>> {
        self.0
            .read()
            .map_err(|_| Error::operation("importer_lock", "importer lock poisoned"))
    }

    /// Registry name of the wrapped importer's format.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn format_name(&self) -> Result<&'static str> {
        Ok(self.read()?.format_name())
    }

    /// Current option values.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn options(&self) -> Result<serde_json::Value> {
        Ok(self.read()?.options())
    }

    /// Binds options on the wrapped importer.
    ///
    /// # Errors
    ///
    /// See [`Importer::bind_options`].
    pub fn bind(&self, options: &OptionMap) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }
        let mut importer = self
            .0
            .write()
            .map_err(|_| Error::operation("importer_lock", "importer lock poisoned"))?;
        importer.bind_options(options)
    }

    /// Binds back values previously read with [`options`](Self::options).
    ///
    /// # Errors
    ///
    /// See [`Importer::bind_options`].
    pub fn restore_options(&self, values: serde_json::Value) -> Result<()> {
        match values {
            serde_json::Value::Object(values) => self.bind(&values.into_iter().collect()),
            _ => Ok(()),
        }
    }

    /// Returns true if both handles point at the same importer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Imports `location` into the dataset's scene.
    ///
    /// Returns immediately; the load runs in the background and the returned
    /// handle carries its operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the load cannot be started.
    pub fn import_into(
        &self,
        dataset: &DataSet,
        location: &Location,
        mode: ImportMode,
    ) -> Result<ImportHandle> {
        let scene = dataset.scene();
        if mode == ImportMode::ReplaceSelected {
            if let Some(node) = scene.selected_node() {
                let operation = node.source().set_source(location.clone(), Some(self.clone()))?;
                return Ok(ImportHandle {
                    node,
                    operation,
                    created_node: false,
                });
            }
        }
        if mode == ImportMode::ResetScene {
            scene.clear();
        }

        let source = FileSource::new(dataset.source_context());
        let operation = source.set_source(location.clone(), Some(self.clone()))?;
        let name = location
            .file_name()
            .unwrap_or_else(|| location.display_string());
        let node = ObjectNode::new(name, source);
        scene.add(Arc::clone(&node));
        Ok(ImportHandle {
            node,
            operation,
            created_node: true,
        })
    }
}

impl fmt::Debug for ImporterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(importer) => f.debug_tuple("ImporterRef").field(&*importer).finish(),
            Err(_) => f.write_str("ImporterRef(<locked>)"),
        }
    }
}

/// Result of [`ImporterRef::import_into`].
#[derive(Debug, Clone)]
pub struct ImportHandle {
    /// The node that receives the data.
    pub node: NodeRef,
    /// The background load.
    pub operation: PendingOperation<LoadResult>,
    /// Whether the node was created by this import.
    pub created_node: bool,
}
