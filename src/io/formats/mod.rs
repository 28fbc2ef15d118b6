//! Built-in format plugins.
//!
//! | Format | Import | Export | Multi-frame |
//! |--------|--------|--------|-------------|
//! | `xyz` | ✓ | ✓ | ✓ (concatenated frames) |
//! | `lammps_dump` | ✓ | ✓ | ✓ (`ITEM: TIMESTEP` blocks) |

pub mod lammps_dump;
pub mod xyz;

use super::registry::{ExporterEntry, ImporterEntry};
use crate::pipeline::TaskContext;
use crate::{Error, Result};
use std::io::BufRead;

/// Lines between cancellation checkpoints in text parsers.
pub const CHECKPOINT_INTERVAL: u64 = 4096;

/// Importers registered in every fresh registry, in detection order.
#[must_use]
pub fn builtin_importers() -> Vec<ImporterEntry> {
    vec![xyz::importer_entry(), lammps_dump::importer_entry()]
}

/// Exporters registered in every fresh registry.
#[must_use]
pub fn builtin_exporters() -> Vec<ExporterEntry> {
    vec![xyz::exporter_entry(), lammps_dump::exporter_entry()]
}

/// First line of a sampled prefix, without its terminator.
///
/// A non-empty prefix without a newline is one (possibly truncated) line.
pub(crate) fn first_line(prefix: &[u8]) -> Option<&str> {
    if prefix.is_empty() {
        return None;
    }
    let end = prefix.iter().position(|b| *b == b'\n').unwrap_or(prefix.len());
    std::str::from_utf8(&prefix[..end])
        .ok()
        .map(|line| line.trim_end_matches('\r'))
}

/// Line-oriented reader that tracks line numbers and byte offsets.
pub struct TextStream<'a> {
    reader: &'a mut dyn BufRead,
    line: String,
    line_number: u64,
    byte_offset: u64,
}

impl<'a> TextStream<'a> {
    /// Wraps a reader positioned at `byte_offset`, whose next line is
    /// `first_line_number`.
    pub fn new(reader: &'a mut dyn BufRead, first_line_number: u64, byte_offset: u64) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: first_line_number.saturating_sub(1),
            byte_offset,
        }
    }

    /// Reads the next line without its terminator; `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or invalid UTF-8.
    pub fn read_line(&mut self) -> Result<Option<&str>> {
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| Error::operation("read_line", e))?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        self.byte_offset += read as u64;
        Ok(Some(self.line.trim_end_matches(['\n', '\r'])))
    }

    /// Reads the next line, failing at end of file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImportFailed`] at end of file.
    pub fn expect_line(&mut self, what: &str) -> Result<&str> {
        let line_number = self.line_number + 1;
        self.read_line()?.ok_or_else(|| {
            Error::ImportFailed(format!(
                "unexpected end of file at line {line_number} while reading {what}"
            ))
        })
    }

    /// Line number of the most recently read line.
    #[must_use]
    pub const fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Byte offset where the next line starts.
    #[must_use]
    pub const fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    /// Most recently read line.
    #[must_use]
    pub fn line(&self) -> &str {
        self.line.trim_end_matches(['\n', '\r'])
    }
}

/// Checkpoint and progress update every [`CHECKPOINT_INTERVAL`] items.
pub(crate) fn periodic_checkpoint(ctx: &TaskContext, index: u64) -> Result<()> {
    if index % CHECKPOINT_INTERVAL == 0 {
        ctx.checkpoint()?;
        ctx.set_progress_value(index);
    }
    Ok(())
}

/// Parses an atom count line.
pub(crate) fn parse_count(line: &str, line_number: u64, format: &str) -> Result<usize> {
    line.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n <= 1_000_000_000)
        .ok_or_else(|| {
            Error::ImportFailed(format!(
                "invalid number of particles in line {line_number} of {format} file: {line}"
            ))
        })
}
