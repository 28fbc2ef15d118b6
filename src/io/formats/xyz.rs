//! XYZ format adapter for import/export.
//!
//! An XYZ frame is an atom count line, a free-form comment line and one line
//! per particle. Files may hold several frames back to back.
//!
//! The comment line is searched for simulation cell information:
//! `Lxyz=` or `boxsize` followed by three edge lengths, or `cell_orig`,
//! `cell_vec1`, `cell_vec2`, `cell_vec3` with three components each, and
//! `pbc` with three integer flags.

use super::{TextStream, first_line, parse_count, periodic_checkpoint};
use crate::io::binder;
use crate::io::columns::{self, ColumnMapping, InputColumnReader, PARTICLE_TYPE};
use crate::io::registry::{ExporterEntry, FormatDescriptor, ImporterEntry};
use crate::io::traits::{Exporter, Importer};
use crate::models::{DataCollection, FrameDescriptor, Location, OptionMap, SimulationCell};
use crate::pipeline::TaskContext;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    name: "xyz",
    description: "XYZ particle coordinates",
    extensions: &["xyz"],
};

static BOX_SIZE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?:Lxyz=|boxsize)\s*(\S+)\s+(\S+)\s+(\S+)").ok());

static CELL_KEYWORD: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\b(cell_orig|cell_vec1|cell_vec2|cell_vec3|pbc)\s+(\S+)\s+(\S+)\s+(\S+)").ok()
});

/// Options of the XYZ importer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XyzImportOptions {
    /// Target property per file column.
    ///
    /// When unset, 3, 4 and 7 column files are read as positions, type plus
    /// positions, and type plus positions plus velocities.
    pub columns: Option<ColumnMapping>,
    /// Scan the file for multiple concatenated frames.
    pub multiple_frames: bool,
}

/// Reads XYZ files.
#[derive(Debug, Clone, Default)]
pub struct XyzImporter {
    options: XyzImportOptions,
}

impl XyzImporter {
    /// Creates an importer with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current options.
    #[must_use]
    pub const fn import_options(&self) -> &XyzImportOptions {
        &self.options
    }
}

/// Registry entry for the XYZ importer.
#[must_use]
pub fn importer_entry() -> ImporterEntry {
    ImporterEntry {
        descriptor: DESCRIPTOR,
        detect,
        create: create_importer,
    }
}

fn create_importer() -> Box<dyn Importer> {
    Box::new(XyzImporter::new())
}

fn create_exporter(options: &OptionMap) -> Result<Box<dyn Exporter>> {
    Ok(Box::new(XyzExporter::from_options(options)?))
}

/// Registry entry for the XYZ exporter.
#[must_use]
pub fn exporter_entry() -> ExporterEntry {
    ExporterEntry {
        descriptor: DESCRIPTOR,
        create: create_exporter,
    }
}

/// The first line is an atom count, or blank.
fn detect(prefix: &[u8], _location: &Location) -> bool {
    first_line(prefix).is_some_and(|line| {
        let line = line.trim();
        line.is_empty() || line.parse::<u64>().is_ok()
    })
}

impl Importer for XyzImporter {
    fn format_name(&self) -> &'static str {
        DESCRIPTOR.name
    }

    fn display_name(&self) -> &'static str {
        "XYZ importer"
    }

    fn bind_options(&mut self, options: &OptionMap) -> Result<()> {
        let target = self.display_name();
        binder::bind(&mut self.options, options, target)
    }

    fn options(&self) -> serde_json::Value {
        binder::to_value(&self.options).unwrap_or_default()
    }

    fn multiple_frames(&self) -> bool {
        self.options.multiple_frames
    }

    fn scan_frames(
        &self,
        location: &Location,
        reader: &mut dyn BufRead,
        ctx: &TaskContext,
    ) -> Result<Vec<FrameDescriptor>> {
        ctx.set_progress_text(format!("Scanning XYZ file {}", location.display_string()));
        let mut stream = TextStream::new(reader, 1, 0);
        let mut frames = Vec::new();
        loop {
            ctx.checkpoint()?;
            let byte_offset = stream.byte_offset();
            if stream.read_line()?.is_none() || stream.line().trim().is_empty() {
                break;
            }
            let count = parse_count(stream.line(), stream.line_number(), "XYZ")?;
            frames.push(FrameDescriptor::at(
                location.clone(),
                frames.len(),
                byte_offset,
                stream.line_number(),
            ));
            stream.expect_line("the comment line")?;
            for i in 0..count as u64 {
                periodic_checkpoint(ctx, i)?;
                stream.expect_line("particle data")?;
            }
        }
        tracing::debug!(frames = frames.len(), "Scanned XYZ file");
        Ok(frames)
    }

    fn load_frame(
        &self,
        frame: &FrameDescriptor,
        reader: &mut dyn BufRead,
        ctx: &TaskContext,
    ) -> Result<DataCollection> {
        ctx.set_progress_text(format!("Reading XYZ file {}", frame.location.display_string()));
        let mut stream = TextStream::new(reader, frame.line_number, frame.byte_offset);

        stream.expect_line("the number of particles")?;
        let count = parse_count(stream.line(), stream.line_number(), "XYZ")?;
        ctx.set_progress_maximum(count as u64);

        stream.expect_line("the comment line")?;
        let comment = stream.line().to_string();
        let header = CommentHeader::parse(&comment);

        let mut data = DataCollection::new(0);
        let mut columns: Option<InputColumnReader> = None;
        for i in 0..count {
            periodic_checkpoint(ctx, i as u64)?;
            stream.expect_line("particle data")?;
            if columns.is_none() {
                let mapping = match &self.options.columns {
                    Some(mapping) => mapping.clone(),
                    None => guess_mapping(stream.line(), stream.line_number())?,
                };
                columns = Some(InputColumnReader::new(&mapping, &mut data)?);
            }
            if let Some(reader) = columns.as_mut() {
                reader
                    .read_particle(i, stream.line(), stream.line_number(), &mut data)
                    .map_err(|e| match e {
                        Error::ImportFailed(msg) => {
                            Error::ImportFailed(format!("parsing error in XYZ file: {msg}"))
                        },
                        other => other,
                    })?;
            }
        }
        if let Some(reader) = columns {
            reader.finish(&mut data);
        }

        data.cell = header.resolve_cell(&mut data);
        if !comment.trim().is_empty() {
            data.attributes
                .insert("Comment".to_string(), serde_json::Value::String(comment));
        }
        tracing::debug!(particles = count, label = %frame.label, "Loaded XYZ frame");
        Ok(data)
    }
}

/// Column layouts assumed when no mapping was configured.
fn guess_mapping(line: &str, line_number: u64) -> Result<ColumnMapping> {
    let names: &[&str] = match line.split_whitespace().count() {
        3 => &["Position.X", "Position.Y", "Position.Z"],
        4 => &[PARTICLE_TYPE, "Position.X", "Position.Y", "Position.Z"],
        7 => &[
            PARTICLE_TYPE,
            "Position.X",
            "Position.Y",
            "Position.Z",
            "Velocity.X",
            "Velocity.Y",
            "Velocity.Z",
        ],
        n => {
            return Err(Error::ImportFailed(format!(
                "cannot guess the meaning of the {n} columns in line {line_number}; \
                 set the 'columns' option"
            )));
        },
    };
    Ok(names.iter().map(|n| Some((*n).to_string())).collect())
}

/// Cell information found on a comment line.
#[derive(Debug, Clone, Default)]
struct CommentHeader {
    cell: Option<SimulationCell>,
    pbc: [bool; 3],
}

impl CommentHeader {
    fn parse(comment: &str) -> Self {
        let mut header = Self::default();

        if let Some(caps) = BOX_SIZE.as_ref().and_then(|re| re.captures(comment)) {
            let size: Option<Vec<f64>> = (1..=3)
                .map(|k| caps.get(k).and_then(|m| m.as_str().parse().ok()))
                .collect();
            if let Some([sx, sy, sz]) = size.as_deref().and_then(|s| <[f64; 3]>::try_from(s).ok()) {
                header.cell = Some(SimulationCell::orthogonal(
                    [sx, sy, sz],
                    [-sx / 2.0, -sy / 2.0, -sz / 2.0],
                ));
            }
        }

        let mut origin = [0.0; 3];
        let mut vectors = [[0.0; 3]; 3];
        if let Some(re) = CELL_KEYWORD.as_ref() {
            for caps in re.captures_iter(comment) {
                let values: [&str; 3] =
                    std::array::from_fn(|k| caps.get(k + 2).map_or("", |m| m.as_str()));
                let numbers = values.map(|v| v.parse::<f64>().unwrap_or(0.0));
                match caps.get(1).map(|m| m.as_str()) {
                    Some("cell_orig") => origin = numbers,
                    Some("cell_vec1") => vectors[0] = numbers,
                    Some("cell_vec2") => vectors[1] = numbers,
                    Some("cell_vec3") => vectors[2] = numbers,
                    Some("pbc") => {
                        header.pbc = values.map(|v| v.parse::<i64>().is_ok_and(|flag| flag != 0));
                    },
                    _ => {},
                }
            }
        }
        if vectors.iter().all(|v| v.iter().any(|c| *c != 0.0)) {
            header.cell = Some(SimulationCell {
                vectors,
                origin,
                pbc: [false; 3],
            });
        }
        header
    }

    /// Final cell for the frame; rescales reduced coordinates in `data`.
    fn resolve_cell(&self, data: &mut DataCollection) -> Option<SimulationCell> {
        let bounds = data.positions().and_then(|p| bounding_box(&p));
        let cell = match (self.cell, bounds) {
            (None, Some((min, max))) => Some(SimulationCell::orthogonal(
                [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
                min,
            )),
            (Some(cell), Some((min, max))) => {
                let shift = if within(min, max, -0.01, 1.01) {
                    Some(0.0)
                } else if within(min, max, -0.51, 0.51) {
                    Some(0.5)
                } else {
                    None
                };
                if let (Some(shift), Some(position)) = (shift, data.property_named_mut("Position")) {
                    for p in position.data.chunks_exact_mut(3) {
                        let absolute = cell.reduced_to_absolute([p[0] + shift, p[1] + shift, p[2] + shift]);
                        p.copy_from_slice(&absolute);
                    }
                }
                Some(cell)
            },
            (cell, None) => cell,
        };
        cell.map(|mut cell| {
            cell.pbc = self.pbc;
            cell
        })
    }
}

fn bounding_box(points: &[[f64; 3]]) -> Option<([f64; 3], [f64; 3])> {
    let first = *points.first()?;
    Some(points.iter().fold((first, first), |(mut min, mut max), p| {
        for k in 0..3 {
            min[k] = min[k].min(p[k]);
            max[k] = max[k].max(p[k]);
        }
        (min, max)
    }))
}

fn within(min: [f64; 3], max: [f64; 3], lower: f64, upper: f64) -> bool {
    min.iter().all(|v| *v >= lower) && max.iter().all(|v| *v <= upper)
}

/// Options of the XYZ exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XyzExportOptions {
    /// Properties written per particle line, e.g. `Position.X`.
    pub columns: Vec<String>,
}

/// Writes XYZ files.
#[derive(Debug, Clone)]
pub struct XyzExporter {
    options: XyzExportOptions,
}

impl XyzExporter {
    /// Builds an exporter from an option map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExportOptions`] for unknown options or an
    /// empty `columns` list.
    pub fn from_options(options: &OptionMap) -> Result<Self> {
        let options: XyzExportOptions = binder::build(options, "XYZ exporter")
            .map_err(|e| Error::InvalidExportOptions(e.to_string()))?;
        if options.columns.is_empty() {
            return Err(Error::InvalidExportOptions(
                "the XYZ exporter requires the 'columns' option to list the properties to export"
                    .to_string(),
            ));
        }
        Ok(Self { options })
    }
}

impl Exporter for XyzExporter {
    fn format_name(&self) -> &'static str {
        DESCRIPTOR.name
    }

    fn write_frame(
        &self,
        data: &DataCollection,
        writer: &mut dyn Write,
        ctx: &TaskContext,
    ) -> Result<()> {
        let columns = &self.options.columns;
        columns::require_columns(data, columns)?;
        let count = data.particle_count();
        ctx.set_progress_maximum(count as u64);

        writeln!(writer, "{count}").map_err(write_error)?;
        writeln!(writer, "{}", comment_line(data.cell.as_ref())).map_err(write_error)?;
        for i in 0..count {
            periodic_checkpoint(ctx, i as u64)?;
            let values = columns
                .iter()
                .map(|column| columns::format_value(data, i, column))
                .collect::<Result<Vec<_>>>()?;
            writeln!(writer, "{}", values.join(" ")).map_err(write_error)?;
        }
        Ok(())
    }
}

fn comment_line(cell: Option<&SimulationCell>) -> String {
    let Some(cell) = cell else {
        return String::new();
    };
    let vector = |v: &[f64; 3]| {
        v.iter()
            .map(|c| columns::format_number(*c))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let pbc = cell.pbc.map(|flag| if flag { "1" } else { "0" }).join(" ");
    format!(
        "cell_orig {} cell_vec1 {} cell_vec2 {} cell_vec3 {} pbc {pbc}",
        vector(&cell.origin),
        vector(&cell.vectors[0]),
        vector(&cell.vectors[1]),
        vector(&cell.vectors[2]),
    )
}

fn write_error(e: std::io::Error) -> Error {
    Error::operation("write_file", e)
}
