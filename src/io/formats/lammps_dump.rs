//! LAMMPS text dump adapter for import/export.
//!
//! A dump frame is a sequence of `ITEM:` sections:
//!
//! ```text
//! ITEM: TIMESTEP
//! 100
//! ITEM: NUMBER OF ATOMS
//! 2
//! ITEM: BOX BOUNDS pp pp pp
//! 0 10
//! 0 10
//! 0 10
//! ITEM: ATOMS id type x y z
//! 1 1 0.0 0.0 0.0
//! 2 1 5.0 5.0 5.0
//! ```
//!
//! Triclinic boxes carry a third value per bounds line (`xy`, `xz`, `yz`).
//! Without an explicit `columns` option the `ITEM: ATOMS` header decides
//! which property each column fills.

use super::{TextStream, first_line, parse_count, periodic_checkpoint};
use crate::io::binder;
use crate::io::columns::{self, ColumnMapping, InputColumnReader, PARTICLE_TYPE};
use crate::io::registry::{ExporterEntry, FormatDescriptor, ImporterEntry};
use crate::io::traits::{Exporter, Importer};
use crate::models::{DataCollection, FrameDescriptor, Location, OptionMap, SimulationCell};
use crate::pipeline::TaskContext;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    name: "lammps_dump",
    description: "LAMMPS text dump",
    extensions: &["dump", "lammpstrj"],
};

const TIMESTEP: &str = "ITEM: TIMESTEP";
const NUMBER_OF_ATOMS: &str = "ITEM: NUMBER OF ATOMS";
const BOX_BOUNDS: &str = "ITEM: BOX BOUNDS";
const ATOMS: &str = "ITEM: ATOMS";

/// Dump column names and the properties they fill.
const COLUMN_NAMES: &[(&str, &str)] = &[
    ("id", "Particle Identifier"),
    ("type", PARTICLE_TYPE),
    ("element", PARTICLE_TYPE),
    ("mol", "Molecule Identifier"),
    ("mass", "Mass"),
    ("q", "Charge"),
    ("radius", "Radius"),
    ("x", "Position.X"),
    ("y", "Position.Y"),
    ("z", "Position.Z"),
    ("xu", "Position.X"),
    ("yu", "Position.Y"),
    ("zu", "Position.Z"),
    ("xs", "Position.X"),
    ("ys", "Position.Y"),
    ("zs", "Position.Z"),
    ("xsu", "Position.X"),
    ("ysu", "Position.Y"),
    ("zsu", "Position.Z"),
    ("vx", "Velocity.X"),
    ("vy", "Velocity.Y"),
    ("vz", "Velocity.Z"),
    ("fx", "Force.X"),
    ("fy", "Force.Y"),
    ("fz", "Force.Z"),
    ("ix", "Periodic Image.X"),
    ("iy", "Periodic Image.Y"),
    ("iz", "Periodic Image.Z"),
];

/// Options of the LAMMPS dump importer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LammpsDumpImportOptions {
    /// Target property per file column; overrides the `ITEM: ATOMS` header.
    pub columns: Option<ColumnMapping>,
    /// Scan the file for all timesteps.
    pub multiple_frames: bool,
}

/// Reads LAMMPS text dump files.
#[derive(Debug, Clone, Default)]
pub struct LammpsDumpImporter {
    options: LammpsDumpImportOptions,
}

impl LammpsDumpImporter {
    /// Creates an importer with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Registry entry for the LAMMPS dump importer.
#[must_use]
pub fn importer_entry() -> ImporterEntry {
    ImporterEntry {
        descriptor: DESCRIPTOR,
        detect,
        create: create_importer,
    }
}

/// Registry entry for the LAMMPS dump exporter.
#[must_use]
pub fn exporter_entry() -> ExporterEntry {
    ExporterEntry {
        descriptor: DESCRIPTOR,
        create: create_exporter,
    }
}

fn create_importer() -> Box<dyn Importer> {
    Box::new(LammpsDumpImporter::new())
}

fn create_exporter(options: &OptionMap) -> Result<Box<dyn Exporter>> {
    Ok(Box::new(LammpsDumpExporter::from_options(options)?))
}

fn detect(prefix: &[u8], _location: &Location) -> bool {
    first_line(prefix).is_some_and(|line| line.trim_start().starts_with(TIMESTEP))
}

/// Maps `ITEM: ATOMS` column names to properties.
///
/// Unknown names (computes, fixes, variables) become scalar properties of
/// the same name.
#[must_use]
pub fn default_mapping(header: &[&str]) -> ColumnMapping {
    header
        .iter()
        .map(|name| {
            let property = COLUMN_NAMES
                .iter()
                .find(|(column, _)| column == name)
                .map_or(*name, |(_, property)| *property);
            Some(property.to_string())
        })
        .collect()
}

impl Importer for LammpsDumpImporter {
    fn format_name(&self) -> &'static str {
        DESCRIPTOR.name
    }

    fn display_name(&self) -> &'static str {
        "LAMMPS dump importer"
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
        ctx.set_progress_text(format!(
            "Scanning LAMMPS dump file {}",
            location.display_string()
        ));
        let mut stream = TextStream::new(reader, 1, 0);
        let mut frames = Vec::new();
        let mut count = 0_usize;
        loop {
            ctx.checkpoint()?;
            let byte_offset = stream.byte_offset();
            if stream.read_line()?.is_none() {
                break;
            }
            let line = stream.line().trim_start();
            if line.starts_with(TIMESTEP) {
                frames.push(FrameDescriptor::at(
                    location.clone(),
                    frames.len(),
                    byte_offset,
                    stream.line_number(),
                ));
                stream.expect_line("the timestep")?;
            } else if line.starts_with(NUMBER_OF_ATOMS) {
                stream.expect_line("the number of atoms")?;
                count = parse_count(stream.line(), stream.line_number(), "LAMMPS dump")?;
            } else if line.starts_with(ATOMS) {
                for i in 0..count as u64 {
                    periodic_checkpoint(ctx, i)?;
                    stream.expect_line("atom data")?;
                }
            }
        }
        tracing::debug!(frames = frames.len(), "Scanned LAMMPS dump file");
        Ok(frames)
    }

    fn load_frame(
        &self,
        frame: &FrameDescriptor,
        reader: &mut dyn BufRead,
        ctx: &TaskContext,
    ) -> Result<DataCollection> {
        ctx.set_progress_text(format!(
            "Reading LAMMPS dump file {}",
            frame.location.display_string()
        ));
        let mut stream = TextStream::new(reader, frame.line_number, frame.byte_offset);
        let mut timestep: Option<i64> = None;
        let mut count: Option<usize> = None;
        let mut cell: Option<SimulationCell> = None;

        loop {
            if stream.read_line()?.is_none() {
                return Err(Error::ImportFailed(
                    "LAMMPS dump file ended before the ITEM: ATOMS section".to_string(),
                ));
            }
            let line = stream.line().trim_start().to_string();
            if line.starts_with(TIMESTEP) {
                stream.expect_line("the timestep")?;
                timestep = Some(stream.line().trim().parse().map_err(|_| {
                    Error::ImportFailed(format!(
                        "invalid timestep in line {} of LAMMPS dump file: {}",
                        stream.line_number(),
                        stream.line()
                    ))
                })?);
            } else if line.starts_with(NUMBER_OF_ATOMS) {
                stream.expect_line("the number of atoms")?;
                count = Some(parse_count(stream.line(), stream.line_number(), "LAMMPS dump")?);
            } else if let Some(flags) = line.strip_prefix(BOX_BOUNDS) {
                cell = Some(read_box(&mut stream, flags)?);
            } else if let Some(header) = line.strip_prefix(ATOMS) {
                let count = count.ok_or_else(|| {
                    Error::ImportFailed(format!(
                        "ITEM: ATOMS in line {} precedes ITEM: NUMBER OF ATOMS",
                        stream.line_number()
                    ))
                })?;
                let header: Vec<&str> = header.split_whitespace().collect();
                let mut data = self.read_atoms(&mut stream, &header, count, ctx)?;
                let reduced = self.options.columns.is_none()
                    && ["xs", "ys", "zs"]
                        .iter()
                        .all(|c| header.iter().any(|h: &&str| h.strip_suffix('u').unwrap_or(*h) == *c));
                if let (true, Some(cell)) = (reduced, cell) {
                    if let Some(position) = data.property_named_mut("Position") {
                        for p in position.data.chunks_exact_mut(3) {
                            let absolute = cell.reduced_to_absolute([p[0], p[1], p[2]]);
                            p.copy_from_slice(&absolute);
                        }
                    }
                }
                data.cell = cell;
                if let Some(timestep) = timestep {
                    data.attributes
                        .insert("Timestep".to_string(), serde_json::Value::from(timestep));
                }
                tracing::debug!(particles = count, ?timestep, "Loaded LAMMPS dump frame");
                return Ok(data);
            }
        }
    }
}

impl LammpsDumpImporter {
    fn read_atoms(
        &self,
        stream: &mut TextStream<'_>,
        header: &[&str],
        count: usize,
        ctx: &TaskContext,
    ) -> Result<DataCollection> {
        let mapping = match &self.options.columns {
            Some(mapping) => mapping.clone(),
            None if header.is_empty() => {
                return Err(Error::ImportFailed(format!(
                    "the ITEM: ATOMS line {} names no columns; set the 'columns' option",
                    stream.line_number()
                )));
            },
            None => default_mapping(header),
        };
        ctx.set_progress_maximum(count as u64);
        let mut data = DataCollection::new(0);
        let mut reader = InputColumnReader::new(&mapping, &mut data)?;
        for i in 0..count {
            periodic_checkpoint(ctx, i as u64)?;
            stream.expect_line("atom data")?;
            reader.read_particle(i, stream.line(), stream.line_number(), &mut data)?;
        }
        reader.finish(&mut data);
        Ok(data)
    }
}

/// Parses the three bounds lines following `ITEM: BOX BOUNDS`.
fn read_box(stream: &mut TextStream<'_>, flags: &str) -> Result<SimulationCell> {
    let flags: Vec<&str> = flags.split_whitespace().collect();
    let triclinic = flags.contains(&"xy");
    let styles: Vec<&str> = flags
        .iter()
        .copied()
        .filter(|f| !matches!(*f, "xy" | "xz" | "yz"))
        .collect();

    let mut bounds = [[0.0_f64; 3]; 3];
    for row in &mut bounds {
        stream.expect_line("the box bounds")?;
        let values: Vec<f64> = stream
            .line()
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| invalid_bounds(stream))?;
        let needed = if triclinic { 3 } else { 2 };
        if values.len() < needed {
            return Err(invalid_bounds(stream));
        }
        row[..needed].copy_from_slice(&values[..needed]);
    }

    let [[xlo_b, xhi_b, xy], [ylo_b, yhi_b, xz], [zlo, zhi, yz]] = bounds;
    let xlo = xlo_b - 0.0_f64.min(xy).min(xz).min(xy + xz);
    let xhi = xhi_b - 0.0_f64.max(xy).max(xz).max(xy + xz);
    let ylo = ylo_b - 0.0_f64.min(yz);
    let yhi = yhi_b - 0.0_f64.max(yz);

    let pbc = if styles.len() == 3 {
        [styles[0] == "pp", styles[1] == "pp", styles[2] == "pp"]
    } else {
        [true; 3]
    };
    Ok(SimulationCell {
        vectors: [[xhi - xlo, 0.0, 0.0], [xy, yhi - ylo, 0.0], [xz, yz, zhi - zlo]],
        origin: [xlo, ylo, zlo],
        pbc,
    })
}

fn invalid_bounds(stream: &TextStream<'_>) -> Error {
    Error::ImportFailed(format!(
        "invalid box bounds in line {} of LAMMPS dump file: {}",
        stream.line_number(),
        stream.line()
    ))
}

/// Options of the LAMMPS dump exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LammpsDumpExportOptions {
    /// Properties written per atom line.
    pub columns: Vec<String>,
}

/// Writes LAMMPS text dump files.
#[derive(Debug, Clone)]
pub struct LammpsDumpExporter {
    options: LammpsDumpExportOptions,
}

impl LammpsDumpExporter {
    /// Builds an exporter from an option map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExportOptions`] for unknown options or an
    /// empty `columns` list.
    pub fn from_options(options: &OptionMap) -> Result<Self> {
        let options: LammpsDumpExportOptions = binder::build(options, "LAMMPS dump exporter")
            .map_err(|e| Error::InvalidExportOptions(e.to_string()))?;
        if options.columns.is_empty() {
            return Err(Error::InvalidExportOptions(
                "the LAMMPS dump exporter requires the 'columns' option".to_string(),
            ));
        }
        Ok(Self { options })
    }
}

/// Dump column name for a property column; the first table entry wins.
fn dump_column_name(column: &str) -> String {
    COLUMN_NAMES
        .iter()
        .find(|(_, property)| *property == column)
        .map_or_else(|| column.replace(' ', "_"), |(name, _)| (*name).to_string())
}

impl Exporter for LammpsDumpExporter {
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
        let timestep = data
            .attributes
            .get("Timestep")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0);
        let cell = data.cell.unwrap_or_else(|| SimulationCell::orthogonal([0.0; 3], [0.0; 3]));

        let mut header = format!("{TIMESTEP}\n{timestep}\n{NUMBER_OF_ATOMS}\n{count}\n");
        header.push_str(&box_section(&cell));
        let names: Vec<String> = columns.iter().map(|c| dump_column_name(c)).collect();
        header.push_str(&format!("{ATOMS} {}\n", names.join(" ")));
        writer.write_all(header.as_bytes()).map_err(write_error)?;

        for i in 0..count {
            periodic_checkpoint(ctx, i as u64)?;
            let mut values = Vec::with_capacity(columns.len());
            for column in columns {
                let value = data.column_value(i, column).ok_or_else(|| {
                    Error::ExportFailed(format!("the property '{column}' does not exist"))
                })?;
                values.push(columns::format_number(value));
            }
            writeln!(writer, "{}", values.join(" ")).map_err(write_error)?;
        }
        Ok(())
    }
}

fn box_section(cell: &SimulationCell) -> String {
    let [a, b, c] = cell.vectors;
    let [xlo, ylo, zlo] = cell.origin;
    let (xhi, yhi, zhi) = (xlo + a[0], ylo + b[1], zlo + c[2]);
    let (xy, xz, yz) = (b[0], c[0], c[1]);
    let styles = cell.pbc.map(|p| if p { "pp" } else { "ff" }).join(" ");
    let n = columns::format_number;
    if xy == 0.0 && xz == 0.0 && yz == 0.0 {
        format!(
            "{BOX_BOUNDS} {styles}\n{} {}\n{} {}\n{} {}\n",
            n(xlo),
            n(xhi),
            n(ylo),
            n(yhi),
            n(zlo),
            n(zhi)
        )
    } else {
        let xlo_b = xlo + 0.0_f64.min(xy).min(xz).min(xy + xz);
        let xhi_b = xhi + 0.0_f64.max(xy).max(xz).max(xy + xz);
        let ylo_b = ylo + 0.0_f64.min(yz);
        let yhi_b = yhi + 0.0_f64.max(yz);
        format!(
            "{BOX_BOUNDS} xy xz yz {styles}\n{} {} {}\n{} {} {}\n{} {} {}\n",
            n(xlo_b),
            n(xhi_b),
            n(xy),
            n(ylo_b),
            n(yhi_b),
            n(xz),
            n(zlo),
            n(zhi),
            n(yz)
        )
    }
}

fn write_error(e: std::io::Error) -> Error {
    Error::operation("write_file", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    const DUMP: &str = "\
ITEM: TIMESTEP
100
ITEM: NUMBER OF ATOMS
2
ITEM: BOX BOUNDS pp pp ff
0 10
0 20
0 30
ITEM: ATOMS id type x y z
1 1 0.0 0.0 0.0
2 2 5.0 5.0 5.0
ITEM: TIMESTEP
200
ITEM: NUMBER OF ATOMS
1
ITEM: BOX BOUNDS pp pp pp
0 10
0 10
0 10
ITEM: ATOMS id type xs ys zs
7 1 0.5 0.25 0.1
";

    fn load_at(importer: &LammpsDumpImporter, frame: &FrameDescriptor) -> Result<DataCollection> {
        let offset = usize::try_from(frame.byte_offset).unwrap();
        let mut cursor = Cursor::new(DUMP.as_bytes()[offset..].to_vec());
        let mut local = frame.clone();
        local.byte_offset = 0;
        importer.load_frame(&local, &mut cursor, &TaskContext::detached("load"))
    }

    fn scan() -> Vec<FrameDescriptor> {
        let mut cursor = Cursor::new(DUMP.as_bytes().to_vec());
        LammpsDumpImporter::new()
            .scan_frames(
                &Location::local("md.dump"),
                &mut cursor,
                &TaskContext::detached("scan"),
            )
            .unwrap()
    }

    #[test]
    fn test_detect() {
        let location = Location::local("md.dump");
        assert!(detect(DUMP.as_bytes(), &location));
        assert!(!detect(b"2\ncomment\n", &location));
    }

    #[test]
    fn test_default_mapping() {
        assert_eq!(
            default_mapping(&["id", "type", "xu", "vx", "c_pe"]),
            vec![
                Some("Particle Identifier".to_string()),
                Some("Particle Type".to_string()),
                Some("Position.X".to_string()),
                Some("Velocity.X".to_string()),
                Some("c_pe".to_string()),
            ]
        );
        assert_eq!(default_mapping(&["xsu"]), vec![Some("Position.X".to_string())]);
    }

    #[test]
    fn test_scan_finds_timesteps() {
        let frames = scan();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].byte_offset, 0);
        assert_eq!(frames[1].line_number, 12);
        assert_eq!(frames[1].label, "md.dump (Frame 1)");
    }

    #[test]
    fn test_load_first_frame() {
        let frames = scan();
        let data = load_at(&LammpsDumpImporter::new(), &frames[0]).unwrap();
        assert_eq!(data.particle_count(), 2);
        assert_eq!(data.column_value(1, "Particle Type"), Some(2.0));
        assert_eq!(data.column_value(1, "Position.Y"), Some(5.0));
        assert_eq!(data.attributes.get("Timestep"), Some(&json!(100)));
        let cell = data.cell.unwrap();
        assert_eq!(cell.vectors[1], [0.0, 20.0, 0.0]);
        assert_eq!(cell.pbc, [true, true, false]);
    }

    #[test]
    fn test_reduced_coordinates() {
        let frames = scan();
        let data = load_at(&LammpsDumpImporter::new(), &frames[1]).unwrap();
        assert_eq!(data.column_value(0, "Position.X"), Some(5.0));
        assert_eq!(data.column_value(0, "Position.Y"), Some(2.5));
        assert_eq!(data.column_value(0, "Particle Identifier"), Some(7.0));
    }

    #[test]
    fn test_triclinic_box() {
        let text = "ITEM: BOX BOUNDS xy xz yz pp pp pp\n-1 10 -1\n0 10 0\n0 10 0\n";
        let mut cursor = Cursor::new(text.as_bytes().to_vec());
        let mut stream = TextStream::new(&mut cursor, 1, 0);
        stream.read_line().unwrap();
        let flags = stream.line().strip_prefix(BOX_BOUNDS).unwrap().to_string();
        let cell = read_box(&mut stream, &flags).unwrap();
        assert_eq!(cell.origin, [0.0, 0.0, 0.0]);
        assert_eq!(cell.vectors[0], [10.0, 0.0, 0.0]);
        assert_eq!(cell.vectors[1], [-1.0, 10.0, 0.0]);
        assert!(box_section(&cell).starts_with("ITEM: BOX BOUNDS xy xz yz pp pp pp\n-1 10 -1\n"));
    }

    #[test]
    fn test_atoms_before_count() {
        let mut cursor = Cursor::new(b"ITEM: ATOMS id\n1\n".to_vec());
        let err = LammpsDumpImporter::new()
            .load_frame(
                &FrameDescriptor::whole_file(Location::local("bad.dump")),
                &mut cursor,
                &TaskContext::detached("load"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ImportFailed(_)));
    }

    #[test]
    fn test_huge_count_fails_without_allocating() {
        let text = "ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n999999999\nITEM: ATOMS id x\n1 0.5\n";
        let mut cursor = Cursor::new(text.as_bytes().to_vec());
        let err = LammpsDumpImporter::new()
            .load_frame(
                &FrameDescriptor::whole_file(Location::local("huge.dump")),
                &mut cursor,
                &TaskContext::detached("load"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ImportFailed(msg) if msg.contains("end of file")));
    }

    #[test]
    fn test_export_round_trip() {
        let frames = scan();
        let data = load_at(&LammpsDumpImporter::new(), &frames[0]).unwrap();
        let mut options = OptionMap::new();
        options.insert(
            "columns".into(),
            json!(["Particle Identifier", "Particle Type", "Position.X", "Position.Y", "Position.Z"]),
        );
        let exporter = LammpsDumpExporter::from_options(&options).unwrap();
        let mut out = Vec::new();
        exporter
            .write_frame(&data, &mut out, &TaskContext::detached("export"))
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("ITEM: TIMESTEP\n100\nITEM: NUMBER OF ATOMS\n2\n"));
        assert!(text.contains("ITEM: BOX BOUNDS pp pp ff\n0 10\n0 20\n0 30\n"));
        assert!(text.contains("ITEM: ATOMS id type x y z\n1 1 0 0 0\n2 2 5 5 5\n"));

        let mut cursor = Cursor::new(text.into_bytes());
        let reread = LammpsDumpImporter::new()
            .load_frame(
                &FrameDescriptor::whole_file(Location::local("out.dump")),
                &mut cursor,
                &TaskContext::detached("load"),
            )
            .unwrap();
        assert_eq!(reread.cell, data.cell);
        assert_eq!(reread.properties(), data.properties());
    }
}
