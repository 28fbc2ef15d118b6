//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use atomio::io::binder;
use atomio::io::registry::ImporterEntry;
use atomio::models::DataCollection;
use atomio::pipeline::TaskManager;
use atomio::{
    AtomioConfig, DataSet, ExporterRegistry, FormatDescriptor, FormatRegistry,
    FrameDescriptor, Importer, Location, OptionMap, Result, TaskContext,
};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Three particles with identifiers, single frame.
pub const XYZ_SINGLE: &str = "3\nwater\n1 0.0 0.0 0.0\n2 0.757 0.586 0.0\n3 -0.757 0.586 0.0\n";

/// Two frames of two particles each.
pub const XYZ_TWO_FRAMES: &str =
    "2\nframe 0\nCu 0.0 0.0 0.0\nZr 1.0 1.0 1.0\n2\nframe 1\nCu 0.5 0.0 0.0\nZr 1.5 1.0 1.0\n";

/// Declares two particles but the data lines are malformed.
pub const XYZ_MALFORMED: &str = "2\nbroken\nCu 0.0 zero 0.0\nZr 1.0 1.0 1.0\n";

/// A single-frame LAMMPS text dump.
pub const LAMMPS_DUMP: &str = "\
ITEM: TIMESTEP
100
ITEM: NUMBER OF ATOMS
2
ITEM: BOX BOUNDS pp pp pp
0.0 10.0
0.0 10.0
0.0 10.0
ITEM: ATOMS id type x y z
1 1 1.0 2.0 3.0
2 2 4.0 5.0 6.0
";

/// Standard XYZ column mapping with identifiers.
pub fn id_columns() -> serde_json::Value {
    serde_json::json!(["Particle Identifier", "Position.X", "Position.Y", "Position.Z"])
}

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Builds an option map from `(name, value)` pairs.
pub fn options(pairs: &[(&str, serde_json::Value)]) -> OptionMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Options of [`SlowImporter`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SlowOptions {
    /// Finish immediately instead of waiting to be canceled.
    pub fast: bool,
}

/// An importer that only finishes by being canceled (or after 10 s),
/// unless its `fast` option is set.
#[derive(Debug, Default)]
pub struct SlowImporter {
    options: SlowOptions,
}

impl Importer for SlowImporter {
    fn format_name(&self) -> &'static str {
        "slow"
    }

    fn display_name(&self) -> &'static str {
        "Slow importer"
    }

    fn bind_options(&mut self, options: &OptionMap) -> Result<()> {
        let target = self.display_name();
        binder::bind(&mut self.options, options, target)
    }

    fn options(&self) -> serde_json::Value {
        serde_json::to_value(&self.options).unwrap_or_default()
    }

    fn load_frame(
        &self,
        _frame: &FrameDescriptor,
        _reader: &mut dyn BufRead,
        ctx: &TaskContext,
    ) -> Result<DataCollection> {
        if self.options.fast {
            return Ok(DataCollection::new(0));
        }
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            ctx.checkpoint()?;
            thread::sleep(Duration::from_millis(2));
        }
        Ok(DataCollection::new(0))
    }
}

fn detect_slow(prefix: &[u8], _location: &Location) -> bool {
    prefix.starts_with(b"SLOW")
}

fn create_slow() -> Box<dyn Importer> {
    Box::new(SlowImporter::default())
}

/// Built-in formats plus the `slow` test format.
pub fn dataset_with_slow_format() -> DataSet {
    let formats = FormatRegistry::with_builtin_formats();
    formats
        .register(ImporterEntry {
            descriptor: FormatDescriptor {
                name: "slow",
                description: "Test format that loads until canceled",
                extensions: &["slow"],
            },
            detect: detect_slow,
            create: create_slow,
        })
        .unwrap();
    DataSet::with_registries(
        &AtomioConfig::default(),
        Arc::new(formats),
        Arc::new(ExporterRegistry::with_builtin_formats()),
    )
    .unwrap()
}

/// Cancels every operation as soon as one is running.
///
/// The handle yields whether an operation was observed before canceling.
pub fn cancel_when_running(tasks: Arc<TaskManager>) -> JoinHandle<bool> {
    thread::spawn(move || {
        let observed = tasks.wait_until_active(Duration::from_secs(5));
        tasks.cancel_all();
        observed
    })
}
