//! Animation frames within (possibly multi-frame) files.

use super::Location;
use serde::{Deserialize, Serialize};

/// Animation time, measured in animation frames.
pub type TimePoint = i32;

/// Where one frame's data lives inside a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// The file holding the frame.
    pub location: Location,
    /// Byte offset of the frame's first line.
    pub byte_offset: u64,
    /// One-based line number of the frame's first line.
    pub line_number: u64,
    /// Human-readable label, e.g. `dump.lammps (Frame 3)`.
    pub label: String,
}

impl FrameDescriptor {
    /// Describes a file that holds exactly one frame starting at its beginning.
    #[must_use]
    pub fn whole_file(location: Location) -> Self {
        let label = location.file_name().unwrap_or_else(|| location.to_string());
        Self {
            location,
            byte_offset: 0,
            line_number: 1,
            label,
        }
    }

    /// Describes frame `index` starting at the given offset.
    #[must_use]
    pub fn at(location: Location, index: usize, byte_offset: u64, line_number: u64) -> Self {
        let name = location.file_name().unwrap_or_else(|| location.to_string());
        Self {
            location,
            byte_offset,
            line_number,
            label: format!("{name} (Frame {index})"),
        }
    }
}
