//! Data models for atomio.
//!
//! This module contains the value types exchanged between the registries,
//! the importers/exporters and the pipeline: locations, pipeline status,
//! loaded particle data, frame descriptors and untyped option maps.

mod data;
mod frame;
mod location;
mod options;
mod status;

pub use data::{
    DataCollection, ParticleProperty, SimulationCell, split_column, standard_components,
};
pub use frame::{FrameDescriptor, TimePoint};
pub use location::Location;
pub use options::{OptionMap, parse_option_assignment};
pub use status::{PipelineStatus, StatusType};
