//! Loaded particle data.

use super::PipelineStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Component names of the vector-valued standard properties.
const XYZ: &[&str] = &["X", "Y", "Z"];
const RGB: &[&str] = &["R", "G", "B"];

/// Returns the component names for a property name.
///
/// Standard vector properties (`Position`, `Velocity`, …) have fixed
/// components; anything else is scalar unless a component is requested
/// explicitly, in which case X/Y/Z is assumed.
#[must_use]
pub fn standard_components(name: &str) -> &'static [&'static str] {
    match name {
        "Position" | "Velocity" | "Force" | "Displacement" | "Dipole Orientation"
        | "Angular Velocity" | "Angular Momentum" | "Torque" | "Aspherical Shape"
        | "Periodic Image" => XYZ,
        "Color" => RGB,
        _ => &[],
    }
}

/// One per-particle property, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleProperty {
    /// Property name, e.g. `Position`.
    pub name: String,
    /// Component names; empty for scalar properties.
    pub components: Vec<String>,
    /// `particle_count * max(1, components.len())` values.
    pub data: Vec<f64>,
}

impl ParticleProperty {
    /// Creates a zero-filled property.
    #[must_use]
    pub fn new(name: impl Into<String>, components: &[&str], count: usize) -> Self {
        let stride = components.len().max(1);
        Self {
            name: name.into(),
            components: components.iter().map(|c| (*c).to_string()).collect(),
            data: vec![0.0; count * stride],
        }
    }

    /// Number of values per particle.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.components.len().max(1)
    }

    /// Index of a named component (`None` selects the scalar value).
    #[must_use]
    pub fn component_index(&self, component: Option<&str>) -> Option<usize> {
        match component {
            None if self.components.is_empty() => Some(0),
            None => None,
            Some(c) => self.components.iter().position(|name| name == c),
        }
    }

    /// Reads one value.
    #[must_use]
    pub fn get(&self, particle: usize, component: usize) -> Option<f64> {
        self.data.get(particle * self.stride() + component).copied()
    }

    /// Resizes the storage to `count` particles, zero-filling new rows.
    pub fn resize(&mut self, count: usize) {
        let len = count * self.stride();
        self.data.resize(len, 0.0);
    }

    /// Writes one value; out-of-range writes are ignored.
    pub fn set(&mut self, particle: usize, component: usize, value: f64) {
        let index = particle * self.stride() + component;
        if let Some(slot) = self.data.get_mut(index) {
            *slot = value;
        }
    }
}

/// Simulation cell geometry: three cell vectors plus an origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationCell {
    /// Cell vectors a, b, c.
    pub vectors: [[f64; 3]; 3],
    /// Cell origin.
    pub origin: [f64; 3],
    /// Periodic boundary flags per axis.
    pub pbc: [bool; 3],
}

impl SimulationCell {
    /// Creates an orthogonal, non-periodic cell.
    #[must_use]
    pub const fn orthogonal(size: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            vectors: [[size[0], 0.0, 0.0], [0.0, size[1], 0.0], [0.0, 0.0, size[2]]],
            origin,
            pbc: [false; 3],
        }
    }

    /// Maps reduced coordinates into absolute (Cartesian) coordinates.
    #[must_use]
    pub fn reduced_to_absolute(&self, p: [f64; 3]) -> [f64; 3] {
        let [a, b, c] = self.vectors;
        std::array::from_fn(|k| {
            p[0].mul_add(a[k], p[1].mul_add(b[k], p[2].mul_add(c[k], self.origin[k])))
        })
    }
}

/// The data loaded for one frame, together with its pipeline status.
///
/// This is the value a blocking `data()` call hands back to scripts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataCollection {
    particle_count: usize,
    properties: Vec<ParticleProperty>,
    /// Names of particle types, when types were given textually.
    pub type_names: Vec<String>,
    /// Simulation cell, if known.
    pub cell: Option<SimulationCell>,
    /// Global attributes (timestep, source frame, …).
    pub attributes: BTreeMap<String, serde_json::Value>,
    status: PipelineStatus,
}

impl DataCollection {
    /// Creates an empty collection for `particle_count` particles.
    #[must_use]
    pub fn new(particle_count: usize) -> Self {
        Self {
            particle_count,
            ..Self::default()
        }
    }

    /// Creates an empty collection carrying only a status.
    #[must_use]
    pub fn with_status_only(status: PipelineStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Number of particles.
    #[must_use]
    pub const fn particle_count(&self) -> usize {
        self.particle_count
    }

    /// Changes the particle count, resizing every property.
    ///
    /// Importers grow the count one particle at a time as lines are read,
    /// so a bogus count in a file header never allocates up front.
    pub fn set_particle_count(&mut self, count: usize) {
        self.particle_count = count;
        for property in &mut self.properties {
            property.resize(count);
        }
    }

    /// Status of the evaluation that produced this data.
    #[must_use]
    pub const fn status(&self) -> &PipelineStatus {
        &self.status
    }

    /// Replaces the status.
    pub fn set_status(&mut self, status: PipelineStatus) {
        self.status = status;
    }

    /// All properties.
    #[must_use]
    pub fn properties(&self) -> &[ParticleProperty] {
        &self.properties
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&ParticleProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up a property by name for modification.
    pub fn property_named_mut(&mut self, name: &str) -> Option<&mut ParticleProperty> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// Mutable access to a property by index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn property_mut(&mut self, index: usize) -> &mut ParticleProperty {
        &mut self.properties[index]
    }

    /// Returns the named property, creating it with standard components.
    pub fn ensure_property(&mut self, name: &str, component: Option<&str>) -> &mut ParticleProperty {
        let index = if let Some(index) = self.properties.iter().position(|p| p.name == name) {
            index
        } else {
            let mut components = standard_components(name);
            if components.is_empty() && component.is_some() {
                components = XYZ;
            }
            self.properties
                .push(ParticleProperty::new(name, components, self.particle_count));
            self.properties.len() - 1
        };
        &mut self.properties[index]
    }

    /// Reads a value addressed as `Property` or `Property.Component`.
    #[must_use]
    pub fn column_value(&self, particle: usize, column: &str) -> Option<f64> {
        let (name, component) = split_column(column);
        let property = self.property(name)?;
        let index = property.component_index(component)?;
        property.get(particle, index)
    }

    /// Positions of all particles, if a `Position` property exists.
    #[must_use]
    pub fn positions(&self) -> Option<Vec<[f64; 3]>> {
        let property = self.property("Position")?;
        Some(
            property
                .data
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        )
    }
}

/// Splits `Position.X` into (`Position`, `Some("X")`).
#[must_use]
pub fn split_column(column: &str) -> (&str, Option<&str>) {
    match column.rsplit_once('.') {
        Some((name, component)) if !name.is_empty() && !component.is_empty() => {
            (name, Some(component))
        },
        _ => (column, None),
    }
}
