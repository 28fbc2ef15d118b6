//! Mapping of whitespace-separated file columns to particle properties.
//!
//! A mapping lists, per file column, the property that receives it
//! (`Position.X`, `Particle Identifier`, …) or `None` to skip the column.

use crate::models::{DataCollection, split_column};
use crate::{Error, Result};

/// Per-column target property names; `None` skips a column.
pub type ColumnMapping = Vec<Option<String>>;

/// Property holding particle types, which may be given by name.
pub const PARTICLE_TYPE: &str = "Particle Type";

#[derive(Debug, Clone)]
struct Target {
    property: usize,
    component: usize,
    is_type: bool,
}

/// Parses data lines into the properties of a [`DataCollection`].
#[derive(Debug)]
pub struct InputColumnReader {
    targets: Vec<Option<Target>>,
    type_names: Vec<String>,
}

impl InputColumnReader {
    /// Creates the mapped properties in `data` and prepares the reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImportFailed`] if a mapping entry names a component
    /// its property does not have, or if the mapping is empty.
    pub fn new(mapping: &[Option<String>], data: &mut DataCollection) -> Result<Self> {
        if mapping.is_empty() {
            return Err(Error::ImportFailed(
                "the column mapping is empty".to_string(),
            ));
        }
        let mut targets = Vec::with_capacity(mapping.len());
        for entry in mapping {
            let Some(column) = entry.as_deref().filter(|c| !c.trim().is_empty()) else {
                targets.push(None);
                continue;
            };
            let (name, component) = split_column(column);
            let property = data.ensure_property(name, component);
            let Some(component_index) = property.component_index(component) else {
                return Err(Error::ImportFailed(format!(
                    "property '{name}' has no component '{}'",
                    component.unwrap_or("")
                )));
            };
            let property_index = data
                .properties()
                .iter()
                .position(|p| p.name == name)
                .unwrap_or_default();
            targets.push(Some(Target {
                property: property_index,
                component: component_index,
                is_type: name == PARTICLE_TYPE,
            }));
        }
        Ok(Self {
            targets,
            type_names: data.type_names.clone(),
        })
    }

    /// Number of file columns the reader expects per line.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.targets.len()
    }

    /// Parses one data line for particle `index`, growing `data` to hold it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImportFailed`] if the line has the wrong number of
    /// columns or a mapped value is not a number.
    pub fn read_particle(
        &mut self,
        index: usize,
        line: &str,
        line_number: u64,
        data: &mut DataCollection,
    ) -> Result<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != self.targets.len() {
            return Err(Error::ImportFailed(format!(
                "line {line_number} has {} columns, but the column mapping lists {}",
                tokens.len(),
                self.targets.len()
            )));
        }
        if index >= data.particle_count() {
            data.set_particle_count(index + 1);
        }
        for (token, target) in tokens.iter().zip(&self.targets) {
            let Some(target) = target else { continue };
            let value = if target.is_type {
                parse_type(&mut self.type_names, token)
            } else {
                token.parse::<f64>().ok()
            };
            let Some(value) = value else {
                return Err(Error::ImportFailed(format!(
                    "invalid value '{token}' in line {line_number}"
                )));
            };
            data.property_mut(target.property)
                .set(index, target.component, value);
        }
        Ok(())
    }

    /// Stores the collected type names in `data`.
    pub fn finish(self, data: &mut DataCollection) {
        data.type_names = self.type_names;
    }
}

/// Numeric type ids pass through; names get ids in order of appearance.
fn parse_type(type_names: &mut Vec<String>, token: &str) -> Option<f64> {
    if let Ok(id) = token.parse::<i64>() {
        #[allow(clippy::cast_precision_loss)]
        return Some(id as f64);
    }
    if token.parse::<f64>().is_ok() {
        return None;
    }
    let position = match type_names.iter().position(|n| n == token) {
        Some(position) => position,
        None => {
            type_names.push(token.to_string());
            type_names.len() - 1
        },
    };
    #[allow(clippy::cast_precision_loss)]
    Some((position + 1) as f64)
}

/// Formats one output value of `column` for particle `index`.
///
/// Integral values print without a fractional part; particle types print
/// their name when the data carries type names.
///
/// # Errors
///
/// Returns [`Error::ExportFailed`] if the property is missing.
pub fn format_value(data: &DataCollection, index: usize, column: &str) -> Result<String> {
    let value = data
        .column_value(index, column)
        .ok_or_else(|| missing_column(column))?;
    if column == PARTICLE_TYPE && !data.type_names.is_empty() {
        if let Some(name) = type_name(data, value) {
            return Ok(name.to_string());
        }
    }
    Ok(format_number(value))
}

/// Checks up front that every output column exists in `data`.
///
/// # Errors
///
/// Returns [`Error::ExportFailed`] naming the first missing column.
pub fn require_columns(data: &DataCollection, columns: &[String]) -> Result<()> {
    if data.particle_count() == 0 {
        return Ok(());
    }
    match columns.iter().find(|c| data.column_value(0, c).is_none()) {
        Some(column) => Err(missing_column(column)),
        None => Ok(()),
    }
}

fn missing_column(column: &str) -> Error {
    Error::ExportFailed(format!(
        "the property '{column}' does not exist in the data to be exported"
    ))
}

fn type_name(data: &DataCollection, value: f64) -> Option<&str> {
    if value.fract() != 0.0 || value < 1.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = value as usize - 1;
    data.type_names.get(index).map(String::as_str)
}

/// Shortest round-tripping text form of a value.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(columns: &[Option<&str>]) -> ColumnMapping {
        columns.iter().map(|c| c.map(str::to_string)).collect()
    }

    #[test]
    fn test_read_mapped_columns() {
        let mut data = DataCollection::new(2);
        let mut reader = InputColumnReader::new(
            &mapping(&[Some("Particle Identifier"), None, Some("Position.X"), Some("Position.Y"), Some("Position.Z")]),
            &mut data,
        )
        .unwrap();
        reader.read_particle(0, "1 skip 0.5 1.5 2.5", 3, &mut data).unwrap();
        reader.read_particle(1, "2 skip -1 0 1e-3", 4, &mut data).unwrap();
        reader.finish(&mut data);

        assert_eq!(data.column_value(1, "Particle Identifier"), Some(2.0));
        assert_eq!(data.column_value(0, "Position.Y"), Some(1.5));
        assert_eq!(data.column_value(1, "Position.Z"), Some(1e-3));
        assert_eq!(data.properties().len(), 2);
    }

    #[test]
    fn test_reader_grows_data_per_particle() {
        let mut data = DataCollection::new(0);
        let mut reader = InputColumnReader::new(&mapping(&[Some("Position.X"), Some("Mass")]), &mut data).unwrap();
        assert_eq!(data.property("Position").unwrap().data.len(), 0);

        reader.read_particle(0, "1.5 2", 1, &mut data).unwrap();
        reader.read_particle(1, "2.5 3", 2, &mut data).unwrap();

        assert_eq!(data.particle_count(), 2);
        assert_eq!(data.property("Position").unwrap().data.len(), 6);
        assert_eq!(data.column_value(1, "Position.X"), Some(2.5));
        assert_eq!(data.column_value(1, "Position.Y"), Some(0.0));
        assert_eq!(data.column_value(0, "Mass"), Some(2.0));
    }

    #[test]
    fn test_named_types() {
        let mut data = DataCollection::new(3);
        let mut reader = InputColumnReader::new(&mapping(&[Some("Particle Type")]), &mut data).unwrap();
        for (i, line) in ["Cu", "Zr", "Cu"].iter().enumerate() {
            reader.read_particle(i, line, 1, &mut data).unwrap();
        }
        reader.finish(&mut data);
        assert_eq!(data.type_names, vec!["Cu", "Zr"]);
        assert_eq!(data.column_value(2, "Particle Type"), Some(1.0));
        assert_eq!(format_value(&data, 1, "Particle Type").unwrap(), "Zr");
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut data = DataCollection::new(1);
        let mut reader =
            InputColumnReader::new(&mapping(&[Some("Position.X"), Some("Position.Y")]), &mut data).unwrap();
        let err = reader.read_particle(0, "1 2 3", 7, &mut data).unwrap_err();
        assert!(matches!(err, Error::ImportFailed(msg) if msg.contains("line 7")));
    }

    #[test]
    fn test_invalid_number() {
        let mut data = DataCollection::new(1);
        let mut reader = InputColumnReader::new(&mapping(&[Some("Mass")]), &mut data).unwrap();
        assert!(reader.read_particle(0, "heavy", 2, &mut data).is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.25), "-0.25");
        assert_eq!(format_number(1e20), "100000000000000000000");
    }

    #[test]
    fn test_require_columns() {
        let mut data = DataCollection::new(1);
        data.ensure_property("Position", Some("X"));
        assert!(require_columns(&data, &["Position.X".to_string()]).is_ok());
        assert!(matches!(
            require_columns(&data, &["Mass".to_string()]),
            Err(Error::ExportFailed(_))
        ));
    }
}
