use crate::core::composition::{Block, Component, ThermalScatteringLaw};
use crate::core::nuclides::identity::{Nuclide, NuclideParseError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CompositionFileError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Unit name '{0}' appears more than once")]
    DuplicateUnit(String),
    #[error("Unit '{unit}' has an empty cross-section id")]
    MissingXsId { unit: String },
    #[error("Unit '{unit}': {field} must not be negative (got {value})")]
    NegativeValue {
        unit: String,
        field: String,
        value: f64,
    },
    #[error("Unit '{unit}': {source}")]
    Nuclide {
        unit: String,
        source: NuclideParseError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCompositionFile {
    #[serde(default, rename = "unit")]
    units: Vec<RawUnit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawUnit {
    name: String,
    xs_id: String,
    density: f64,
    #[serde(default, rename = "component")]
    components: Vec<RawComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawComponent {
    name: String,
    #[serde(default)]
    fuel: bool,
    area: f64,
    temperature_c: f64,
    #[serde(default)]
    thermal_scattering: Vec<ThermalScatteringLaw>,
    #[serde(default)]
    number_densities: BTreeMap<String, f64>,
}

/// Loads composition units from a TOML file.
///
/// # Errors
///
/// Fails on unreadable or malformed files, duplicate unit names, negative
/// densities or areas, and nuclide names that do not parse.
pub fn load(path: &Path) -> Result<Vec<Block>, CompositionFileError> {
    let content = std::fs::read_to_string(path).map_err(|e| CompositionFileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let raw: RawCompositionFile = toml::from_str(&content).map_err(|e| CompositionFileError::Toml {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut names = HashSet::new();
    let mut blocks = Vec::with_capacity(raw.units.len());
    for unit in raw.units {
        if !names.insert(unit.name.clone()) {
            return Err(CompositionFileError::DuplicateUnit(unit.name));
        }
        blocks.push(convert_unit(unit)?);
    }
    debug!(path = %path.display(), units = blocks.len(), "Loaded composition file.");
    Ok(blocks)
}

fn convert_unit(raw: RawUnit) -> Result<Block, CompositionFileError> {
    if raw.xs_id.trim().is_empty() {
        return Err(CompositionFileError::MissingXsId { unit: raw.name });
    }
    check_non_negative(&raw.name, "density", raw.density)?;

    let mut components = Vec::with_capacity(raw.components.len());
    for component in raw.components {
        check_non_negative(&raw.name, &format!("area of component '{}'", component.name), component.area)?;
        for (nuclide, &density) in &component.number_densities {
            nuclide
                .parse::<Nuclide>()
                .map_err(|source| CompositionFileError::Nuclide {
                    unit: raw.name.clone(),
                    source,
                })?;
            check_non_negative(&raw.name, &format!("number density of {nuclide}"), density)?;
        }
        components.push(Component {
            name: component.name,
            is_fuel: component.fuel,
            area: component.area,
            temperature_c: component.temperature_c,
            thermal_scattering: component.thermal_scattering,
            number_densities: component.number_densities,
        });
    }

    Ok(Block {
        name: raw.name,
        xs_id: raw.xs_id.trim().to_string(),
        density: raw.density,
        components,
    })
}

fn check_non_negative(unit: &str, field: &str, value: f64) -> Result<(), CompositionFileError> {
    if value < 0.0 {
        return Err(CompositionFileError::NegativeValue {
            unit: unit.to_string(),
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}
