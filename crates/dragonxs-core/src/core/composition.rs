use super::nuclides::identity::NuclideParseError;
use super::nuclides::library_id::UnknownBoundNuclide;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const CELSIUS_TO_KELVIN: f64 = 273.15;

/// Violations of the composition data model found while building solver records.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompositionError {
    #[error("Invalid nuclide: {0}")]
    Nuclide(#[from] NuclideParseError),

    #[error(
        "Nuclide '{nuclide}' in unit '{unit}' is bound to thermal-scattering law '{law}' in one component and free in another"
    )]
    BoundAndFree {
        unit: String,
        nuclide: String,
        law: String,
    },

    #[error(
        "Nuclide '{nuclide}' in unit '{unit}' is bound to two thermal-scattering laws: '{first}' and '{second}'"
    )]
    ConflictingBindings {
        unit: String,
        nuclide: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    UnknownBoundNuclide(#[from] UnknownBoundNuclide),

    #[error("Unit '{unit}' returned {actual} number densities for {expected} requested nuclides")]
    DensityCountMismatch {
        unit: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unit '{unit}' has no component area to average temperatures over")]
    NoComponentArea { unit: String },
}

/// A thermal-scattering law and the nuclides of a material it binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermalScatteringLaw {
    #[serde(rename = "law")]
    pub name: String,
    pub nuclides: Vec<String>,
}

/// One constituent of a composition unit: a material region with its own
/// temperature, cross-sectional area and nuclide content.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub is_fuel: bool,
    pub area: f64,
    pub temperature_c: f64,
    pub thermal_scattering: Vec<ThermalScatteringLaw>,
    /// Number densities in atoms/barn-cm, keyed by nuclide name.
    pub number_densities: BTreeMap<String, f64>,
}

impl Component {
    /// Returns the law binding `label` in this component, if any.
    pub fn binding_for(&self, label: &str) -> Option<&str> {
        let label = normalize_label(label);
        self.thermal_scattering
            .iter()
            .find(|law| law.nuclides.iter().any(|n| normalize_label(n) == label))
            .map(|law| law.name.as_str())
    }

    pub fn number_density(&self, label: &str) -> f64 {
        let label = normalize_label(label);
        self.number_densities
            .iter()
            .find(|(name, _)| normalize_label(name) == label)
            .map(|(_, density)| *density)
            .unwrap_or(0.0)
    }
}

/// A read-only view of one region whose nuclide content is modeled.
///
/// Implementations are treated as immutable for the duration of one pipeline run.
pub trait CompositionUnit: Send + Sync {
    fn name(&self) -> &str;

    /// The cross-section group identifier, e.g. `AA`.
    fn xs_id(&self) -> &str;

    /// Bulk mass density in g/cc.
    fn density(&self) -> f64;

    /// Number densities for `nuclides`, in the same order and of the same length.
    fn number_densities(&self, nuclides: &[String]) -> Vec<f64>;

    fn components(&self) -> &[Component];

    /// Key used to sequence units deterministically.
    fn order_key(&self) -> String {
        format!("{}/{}", self.xs_id(), self.name())
    }

    /// Mixture temperature in Kelvin.
    ///
    /// Area-weighted average over fuel components when the unit has any, and over
    /// all components otherwise. DRAGON accepts a single temperature per mixture.
    fn temperature_k(&self) -> Result<f64, CompositionError> {
        let has_fuel = self.components().iter().any(|c| c.is_fuel);
        let (weighted, total_area) = self
            .components()
            .iter()
            .filter(|c| !has_fuel || c.is_fuel)
            .fold((0.0, 0.0), |(weighted, area), c| {
                (weighted + c.temperature_c * c.area, area + c.area)
            });
        if total_area <= 0.0 {
            return Err(CompositionError::NoComponentArea {
                unit: self.name().to_string(),
            });
        }
        Ok(weighted / total_area + CELSIUS_TO_KELVIN)
    }
}

/// A homogenized unit: number densities are area-weighted over its components.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub xs_id: String,
    pub density: f64,
    pub components: Vec<Component>,
}

impl Block {
    fn total_area(&self) -> f64 {
        self.components.iter().map(|c| c.area).sum()
    }
}

impl CompositionUnit for Block {
    fn name(&self) -> &str {
        &self.name
    }

    fn xs_id(&self) -> &str {
        &self.xs_id
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn number_densities(&self, nuclides: &[String]) -> Vec<f64> {
        let total_area = self.total_area();
        if total_area <= 0.0 {
            return vec![0.0; nuclides.len()];
        }
        nuclides
            .iter()
            .map(|nuclide| {
                self.components
                    .iter()
                    .map(|c| c.number_density(nuclide) * c.area)
                    .sum::<f64>()
                    / total_area
            })
            .collect()
    }

    fn components(&self) -> &[Component] {
        &self.components
    }
}

pub(crate) fn normalize_label(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}
