use super::composition::{CompositionError, CompositionUnit};
use super::nuclides::identity::Nuclide;
use super::nuclides::library_id::resolve_library_id;
use super::nuclides::thermal::ThermalScatteringAssignment;
use serde::{Serialize, Serializer};
use tracing::debug;

/// Default bulk density (g/cc) above which every nuclide of a unit is self-shielded.
pub const DEFAULT_SELF_SHIELD_DENSITY_THRESHOLD: f64 = 1.0e-4;

/// Temperature written for a mixture without content, which has no area to weight by.
pub const EMPTY_MIXTURE_TEMPERATURE_K: f64 = 293.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixingOptions {
    pub self_shield_density_threshold: f64,
}

impl Default for MixingOptions {
    fn default() -> Self {
        Self {
            self_shield_density_threshold: DEFAULT_SELF_SHIELD_DENSITY_THRESHOLD,
        }
    }
}

/// One line of a DRAGON `MIX` card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NuclideRecord {
    pub domain_name: String,
    pub library_id: String,
    pub group_id: String,
    pub number_density: f64,
    /// Resonant region index (`inrs`); `None` excludes the nuclide from self-shielding.
    #[serde(serialize_with = "serialize_self_shield")]
    pub self_shield_index: Option<usize>,
}

fn serialize_self_shield<S: Serializer>(index: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
    match index {
        Some(index) => serializer.serialize_str(&index.to_string()),
        None => serializer.serialize_str(""),
    }
}

/// Template-facing data for one mixture of a case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixtureData {
    pub index: usize,
    pub name: String,
    pub xs_id: String,
    pub temperature_k: f64,
    pub nuclides: Vec<NuclideRecord>,
}

/// A composition unit at a fixed position within its case.
///
/// The position determines the self-shielding index shared by all of the unit's
/// nuclides, so that every mixture of a case gets its own fine-group flux.
pub struct Mixture<'a, U: CompositionUnit + ?Sized> {
    unit: &'a U,
    position: usize,
}

impl<'a, U: CompositionUnit + ?Sized> Mixture<'a, U> {
    pub fn new(unit: &'a U, position: usize) -> Self {
        Self { unit, position }
    }

    pub fn unit(&self) -> &U {
        self.unit
    }

    /// The 1-based resonant region index of this mixture.
    pub fn self_shield_region(&self) -> usize {
        self.position + 1
    }

    /// Builds the ordered nuclide records of this mixture.
    ///
    /// Lumped and dummy placeholder nuclides are skipped. A unit whose number
    /// densities are all zero yields an empty list.
    ///
    /// # Errors
    ///
    /// Fails when a nuclide name cannot be parsed, when the unit's thermal-scattering
    /// bindings are inconsistent, or when the unit returns a wrong number of densities.
    pub fn records(
        &self,
        nuclides: &[String],
        options: &MixingOptions,
    ) -> Result<Vec<NuclideRecord>, CompositionError> {
        let densities = self.unit.number_densities(nuclides);
        if densities.len() != nuclides.len() {
            return Err(CompositionError::DensityCountMismatch {
                unit: self.unit.name().to_string(),
                expected: nuclides.len(),
                actual: densities.len(),
            });
        }
        let parsed = nuclides
            .iter()
            .map(|name| name.parse::<Nuclide>())
            .collect::<Result<Vec<_>, _>>()?;
        if densities.iter().all(|&d| d == 0.0) {
            debug!(unit = self.unit.name(), "Unit has no nuclide content; writing an empty mixture.");
            return Ok(Vec::new());
        }

        let assignment = ThermalScatteringAssignment::resolve(self.unit)?;
        let bulk_shielded = self.unit.density() > options.self_shield_density_threshold;

        let mut records = Vec::with_capacity(nuclides.len());
        for (nuclide, &number_density) in parsed.iter().zip(&densities) {
            let Some(identity) = nuclide.identity() else {
                continue;
            };
            let self_shield_index = (identity.is_heavy_metal() || bulk_shielded)
                .then(|| self.self_shield_region());

            records.push(NuclideRecord {
                domain_name: identity.label(),
                library_id: resolve_library_id(identity, &assignment)?,
                group_id: self.unit.xs_id().to_string(),
                number_density,
                self_shield_index,
            });
        }
        Ok(records)
    }

    pub fn to_data(
        &self,
        nuclides: &[String],
        options: &MixingOptions,
    ) -> Result<MixtureData, CompositionError> {
        let records = self.records(nuclides, options)?;
        let temperature_k = if records.is_empty() {
            match self.unit.temperature_k() {
                Err(CompositionError::NoComponentArea { .. }) => EMPTY_MIXTURE_TEMPERATURE_K,
                other => other?,
            }
        } else {
            self.unit.temperature_k()?
        };
        Ok(MixtureData {
            index: self.self_shield_region(),
            name: self.unit.name().to_string(),
            xs_id: self.unit.xs_id().to_string(),
            temperature_k,
            nuclides: records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::composition::{Block, Component, ThermalScatteringLaw};
    use std::collections::BTreeMap;

    fn nuclides(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn component(name: &str, is_fuel: bool, contents: &[(&str, f64)]) -> Component {
        Component {
            name: name.to_string(),
            is_fuel,
            area: 1.0,
            temperature_c: 600.0,
            thermal_scattering: Vec::new(),
            number_densities: contents
                .iter()
                .map(|(n, d)| (n.to_string(), *d))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn fuel_block(density: f64) -> Block {
        Block {
            name: "B0001-001".to_string(),
            xs_id: "AA".to_string(),
            density,
            components: vec![
                component("fuel", true, &[("U235", 0.004), ("U238", 0.02), ("LFP35", 1e-4)]),
                component("clad", false, &[("FE56", 0.06)]),
            ],
        }
    }

    #[test]
    fn records_follow_requested_order_and_skip_placeholders() {
        let block = fuel_block(10.0);
        let mixture = Mixture::new(&block, 0);
        let records = mixture
            .records(&nuclides(&["U238", "LFP35", "FE56", "U235", "DUMP1"]), &MixingOptions::default())
            .unwrap();
        let names: Vec<_> = records.iter().map(|r| r.domain_name.as_str()).collect();
        assert_eq!(names, ["U238", "FE56", "U235"]);
        assert!(records.iter().all(|r| r.group_id == "AA"));
        assert_eq!(records[0].library_id, "U238");
        assert_eq!(records[1].library_id, "Fe56");
    }

    #[test]
    fn zero_density_unit_yields_no_records() {
        let mut block = fuel_block(10.0);
        for c in &mut block.components {
            c.area = 0.0;
        }
        let records = Mixture::new(&block, 0)
            .records(&nuclides(&["U235", "FE56"]), &MixingOptions::default())
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn dense_units_shield_every_nuclide_with_their_position() {
        let block = fuel_block(10.0);
        let records = Mixture::new(&block, 2)
            .records(&nuclides(&["U235", "FE56"]), &MixingOptions::default())
            .unwrap();
        assert!(records.iter().all(|r| r.self_shield_index == Some(3)));
    }

    #[test]
    fn dilute_units_only_shield_heavy_metal() {
        let block = fuel_block(5e-5);
        let records = Mixture::new(&block, 0)
            .records(&nuclides(&["U235", "FE56"]), &MixingOptions::default())
            .unwrap();
        assert_eq!(records[0].self_shield_index, Some(1));
        assert_eq!(records[1].self_shield_index, None);
    }

    #[test]
    fn threshold_is_configurable() {
        let block = fuel_block(0.5);
        let options = MixingOptions {
            self_shield_density_threshold: 1.0,
        };
        let records = Mixture::new(&block, 0)
            .records(&nuclides(&["FE56"]), &options)
            .unwrap();
        assert_eq!(records[0].self_shield_index, None);
    }

    #[test]
    fn bound_nuclides_use_thermal_scattering_names() {
        let mut block = fuel_block(10.0);
        let mut liner = component("liner", false, &[("C", 0.08)]);
        liner.thermal_scattering.push(ThermalScatteringLaw {
            name: "graphite".to_string(),
            nuclides: vec!["C".to_string()],
        });
        block.components.push(liner);

        let records = Mixture::new(&block, 0)
            .records(&nuclides(&["C", "U235"]), &MixingOptions::default())
            .unwrap();
        assert_eq!(records[0].library_id, "C0_GR");
        assert_eq!(records[1].library_id, "U235");
    }

    #[test]
    fn mixed_bound_and_free_nuclide_is_rejected() {
        let mut block = fuel_block(10.0);
        let mut liner = component("liner", false, &[("C", 0.08)]);
        liner.thermal_scattering.push(ThermalScatteringLaw {
            name: "graphite".to_string(),
            nuclides: vec!["C".to_string()],
        });
        block.components.push(liner);
        block.components[1]
            .number_densities
            .insert("C".to_string(), 0.001);

        let result = Mixture::new(&block, 0).records(&nuclides(&["C"]), &MixingOptions::default());
        assert!(matches!(result, Err(CompositionError::BoundAndFree { .. })));
    }

    #[test]
    fn unknown_nuclide_names_are_reported() {
        let block = fuel_block(10.0);
        let result = Mixture::new(&block, 0).records(&nuclides(&["U235", "QQ1"]), &MixingOptions::default());
        assert!(matches!(result, Err(CompositionError::Nuclide(_))));

        let result = Mixture::new(&block, 0).records(&nuclides(&["QQ1"]), &MixingOptions::default());
        assert!(matches!(result, Err(CompositionError::Nuclide(_))));
    }

    #[test]
    fn zero_area_unit_renders_as_an_empty_mixture() {
        let mut block = fuel_block(10.0);
        for c in &mut block.components {
            c.area = 0.0;
        }
        let data = Mixture::new(&block, 0)
            .to_data(&nuclides(&["U235", "FE56"]), &MixingOptions::default())
            .unwrap();
        assert!(data.nuclides.is_empty());
        assert_eq!(data.temperature_k, EMPTY_MIXTURE_TEMPERATURE_K);
    }

    #[test]
    fn mixture_data_carries_temperature_and_index() {
        let block = fuel_block(10.0);
        let data = Mixture::new(&block, 1)
            .to_data(&nuclides(&["U235"]), &MixingOptions::default())
            .unwrap();
        assert_eq!(data.index, 2);
        assert_eq!(data.xs_id, "AA");
        assert!((data.temperature_k - 873.15).abs() < 1e-9);
        assert_eq!(data.nuclides.len(), 1);
    }
}
