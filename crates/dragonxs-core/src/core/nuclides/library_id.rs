use super::identity::NuclideIdentity;
use super::thermal::ThermalScatteringAssignment;
use phf::{Map, phf_map};
use thiserror::Error;

/// DRAGLIB isotope names for nuclides bound in a thermal-scattering law,
/// keyed by `"{law}:{nuclide label}"`.
static BOUND_LIBRARY_NAMES: Map<&'static str, &'static str> = phf_map! {
    "graphite:C" => "C0_GR",
    "graphite:C12" => "C12_GR",
    "h2o:H1" => "H1_H2O",
    "d2o:H2" => "H2_D2O",
    "zrh:H1" => "H1_ZRH",
    "ch2:H1" => "H1_CH2",
    "be:BE9" => "Be9_BE",
    "beo:BE9" => "Be9_BEO",
    "beo:O16" => "O16_BEO",
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("No DRAGLIB entry for nuclide '{nuclide}' bound in thermal-scattering law '{law}'")]
pub struct UnknownBoundNuclide {
    pub nuclide: String,
    pub law: String,
}

/// Returns the DRAGLIB isotope name of a free (unbound) nuclide.
///
/// DRAGON is case sensitive on isotope names: the element symbol is capitalized
/// (`Am`, `Na`), followed by the mass number and an `m` suffix for metastable
/// states, e.g. `Am242m`, `U235`, `Na23`.
pub fn draglib_id(identity: &NuclideIdentity) -> String {
    let mut chars = identity.symbol.chars();
    let mut id = match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    };
    id.push_str(&identity.mass_number.to_string());
    if identity.metastable > 0 {
        id.push('m');
    }
    id
}

/// Returns the DRAGLIB name of a bound nuclide, if the law/nuclide pair is tabulated.
pub fn bound_draglib_id(identity: &NuclideIdentity, law: &str) -> Option<&'static str> {
    let key = format!("{}:{}", law.to_ascii_lowercase(), identity.label());
    BOUND_LIBRARY_NAMES.get(key.as_str()).copied()
}

/// Resolves the library name of a nuclide within a unit.
///
/// Thermal-scattering bindings take precedence over the default naming rule.
pub fn resolve_library_id(
    identity: &NuclideIdentity,
    assignment: &ThermalScatteringAssignment,
) -> Result<String, UnknownBoundNuclide> {
    match assignment.law_for(&identity.label()) {
        Some(law) => bound_draglib_id(identity, law)
            .map(str::to_string)
            .ok_or_else(|| UnknownBoundNuclide {
                nuclide: identity.label(),
                law: law.to_string(),
            }),
        None => Ok(draglib_id(identity)),
    }
}
