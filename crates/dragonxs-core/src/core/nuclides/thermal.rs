use crate::core::composition::{CompositionError, CompositionUnit, normalize_label};
use std::collections::{BTreeMap, BTreeSet};

/// Which nuclides of one composition unit are bound to which thermal-scattering law.
///
/// Built by scanning every component of the unit. Within one unit a nuclide is
/// either bound to exactly one law everywhere it appears, or free everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThermalScatteringAssignment {
    bindings: BTreeMap<String, String>,
}

impl ThermalScatteringAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bindings<I, K, V>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            bindings: bindings
                .into_iter()
                .map(|(nuclide, law)| {
                    (
                        normalize_label(nuclide.as_ref()),
                        law.as_ref().to_ascii_lowercase(),
                    )
                })
                .collect(),
        }
    }

    /// Scans the components of `unit` and collects its thermal-scattering bindings.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::BoundAndFree`] when a nuclide is bound in one
    /// component but free in another, and [`CompositionError::ConflictingBindings`]
    /// when a nuclide is bound to two different laws.
    pub fn resolve<U>(unit: &U) -> Result<Self, CompositionError>
    where
        U: CompositionUnit + ?Sized,
    {
        let mut bindings: BTreeMap<String, String> = BTreeMap::new();
        let mut free: BTreeSet<String> = BTreeSet::new();

        for component in unit.components() {
            for (name, &density) in &component.number_densities {
                if density <= 0.0 {
                    continue;
                }
                let label = normalize_label(name);
                match component.binding_for(&label) {
                    Some(law) => {
                        let law = law.to_ascii_lowercase();
                        if let Some(existing) = bindings.get(&label) {
                            if *existing != law {
                                return Err(CompositionError::ConflictingBindings {
                                    unit: unit.name().to_string(),
                                    nuclide: label,
                                    first: existing.clone(),
                                    second: law,
                                });
                            }
                        }
                        if free.contains(&label) {
                            return Err(CompositionError::BoundAndFree {
                                unit: unit.name().to_string(),
                                nuclide: label,
                                law,
                            });
                        }
                        bindings.insert(label, law);
                    }
                    None => {
                        if let Some(law) = bindings.get(&label) {
                            return Err(CompositionError::BoundAndFree {
                                unit: unit.name().to_string(),
                                nuclide: label,
                                law: law.clone(),
                            });
                        }
                        free.insert(label);
                    }
                }
            }
        }

        Ok(Self { bindings })
    }

    pub fn law_for(&self, label: &str) -> Option<&str> {
        self.bindings.get(&normalize_label(label)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(nuclide, law)| (nuclide.as_str(), law.as_str()))
    }
}
