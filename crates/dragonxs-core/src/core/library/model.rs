use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeConflictError {
    #[error("Nuclide '{label}' of cross-section id '{xs_id}' is present in more than one library")]
    DuplicateEntry { label: String, xs_id: String },
    #[error("More than one library was produced for cross-section id '{xs_id}'")]
    DuplicateSource { xs_id: String },
    #[error("Library for '{xs_id}' has {found} energy groups, expected {expected}")]
    GroupMismatch {
        xs_id: String,
        expected: usize,
        found: usize,
    },
}

/// Microscopic cross sections of one nuclide in one cross-section group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NuclideEntry {
    pub label: String,
    pub xs_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neutron_velocity: Option<Vec<f64>>,
    /// Group-wise cross sections keyed by reaction name (`total`, `fission`, ...).
    #[serde(default)]
    pub cross_sections: BTreeMap<String, Vec<f64>>,
}

impl NuclideEntry {
    pub fn identity(&self) -> (&str, &str) {
        (&self.label, &self.xs_id)
    }
}

/// A multigroup cross-section library.
///
/// A per-case library carries its `xs_id`; a merged library spans several ids and has none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct XsLibrary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xs_id: Option<String>,
    pub groups: usize,
    #[serde(default, rename = "nuclide")]
    pub nuclides: Vec<NuclideEntry>,
}

impl XsLibrary {
    pub fn new(groups: usize) -> Self {
        Self {
            xs_id: None,
            groups,
            nuclides: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nuclides.is_empty()
    }

    pub fn xs_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nuclides.iter().map(|n| n.xs_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn get(&self, label: &str, xs_id: &str) -> Option<&NuclideEntry> {
        self.nuclides
            .iter()
            .find(|n| n.label == label && n.xs_id == xs_id)
    }

    /// Appends every entry of `other`.
    ///
    /// An empty library adopts the group count of the first library merged into it.
    /// Nothing is appended when a conflict is found.
    pub fn merge(&mut self, other: XsLibrary) -> Result<(), MergeConflictError> {
        let source_id = other
            .xs_id
            .clone()
            .or_else(|| other.nuclides.first().map(|n| n.xs_id.clone()))
            .unwrap_or_default();

        if self.is_empty() && self.groups == 0 {
            self.groups = other.groups;
        } else if other.groups != self.groups {
            return Err(MergeConflictError::GroupMismatch {
                xs_id: source_id,
                expected: self.groups,
                found: other.groups,
            });
        }

        let mut seen: HashSet<(&str, &str)> = self.nuclides.iter().map(NuclideEntry::identity).collect();
        for entry in &other.nuclides {
            if !seen.insert(entry.identity()) {
                return Err(MergeConflictError::DuplicateEntry {
                    label: entry.label.clone(),
                    xs_id: entry.xs_id.clone(),
                });
            }
        }

        self.nuclides.extend(other.nuclides);
        Ok(())
    }

    /// The neutron velocity of every cross-section id, taken from its first entry that has one.
    pub fn neutron_velocities(&self) -> BTreeMap<String, Vec<f64>> {
        let mut velocities = BTreeMap::new();
        for entry in &self.nuclides {
            if let Some(velocity) = &entry.neutron_velocity {
                velocities
                    .entry(entry.xs_id.clone())
                    .or_insert_with(|| velocity.clone());
            }
        }
        velocities
    }
}
