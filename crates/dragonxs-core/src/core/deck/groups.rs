use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The largest group count a DRAGLIB library resolves without fine-group collapsing.
pub const RECOMMENDED_MAX_GROUPS: usize = 33;

/// Upper energy bounds (eV) of the 33-group ANL structure, highest first.
pub const ANL33: [f64; 33] = [
    1.4191e7, 1.0e7, 6.0653e6, 3.6788e6, 2.2313e6, 1.3534e6, 8.2085e5, 4.9787e5, 3.0197e5,
    1.8316e5, 1.1109e5, 6.7379e4, 4.0868e4, 2.4788e4, 1.5034e4, 9.1188e3, 5.5308e3, 3.3546e3,
    2.0347e3, 1.2341e3, 7.4852e2, 4.5400e2, 3.0433e2, 1.4863e2, 9.1661e1, 6.7904e1, 4.0169e1,
    2.2603e1, 1.3710e1, 8.3153, 4.0, 5.4e-1, 4.1399e-1,
];

/// A coarse four-group structure for quick scoping runs.
pub const FAST4: [f64; 4] = [1.4191e7, 8.2085e5, 1.1109e5, 1.2341e3];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupStructureError {
    #[error("Unknown group structure '{0}'. Known structures: ANL33, FAST4")]
    Unknown(String),
    #[error("Group structure is empty")]
    Empty,
    #[error("Group boundaries must be positive and strictly decreasing (offending value at index {index})")]
    NotDecreasing { index: usize },
}

/// Looks up a named group structure, case-insensitively.
pub fn by_name(name: &str) -> Option<&'static [f64]> {
    match name.trim().to_ascii_uppercase().as_str() {
        "ANL33" => Some(&ANL33),
        "FAST4" => Some(&FAST4),
        _ => None,
    }
}

/// An energy group structure given by its upper bounds, highest energy first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupStructure {
    Named(String),
    Explicit(Vec<f64>),
}

impl Default for GroupStructure {
    fn default() -> Self {
        GroupStructure::Named("ANL33".to_string())
    }
}

impl GroupStructure {
    pub fn upper_bounds(&self) -> Result<&[f64], GroupStructureError> {
        let bounds = match self {
            GroupStructure::Named(name) => {
                by_name(name).ok_or_else(|| GroupStructureError::Unknown(name.clone()))?
            }
            GroupStructure::Explicit(bounds) => bounds.as_slice(),
        };
        if bounds.is_empty() {
            return Err(GroupStructureError::Empty);
        }
        if let Some(index) = bounds
            .iter()
            .enumerate()
            .position(|(i, &b)| b <= 0.0 || (i > 0 && b >= bounds[i - 1]))
        {
            return Err(GroupStructureError::NotDecreasing { index });
        }
        Ok(bounds)
    }

    pub fn num_groups(&self) -> Result<usize, GroupStructureError> {
        Ok(self.upper_bounds()?.len())
    }

    /// Boundaries strictly between the implicit zero floor and the top of the structure.
    ///
    /// DRAGON takes the top boundary from the library, so the first value is dropped.
    pub fn inner_boundaries(&self) -> Result<Vec<f64>, GroupStructureError> {
        Ok(self.upper_bounds()?[1..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_structures_are_case_insensitive() {
        let structure = GroupStructure::Named("anl33".to_string());
        assert_eq!(structure.num_groups().unwrap(), 33);
    }

    #[test]
    fn inner_boundaries_drop_the_top_value() {
        let structure = GroupStructure::Named("FAST4".to_string());
        assert_eq!(
            structure.inner_boundaries().unwrap(),
            vec![8.2085e5, 1.1109e5, 1.2341e3]
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let structure = GroupStructure::Named("XMAS172".to_string());
        assert!(matches!(
            structure.upper_bounds(),
            Err(GroupStructureError::Unknown(_))
        ));
    }

    #[test]
    fn explicit_structures_must_decrease() {
        let structure = GroupStructure::Explicit(vec![1.0e6, 2.0e6]);
        assert_eq!(
            structure.upper_bounds(),
            Err(GroupStructureError::NotDecreasing { index: 1 })
        );
        assert_eq!(
            GroupStructure::Explicit(Vec::new()).upper_bounds(),
            Err(GroupStructureError::Empty)
        );
    }

    #[test]
    fn anl33_is_strictly_decreasing() {
        assert!(GroupStructure::default().upper_bounds().is_ok());
    }
}
