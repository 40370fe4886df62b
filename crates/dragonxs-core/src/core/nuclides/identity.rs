use phf::{Map, phf_map};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Atomic numbers keyed by upper-case element symbol.
static ELEMENTS: Map<&'static str, u32> = phf_map! {
    "H" => 1, "HE" => 2, "LI" => 3, "BE" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8,
    "F" => 9, "NE" => 10, "NA" => 11, "MG" => 12, "AL" => 13, "SI" => 14, "P" => 15,
    "S" => 16, "CL" => 17, "AR" => 18, "K" => 19, "CA" => 20, "SC" => 21, "TI" => 22,
    "V" => 23, "CR" => 24, "MN" => 25, "FE" => 26, "CO" => 27, "NI" => 28, "CU" => 29,
    "ZN" => 30, "GA" => 31, "GE" => 32, "AS" => 33, "SE" => 34, "BR" => 35, "KR" => 36,
    "RB" => 37, "SR" => 38, "Y" => 39, "ZR" => 40, "NB" => 41, "MO" => 42, "TC" => 43,
    "RU" => 44, "RH" => 45, "PD" => 46, "AG" => 47, "CD" => 48, "IN" => 49, "SN" => 50,
    "SB" => 51, "TE" => 52, "I" => 53, "XE" => 54, "CS" => 55, "BA" => 56, "LA" => 57,
    "CE" => 58, "PR" => 59, "ND" => 60, "PM" => 61, "SM" => 62, "EU" => 63, "GD" => 64,
    "TB" => 65, "DY" => 66, "HO" => 67, "ER" => 68, "TM" => 69, "YB" => 70, "LU" => 71,
    "HF" => 72, "TA" => 73, "W" => 74, "RE" => 75, "OS" => 76, "IR" => 77, "PT" => 78,
    "AU" => 79, "HG" => 80, "TL" => 81, "PB" => 82, "BI" => 83, "PO" => 84, "AT" => 85,
    "RN" => 86, "FR" => 87, "RA" => 88, "AC" => 89, "TH" => 90, "PA" => 91, "U" => 92,
    "NP" => 93, "PU" => 94, "AM" => 95, "CM" => 96, "BK" => 97, "CF" => 98, "ES" => 99,
    "FM" => 100, "MD" => 101, "NO" => 102, "LR" => 103,
};

const LUMPED_PREFIXES: [&str; 2] = ["LFP", "LREGN"];
const DUMMY_PREFIX: &str = "DUMP";

/// Elements above actinium count as heavy metal.
const HEAVY_METAL_MIN_Z: u32 = 90;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NuclideParseError {
    #[error("Nuclide name is empty")]
    Empty,
    #[error("Unknown element symbol '{symbol}' in nuclide name '{name}'")]
    UnknownElement { name: String, symbol: String },
    #[error("Malformed nuclide name '{0}'. Expected e.g. 'U235', 'AM242M' or 'C'")]
    Malformed(String),
}

/// A single isotope (or natural element when `mass_number` is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NuclideIdentity {
    pub symbol: &'static str,
    pub z: u32,
    pub mass_number: u32,
    pub metastable: u8,
}

impl NuclideIdentity {
    pub fn is_heavy_metal(&self) -> bool {
        self.z >= HEAVY_METAL_MIN_Z
    }

    pub fn is_natural(&self) -> bool {
        self.mass_number == 0
    }

    /// The canonical domain label, e.g. `U235`, `AM242M`, or `C` for natural carbon.
    pub fn label(&self) -> String {
        let mut label = self.symbol.to_string();
        if !self.is_natural() {
            label.push_str(&self.mass_number.to_string());
        }
        if self.metastable > 0 {
            label.push('M');
        }
        label
    }
}

impl fmt::Display for NuclideIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A nuclide as it appears in a composition model.
///
/// Lumped fission products and dummy nuclides are placeholders that the
/// pipeline never expands into solver records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Nuclide {
    Isotope(NuclideIdentity),
    Lumped(String),
    Dummy(String),
}

impl Nuclide {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Nuclide::Lumped(_) | Nuclide::Dummy(_))
    }

    pub fn identity(&self) -> Option<&NuclideIdentity> {
        match self {
            Nuclide::Isotope(identity) => Some(identity),
            Nuclide::Lumped(_) | Nuclide::Dummy(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Nuclide::Isotope(identity) => identity.label(),
            Nuclide::Lumped(name) | Nuclide::Dummy(name) => name.clone(),
        }
    }
}

impl FromStr for Nuclide {
    type Err = NuclideParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim().to_ascii_uppercase();
        if name.is_empty() {
            return Err(NuclideParseError::Empty);
        }
        if LUMPED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            return Ok(Nuclide::Lumped(name));
        }
        if name.starts_with(DUMMY_PREFIX) {
            return Ok(Nuclide::Dummy(name));
        }

        let letters_end = name
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(name.len());
        let letters = &name[..letters_end];
        let rest = &name[letters_end..];

        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let digits = &rest[..digits_end];
        let suffix = &rest[digits_end..];

        // A trailing 'M' directly after the letters would be part of the symbol,
        // so the metastable marker is only recognised after a mass number.
        let metastable = match suffix {
            "" => 0,
            "M" if !digits.is_empty() => 1,
            _ => return Err(NuclideParseError::Malformed(name)),
        };

        let (symbol, z) = ELEMENTS
            .get_entry(letters)
            .map(|(symbol, z)| (*symbol, *z))
            .ok_or_else(|| NuclideParseError::UnknownElement {
                name: name.clone(),
                symbol: letters.to_string(),
            })?;

        let mass_number = if digits.is_empty() {
            0
        } else {
            digits
                .parse()
                .map_err(|_| NuclideParseError::Malformed(name.clone()))?
        };

        Ok(Nuclide::Isotope(NuclideIdentity {
            symbol,
            z,
            mass_number,
            metastable,
        }))
    }
}
