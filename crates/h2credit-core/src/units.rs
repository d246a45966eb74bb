//! Canonical unit normalisation for reported quantities.
//!
//! Energy is canonicalised to kWh and hydrogen mass to kg. Unrecognised units fall back to
//! the base unit instead of failing; the fallback is flagged on the returned value and logged
//! so callers can surface it.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CANONICAL_ENERGY_UNIT: &str = "kWh";
pub const CANONICAL_MASS_UNIT: &str = "kg";

/// Energy units understood by the normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyUnit {
    #[serde(rename = "Wh")]
    WattHour,
    #[serde(rename = "kWh")]
    KilowattHour,
    #[serde(rename = "MWh")]
    MegawattHour,
}

impl EnergyUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        match unit.trim().to_ascii_lowercase().as_str() {
            "wh" => Some(Self::WattHour),
            "kwh" => Some(Self::KilowattHour),
            "mwh" => Some(Self::MegawattHour),
            _ => None,
        }
    }

    pub fn kwh_factor(self) -> f64 {
        match self {
            Self::WattHour => 0.001,
            Self::KilowattHour => 1.0,
            Self::MegawattHour => 1000.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::WattHour => "Wh",
            Self::KilowattHour => "kWh",
            Self::MegawattHour => "MWh",
        }
    }
}

/// Mass units understood by the normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MassUnit {
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "t")]
    Tonne,
}

impl MassUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        match unit.trim().to_ascii_lowercase().as_str() {
            "kg" | "kgs" => Some(Self::Kilogram),
            "t" | "ton" | "tons" | "tonne" | "tonnes" => Some(Self::Tonne),
            _ => None,
        }
    }

    pub fn kg_factor(self) -> f64 {
        match self {
            Self::Kilogram => 1.0,
            Self::Tonne => 1000.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Kilogram => "kg",
            Self::Tonne => "t",
        }
    }
}

/// A quantity expressed in its canonical unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normalized {
    pub value: f64,
    pub canonical_unit: &'static str,
    /// True when the source unit was not recognised and the base unit was assumed.
    pub defaulted: bool,
}

/// Convert an energy quantity to kWh.
pub fn normalize_energy(value: f64, unit: &str) -> Normalized {
    match EnergyUnit::parse(unit) {
        Some(parsed) => Normalized {
            value: value * parsed.kwh_factor(),
            canonical_unit: CANONICAL_ENERGY_UNIT,
            defaulted: false,
        },
        None => {
            warn!(unit, value, "unrecognised energy unit, assuming kWh");
            Normalized {
                value,
                canonical_unit: CANONICAL_ENERGY_UNIT,
                defaulted: true,
            }
        }
    }
}

/// Convert a hydrogen mass to kg.
pub fn normalize_hydrogen(value: f64, unit: &str) -> Normalized {
    match MassUnit::parse(unit) {
        Some(parsed) => Normalized {
            value: value * parsed.kg_factor(),
            canonical_unit: CANONICAL_MASS_UNIT,
            defaulted: false,
        },
        None => {
            warn!(unit, value, "unrecognised mass unit, assuming kg");
            Normalized {
                value,
                canonical_unit: CANONICAL_MASS_UNIT,
                defaulted: true,
            }
        }
    }
}

pub fn kwh_to_mwh(energy_kwh: f64) -> f64 {
    energy_kwh / 1000.0
}
