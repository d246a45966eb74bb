//! Locates an energy quantity and a hydrogen quantity in free-form document text.
//!
//! Each quantity is searched with an ordered pattern list, specific (labelled) first and
//! generic last. The first matching pattern wins. The two quantities are found
//! independently; cross-checking them is the verifier's job.

use crate::types::{ExtractedQuantity, ExtractionResult, MissingQuantity};
use crate::units::{kwh_to_mwh, normalize_energy, normalize_hydrogen};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

/// Decimal with optional integer part, so ".5" is read whole rather than from after the dot.
const NUMBER: &str = r"(\d*\.?\d+)";

static ENERGY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        format!(r"(?i)(?:energy|power|electricity|renewable)[:\s]*{NUMBER}\s*(MWh|MW|kWh|Wh)\b"),
        format!(r"(?i){NUMBER}\s*(MWh|MW|kWh|Wh)\b"),
        format!(r"(?i)energy[:\s]*{NUMBER}"),
    ])
});

static HYDROGEN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        format!(r"(?i)(?:hydrogen|h2|h₂)[:\s]*{NUMBER}\s*(kgs|kg|tonnes|tonne|tons|ton|t)\b"),
        format!(r"(?i){NUMBER}\s*(kgs|kg|tonnes|tonne|tons|ton|t)\b"),
        format!(r"(?i)hydrogen[:\s]*{NUMBER}"),
    ])
});

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("extraction pattern is valid"))
        .collect()
}

/// Pure text-to-quantities parser. Holds no state, so one instance can serve any number of
/// concurrent callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportExtractor;

impl ReportExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> ExtractionResult {
        let mut warnings = Vec::new();
        let energy = find_quantity(&ENERGY_PATTERNS, text, Quantity::Energy, &mut warnings);
        let hydrogen = find_quantity(&HYDROGEN_PATTERNS, text, Quantity::Hydrogen, &mut warnings);

        match (energy, hydrogen) {
            (Some(energy), Some(hydrogen)) => {
                debug!(
                    energy_kwh = energy.normalized,
                    h2_kg = hydrogen.normalized,
                    warnings = warnings.len(),
                    "extracted production quantities"
                );
                ExtractionResult::Success {
                    energy_kwh: energy.normalized,
                    energy_mwh: kwh_to_mwh(energy.normalized),
                    h2_kg: hydrogen.normalized,
                    energy,
                    hydrogen,
                    warnings,
                }
            }
            (energy, hydrogen) => {
                let mut missing = Vec::new();
                if energy.is_none() {
                    missing.push(MissingQuantity::Energy);
                }
                if hydrogen.is_none() {
                    missing.push(MissingQuantity::Hydrogen);
                }
                let reason = match missing.as_slice() {
                    [MissingQuantity::Energy] => "energy quantity not found in document",
                    [MissingQuantity::Hydrogen] => "hydrogen quantity not found in document",
                    _ => "energy and hydrogen quantities not found in document",
                };
                debug!(reason, "extraction failed");
                ExtractionResult::Failure {
                    reason: reason.to_string(),
                    missing,
                }
            }
        }
    }
}

/// Convenience wrapper over [`ReportExtractor::extract`].
pub fn extract(text: &str) -> ExtractionResult {
    ReportExtractor.extract(text)
}

#[derive(Debug, Clone, Copy)]
enum Quantity {
    Energy,
    Hydrogen,
}

impl Quantity {
    fn name(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Hydrogen => "hydrogen",
        }
    }

    fn base_unit(self) -> &'static str {
        match self {
            Self::Energy => "kWh",
            Self::Hydrogen => "kg",
        }
    }
}

fn find_quantity(
    patterns: &[Regex],
    text: &str,
    quantity: Quantity,
    warnings: &mut Vec<String>,
) -> Option<ExtractedQuantity> {
    patterns
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|captures| to_quantity(&captures, quantity, warnings))
}

fn to_quantity(
    captures: &Captures<'_>,
    quantity: Quantity,
    warnings: &mut Vec<String>,
) -> Option<ExtractedQuantity> {
    let raw_value = captures.get(1)?.as_str().parse::<f64>().ok()?;
    let raw_unit = captures.get(2).map(|unit| unit.as_str().to_string());
    let matched_text = captures.get(0)?.as_str().to_string();

    let normalized = match raw_unit.as_deref() {
        Some(unit) => {
            let normalized = match quantity {
                Quantity::Energy => normalize_energy(raw_value, unit),
                Quantity::Hydrogen => normalize_hydrogen(raw_value, unit),
            };
            if normalized.defaulted {
                warnings.push(format!(
                    "{} unit '{}' not recognised; assumed {}",
                    quantity.name(),
                    unit,
                    quantity.base_unit()
                ));
            }
            normalized.value
        }
        None => {
            warnings.push(format!(
                "{} value {} has no unit; assumed {}",
                quantity.name(),
                raw_value,
                quantity.base_unit()
            ));
            raw_value
        }
    };

    Some(ExtractedQuantity {
        raw_value,
        raw_unit,
        normalized,
        matched_text,
    })
}
