use crate::error::H2Error;
use crate::units::{kwh_to_mwh, EnergyUnit};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Renewable source powering the electrolyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductionMethod {
    Wind,
    Solar,
    Hydro,
}

impl ProductionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wind => "wind",
            Self::Solar => "solar",
            Self::Hydro => "hydro",
        }
    }

    /// Capitalised form used in credit names and certificates.
    pub fn label(self) -> &'static str {
        match self {
            Self::Wind => "Wind",
            Self::Solar => "Solar",
            Self::Hydro => "Hydro",
        }
    }
}

impl fmt::Display for ProductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductionMethod {
    type Err = H2Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wind" => Ok(Self::Wind),
            "solar" => Ok(Self::Solar),
            "hydro" => Ok(Self::Hydro),
            other => Err(H2Error::validation(
                "production_method",
                format!("unknown production method '{other}'; expected wind, solar or hydro"),
            )),
        }
    }
}

/// Validated production report. Energy is always kWh.
///
/// Construction goes through [`ProductionReport::new`] (or deserialisation, which runs the
/// same checks), so every instance satisfies `energy_kwh > 0 && h2_kg > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProductionReportFields")]
pub struct ProductionReport {
    energy_kwh: f64,
    h2_kg: f64,
    method: ProductionMethod,
    production_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct ProductionReportFields {
    energy_kwh: f64,
    h2_kg: f64,
    method: ProductionMethod,
    production_date: NaiveDate,
}

impl TryFrom<ProductionReportFields> for ProductionReport {
    type Error = H2Error;

    fn try_from(fields: ProductionReportFields) -> Result<Self, Self::Error> {
        Self::new(
            fields.energy_kwh,
            fields.h2_kg,
            fields.method,
            fields.production_date,
        )
    }
}

impl ProductionReport {
    pub fn new(
        energy_kwh: f64,
        h2_kg: f64,
        method: ProductionMethod,
        production_date: NaiveDate,
    ) -> Result<Self, H2Error> {
        ensure_positive("energy_kwh", energy_kwh)?;
        ensure_positive("h2_kg", h2_kg)?;
        if !kwh_to_mwh(energy_kwh).is_normal() {
            return Err(H2Error::validation(
                "energy_kwh",
                format!("{energy_kwh} is too small to derive an expected hydrogen yield"),
            ));
        }
        Ok(Self {
            energy_kwh,
            h2_kg,
            method,
            production_date,
        })
    }

    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    pub fn energy_mwh(&self) -> f64 {
        kwh_to_mwh(self.energy_kwh)
    }

    pub fn h2_kg(&self) -> f64 {
        self.h2_kg
    }

    pub fn method(&self) -> ProductionMethod {
        self.method
    }

    pub fn production_date(&self) -> NaiveDate {
        self.production_date
    }
}

fn ensure_positive(field: &str, value: f64) -> Result<(), H2Error> {
    if !value.is_finite() {
        return Err(H2Error::validation(field, "must be a finite number"));
    }
    if value <= 0.0 {
        return Err(H2Error::validation(
            field,
            format!("must be greater than zero, got {value}"),
        ));
    }
    if !value.is_normal() {
        return Err(H2Error::validation(
            field,
            format!("{value} is below the smallest measurable quantity"),
        ));
    }
    Ok(())
}

fn default_energy_unit() -> String {
    "kWh".to_string()
}

/// Manual-entry form exactly as typed by a producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportForm {
    pub energy: String,
    #[serde(default = "default_energy_unit")]
    pub energy_unit: String,
    pub h2_kg: String,
    pub production_method: String,
    pub production_date: String,
}

impl ReportForm {
    /// Parse and validate the form. The energy unit is a closed choice on the form, so an
    /// unknown unit is rejected rather than defaulted.
    pub fn into_report(self) -> Result<ProductionReport, H2Error> {
        let energy = parse_number("energy", &self.energy)?;
        let unit = EnergyUnit::parse(&self.energy_unit).ok_or_else(|| {
            H2Error::validation(
                "energy_unit",
                format!("unknown energy unit '{}'", self.energy_unit),
            )
        })?;
        let h2_kg = parse_number("h2_kg", &self.h2_kg)?;
        let method = self.production_method.parse::<ProductionMethod>()?;
        let production_date = parse_production_date(&self.production_date)?;

        ProductionReport::new(energy * unit.kwh_factor(), h2_kg, method, production_date)
    }
}

/// Parse an ISO `YYYY-MM-DD` production date.
pub fn parse_production_date(raw: &str) -> Result<NaiveDate, H2Error> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| {
        H2Error::validation("production_date", format!("expected YYYY-MM-DD: {err}"))
    })
}

fn parse_number(field: &str, raw: &str) -> Result<f64, H2Error> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| H2Error::validation(field, format!("'{}' is not a number", raw.trim())))
}

/// One quantity located in document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedQuantity {
    pub raw_value: f64,
    pub raw_unit: Option<String>,
    pub normalized: f64,
    pub matched_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingQuantity {
    Energy,
    Hydrogen,
}

/// Result of scanning a document. Never partial: both quantities or a reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    Success {
        energy_kwh: f64,
        energy_mwh: f64,
        h2_kg: f64,
        energy: ExtractedQuantity,
        hydrogen: ExtractedQuantity,
        warnings: Vec<String>,
    },
    Failure {
        reason: String,
        missing: Vec<MissingQuantity>,
    },
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// `(energy_kwh, h2_kg)` when extraction succeeded.
    pub fn quantities(&self) -> Option<(f64, f64)> {
        match self {
            Self::Success {
                energy_kwh, h2_kg, ..
            } => Some((*energy_kwh, *h2_kg)),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<(f64, f64), H2Error> {
        match self {
            Self::Success {
                energy_kwh, h2_kg, ..
            } => Ok((energy_kwh, h2_kg)),
            Self::Failure { reason, .. } => Err(H2Error::Extraction { reason }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrelationRating {
    Excellent,
    Good,
    Poor,
}

impl CorrelationRating {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Poor => "POOR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EfficiencyRating {
    Excellent,
    Good,
    BelowStandard,
}

impl EfficiencyRating {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::BelowStandard => "BELOW_STANDARD",
        }
    }
}

/// Bucket of the fraud step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudRisk {
    Low,
    Medium,
    High,
}

impl FraudRisk {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExpectedRange {
    pub min: f64,
    pub max: f64,
}

/// Immutable verification verdict derived from one [`ProductionReport`].
///
/// Only [`crate::policy::ThresholdVerifier`] builds verdicts. There is no `Deserialize`, so an
/// approved verdict cannot be forged from a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationVerdict {
    pub(crate) approved: bool,
    pub(crate) energy_kwh: f64,
    pub(crate) energy_mwh: f64,
    pub(crate) h2_kg: f64,
    pub(crate) efficiency_kwh_per_kg: f64,
    pub(crate) expected_h2_kg: f64,
    pub(crate) expected_h2_range: ExpectedRange,
    pub(crate) h2_deviation_ratio: f64,
    pub(crate) efficiency_acceptable: bool,
    pub(crate) deviation_acceptable: bool,
    pub(crate) fraud_probability: f64,
    pub(crate) fraud_risk: FraudRisk,
    pub(crate) confidence: f64,
    pub(crate) efficiency_score: f64,
    pub(crate) correlation_rating: CorrelationRating,
    pub(crate) efficiency_rating: EfficiencyRating,
    pub(crate) policy_version: String,
    pub(crate) findings: Vec<String>,
}

impl VerificationVerdict {
    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    pub fn energy_mwh(&self) -> f64 {
        self.energy_mwh
    }

    pub fn h2_kg(&self) -> f64 {
        self.h2_kg
    }

    pub fn efficiency_kwh_per_kg(&self) -> f64 {
        self.efficiency_kwh_per_kg
    }

    pub fn expected_h2_kg(&self) -> f64 {
        self.expected_h2_kg
    }

    pub fn expected_h2_range(&self) -> ExpectedRange {
        self.expected_h2_range
    }

    pub fn h2_deviation_ratio(&self) -> f64 {
        self.h2_deviation_ratio
    }

    pub fn efficiency_acceptable(&self) -> bool {
        self.efficiency_acceptable
    }

    pub fn deviation_acceptable(&self) -> bool {
        self.deviation_acceptable
    }

    pub fn fraud_probability(&self) -> f64 {
        self.fraud_probability
    }

    pub fn fraud_risk(&self) -> FraudRisk {
        self.fraud_risk
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Same value as [`Self::confidence`]; the name used on credits and submissions.
    pub fn validity_score(&self) -> f64 {
        self.confidence
    }

    pub fn efficiency_score(&self) -> f64 {
        self.efficiency_score
    }

    pub fn correlation_rating(&self) -> CorrelationRating {
        self.correlation_rating
    }

    pub fn efficiency_rating(&self) -> EfficiencyRating {
        self.efficiency_rating
    }

    pub fn policy_version(&self) -> &str {
        &self.policy_version
    }

    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    pub fn threshold_analysis(&self) -> ThresholdAnalysis {
        ThresholdAnalysis {
            h2_deviation: self.h2_deviation_ratio,
            h2_deviation_acceptable: self.deviation_acceptable,
            efficiency_acceptable: self.efficiency_acceptable,
            energy_h2_correlation: self.correlation_rating,
            efficiency_rating: self.efficiency_rating,
        }
    }

    /// BLAKE3 digest over every field, in declaration order. Identical verdicts always
    /// produce identical digests.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[u8::from(self.approved)]);
        for value in [
            self.energy_kwh,
            self.energy_mwh,
            self.h2_kg,
            self.efficiency_kwh_per_kg,
            self.expected_h2_kg,
            self.expected_h2_range.min,
            self.expected_h2_range.max,
            self.h2_deviation_ratio,
        ] {
            hasher.update(&value.to_bits().to_le_bytes());
        }
        hasher.update(&[
            u8::from(self.efficiency_acceptable),
            u8::from(self.deviation_acceptable),
        ]);
        for value in [
            self.fraud_probability,
            self.confidence,
            self.efficiency_score,
        ] {
            hasher.update(&value.to_bits().to_le_bytes());
        }
        for label in [
            self.fraud_risk.as_str(),
            self.correlation_rating.as_str(),
            self.efficiency_rating.as_str(),
            self.policy_version.as_str(),
        ] {
            hasher.update(label.as_bytes());
            hasher.update(&[0]);
        }
        for finding in &self.findings {
            hasher.update(finding.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Compact explanation embedded in the persistence submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAnalysis {
    pub h2_deviation: f64,
    pub h2_deviation_acceptable: bool,
    pub efficiency_acceptable: bool,
    pub energy_h2_correlation: CorrelationRating,
    pub efficiency_rating: EfficiencyRating,
}

/// Tradable credit synthesised from an approved verdict. Read-only after issuance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditRecord {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) amount_kg: f64,
    pub(crate) price: f64,
    pub(crate) currency: String,
    pub(crate) production_method: ProductionMethod,
    pub(crate) production_date: NaiveDate,
    pub(crate) energy_input_kwh: f64,
    pub(crate) energy_input_mwh: f64,
    pub(crate) efficiency: f64,
    pub(crate) verification_score: f64,
    pub(crate) verdict_digest: String,
    pub(crate) auto_generated: bool,
    pub(crate) threshold_verified: bool,
    pub(crate) generated_at: DateTime<Utc>,
}

impl CreditRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn amount_kg(&self) -> f64 {
        self.amount_kg
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn production_method(&self) -> ProductionMethod {
        self.production_method
    }

    pub fn production_date(&self) -> NaiveDate {
        self.production_date
    }

    pub fn energy_input_kwh(&self) -> f64 {
        self.energy_input_kwh
    }

    pub fn energy_input_mwh(&self) -> f64 {
        self.energy_input_mwh
    }

    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn verification_score(&self) -> f64 {
        self.verification_score
    }

    pub fn verdict_digest(&self) -> &str {
        &self.verdict_digest
    }

    pub fn auto_generated(&self) -> bool {
        self.auto_generated
    }

    pub fn threshold_verified(&self) -> bool {
        self.threshold_verified
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

pub const SUBMISSION_STATUS_VERIFIED: &str = "verified";

/// Payload handed to the persistence collaborator after a verdict is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub energy_mwh: f64,
    pub h2_kg: f64,
    pub production_method: ProductionMethod,
    pub production_date: NaiveDate,
    pub efficiency: f64,
    pub verification_score: f64,
    pub threshold_analysis: ThresholdAnalysis,
    pub status: String,
}

impl VerificationSubmission {
    pub fn from_verdict(report: &ProductionReport, verdict: &VerificationVerdict) -> Self {
        Self {
            energy_mwh: report.energy_mwh(),
            h2_kg: report.h2_kg(),
            production_method: report.method(),
            production_date: report.production_date(),
            efficiency: verdict.efficiency_kwh_per_kg(),
            verification_score: verdict.validity_score(),
            threshold_analysis: verdict.threshold_analysis(),
            status: SUBMISSION_STATUS_VERIFIED.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingCreator {
    pub username: String,
}

/// Payload handed to the marketplace collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceListing {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub price: f64,
    pub creator: ListingCreator,
    pub is_active: bool,
    pub is_expired: bool,
    pub production_method: ProductionMethod,
    pub energy_input_kwh: f64,
    pub energy_input_mwh: f64,
    pub efficiency: f64,
    pub verification_score: f64,
    pub auto_generated: bool,
    pub generated_at: DateTime<Utc>,
    pub threshold_verified: bool,
}

impl MarketplaceListing {
    pub fn from_credit(credit: &CreditRecord, creator: impl Into<String>) -> Self {
        Self {
            id: credit.id().to_string(),
            name: credit.name().to_string(),
            amount: credit.amount_kg(),
            price: credit.price(),
            creator: ListingCreator {
                username: creator.into(),
            },
            is_active: true,
            is_expired: false,
            production_method: credit.production_method(),
            energy_input_kwh: credit.energy_input_kwh(),
            energy_input_mwh: credit.energy_input_mwh(),
            efficiency: credit.efficiency(),
            verification_score: credit.verification_score(),
            auto_generated: credit.auto_generated(),
            generated_at: credit.generated_at(),
            threshold_verified: credit.threshold_verified(),
        }
    }
}

/// Acknowledgement returned by an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub collaborator: String,
    pub reference: String,
    pub acknowledged_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn report_rejects_non_positive_quantities() {
        let err = ProductionReport::new(0.0, 40.0, ProductionMethod::Wind, date()).unwrap_err();
        assert!(matches!(err, H2Error::Validation { ref field, .. } if field == "energy_kwh"));

        let err =
            ProductionReport::new(2000.0, -1.0, ProductionMethod::Solar, date()).unwrap_err();
        assert!(matches!(err, H2Error::Validation { ref field, .. } if field == "h2_kg"));

        assert!(ProductionReport::new(f64::NAN, 40.0, ProductionMethod::Hydro, date()).is_err());
    }

    #[test]
    fn report_rejects_quantities_with_no_expected_yield() {
        let err = ProductionReport::new(5e-324, 40.0, ProductionMethod::Wind, date()).unwrap_err();
        assert!(matches!(err, H2Error::Validation { ref field, .. } if field == "energy_kwh"));

        // Normal in kWh, subnormal once converted to MWh.
        let err = ProductionReport::new(1e-306, 40.0, ProductionMethod::Wind, date()).unwrap_err();
        assert!(err.to_string().contains("expected hydrogen yield"));

        let err = ProductionReport::new(2000.0, 1e-310, ProductionMethod::Wind, date()).unwrap_err();
        assert!(matches!(err, H2Error::Validation { ref field, .. } if field == "h2_kg"));
    }

    #[test]
    fn report_deserialisation_runs_validation() {
        let ok: ProductionReport = serde_json::from_value(serde_json::json!({
            "energy_kwh": 2000.0,
            "h2_kg": 40.0,
            "method": "wind",
            "production_date": "2024-05-01"
        }))
        .unwrap();
        assert_eq!(ok.energy_mwh(), 2.0);

        let bad = serde_json::from_value::<ProductionReport>(serde_json::json!({
            "energy_kwh": 2000.0,
            "h2_kg": 0.0,
            "method": "wind",
            "production_date": "2024-05-01"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn form_converts_megawatt_hours() {
        let report = ReportForm {
            energy: " 2 ".to_string(),
            energy_unit: "MWh".to_string(),
            h2_kg: "40".to_string(),
            production_method: "Solar".to_string(),
            production_date: "2024-05-01".to_string(),
        }
        .into_report()
        .unwrap();

        assert_eq!(report.energy_kwh(), 2000.0);
        assert_eq!(report.method(), ProductionMethod::Solar);
    }

    #[test]
    fn form_rejects_non_numeric_and_unknown_method() {
        let base = ReportForm {
            energy: "2000".to_string(),
            energy_unit: "kWh".to_string(),
            h2_kg: "forty".to_string(),
            production_method: "wind".to_string(),
            production_date: "2024-05-01".to_string(),
        };
        let err = base.clone().into_report().unwrap_err();
        assert!(err.to_string().contains("'forty' is not a number"));

        let mut coal = base.clone();
        coal.h2_kg = "40".to_string();
        coal.production_method = "coal".to_string();
        assert!(coal.into_report().unwrap_err().to_string().contains("coal"));

        let mut bad_date = base;
        bad_date.h2_kg = "40".to_string();
        bad_date.production_date = "01/05/2024".to_string();
        assert!(matches!(
            bad_date.into_report().unwrap_err(),
            H2Error::Validation { ref field, .. } if field == "production_date"
        ));
    }

    #[test]
    fn failed_extraction_converts_to_error() {
        let failure = ExtractionResult::Failure {
            reason: "hydrogen quantity not found".to_string(),
            missing: vec![MissingQuantity::Hydrogen],
        };
        assert!(failure.quantities().is_none());
        assert!(matches!(
            failure.into_result().unwrap_err(),
            H2Error::Extraction { .. }
        ));
    }
}
