//! Production certificates issued alongside an approved credit.

use crate::error::H2Error;
use crate::types::{CreditRecord, VerificationVerdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateKind {
    EnergyCertificate,
    HydrogenCertificate,
    EfficiencyReport,
}

impl CertificateKind {
    pub fn number_prefix(self) -> &'static str {
        match self {
            Self::EnergyCertificate => "REC",
            Self::HydrogenCertificate => "H2C",
            Self::EfficiencyReport => "EFF",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::EnergyCertificate => "Renewable Energy Production Certificate",
            Self::HydrogenCertificate => "Green Hydrogen Production Certificate",
            Self::EfficiencyReport => "H₂ Production Efficiency Report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionCertificate {
    pub kind: CertificateKind,
    pub certificate_number: String,
    pub title: String,
    pub content: String,
    pub credit_id: String,
    pub issued_at: DateTime<Utc>,
    /// BLAKE3 over number, title, content and credit id.
    pub content_digest: String,
}

impl ProductionCertificate {
    fn new(
        kind: CertificateKind,
        sequence: u64,
        content: String,
        credit: &CreditRecord,
    ) -> Self {
        let certificate_number = format!("{}-{:06}", kind.number_prefix(), sequence);
        let content_digest = content_digest(kind, &certificate_number, &content, credit.id());
        Self {
            kind,
            certificate_number,
            title: kind.title().to_string(),
            content,
            credit_id: credit.id().to_string(),
            issued_at: credit.generated_at(),
            content_digest,
        }
    }

    pub fn verify_digest(&self) -> bool {
        content_digest(
            self.kind,
            &self.certificate_number,
            &self.content,
            &self.credit_id,
        ) == self.content_digest
    }
}

fn content_digest(kind: CertificateKind, number: &str, content: &str, credit_id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [number, kind.title(), content, credit_id] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Builds the energy, hydrogen and efficiency certificates for an issued credit.
///
/// `sequence` is the request's position in the issuing sequence; all three certificates share it.
pub fn certify(
    sequence: u64,
    verdict: &VerificationVerdict,
    credit: &CreditRecord,
) -> Result<Vec<ProductionCertificate>, H2Error> {
    if !verdict.approved() {
        return Err(H2Error::InvariantViolation(
            "certificates require an approved verdict".into(),
        ));
    }
    if credit.verdict_digest() != verdict.digest() {
        return Err(H2Error::InvariantViolation(
            "credit was issued against a different verdict".into(),
        ));
    }

    let date = credit.production_date().format("%Y-%m-%d");
    let method = credit.production_method().as_str();
    Ok(vec![
        ProductionCertificate::new(
            CertificateKind::EnergyCertificate,
            sequence,
            format!(
                "Certified that {} MWh of renewable energy was produced from {} sources on {}",
                credit.energy_input_mwh(),
                method,
                date
            ),
            credit,
        ),
        ProductionCertificate::new(
            CertificateKind::HydrogenCertificate,
            sequence,
            format!(
                "Certified that {} kg of green hydrogen was produced using {} MWh of renewable energy",
                credit.amount_kg(),
                credit.energy_input_mwh()
            ),
            credit,
        ),
        ProductionCertificate::new(
            CertificateKind::EfficiencyReport,
            sequence,
            format!(
                "Production efficiency: {:.2} kWh/kg H₂ (expected {:.2} kg, deviation {:.2}%), rated {}",
                verdict.efficiency_kwh_per_kg(),
                verdict.expected_h2_kg(),
                verdict.h2_deviation_ratio() * 100.0,
                verdict.efficiency_rating().as_str()
            ),
            credit,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{FixedClock, SequentialIdSource};
    use crate::issuer::{CreditIssuer, IssuanceConfig};
    use crate::policy::ThresholdVerifier;
    use crate::types::{ProductionMethod, ProductionReport};
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Arc;

    fn issued(energy_kwh: f64, h2_kg: f64) -> (VerificationVerdict, CreditRecord) {
        let report = ProductionReport::new(
            energy_kwh,
            h2_kg,
            ProductionMethod::Solar,
            NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
        )
        .unwrap();
        let decision = ThresholdVerifier::default().decide(&report);
        let verdict = decision.verdict().clone();
        let issuer = CreditIssuer::new(
            IssuanceConfig::default(),
            Arc::new(SequentialIdSource::new()),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 7, 3, 9, 0, 0).unwrap())),
        )
        .unwrap();
        let credit = issuer.issue(&report, decision).unwrap();
        (verdict, credit)
    }

    #[test]
    fn three_certificates_share_sequence() {
        let (verdict, credit) = issued(2000.0, 40.0);
        let certificates = certify(7, &verdict, &credit).unwrap();

        let numbers: Vec<_> = certificates
            .iter()
            .map(|c| c.certificate_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["REC-000007", "H2C-000007", "EFF-000007"]);
        assert!(certificates.iter().all(|c| c.credit_id == credit.id()));
        assert!(certificates.iter().all(ProductionCertificate::verify_digest));
        assert!(certificates[1].content.contains("40 kg of green hydrogen"));
        assert!(certificates[2].content.contains("50.00 kWh/kg"));
    }

    #[test]
    fn tampered_content_fails_digest() {
        let (verdict, credit) = issued(2000.0, 40.0);
        let mut certificate = certify(1, &verdict, &credit).unwrap().remove(0);
        certificate.content = certificate.content.replace("2 MWh", "20 MWh");
        assert!(!certificate.verify_digest());
    }

    #[test]
    fn rejected_verdict_cannot_be_certified() {
        let (_, credit) = issued(2000.0, 40.0);
        let rejected = ThresholdVerifier::default().verify(
            &ProductionReport::new(
                2000.0,
                10.0,
                ProductionMethod::Solar,
                NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
            )
            .unwrap(),
        );
        assert!(certify(1, &rejected, &credit).is_err());
    }
}
