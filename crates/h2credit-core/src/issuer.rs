use crate::error::H2Error;
use crate::identity::{Clock, IdentitySource};
use crate::policy::Decision;
use crate::types::{CreditRecord, ProductionReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceConfig {
    /// Fixed price per kg of certified hydrogen.
    pub price_per_kg: f64,
    pub currency: String,
    pub credit_id_prefix: String,
    /// Username the marketplace listing is created under.
    pub creator: String,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            price_per_kg: 2.5,
            currency: "USD".to_string(),
            credit_id_prefix: "CREDIT".to_string(),
            creator: "verified_producer".to_string(),
        }
    }
}

impl IssuanceConfig {
    pub fn validate(&self) -> Result<(), H2Error> {
        if !self.price_per_kg.is_finite() || self.price_per_kg < 0.0 {
            return Err(H2Error::Config(format!(
                "price_per_kg must be a non-negative number, got {}",
                self.price_per_kg
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(H2Error::Config("currency must not be empty".into()));
        }
        if self.credit_id_prefix.trim().is_empty() {
            return Err(H2Error::Config("credit_id_prefix must not be empty".into()));
        }
        if self.creator.trim().is_empty() {
            return Err(H2Error::Config("creator must not be empty".into()));
        }
        Ok(())
    }
}

/// Turns approved verdicts into tradable credit records.
///
/// Identity and time are injected; everything else on the record is derived from the report
/// and the verdict.
#[derive(Clone)]
pub struct CreditIssuer {
    config: IssuanceConfig,
    ids: Arc<dyn IdentitySource>,
    clock: Arc<dyn Clock>,
}

impl CreditIssuer {
    pub fn new(
        config: IssuanceConfig,
        ids: Arc<dyn IdentitySource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, H2Error> {
        config.validate()?;
        Ok(Self { config, ids, clock })
    }

    pub fn config(&self) -> &IssuanceConfig {
        &self.config
    }

    /// Mint the credit backed by `decision`. The approval is consumed, so a verdict can back
    /// at most one credit. A rejected decision is an [`H2Error::InvariantViolation`].
    pub fn issue(
        &self,
        report: &ProductionReport,
        decision: Decision,
    ) -> Result<CreditRecord, H2Error> {
        let approval = match decision {
            Decision::Approved(approval) => approval,
            Decision::Rejected(verdict) => {
                error!(
                    h2_kg = report.h2_kg(),
                    deviation = verdict.h2_deviation_ratio(),
                    "refusing to issue credit for a rejected verdict"
                );
                return Err(H2Error::InvariantViolation(
                    "credit issuance requires an approved verdict".into(),
                ));
            }
        };
        let verdict = approval.verdict();
        if verdict.energy_kwh() != report.energy_kwh() || verdict.h2_kg() != report.h2_kg() {
            error!(
                report_energy_kwh = report.energy_kwh(),
                verdict_energy_kwh = verdict.energy_kwh(),
                report_h2_kg = report.h2_kg(),
                verdict_h2_kg = verdict.h2_kg(),
                "verdict does not belong to report"
            );
            return Err(H2Error::InvariantViolation(
                "verdict was computed for a different report".into(),
            ));
        }

        let amount_kg = report.h2_kg();
        let credit = CreditRecord {
            id: self.ids.next_id(&self.config.credit_id_prefix),
            name: format!("{} H₂ Credit - {}kg", report.method().label(), amount_kg),
            amount_kg,
            price: amount_kg * self.config.price_per_kg,
            currency: self.config.currency.clone(),
            production_method: report.method(),
            production_date: report.production_date(),
            energy_input_kwh: report.energy_kwh(),
            energy_input_mwh: report.energy_mwh(),
            efficiency: verdict.efficiency_kwh_per_kg(),
            verification_score: verdict.validity_score(),
            verdict_digest: verdict.digest(),
            auto_generated: true,
            threshold_verified: true,
            generated_at: self.clock.now(),
        };

        info!(
            credit_id = %credit.id,
            amount_kg,
            price = credit.price,
            method = %report.method(),
            "credit issued"
        );
        Ok(credit)
    }
}

impl std::fmt::Debug for CreditIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditIssuer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{FixedClock, SequentialIdSource};
    use crate::policy::ThresholdVerifier;
    use crate::types::ProductionMethod;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn issuer() -> CreditIssuer {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        CreditIssuer::new(
            IssuanceConfig::default(),
            Arc::new(SequentialIdSource::new()),
            Arc::new(clock),
        )
        .unwrap()
    }

    fn report(energy_kwh: f64, h2_kg: f64) -> ProductionReport {
        ProductionReport::new(
            energy_kwh,
            h2_kg,
            ProductionMethod::Wind,
            NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn issues_credit_for_approved_verdict() {
        let report = report(2000.0, 40.0);
        let verdict = ThresholdVerifier::default().verify(&report);
        let decision = ThresholdVerifier::default().decide(&report);
        let credit = issuer().issue(&report, decision).unwrap();

        assert_eq!(credit.id(), "CREDIT_00000001");
        assert_eq!(credit.name(), "Wind H₂ Credit - 40kg");
        assert_eq!(credit.amount_kg(), 40.0);
        assert_eq!(credit.price(), 100.0);
        assert_eq!(credit.currency(), "USD");
        assert_eq!(credit.energy_input_mwh(), 2.0);
        assert_eq!(credit.efficiency(), 50.0);
        assert_eq!(credit.verification_score(), verdict.confidence());
        assert_eq!(credit.verdict_digest(), verdict.digest());
        assert!(credit.auto_generated());
        assert!(credit.threshold_verified());
        assert_eq!(
            credit.generated_at(),
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn refuses_rejected_verdict() {
        let report = report(2000.0, 10.0);
        let decision = ThresholdVerifier::default().decide(&report);
        assert!(!decision.is_approved());
        let err = issuer().issue(&report, decision).unwrap_err();
        assert!(matches!(err, H2Error::InvariantViolation(_)));
    }

    #[test]
    fn refuses_verdict_for_another_report() {
        let approved = ThresholdVerifier::default().decide(&report(2000.0, 40.0));
        let err = issuer().issue(&report(2000.0, 41.0), approved).unwrap_err();
        assert!(err.to_string().contains("different report"));
    }

    #[test]
    fn copy_of_credited_verdict_cannot_back_another_credit() {
        let issuer = issuer();
        let report = report(2000.0, 40.0);
        let decision = ThresholdVerifier::default().decide(&report);
        let copy = decision.verdict().clone();
        assert!(copy.approved());

        issuer.issue(&report, decision).unwrap();
        let err = issuer.issue(&report, Decision::Rejected(copy)).unwrap_err();
        assert!(matches!(err, H2Error::InvariantViolation(_)));
    }

    #[test]
    fn separate_approvals_get_distinct_ids() {
        let issuer = issuer();
        let verifier = ThresholdVerifier::default();
        let first_report = report(2000.0, 40.0);
        let second_report = report(2100.0, 42.0);
        let first = issuer.issue(&first_report, verifier.decide(&first_report)).unwrap();
        let second = issuer.issue(&second_report, verifier.decide(&second_report)).unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let config = IssuanceConfig {
            credit_id_prefix: " ".to_string(),
            ..IssuanceConfig::default()
        };
        assert!(CreditIssuer::new(
            config,
            Arc::new(SequentialIdSource::new()),
            Arc::new(crate::identity::SystemClock),
        )
        .is_err());
    }
}
