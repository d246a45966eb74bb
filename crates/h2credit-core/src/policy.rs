use crate::error::H2Error;
use crate::types::{
    CorrelationRating, EfficiencyRating, ExpectedRange, FraudRisk, ProductionReport,
    VerificationVerdict,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Regulatory parameters of the physical-correlation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationPolicyConfig {
    pub policy_version: String,
    /// Expected hydrogen yield per MWh of renewable input.
    pub kg_h2_per_mwh: f64,
    /// Maximum relative deviation between reported and expected hydrogen.
    pub max_deviation: f64,
    pub efficiency_min_kwh_per_kg: f64,
    pub efficiency_max_kwh_per_kg: f64,
    /// Below the acceptable band but at or above this floor still rates GOOD.
    pub efficiency_good_floor_kwh_per_kg: f64,
    pub fraud_high_deviation: f64,
    pub fraud_medium_deviation: f64,
    pub fraud_high_probability: f64,
    pub fraud_medium_probability: f64,
    pub fraud_low_probability: f64,
    pub min_confidence: f64,
    pub correlation_excellent_deviation: f64,
    pub correlation_good_deviation: f64,
    /// Half-width of the reported expected-output band, relative to expected output.
    pub expected_range_band: f64,
}

impl Default for VerificationPolicyConfig {
    fn default() -> Self {
        Self {
            policy_version: "h2-threshold-v1".to_string(),
            kg_h2_per_mwh: 22.5,
            max_deviation: 0.25,
            efficiency_min_kwh_per_kg: 40.0,
            efficiency_max_kwh_per_kg: 60.0,
            efficiency_good_floor_kwh_per_kg: 35.0,
            fraud_high_deviation: 0.20,
            fraud_medium_deviation: 0.15,
            fraud_high_probability: 0.8,
            fraud_medium_probability: 0.5,
            fraud_low_probability: 0.1,
            min_confidence: 0.1,
            correlation_excellent_deviation: 0.05,
            correlation_good_deviation: 0.20,
            expected_range_band: 0.08,
        }
    }
}

impl VerificationPolicyConfig {
    pub fn validate(&self) -> Result<(), H2Error> {
        if self.policy_version.trim().is_empty() {
            return Err(H2Error::Config("policy_version must not be empty".into()));
        }
        for (name, value) in [
            ("kg_h2_per_mwh", self.kg_h2_per_mwh),
            ("max_deviation", self.max_deviation),
            ("efficiency_min_kwh_per_kg", self.efficiency_min_kwh_per_kg),
            ("efficiency_max_kwh_per_kg", self.efficiency_max_kwh_per_kg),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(H2Error::Config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.efficiency_min_kwh_per_kg > self.efficiency_max_kwh_per_kg {
            return Err(H2Error::Config(format!(
                "efficiency band is inverted: [{}, {}]",
                self.efficiency_min_kwh_per_kg, self.efficiency_max_kwh_per_kg
            )));
        }
        if self.efficiency_good_floor_kwh_per_kg > self.efficiency_min_kwh_per_kg {
            return Err(H2Error::Config(format!(
                "efficiency_good_floor_kwh_per_kg {} exceeds efficiency_min_kwh_per_kg {}",
                self.efficiency_good_floor_kwh_per_kg, self.efficiency_min_kwh_per_kg
            )));
        }
        if self.fraud_medium_deviation > self.fraud_high_deviation {
            return Err(H2Error::Config(
                "fraud_medium_deviation must not exceed fraud_high_deviation".into(),
            ));
        }
        if self.correlation_excellent_deviation > self.correlation_good_deviation {
            return Err(H2Error::Config(
                "correlation_excellent_deviation must not exceed correlation_good_deviation"
                    .into(),
            ));
        }
        for (name, value) in [
            ("fraud_high_probability", self.fraud_high_probability),
            ("fraud_medium_probability", self.fraud_medium_probability),
            ("fraud_low_probability", self.fraud_low_probability),
            ("min_confidence", self.min_confidence),
            ("expected_range_band", self.expected_range_band),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(H2Error::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// A verdict that cleared every threshold and has not backed a credit yet.
///
/// Only [`ThresholdVerifier::decide`] creates one. It cannot be cloned, and
/// [`CreditIssuer::issue`](crate::issuer::CreditIssuer::issue) takes it by value, so one
/// approval backs at most one credit:
///
/// ```compile_fail
/// # use h2credit_core::{CreditIssuer, Decision, ProductionReport};
/// fn issue_twice(issuer: &CreditIssuer, report: &ProductionReport, decision: Decision) {
///     let _first = issuer.issue(report, decision);
///     let _second = issuer.issue(report, decision);
/// }
/// ```
#[derive(Debug, PartialEq)]
pub struct ApprovedVerdict(VerificationVerdict);

impl ApprovedVerdict {
    pub fn verdict(&self) -> &VerificationVerdict {
        &self.0
    }

    pub fn into_verdict(self) -> VerificationVerdict {
        self.0
    }
}

/// Result of [`ThresholdVerifier::decide`].
#[derive(Debug, PartialEq)]
pub enum Decision {
    Approved(ApprovedVerdict),
    Rejected(VerificationVerdict),
}

impl Decision {
    pub fn verdict(&self) -> &VerificationVerdict {
        match self {
            Decision::Approved(approval) => approval.verdict(),
            Decision::Rejected(verdict) => verdict,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved(_))
    }
}

/// Deterministic threshold verifier. The same report under the same policy always yields a
/// bit-identical verdict.
#[derive(Debug, Clone, Default)]
pub struct ThresholdVerifier {
    config: VerificationPolicyConfig,
}

impl ThresholdVerifier {
    pub fn new(config: VerificationPolicyConfig) -> Result<Self, H2Error> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VerificationPolicyConfig {
        &self.config
    }

    /// Verify `report` and wrap an approval in the token credit issuance consumes.
    pub fn decide(&self, report: &ProductionReport) -> Decision {
        let verdict = self.verify(report);
        if verdict.approved() {
            Decision::Approved(ApprovedVerdict(verdict))
        } else {
            Decision::Rejected(verdict)
        }
    }

    pub fn verify(&self, report: &ProductionReport) -> VerificationVerdict {
        let cfg = &self.config;
        let energy_kwh = report.energy_kwh();
        let h2_kg = report.h2_kg();

        let energy_mwh = energy_kwh / 1000.0;
        let efficiency = energy_kwh / h2_kg;
        let expected_h2 = energy_mwh * cfg.kg_h2_per_mwh;
        let deviation = (h2_kg - expected_h2).abs() / expected_h2;

        let deviation_acceptable = deviation <= cfg.max_deviation;
        let efficiency_acceptable = efficiency >= cfg.efficiency_min_kwh_per_kg
            && efficiency <= cfg.efficiency_max_kwh_per_kg;
        let approved = deviation_acceptable && efficiency_acceptable;

        let confidence = cfg.min_confidence.max(1.0 - deviation);

        let fraud_risk = if deviation > cfg.fraud_high_deviation {
            FraudRisk::High
        } else if deviation > cfg.fraud_medium_deviation {
            FraudRisk::Medium
        } else {
            FraudRisk::Low
        };
        let fraud_probability = match fraud_risk {
            FraudRisk::High => cfg.fraud_high_probability,
            FraudRisk::Medium => cfg.fraud_medium_probability,
            FraudRisk::Low => cfg.fraud_low_probability,
        };

        let above_good_floor = efficiency >= cfg.efficiency_good_floor_kwh_per_kg;
        let efficiency_score = if efficiency_acceptable {
            0.95
        } else if above_good_floor {
            0.8
        } else {
            0.6
        };
        let efficiency_rating = if efficiency_acceptable {
            EfficiencyRating::Excellent
        } else if above_good_floor {
            EfficiencyRating::Good
        } else {
            EfficiencyRating::BelowStandard
        };

        let correlation_rating = if deviation <= cfg.correlation_excellent_deviation {
            CorrelationRating::Excellent
        } else if deviation <= cfg.correlation_good_deviation {
            CorrelationRating::Good
        } else {
            CorrelationRating::Poor
        };

        let mut findings = Vec::new();
        if !deviation_acceptable {
            findings.push(format!(
                "h2 deviation {:.4} exceeds tolerance {:.2} (reported {} kg, expected {:.3} kg)",
                deviation, cfg.max_deviation, h2_kg, expected_h2
            ));
        }
        if !efficiency_acceptable {
            findings.push(format!(
                "efficiency {:.2} kWh/kg outside accepted band [{}, {}]",
                efficiency, cfg.efficiency_min_kwh_per_kg, cfg.efficiency_max_kwh_per_kg
            ));
        }
        if approved && fraud_risk != FraudRisk::Low {
            findings.push(format!(
                "approved with elevated fraud risk {} (deviation {:.4})",
                fraud_risk.as_str(),
                deviation
            ));
        }

        debug!(
            energy_kwh,
            h2_kg,
            efficiency,
            deviation,
            approved,
            "threshold verification evaluated"
        );

        VerificationVerdict {
            approved,
            energy_kwh,
            energy_mwh,
            h2_kg,
            efficiency_kwh_per_kg: efficiency,
            expected_h2_kg: expected_h2,
            expected_h2_range: ExpectedRange {
                min: expected_h2 * (1.0 - cfg.expected_range_band),
                max: expected_h2 * (1.0 + cfg.expected_range_band),
            },
            h2_deviation_ratio: deviation,
            efficiency_acceptable,
            deviation_acceptable,
            fraud_probability,
            fraud_risk,
            confidence,
            efficiency_score,
            correlation_rating,
            efficiency_rating,
            policy_version: cfg.policy_version.clone(),
            findings,
        }
    }
}
