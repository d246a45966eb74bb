use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use h2credit_core::*;
use std::sync::{Arc, Mutex};

fn wind_report(energy_kwh: f64, h2_kg: f64) -> ProductionReport {
    ProductionReport::new(
        energy_kwh,
        h2_kg,
        ProductionMethod::Wind,
        NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
    )
    .unwrap()
}

#[test]
fn scenario_a_plausible_report_is_approved() {
    let verdict = ThresholdVerifier::default().verify(&wind_report(2000.0, 40.0));

    assert_eq!(verdict.efficiency_kwh_per_kg(), 50.0);
    assert_eq!(verdict.expected_h2_kg(), 45.0);
    assert!((verdict.h2_deviation_ratio() - 0.111).abs() < 1e-3);
    assert!(verdict.deviation_acceptable());
    assert!(verdict.efficiency_acceptable());
    assert!(verdict.approved());
    assert_eq!(verdict.fraud_probability(), 0.1);
    assert_eq!(verdict.correlation_rating(), CorrelationRating::Good);
    assert_eq!(verdict.efficiency_rating(), EfficiencyRating::Excellent);
}

#[test]
fn scenario_b_implausible_efficiency_is_rejected() {
    let verdict = ThresholdVerifier::default().verify(&wind_report(2000.0, 10.0));

    assert_eq!(verdict.efficiency_kwh_per_kg(), 200.0);
    assert_eq!(verdict.expected_h2_kg(), 45.0);
    assert!((verdict.h2_deviation_ratio() - 0.778).abs() < 1e-3);
    assert!(!verdict.approved());
    assert!(!verdict.deviation_acceptable());
    assert!(!verdict.efficiency_acceptable());
    assert_eq!(verdict.fraud_probability(), 0.8);
}

#[test]
fn scenario_c_document_quantities_are_normalised() {
    let result =
        ReportExtractor::new().extract("Energy produced: 500 MWh ... Hydrogen output: 2 tons");
    assert_eq!(result.quantities(), Some((500_000.0, 2000.0)));
}

#[test]
fn extraction_failure_names_missing_quantity() {
    match ReportExtractor::new().extract("no numeric data here") {
        ExtractionResult::Failure { missing, .. } => assert!(!missing.is_empty()),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn unit_normalisation_examples() {
    assert_eq!(normalize_energy(2.0, "MWh").value, 2000.0);
    assert_eq!(normalize_hydrogen(2.0, "ton").value, 2000.0);
}

#[test]
fn issuing_on_rejected_verdict_is_an_invariant_violation() {
    let report = wind_report(2000.0, 10.0);
    let decision = ThresholdVerifier::default().decide(&report);
    let issuer = CreditIssuer::new(
        IssuanceConfig::default(),
        Arc::new(SequentialIdSource::new()),
        Arc::new(SystemClock),
    )
    .unwrap();

    assert!(matches!(
        issuer.issue(&report, decision),
        Err(H2Error::InvariantViolation(_))
    ));
}

#[test]
fn stricter_policy_rejects_what_default_approves() {
    let report = wind_report(2000.0, 40.0);
    let strict = ThresholdVerifier::new(VerificationPolicyConfig {
        max_deviation: 0.10,
        ..VerificationPolicyConfig::default()
    })
    .unwrap();

    assert!(ThresholdVerifier::default().verify(&report).approved());
    assert!(!strict.verify(&report).approved());
}

#[derive(Default)]
struct RecordingCollaborator {
    submissions: Mutex<Vec<VerificationSubmission>>,
    listings: Mutex<Vec<MarketplaceListing>>,
}

fn receipt(collaborator: &str, reference: String) -> SubmissionReceipt {
    SubmissionReceipt {
        collaborator: collaborator.to_string(),
        reference,
        acknowledged_at: Utc.with_ymd_and_hms(2024, 4, 11, 0, 0, 0).unwrap(),
    }
}

#[async_trait]
impl PersistenceCollaborator for RecordingCollaborator {
    fn name(&self) -> &'static str {
        "recording-persistence"
    }

    async fn submit_verification(
        &self,
        submission: &VerificationSubmission,
    ) -> Result<SubmissionReceipt, H2Error> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(submission.clone());
        Ok(receipt(
            "recording-persistence",
            format!("sub-{}", submissions.len()),
        ))
    }
}

#[async_trait]
impl MarketplaceCollaborator for RecordingCollaborator {
    fn name(&self) -> &'static str {
        "recording-marketplace"
    }

    async fn publish_credit(
        &self,
        listing: &MarketplaceListing,
    ) -> Result<SubmissionReceipt, H2Error> {
        self.listings.lock().unwrap().push(listing.clone());
        Ok(receipt("recording-marketplace", listing.id.clone()))
    }
}

#[tokio::test]
async fn document_upload_flows_through_to_marketplace() {
    let collaborator = Arc::new(RecordingCollaborator::default());
    let pipeline = VerificationPipeline::new(
        &EngineConfig::default(),
        Arc::new(SequentialIdSource::new()),
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 4, 11, 8, 30, 0).unwrap())),
        collaborator.clone(),
        collaborator.clone(),
    )
    .unwrap();

    let outcome = pipeline
        .run(VerificationRequest::Document {
            text: "Monthly report\nRenewable energy: 2 MWh\nHydrogen produced: 42 kg".to_string(),
            production_method: ProductionMethod::Solar,
            production_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        })
        .await;

    assert_eq!(outcome.status, VerificationStatus::CreditGenerated);
    assert!(outcome.extraction_warnings.is_empty());

    let submissions = collaborator.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].energy_mwh, 2.0);
    assert_eq!(submissions[0].h2_kg, 42.0);
    assert_eq!(submissions[0].status, SUBMISSION_STATUS_VERIFIED);
    assert!(submissions[0].threshold_analysis.h2_deviation_acceptable);

    let listings = collaborator.listings.lock().unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].name, "Solar H₂ Credit - 42kg");
    assert_eq!(listings[0].price, 105.0);
    assert_eq!(listings[0].creator.username, "verified_producer");
    assert!(listings[0].is_active);
    assert!(!listings[0].is_expired);
    assert!(listings[0].auto_generated && listings[0].threshold_verified);
}

#[tokio::test]
async fn concurrent_requests_get_distinct_credit_ids() {
    let collaborator = Arc::new(RecordingCollaborator::default());
    let pipeline = Arc::new(
        VerificationPipeline::new(
            &EngineConfig::default(),
            Arc::new(SequentialIdSource::new()),
            Arc::new(SystemClock),
            collaborator.clone(),
            collaborator.clone(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let report = wind_report(2000.0 + i as f64, 40.0);
                pipeline.run(VerificationRequest::Report(report)).await
            })
        })
        .collect();

    let mut credit_ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, VerificationStatus::CreditGenerated);
        credit_ids.push(outcome.credit.unwrap().id().to_string());
    }
    credit_ids.sort();
    credit_ids.dedup();
    assert_eq!(credit_ids.len(), 16);
    assert_eq!(collaborator.listings.lock().unwrap().len(), 16);
}
