//! End-to-end processing of one verification request.
//!
//! The verdict is final before any collaborator is contacted. Collaborator calls are bounded
//! by the configured timeout and their results are recorded on the outcome; how a failure
//! affects the final status is decided by [`SubmissionPolicy`].

use crate::certificates::{certify, ProductionCertificate};
use crate::collaborators::{MarketplaceCollaborator, PersistenceCollaborator};
use crate::config::{EngineConfig, PipelineConfig, SubmissionPolicy};
use crate::error::H2Error;
use crate::extract::ReportExtractor;
use crate::flow::{VerificationStateMachine, VerificationStatus};
use crate::identity::{Clock, IdentitySource};
use crate::issuer::CreditIssuer;
use crate::policy::ThresholdVerifier;
use crate::types::{
    CreditRecord, ExtractionResult, MarketplaceListing, ProductionMethod, ProductionReport,
    ReportForm, SubmissionReceipt, VerificationSubmission, VerificationVerdict,
};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One unit of work for the pipeline.
#[derive(Debug, Clone)]
pub enum VerificationRequest {
    /// Values typed into the manual-entry form.
    Manual(ReportForm),
    /// An already validated report.
    Report(ProductionReport),
    /// Free text of an uploaded production document. Method and date come from the form
    /// the document was attached to.
    Document {
        text: String,
        production_method: ProductionMethod,
        production_date: NaiveDate,
    },
}

/// What happened to one collaborator call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    NotAttempted,
    Acknowledged { receipt: SubmissionReceipt },
    Failed { kind: &'static str, message: String },
    Skipped { reason: String },
}

impl SubmissionState {
    fn from_result(result: &Result<SubmissionReceipt, H2Error>) -> Self {
        match result {
            Ok(receipt) => Self::Acknowledged {
                receipt: receipt.clone(),
            },
            Err(err) => Self::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub request_id: String,
    pub status: VerificationStatus,
    pub history: Vec<VerificationStatus>,
    pub report: Option<ProductionReport>,
    pub extraction_warnings: Vec<String>,
    pub verdict: Option<VerificationVerdict>,
    pub credit: Option<CreditRecord>,
    pub certificates: Vec<ProductionCertificate>,
    pub persistence: SubmissionState,
    pub marketplace: SubmissionState,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<H2Error>,
}

impl VerificationOutcome {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            status: VerificationStatus::Pending,
            history: Vec::new(),
            report: None,
            extraction_warnings: Vec::new(),
            verdict: None,
            credit: None,
            certificates: Vec::new(),
            persistence: SubmissionState::NotAttempted,
            marketplace: SubmissionState::NotAttempted,
            error: None,
        }
    }
}

#[derive(Serialize)]
struct ErrorView {
    kind: &'static str,
    message: String,
}

fn serialize_error<S: Serializer>(
    error: &Option<H2Error>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => ErrorView {
            kind: err.kind(),
            message: err.to_string(),
        }
        .serialize(serializer),
        None => serializer.serialize_none(),
    }
}

/// Extract or validate, verify, issue, certify, submit, publish.
///
/// Requests are independent; the identity source and the certificate counter are the only
/// state shared between concurrent runs.
pub struct VerificationPipeline {
    extractor: ReportExtractor,
    verifier: ThresholdVerifier,
    issuer: CreditIssuer,
    ids: Arc<dyn IdentitySource>,
    persistence: Arc<dyn PersistenceCollaborator>,
    marketplace: Arc<dyn MarketplaceCollaborator>,
    config: PipelineConfig,
    creator: String,
    certificate_sequence: AtomicU64,
}

impl VerificationPipeline {
    pub fn new(
        config: &EngineConfig,
        ids: Arc<dyn IdentitySource>,
        clock: Arc<dyn Clock>,
        persistence: Arc<dyn PersistenceCollaborator>,
        marketplace: Arc<dyn MarketplaceCollaborator>,
    ) -> Result<Self, H2Error> {
        config.pipeline.validate()?;
        Ok(Self {
            extractor: ReportExtractor::new(),
            verifier: ThresholdVerifier::new(config.verification.clone())?,
            issuer: CreditIssuer::new(config.issuance.clone(), Arc::clone(&ids), clock)?,
            ids,
            persistence,
            marketplace,
            config: config.pipeline.clone(),
            creator: config.issuance.creator.clone(),
            certificate_sequence: AtomicU64::new(0),
        })
    }

    pub fn extractor(&self) -> &ReportExtractor {
        &self.extractor
    }

    pub fn verifier(&self) -> &ThresholdVerifier {
        &self.verifier
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one request to a final status. Never panics and never returns `Err`: failures are
    /// reported on the outcome.
    pub async fn run(&self, request: VerificationRequest) -> VerificationOutcome {
        let request_id = self.ids.next_id(&self.config.request_id_prefix);
        let mut machine = VerificationStateMachine::new(request_id.clone());
        let mut outcome = VerificationOutcome::new(&request_id);

        if let Err(err) = self.process(&mut machine, &mut outcome, request).await {
            if matches!(
                machine.status(),
                VerificationStatus::Pending | VerificationStatus::Processing
            ) {
                if let Err(transition) = machine.mark_error() {
                    warn!(request_id = %request_id, error = %transition, "error transition refused");
                }
            }
            warn!(
                request_id = %request_id,
                status = machine.status().name(),
                kind = err.kind(),
                error = %err,
                "verification request failed"
            );
            outcome.error = Some(err);
        }

        outcome.status = machine.status();
        outcome.history = machine.history().to_vec();
        info!(
            request_id = %request_id,
            status = outcome.status.name(),
            "verification request finished"
        );
        outcome
    }

    async fn process(
        &self,
        machine: &mut VerificationStateMachine,
        outcome: &mut VerificationOutcome,
        request: VerificationRequest,
    ) -> Result<(), H2Error> {
        machine.mark_processing()?;

        let report = match request {
            VerificationRequest::Manual(form) => form.into_report()?,
            VerificationRequest::Report(report) => report,
            VerificationRequest::Document {
                text,
                production_method,
                production_date,
            } => {
                let extraction = self.extractor.extract(&text);
                if let ExtractionResult::Success { warnings, .. } = &extraction {
                    outcome.extraction_warnings = warnings.clone();
                }
                let (energy_kwh, h2_kg) = extraction.into_result()?;
                ProductionReport::new(energy_kwh, h2_kg, production_method, production_date)?
            }
        };
        outcome.report = Some(report.clone());

        let decision = self.verifier.decide(&report);
        let verdict = decision.verdict().clone();
        info!(
            request_id = %machine.request_id(),
            approved = verdict.approved(),
            efficiency = verdict.efficiency_kwh_per_kg(),
            deviation = verdict.h2_deviation_ratio(),
            fraud_risk = verdict.fraud_risk().as_str(),
            "verdict reached"
        );
        outcome.verdict = Some(verdict.clone());

        if !decision.is_approved() {
            machine.mark_rejected()?;
            return Ok(());
        }
        machine.mark_approved()?;

        let credit = self.issuer.issue(&report, decision)?;
        outcome.credit = Some(credit.clone());
        let sequence = self.certificate_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        outcome.certificates = certify(sequence, &verdict, &credit)?;

        let submission = VerificationSubmission::from_verdict(&report, &verdict);
        let persisted = self
            .bounded(
                self.persistence.name(),
                self.persistence.submit_verification(&submission),
            )
            .await;
        outcome.persistence = SubmissionState::from_result(&persisted);
        if let Err(err) = persisted {
            warn!(
                request_id = %machine.request_id(),
                collaborator = self.persistence.name(),
                error = %err,
                "verification submission failed"
            );
            if self.config.submission_policy == SubmissionPolicy::RequireAck {
                outcome.marketplace = SubmissionState::Skipped {
                    reason: "persistence did not acknowledge the verification".to_string(),
                };
                return Err(err);
            }
        }

        let listing = MarketplaceListing::from_credit(&credit, self.creator.as_str());
        let published = self
            .bounded(
                self.marketplace.name(),
                self.marketplace.publish_credit(&listing),
            )
            .await;
        outcome.marketplace = SubmissionState::from_result(&published);
        if let Err(err) = published {
            warn!(
                request_id = %machine.request_id(),
                collaborator = self.marketplace.name(),
                credit_id = %credit.id(),
                error = %err,
                "credit listing failed"
            );
            if self.config.submission_policy == SubmissionPolicy::RequireAck {
                return Err(err);
            }
        }

        machine.mark_credit_generated()
    }

    async fn bounded<F>(&self, collaborator: &str, call: F) -> Result<SubmissionReceipt, H2Error>
    where
        F: Future<Output = Result<SubmissionReceipt, H2Error>>,
    {
        let timeout_ms = self.config.submission_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(H2Error::SubmissionTimeout {
                collaborator: collaborator.to_string(),
                timeout_ms,
            }),
        }
    }
}
