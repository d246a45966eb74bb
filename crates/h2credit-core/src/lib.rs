//! Hydrogen production verification and credit issuance.
//!
//! Production reports are normalised to kWh and kg, checked against the physical
//! energy-to-hydrogen correlation, and, when approved, turned into tradable credits with
//! their production certificates. Verification is deterministic; identity and time are
//! injected.

#![deny(unsafe_code)]

pub mod certificates;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod extract;
pub mod flow;
pub mod identity;
pub mod issuer;
pub mod pipeline;
pub mod policy;
pub mod types;
pub mod units;

pub use certificates::{certify, CertificateKind, ProductionCertificate};
pub use collaborators::{MarketplaceCollaborator, PersistenceCollaborator};
pub use config::{EngineConfig, PipelineConfig, SubmissionPolicy};
pub use error::H2Error;
pub use extract::ReportExtractor;
pub use flow::{VerificationStateMachine, VerificationStatus};
pub use identity::{
    Clock, FixedClock, IdentitySource, SequentialIdSource, SystemClock, UuidIdSource,
};
pub use issuer::{CreditIssuer, IssuanceConfig};
pub use pipeline::{
    SubmissionState, VerificationOutcome, VerificationPipeline, VerificationRequest,
};
pub use policy::{ApprovedVerdict, Decision, ThresholdVerifier, VerificationPolicyConfig};
pub use types::{
    parse_production_date, CorrelationRating, CreditRecord, EfficiencyRating, ExpectedRange,
    ExtractedQuantity, ExtractionResult, FraudRisk, ListingCreator, MarketplaceListing,
    MissingQuantity, ProductionMethod, ProductionReport, ReportForm, SubmissionReceipt,
    ThresholdAnalysis, VerificationSubmission, VerificationVerdict, SUBMISSION_STATUS_VERIFIED,
};
pub use units::{normalize_energy, normalize_hydrogen, EnergyUnit, MassUnit, Normalized};
