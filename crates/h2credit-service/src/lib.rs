#![deny(unsafe_code)]

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use h2credit_adapters::{
    HttpMarketplace, HttpPersistence, InMemoryMarketplace, InMemoryPersistence,
    DEFAULT_IN_MEMORY_RETENTION,
};
use h2credit_core::{
    parse_production_date, Clock, EnergyUnit, EngineConfig, ExtractionResult, H2Error,
    IdentitySource, MarketplaceCollaborator, PersistenceCollaborator, ProductionMethod,
    ProductionReport, ReportForm, SequentialIdSource, SystemClock, ThresholdAnalysis,
    UuidIdSource, VerificationOutcome, VerificationPipeline, VerificationRequest,
    VerificationVerdict,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdSourceKind {
    #[default]
    Sequential,
    Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub id_source: IdSourceKind,
    /// Base URL of the verification store. In-memory when absent.
    pub persistence_url: Option<String>,
    /// Base URL of the credit marketplace. In-memory when absent.
    pub marketplace_url: Option<String>,
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<EngineConfig>,
    pub pipeline: Arc<VerificationPipeline>,
}

impl ServiceState {
    pub fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let ServiceConfig {
            engine,
            id_source,
            persistence_url,
            marketplace_url,
        } = config;
        let ids: Arc<dyn IdentitySource> = match id_source {
            IdSourceKind::Sequential => Arc::new(SequentialIdSource::new()),
            IdSourceKind::Uuid => Arc::new(UuidIdSource),
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let in_memory = persistence_url.is_none() || marketplace_url.is_none();
        let timeout = Duration::from_millis(engine.pipeline.submission_timeout_ms);

        let persistence: Arc<dyn PersistenceCollaborator> = match persistence_url {
            Some(url) => Arc::new(HttpPersistence::with_clock(
                &url,
                timeout,
                Arc::clone(&clock),
            )?),
            None => Arc::new(InMemoryPersistence::with_clock(Arc::clone(&clock))),
        };
        let marketplace: Arc<dyn MarketplaceCollaborator> = match marketplace_url {
            Some(url) => Arc::new(HttpMarketplace::with_clock(
                &url,
                timeout,
                Arc::clone(&clock),
            )?),
            None => Arc::new(InMemoryMarketplace::with_clock(Arc::clone(&clock))),
        };
        info!(
            persistence = persistence.name(),
            marketplace = marketplace.name(),
            policy_version = %engine.verification.policy_version,
            "collaborators configured"
        );
        if in_memory {
            warn!(
                retention = DEFAULT_IN_MEMORY_RETENTION,
                "in-memory collaborators keep only recent records and are meant for development"
            );
        }

        Self::with_collaborators(engine, ids, clock, persistence, marketplace)
    }

    pub fn with_collaborators(
        engine: EngineConfig,
        ids: Arc<dyn IdentitySource>,
        clock: Arc<dyn Clock>,
        persistence: Arc<dyn PersistenceCollaborator>,
        marketplace: Arc<dyn MarketplaceCollaborator>,
    ) -> Result<Self, ServiceError> {
        let pipeline = VerificationPipeline::new(&engine, ids, clock, persistence, marketplace)?;
        Ok(Self {
            engine: Arc::new(engine),
            pipeline: Arc::new(pipeline),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/policy", get(policy))
        .route("/v1/extract", post(extract))
        .route("/v1/verify", post(verify))
        .route("/v1/verifications", post(create_verification))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core engine error: {0}")]
    Core(#[from] H2Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] H2Error),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Core(err) => {
                let status = if err.is_user_facing() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub policy_version: String,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "h2credit-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        policy_version: state.engine.verification.policy_version.clone(),
    })
}

async fn policy(State(state): State<ServiceState>) -> Json<EngineConfig> {
    Json(state.engine.as_ref().clone())
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
}

async fn extract(
    State(state): State<ServiceState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractionResult>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.pipeline.extractor().extract(&request.text)))
}

/// Verdict-only request. The caller names the energy unit by choosing the field.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub energy_kwh: Option<f64>,
    pub energy_mwh: Option<f64>,
    pub h2_kg: f64,
    pub production_method: String,
    pub production_date: String,
}

impl VerifyRequest {
    pub fn into_report(self) -> Result<ProductionReport, H2Error> {
        let energy_kwh = match (self.energy_kwh, self.energy_mwh) {
            (Some(kwh), None) => kwh,
            (None, Some(mwh)) => mwh * EnergyUnit::MegawattHour.kwh_factor(),
            (Some(_), Some(_)) => {
                return Err(H2Error::validation(
                    "energy",
                    "provide exactly one of energy_kwh or energy_mwh, not both",
                ))
            }
            (None, None) => {
                return Err(H2Error::validation(
                    "energy",
                    "one of energy_kwh or energy_mwh is required",
                ))
            }
        };
        let method = self.production_method.parse::<ProductionMethod>()?;
        let production_date = parse_production_date(&self.production_date)?;
        ProductionReport::new(energy_kwh, self.h2_kg, method, production_date)
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verdict: VerificationVerdict,
    pub threshold_analysis: ThresholdAnalysis,
    pub digest: String,
}

async fn verify(
    State(state): State<ServiceState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(request) = payload?;
    let report = request.into_report()?;
    let verdict = state.pipeline.verifier().verify(&report);
    info!(
        approved = verdict.approved(),
        efficiency = verdict.efficiency_kwh_per_kg(),
        deviation = verdict.h2_deviation_ratio(),
        "verdict served"
    );
    Ok(Json(VerifyResponse {
        threshold_analysis: verdict.threshold_analysis(),
        digest: verdict.digest(),
        verdict,
    }))
}

/// Full pipeline request: a manual form or the text of an uploaded document.
#[derive(Debug, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum VerificationBody {
    Manual(ReportForm),
    Document {
        text: String,
        production_method: String,
        production_date: String,
    },
}

impl VerificationBody {
    pub fn into_request(self) -> Result<VerificationRequest, H2Error> {
        match self {
            Self::Manual(form) => Ok(VerificationRequest::Manual(form)),
            Self::Document {
                text,
                production_method,
                production_date,
            } => {
                if text.trim().is_empty() {
                    return Err(H2Error::validation("text", "document text is empty"));
                }
                Ok(VerificationRequest::Document {
                    text,
                    production_method: production_method.parse()?,
                    production_date: parse_production_date(&production_date)?,
                })
            }
        }
    }
}

async fn create_verification(
    State(state): State<ServiceState>,
    payload: Result<Json<VerificationBody>, JsonRejection>,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let Json(body) = payload?;
    let request = body.into_request()?;
    let outcome = state.pipeline.run(request).await;
    match &outcome.error {
        Some(err) if err.is_user_facing() => Err(ApiError::bad_request(format!(
            "{} (request {})",
            err, outcome.request_id
        ))),
        _ => Ok(Json(outcome)),
    }
}
