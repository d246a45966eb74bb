use crate::error::H2Error;
use crate::issuer::IssuanceConfig;
use crate::policy::VerificationPolicyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What an unacknowledged persistence submission means for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPolicy {
    /// The verdict is final before submission; failures are recorded and the credit is
    /// still published.
    #[default]
    Optimistic,
    /// Publish only after persistence acknowledged. On failure the request stays APPROVED.
    RequireAck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub submission_timeout_ms: u64,
    pub submission_policy: SubmissionPolicy,
    pub request_id_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            submission_timeout_ms: 5_000,
            submission_policy: SubmissionPolicy::Optimistic,
            request_id_prefix: "VREQ".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), H2Error> {
        if self.submission_timeout_ms == 0 {
            return Err(H2Error::Config(
                "submission_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.request_id_prefix.trim().is_empty() {
            return Err(H2Error::Config("request_id_prefix must not be empty".into()));
        }
        Ok(())
    }
}

/// Top-level engine configuration, one TOML table per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub verification: VerificationPolicyConfig,
    pub issuance: IssuanceConfig,
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Load from a TOML file. Without a path the defaults apply; a named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, H2Error> {
        let config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|err| {
                    H2Error::Config(format!("cannot read {}: {err}", path.display()))
                })?;
                Self::from_toml(&contents)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, H2Error> {
        toml::from_str(contents).map_err(|err| H2Error::Config(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), H2Error> {
        self.verification.validate()?;
        self.issuance.validate()?;
        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn no_path_yields_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.verification.kg_h2_per_mwh, 22.5);
        assert_eq!(config.issuance.price_per_kg, 2.5);
        assert_eq!(config.pipeline.submission_policy, SubmissionPolicy::Optimistic);
    }

    #[test]
    fn named_file_that_does_not_exist_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h2credit.toml");
        let err = EngineConfig::load(Some(path.as_path())).unwrap_err();
        assert!(matches!(err, H2Error::Config(ref message) if message.contains("cannot read")));
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[verification]
max_deviation = 0.3
policy_version = "h2-threshold-2025"

[pipeline]
submission_policy = "require_ack"
submission_timeout_ms = 250
"#
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.verification.max_deviation, 0.3);
        assert_eq!(config.verification.policy_version, "h2-threshold-2025");
        assert_eq!(config.verification.efficiency_min_kwh_per_kg, 40.0);
        assert_eq!(config.pipeline.submission_policy, SubmissionPolicy::RequireAck);
        assert_eq!(config.pipeline.submission_timeout_ms, 250);
        assert_eq!(config.issuance, IssuanceConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[verification]\nefficiency_max_kwh_per_kg = 30.0").unwrap();
        let err = EngineConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, H2Error::Config(_)));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = EngineConfig::from_toml("[pipeline\nsubmission_timeout_ms = ").unwrap_err();
        assert_eq!(err.kind(), "config_error");
    }
}
