use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Who gets recorded as the opening verifier when an incident is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttributionSource {
    /// The authenticated caller.
    AuthenticatedActor,
    /// A verifier named explicitly in the create request.
    RequestVerifier,
    /// The incident's responsible user.
    ResponsibleUser,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_opening_attribution() -> Vec<AttributionSource> {
    vec![
        AttributionSource::AuthenticatedActor,
        AttributionSource::RequestVerifier,
        AttributionSource::ResponsibleUser,
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a writer waits on a locked database before failing with a retryable error.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Priority order for opening-verifier attribution; the first source that resolves wins.
    #[serde(default = "default_opening_attribution")]
    pub opening_attribution: Vec<AttributionSource>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            opening_attribution: default_opening_attribution(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| {
            AppError::validation("CONFIG_PARSE_FAILED", "Failed to parse engine config")
                .with_details(e.to_string())
        })?;
        if config.opening_attribution.is_empty() {
            return Err(AppError::validation(
                "CONFIG_INVALID",
                "opening_attribution must list at least one source",
            )
            .with_field("opening_attribution"));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::validation("CONFIG_READ_FAILED", "Failed to read engine config")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("parse");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn attribution_order_is_configurable() {
        let config = EngineConfig::from_toml_str(
            r#"
            busy_timeout_ms = 250
            opening_attribution = ["responsible_user", "authenticated_actor"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(
            config.opening_attribution,
            vec![
                AttributionSource::ResponsibleUser,
                AttributionSource::AuthenticatedActor
            ]
        );
    }

    #[test]
    fn empty_attribution_list_is_rejected() {
        let err = EngineConfig::from_toml_str("opening_attribution = []").expect_err("invalid");
        assert_eq!(err.code, "CONFIG_INVALID");
    }
}
