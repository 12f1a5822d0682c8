//! Panel configuration.
//!
//! A [`PanelConfig`] can be built in code, parsed from JSON, or read from the
//! environment:
//!
//! | Variable             | Field                  |
//! |----------------------|------------------------|
//! | `PANEL_CONCURRENCY`  | `concurrency`          |
//! | `PANEL_DISPATCH`     | `dispatch`             |
//! | `PANEL_MAX_WORKERS`  | `max_workers`          |
//! | `GEMINI_MODEL`       | `model`                |
//! | `PANEL_TIMEOUT_SECS` | `request_timeout_secs` |

use crate::aggregator::{ConcurrencyMode, Dispatch};
use crate::error::{PanelError, Result};
use crate::oracle::GeminiOracle;
use crate::oracle::gemini_api::{DEFAULT_GEMINI_MODEL, DEFAULT_TIMEOUT};
use crate::persona::{Persona, PersonaRegistry};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub concurrency: ConcurrencyMode,
    pub dispatch: Dispatch,
    pub max_workers: Option<usize>,
    /// Custom panel. `None` means the four built-in experts.
    pub personas: Option<Vec<Persona>>,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyMode::default(),
            dispatch: Dispatch::default(),
            max_workers: None,
            personas: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl PanelConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("PANEL_CONCURRENCY") {
            config.concurrency = value.parse()?;
        }
        if let Some(value) = lookup("PANEL_DISPATCH") {
            config.dispatch = value.parse()?;
        }
        if let Some(value) = lookup("PANEL_MAX_WORKERS") {
            config.max_workers = Some(parse_number("PANEL_MAX_WORKERS", &value)?);
        }
        if let Some(value) = lookup("GEMINI_MODEL") {
            config.model = value;
        }
        if let Some(value) = lookup("PANEL_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_number("PANEL_TIMEOUT_SECS", &value)?;
        }

        Ok(config)
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyMode) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_personas(mut self, personas: Vec<Persona>) -> Self {
        self.personas = Some(personas);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Builds the persona registry, validating custom personas.
    pub fn registry(&self) -> Result<PersonaRegistry> {
        match &self.personas {
            Some(personas) => PersonaRegistry::new(personas.clone()),
            None => Ok(PersonaRegistry::experts()),
        }
    }

    /// Builds a Gemini oracle with this config's model and timeout.
    ///
    /// The API key still comes from `GEMINI_API_KEY`.
    pub fn gemini_oracle(&self) -> Result<GeminiOracle> {
        Ok(GeminiOracle::try_from_env()?
            .with_model(self.model.clone())
            .with_timeout(self.request_timeout()))
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        PanelError::Config(format!("{key} must be a non-negative integer, got '{value}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PanelConfig::default();
        assert_eq!(config.concurrency, ConcurrencyMode::Parallel);
        assert_eq!(config.dispatch, Dispatch::PerPersona);
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.registry().unwrap().len(), 4);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PanelConfig::from_lookup(lookup(&[
            ("PANEL_CONCURRENCY", "SEQUENTIAL"),
            ("PANEL_DISPATCH", "combined"),
            ("PANEL_MAX_WORKERS", "2"),
            ("GEMINI_MODEL", "gemini-2.5-pro"),
            ("PANEL_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();

        assert_eq!(config.concurrency, ConcurrencyMode::Sequential);
        assert_eq!(config.dispatch, Dispatch::Combined);
        assert_eq!(config.max_workers, Some(2));
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = PanelConfig::from_lookup(lookup(&[("PANEL_CONCURRENCY", "eventually")]))
            .unwrap_err();
        assert!(matches!(err, PanelError::Config(_)));

        let err = PanelConfig::from_lookup(lookup(&[("PANEL_MAX_WORKERS", "-1")])).unwrap_err();
        assert!(err.to_string().contains("PANEL_MAX_WORKERS"));
    }

    #[test]
    fn test_from_json_str() {
        let config = PanelConfig::from_json_str(
            r#"{
                "concurrency": "sequential",
                "personas": [
                    {"name": "A", "role_description": "role of A"},
                    {"name": "B", "role_description": "role of B"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, ConcurrencyMode::Sequential);
        assert_eq!(config.dispatch, Dispatch::PerPersona);
        assert_eq!(config.registry().unwrap().names(), vec!["A", "B"]);
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(matches!(
            PanelConfig::from_json_str("{").unwrap_err(),
            PanelError::Config(_)
        ));
    }

    #[test]
    fn test_registry_validates_custom_personas() {
        let config = PanelConfig::default().with_personas(vec![
            Persona::new("A", "role"),
            Persona::new("A", "other role"),
        ]);
        assert!(matches!(
            config.registry().unwrap_err(),
            PanelError::InvalidRegistry(_)
        ));
    }
}
