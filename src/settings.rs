use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::completion::RetryPolicy;

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_HISTORY_WINDOW: usize = 14;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Transition phrases the model is told to avoid. Overridable through
/// `exclusion_phrases` in the config file; an empty list drops the clause.
pub const DEFAULT_EXCLUSION_PHRASES: &[&str] = &[
    "In conclusion",
    "In today's fast-paced world",
    "In the ever-evolving world of",
    "It's important to note",
    "Let's dive in",
    "delve into",
    "Moreover",
    "Furthermore",
    "Additionally",
    "In summary",
    "Ultimately",
    "When it comes to",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// One completion call per article section, chained through the title.
    #[default]
    Sectioned,
    /// A single call asking for the whole article at once.
    Combined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GenerationPolicies {
    pub mode: Option<GenerationMode>,
    pub history_window: Option<usize>,
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionSettings {
    pub default_model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub generation: Option<GenerationPolicies>,
}

/// Partial update for [`SessionSettings`]; absent fields keep their value.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionSettingsPatch {
    pub default_model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub generation: Option<GenerationPolicies>,
}

impl SessionSettings {
    pub fn apply_patch(&mut self, patch: SessionSettingsPatch) {
        if let Some(model) = patch.default_model {
            self.default_model = Some(model);
        }
        if let Some(params) = patch.model_params {
            self.model_params = Some(params);
        }
        if let Some(generation) = patch.generation {
            self.generation = Some(generation);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GlobalConfigDefaults {
    pub default_model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub generation: Option<GenerationPolicies>,
    pub exclusion_phrases: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub generation: Option<GenerationPolicies>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub model_params: ModelParams,
    pub mode: GenerationMode,
    pub history_window: usize,
    pub retry: RetryPolicy,
    pub exclusion_phrases: Vec<String>,
}

pub fn resolve_effective_settings(
    global: &GlobalConfigDefaults,
    session: &SessionSettings,
    request: &RequestOverrides,
) -> EffectiveSettings {
    let model = request
        .model
        .clone()
        .or_else(|| session.default_model.clone())
        .or_else(|| global.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let model_params = ModelParams {
        temperature: request
            .model_params
            .as_ref()
            .and_then(|p| p.temperature)
            .or_else(|| session.model_params.as_ref().and_then(|p| p.temperature))
            .or_else(|| global.model_params.as_ref().and_then(|p| p.temperature)),
        max_tokens: request
            .model_params
            .as_ref()
            .and_then(|p| p.max_tokens)
            .or_else(|| session.model_params.as_ref().and_then(|p| p.max_tokens))
            .or_else(|| global.model_params.as_ref().and_then(|p| p.max_tokens)),
        top_p: request
            .model_params
            .as_ref()
            .and_then(|p| p.top_p)
            .or_else(|| session.model_params.as_ref().and_then(|p| p.top_p))
            .or_else(|| global.model_params.as_ref().and_then(|p| p.top_p)),
    };

    let layers = [&request.generation, &session.generation, &global.generation];
    let mode = first_set(&layers, |g| g.mode).unwrap_or_default();
    let history_window = first_set(&layers, |g| g.history_window)
        .unwrap_or(DEFAULT_HISTORY_WINDOW)
        .max(1);

    let fallback = RetryPolicy::default();
    let retry = RetryPolicy {
        max_attempts: first_set(&layers, |g| g.max_attempts).unwrap_or(fallback.max_attempts).max(1),
        initial_backoff_ms: first_set(&layers, |g| g.initial_backoff_ms).unwrap_or(fallback.initial_backoff_ms),
        backoff_multiplier: first_set(&layers, |g| g.backoff_multiplier).unwrap_or(fallback.backoff_multiplier),
    };

    let exclusion_phrases = global.exclusion_phrases.clone().unwrap_or_else(|| {
        DEFAULT_EXCLUSION_PHRASES.iter().map(|p| p.to_string()).collect()
    });

    EffectiveSettings {
        model,
        model_params,
        mode,
        history_window,
        retry,
        exclusion_phrases,
    }
}

/// First layer, highest precedence first, that sets the policy `f` reads.
fn first_set<T>(layers: &[&Option<GenerationPolicies>], f: impl Fn(&GenerationPolicies) -> Option<T>) -> Option<T> {
    layers.iter().find_map(|layer| layer.as_ref().and_then(&f))
}

/// Contents of the optional TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub listen: Option<String>,
    pub countries_csv: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub defaults: GlobalConfigDefaults,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn countries_csv(&self) -> PathBuf {
        self.countries_csv
            .clone()
            .unwrap_or_else(|| PathBuf::from("countries.csv"))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("article_generator"))
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_request_over_session_over_global() {
        let global = GlobalConfigDefaults {
            default_model: Some("global-model".into()),
            model_params: Some(ModelParams {
                temperature: Some(0.1),
                max_tokens: Some(1000),
                top_p: Some(0.9),
            }),
            generation: Some(GenerationPolicies {
                mode: Some(GenerationMode::Combined),
                history_window: Some(6),
                max_attempts: Some(5),
                initial_backoff_ms: Some(100),
                backoff_multiplier: None,
            }),
            exclusion_phrases: Some(vec!["Moreover".into()]),
        };

        let session = SessionSettings {
            default_model: Some("session-model".into()),
            model_params: Some(ModelParams {
                temperature: Some(0.2),
                max_tokens: None,
                top_p: None,
            }),
            generation: Some(GenerationPolicies {
                mode: Some(GenerationMode::Sectioned),
                history_window: None,
                max_attempts: Some(2),
                ..Default::default()
            }),
        };

        let request = RequestOverrides {
            model: Some("request-model".into()),
            model_params: Some(ModelParams {
                temperature: None,
                max_tokens: Some(2048),
                top_p: None,
            }),
            generation: Some(GenerationPolicies {
                initial_backoff_ms: Some(10),
                ..Default::default()
            }),
        };

        let eff = resolve_effective_settings(&global, &session, &request);

        assert_eq!(eff.model, "request-model");
        assert_eq!(eff.model_params.temperature, Some(0.2)); // from session
        assert_eq!(eff.model_params.max_tokens, Some(2048)); // from request
        assert_eq!(eff.model_params.top_p, Some(0.9)); // from global
        assert_eq!(eff.mode, GenerationMode::Sectioned); // from session
        assert_eq!(eff.history_window, 6); // from global
        assert_eq!(eff.retry.max_attempts, 2); // from session
        assert_eq!(eff.retry.initial_backoff_ms, 10); // from request
        assert_eq!(eff.retry.backoff_multiplier, RetryPolicy::default().backoff_multiplier);
        assert_eq!(eff.exclusion_phrases, vec!["Moreover".to_string()]);
    }

    #[test]
    fn empty_layers_fall_back_to_builtin_defaults() {
        let eff = resolve_effective_settings(
            &GlobalConfigDefaults::default(),
            &SessionSettings::default(),
            &RequestOverrides::default(),
        );
        assert_eq!(eff.model, DEFAULT_MODEL);
        assert_eq!(eff.history_window, DEFAULT_HISTORY_WINDOW);
        assert_eq!(eff.mode, GenerationMode::Sectioned);
        assert_eq!(eff.exclusion_phrases.len(), DEFAULT_EXCLUSION_PHRASES.len());
    }

    #[test]
    fn zero_window_and_attempts_are_raised_to_one() {
        let session = SessionSettings {
            generation: Some(GenerationPolicies {
                history_window: Some(0),
                max_attempts: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let eff = resolve_effective_settings(&GlobalConfigDefaults::default(), &session, &RequestOverrides::default());
        assert_eq!(eff.history_window, 1);
        assert_eq!(eff.retry.max_attempts, 1);
    }

    #[test]
    fn patch_only_replaces_present_fields() {
        let mut settings = SessionSettings {
            default_model: Some("a".into()),
            model_params: Some(ModelParams { temperature: Some(0.5), ..Default::default() }),
            generation: None,
        };
        settings.apply_patch(SessionSettingsPatch {
            default_model: Some("b".into()),
            ..Default::default()
        });
        assert_eq!(settings.default_model.as_deref(), Some("b"));
        assert_eq!(settings.model_params.unwrap().temperature, Some(0.5));
    }

    #[test]
    fn config_file_parses_defaults_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
listen = "0.0.0.0:8080"
countries_csv = "data/countries.csv"

[defaults]
default_model = "gpt-4o"
exclusion_phrases = []

[defaults.generation]
mode = "combined"
max_attempts = 3
"#,
        )
        .unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listen.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(config.countries_csv(), PathBuf::from("data/countries.csv"));
        assert_eq!(config.defaults.default_model.as_deref(), Some("gpt-4o"));
        let generation = config.defaults.generation.as_ref().unwrap();
        assert_eq!(generation.mode, Some(GenerationMode::Combined));
        assert_eq!(generation.max_attempts, Some(3));
        assert_eq!(config.defaults.exclusion_phrases, Some(vec![]));
        assert_eq!(config.request_timeout_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn missing_config_path_yields_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
