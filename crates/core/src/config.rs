use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::confidence::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::domain::stage::StageKind;

pub const API_KEY_ENV: &str = "INTENTCHAIN_LLM_API_KEY";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub stages: BTreeMap<StageKind, StageOverride>,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Per-stage replacements for the `[llm]` defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct StageOverride {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

/// Resolved model settings handed to a single stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageConfig {
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub confidence_threshold: f64,
    pub stop_on_failure: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub stop_on_failure: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4.1".to_string(),
                temperature: 0.0,
                timeout_secs: 120,
            },
            stages: BTreeMap::new(),
            pipeline: PipelineConfig {
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                stop_on_failure: false,
            },
            logging: LoggingConfig { level: "warn".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    /// The vendor's conventional key variable, read when no intentchain key is set.
    pub fn vendor_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Anthropic)
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("intentchain.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.apply_vendor_key_fallback();
        config.validate()?;

        Ok(config)
    }

    /// Model settings for one stage: `[stages.<name>]` over `[llm]`.
    pub fn stage_config(&self, stage: StageKind) -> StageConfig {
        let stage_override = self.stages.get(&stage);
        StageConfig {
            model: stage_override
                .and_then(|value| value.model.clone())
                .unwrap_or_else(|| self.llm.model.clone()),
            temperature: stage_override
                .and_then(|value| value.temperature)
                .unwrap_or(self.llm.temperature),
            timeout_secs: stage_override
                .and_then(|value| value.timeout_secs)
                .unwrap_or(self.llm.timeout_secs),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(stages) = patch.stages {
            for (stage, stage_override) in stages {
                self.stages.insert(stage, stage_override);
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(confidence_threshold) = pipeline.confidence_threshold {
                self.pipeline.confidence_threshold = confidence_threshold;
            }
            if let Some(stop_on_failure) = pipeline.stop_on_failure {
                self.pipeline.stop_on_failure = stop_on_failure;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("INTENTCHAIN_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env(API_KEY_ENV) {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("INTENTCHAIN_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("INTENTCHAIN_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("INTENTCHAIN_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("INTENTCHAIN_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("INTENTCHAIN_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("INTENTCHAIN_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTENTCHAIN_PIPELINE_CONFIDENCE_THRESHOLD") {
            self.pipeline.confidence_threshold =
                parse_f64("INTENTCHAIN_PIPELINE_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("INTENTCHAIN_PIPELINE_STOP_ON_FAILURE") {
            self.pipeline.stop_on_failure =
                parse_bool("INTENTCHAIN_PIPELINE_STOP_ON_FAILURE", &value)?;
        }

        let log_level =
            read_env("INTENTCHAIN_LOGGING_LEVEL").or_else(|| read_env("INTENTCHAIN_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INTENTCHAIN_LOGGING_FORMAT").or_else(|| read_env("INTENTCHAIN_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(confidence_threshold) = overrides.confidence_threshold {
            self.pipeline.confidence_threshold = confidence_threshold;
        }
        if let Some(stop_on_failure) = overrides.stop_on_failure {
            self.pipeline.stop_on_failure = stop_on_failure;
        }
    }

    fn apply_vendor_key_fallback(&mut self) {
        if self.llm.api_key.is_some() {
            return;
        }
        if let Some(value) = self.llm.provider.vendor_key_env().and_then(read_env) {
            self.llm.api_key = Some(secret_value(value));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_stages(&self.stages)?;
        validate_pipeline(&self.pipeline)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("intentchain.toml"), PathBuf::from("config/intentchain.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_model_settings(
    scope: &str,
    model: Option<&str>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
) -> Result<(), ConfigError> {
    if model.is_some_and(|model| model.trim().is_empty()) {
        return Err(ConfigError::Validation(format!("{scope}.model must not be empty")));
    }
    if temperature.is_some_and(|value| !(0.0..=2.0).contains(&value)) {
        return Err(ConfigError::Validation(format!(
            "{scope}.temperature must be in range 0.0..=2.0"
        )));
    }
    if timeout_secs.is_some_and(|value| value == 0 || value > 300) {
        return Err(ConfigError::Validation(format!(
            "{scope}.timeout_secs must be in range 1..=300"
        )));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_model_settings(
        "llm",
        Some(&llm.model),
        Some(llm.temperature),
        Some(llm.timeout_secs),
    )?;

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if llm.provider.requires_api_key() {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            let vendor_hint = llm
                .provider
                .vendor_key_env()
                .map(|var| format!(" (or {var})"))
                .unwrap_or_default();
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider; set {API_KEY_ENV}{vendor_hint}",
                llm.provider.as_str()
            )));
        }
    }

    Ok(())
}

fn validate_stages(stages: &BTreeMap<StageKind, StageOverride>) -> Result<(), ConfigError> {
    for (stage, stage_override) in stages {
        validate_model_settings(
            &format!("stages.{}", stage.as_str()),
            stage_override.model.as_deref(),
            stage_override.temperature,
            stage_override.timeout_secs,
        )?;
    }
    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    let threshold = pipeline.confidence_threshold;
    if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
        return Err(ConfigError::Validation(
            "pipeline.confidence_threshold must be in range 0..=100".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    stages: Option<BTreeMap<StageKind, StageOverride>>,
    pipeline: Option<PipelinePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    confidence_threshold: Option<f64>,
    stop_on_failure: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
