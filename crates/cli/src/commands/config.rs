use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use intentchain_core::config::{AppConfig, ConfigOverrides, LogFormat, API_KEY_ENV};
use intentchain_core::domain::stage::StageKind;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult, EXIT_OK};

const COMMAND: &str = "config";

/// Where a value came from, as far as it can be told from the outside.
struct Sources {
    file_doc: Option<Value>,
    file_path: Option<PathBuf>,
}

impl Sources {
    fn detect(config_path: Option<&Path>) -> Self {
        let file_path = detect_config_path(config_path);
        let file_doc = file_path.as_deref().and_then(load_config_file_doc);
        Self { file_doc, file_path }
    }

    fn of(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env_is_set(key)) {
            return format!("env ({env_key})");
        }
        if self.in_file(key_path) {
            return self.file_label();
        }
        "default".to_string()
    }

    fn in_file(&self, key_path: &str) -> bool {
        self.file_doc.as_ref().is_some_and(|doc| contains_path(doc, key_path))
    }

    fn file_label(&self) -> String {
        let file_path = self
            .file_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        format!("file ({file_path})")
    }
}

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match load_config(config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::config_failure(COMMAND, &error),
    };

    CommandResult::new(EXIT_OK, render(&config, &Sources::detect(config_path)))
}

fn render(config: &AppConfig, sources: &Sources) -> String {
    let mut lines =
        vec!["effective config (source precedence: overrides > env > file > default):".to_string()];

    lines.push(render_line(
        "llm.provider",
        config.llm.provider.as_str(),
        sources.of("llm.provider", &["INTENTCHAIN_LLM_PROVIDER"]),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        sources.of("llm.model", &["INTENTCHAIN_LLM_MODEL"]),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.effective_base_url(),
        sources.of("llm.base_url", &["INTENTCHAIN_LLM_BASE_URL"]),
    ));
    lines.push(render_line(
        "llm.temperature",
        &config.llm.temperature.to_string(),
        sources.of("llm.temperature", &["INTENTCHAIN_LLM_TEMPERATURE"]),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        sources.of("llm.timeout_secs", &["INTENTCHAIN_LLM_TIMEOUT_SECS"]),
    ));

    let api_key = match &config.llm.api_key {
        Some(key) => redact_key(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    lines.push(render_line("llm.api_key", &api_key, api_key_source(config, sources)));

    for stage in StageKind::ALL {
        let key_path = format!("stages.{}", stage.as_str());
        let settings = config.stage_config(stage);
        let source =
            if sources.in_file(&key_path) { sources.file_label() } else { "inherits [llm]".to_string() };
        lines.push(render_line(
            &key_path,
            &format!(
                "model={} temperature={} timeout_secs={}",
                settings.model, settings.temperature, settings.timeout_secs
            ),
            source,
        ));
    }

    lines.push(render_line(
        "pipeline.confidence_threshold",
        &config.pipeline.confidence_threshold.to_string(),
        sources.of(
            "pipeline.confidence_threshold",
            &["INTENTCHAIN_PIPELINE_CONFIDENCE_THRESHOLD"],
        ),
    ));
    lines.push(render_line(
        "pipeline.stop_on_failure",
        &config.pipeline.stop_on_failure.to_string(),
        sources.of("pipeline.stop_on_failure", &["INTENTCHAIN_PIPELINE_STOP_ON_FAILURE"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        sources.of("logging.level", &["INTENTCHAIN_LOGGING_LEVEL", "INTENTCHAIN_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        log_format_name(config.logging.format),
        sources.of("logging.format", &["INTENTCHAIN_LOGGING_FORMAT", "INTENTCHAIN_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

/// The vendor variable is only consulted when neither the env override nor
/// the file set a key.
fn api_key_source(config: &AppConfig, sources: &Sources) -> String {
    if config.llm.api_key.is_none() {
        return "unset".to_string();
    }
    let source = sources.of("llm.api_key", &[API_KEY_ENV]);
    if source != "default" {
        return source;
    }
    match config.llm.provider.vendor_key_env() {
        Some(vendor_key) if env_is_set(vendor_key) => format!("env ({vendor_key})"),
        _ => source,
    }
}

fn log_format_name(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    }
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("intentchain.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/intentchain.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn env_is_set(key: &str) -> bool {
    env::var(key).is_ok_and(|value| !value.trim().is_empty())
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the vendor prefix before the first `-` and hides the rest.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
