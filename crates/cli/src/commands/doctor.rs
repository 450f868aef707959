use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use intentchain_agent::llm::{CompletionRequest, LlmClient};
use intentchain_agent::providers::build_client;
use intentchain_core::config::{AppConfig, ConfigOverrides, API_KEY_ENV};
use intentchain_core::domain::stage::StageKind;
use serde::Serialize;

use crate::commands::{current_thread_runtime, load_config, CommandResult, EXIT_CHECK_FAILED, EXIT_OK};

const PROBE_PROMPT: &str = "Reply with the JSON object {\"ok\": true} and nothing else.";
const PROBE_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<&Path>, json_output: bool, probe: bool) -> CommandResult {
    let report = build_report(config_path, probe);
    let exit_code =
        if report.overall_status == CheckStatus::Pass { EXIT_OK } else { EXIT_CHECK_FAILED };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::new(exit_code, output);
    }

    CommandResult::new(exit_code, render_human(&report))
}

fn build_report(config_path: Option<&Path>, probe: bool) -> DoctorReport {
    let mut checks = Vec::new();

    match load_config(config_path, ConfigOverrides::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_credential(&config));
            match build_client(&config.llm) {
                Ok(client) => {
                    checks.push(DoctorCheck::pass(
                        "llm_client",
                        format!(
                            "{} client ready for `{}`",
                            config.llm.provider.as_str(),
                            config.llm.effective_base_url()
                        ),
                    ));
                    checks.push(if probe {
                        probe_endpoint(&config, client)
                    } else {
                        DoctorCheck::skipped("endpoint_probe", "pass --probe to send a test request")
                    });
                }
                Err(error) => {
                    checks.push(DoctorCheck::fail("llm_client", error.to_string()));
                    checks.push(DoctorCheck::skipped(
                        "endpoint_probe",
                        "skipped because the client could not be built",
                    ));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["credential_readiness", "llm_client", "endpoint_probe"] {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    // Skipped checks only fail the report when nothing else did.
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_credential(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider;
    if !provider.requires_api_key() {
        return DoctorCheck::pass(
            "credential_readiness",
            format!("{} does not require an api key", provider.as_str()),
        );
    }

    match &config.llm.api_key {
        Some(_) => DoctorCheck::pass(
            "credential_readiness",
            format!("api key present for {}", provider.as_str()),
        ),
        None => {
            let vendor = provider.vendor_key_env().map(|key| format!(" or {key}")).unwrap_or_default();
            DoctorCheck::fail("credential_readiness", format!("set {API_KEY_ENV}{vendor}"))
        }
    }
}

fn probe_endpoint(config: &AppConfig, client: Arc<dyn LlmClient>) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "endpoint_probe",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let settings = config.stage_config(StageKind::Ihf);
    let request = CompletionRequest {
        stage: StageKind::Ihf,
        model: settings.model,
        temperature: settings.temperature,
        timeout: Duration::from_secs(settings.timeout_secs.min(PROBE_TIMEOUT_SECS)),
        system_prompt: PROBE_PROMPT.to_string(),
    };

    match runtime.block_on(client.complete(&request)) {
        Ok(completion) => DoctorCheck::pass(
            "endpoint_probe",
            format!(
                "`{}` replied with {} characters",
                request.model,
                completion.content.chars().count()
            ),
        ),
        Err(error) => DoctorCheck::fail("endpoint_probe", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
