use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use intentchain_agent::guardrails::AlwaysAbort;
use intentchain_agent::llm::ScriptedLlmClient;
use intentchain_agent::monitor_eval::load_cases;
use intentchain_agent::runtime::SilentObserver;
use intentchain_cli::commands::run::{NonInteractive, RunArgs};
use intentchain_cli::commands::{config, doctor, monitor, run};
use intentchain_cli::console::ConsoleReporter;
use intentchain_core::config::AppConfig;
use intentchain_core::domain::intent::Intent;
use intentchain_core::usage::TokenUsage;
use serde_json::{json, Value};
use tempfile::TempDir;

const MANAGED_KEYS: &[&str] = &[
    "INTENTCHAIN_LLM_PROVIDER",
    "INTENTCHAIN_LLM_API_KEY",
    "INTENTCHAIN_LLM_BASE_URL",
    "INTENTCHAIN_LLM_MODEL",
    "INTENTCHAIN_LLM_TEMPERATURE",
    "INTENTCHAIN_LLM_TIMEOUT_SECS",
    "INTENTCHAIN_PIPELINE_CONFIDENCE_THRESHOLD",
    "INTENTCHAIN_PIPELINE_STOP_ON_FAILURE",
    "INTENTCHAIN_LOGGING_LEVEL",
    "INTENTCHAIN_LOGGING_FORMAT",
    "INTENTCHAIN_LOG_LEVEL",
    "INTENTCHAIN_LOG_FORMAT",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
];

fn non_interactive_args() -> RunArgs {
    RunArgs { non_interactive: Some(NonInteractive::Abort), ..RunArgs::default() }
}

#[test]
fn run_without_credential_fails_before_any_model_call() {
    with_env(&[], || {
        let result = run::run(&non_interactive_args(), None);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("INTENTCHAIN_LLM_API_KEY"), "message should name the variable");
    });
}

#[test]
fn run_with_missing_config_file_is_a_config_failure() {
    with_env(&[("INTENTCHAIN_LLM_API_KEY", "sk-test")], || {
        let missing = Path::new("does-not-exist/intentchain.toml");
        let result = run::run(&non_interactive_args(), Some(missing));
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn run_rejects_unknown_only_id() {
    with_env(&[("INTENTCHAIN_LLM_PROVIDER", "ollama")], || {
        let args = RunArgs { only: vec!["intent_99".to_string()], ..non_interactive_args() };
        let result = run::run(&args, None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "intents_input");
        assert_eq!(payload["message"], "unknown intent id `intent_99`");
    });
}

#[tokio::test]
async fn json_report_records_failed_intent_and_exit_code() {
    let client = Arc::new(ScriptedLlmClient::new().with_reply("not json"));
    let intents = [Intent::new("ar", "guarantee 50ms latency for AR/VR traffic")];

    let result = run::execute(
        &AppConfig::default(),
        client.clone(),
        Arc::new(AlwaysAbort),
        &intents,
        true,
        &SilentObserver,
    )
    .await;

    assert_eq!(result.exit_code, 3, "an incomplete batch should exit with 3");
    let report = parse_payload(&result.output);
    assert_eq!(report["intents"][0]["intent"]["id"], "ar");
    assert_eq!(report["intents"][0]["outcome"]["status"], "failed");
    assert_eq!(report["intents"][0]["outcome"]["stage"], "ihf");
    assert_eq!(report["intents"][0]["outcome"]["error_class"], "parse");
    assert_eq!(report["stopped_early"], false);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn human_summary_counts_completed_intents() {
    let client = Arc::new(ScriptedLlmClient::new().with_reply("{}").with_reply("still not an intent"));
    let intents = [Intent::new("a", "first"), Intent::new("b", "second")];

    let result = run::execute(
        &AppConfig::default(),
        client,
        Arc::new(AlwaysAbort),
        &intents,
        false,
        &SilentObserver,
    )
    .await;

    assert_eq!(result.exit_code, 3);
    assert!(result.output.contains("completed 0/2 intents"));
}

#[tokio::test]
async fn demo_monitor_cases_run_through_the_console_reporter() -> Result<(), String> {
    let cases_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/monitor_cases.json");
    let cases = load_cases(&cases_path).map_err(|err| err.to_string())?;
    let total = cases.len();

    let assessment = json!({
        "status": "passed",
        "checks_summary": [{"name": "nfr_compliance", "result": "pass"}],
        "next_hop": "Done",
        "details": {},
        "orchestrator_feedback": null,
        "rationale": "observed telemetry within the policy budget",
        "assumptions": [],
        "confidence": 90
    });
    let mut client = ScriptedLlmClient::new();
    for _ in 0..total {
        client = client.with_reply_and_usage(assessment.to_string(), TokenUsage::new(500, 50, 0));
    }

    let reporter = ConsoleReporter::new(Vec::<u8>::new());
    let failed =
        monitor::execute(&AppConfig::default(), Arc::new(client), cases, &reporter).await;
    let text = String::from_utf8_lossy(&reporter.into_inner()).into_owned();

    assert_eq!(failed, 0);
    assert!(text.contains("POLICY: intent_1"));
    assert!(text.contains("[MONITOR OUTPUT (NOT_MET)]"));
    assert!(text.contains(&format!("Total runs={total} | failed=0")));
    assert!(text.contains(&format!("tokens_total={}", 550 * total)));
    Ok(())
}

#[test]
fn monitor_reports_missing_case_file() {
    with_env(&[("INTENTCHAIN_LLM_API_KEY", "sk-test")], || {
        let result = monitor::run(Path::new("missing/monitor_cases.json"), None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "monitor");
        assert_eq!(payload["error_class"], "monitor_cases");
    });
}

#[test]
fn config_redacts_key_and_attributes_env_sources() {
    with_env(
        &[("INTENTCHAIN_LLM_API_KEY", "sk-secret-value"), ("INTENTCHAIN_LLM_MODEL", "gpt-4.1-mini")],
        || {
            let result = config::run(None);
            assert_eq!(result.exit_code, 0);

            let output = result.output;
            assert!(!output.contains("secret-value"), "api key must be redacted");
            assert!(output
                .contains("- llm.api_key = sk-*** (source: env (INTENTCHAIN_LLM_API_KEY))"));
            assert!(output
                .contains("- llm.model = gpt-4.1-mini (source: env (INTENTCHAIN_LLM_MODEL))"));
            assert!(output.contains("- stages.selector = model=gpt-4.1-mini"));
            assert!(output.contains("- pipeline.confidence_threshold = 65 (source: default)"));
        },
    );
}

#[test]
fn config_attributes_file_values_and_vendor_key() -> Result<(), String> {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("intentchain.toml");
    fs::write(
        &path,
        "[pipeline]\nconfidence_threshold = 80\n\n[stages.monitor]\nmodel = \"gpt-4o\"\n",
    )
    .map_err(|err| err.to_string())?;

    with_env(&[("OPENAI_API_KEY", "sk-vendor")], || {
        let result = config::run(Some(&path));
        assert_eq!(result.exit_code, 0);

        let output = result.output;
        let file = format!("file ({})", path.display());
        assert!(output.contains(&format!("- pipeline.confidence_threshold = 80 (source: {file})")));
        assert!(output.contains(&format!(
            "- stages.monitor = model=gpt-4o temperature=0 timeout_secs=120 (source: {file})"
        )));
        assert!(output.contains("- stages.ihf = model=gpt-4.1 temperature=0 timeout_secs=120 (source: inherits [llm])"));
        assert!(output.contains("- llm.api_key = sk-*** (source: env (OPENAI_API_KEY))"));
    });
    Ok(())
}

#[test]
fn doctor_json_reports_config_failure() {
    with_env(&[], || {
        let result = doctor::run(None, true, false);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn doctor_passes_for_local_provider_without_probe() {
    with_env(&[("INTENTCHAIN_LLM_PROVIDER", "ollama")], || {
        let result = doctor::run(None, true, false);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        let status = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status("credential_readiness"), "pass");
        assert_eq!(status("llm_client"), "pass");
        assert_eq!(status("endpoint_probe"), "skipped");
    });
}

#[test]
fn doctor_human_output_lists_checks() {
    with_env(&[("INTENTCHAIN_LLM_API_KEY", "sk-test")], || {
        let result = doctor::run(None, false, false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] credential_readiness: api key present for openai"));
        assert!(result.output.contains("- [skip] endpoint_probe:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let previous_values: Vec<(&str, Option<String>)> =
        MANAGED_KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in MANAGED_KEYS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
