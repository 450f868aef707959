//! Monitor-only evaluation.
//!
//! Each case pairs ground-truth PCC rules with an observed deployment state
//! and asks the Monitor stage for a compliance assessment. Cases are
//! independent: a failed case is recorded and the next one runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use intentchain_core::errors::StageError;
use intentchain_core::usage::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::runtime::orchestrator_apply;
use crate::stages::{Monitor, StageOutput};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorCase {
    pub policy_id: String,
    #[serde(default)]
    pub case: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    pub pcc_rules: Vec<Value>,
    #[serde(default)]
    pub orchestrator_result: Option<Value>,
    pub observed_state: Value,
}

impl MonitorCase {
    /// The orchestrator result handed to the monitor; the fixed accept when
    /// the case does not name one.
    pub fn effective_orchestrator_result(&self) -> Value {
        self.orchestrator_result.clone().unwrap_or_else(|| orchestrator_apply(&Value::Null))
    }

    pub fn label(&self) -> String {
        match &self.case {
            Some(case) => format!("{} ({case})", self.policy_id),
            None => self.policy_id.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MonitorCaseError {
    #[error("could not read monitor cases `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse monitor cases `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("monitor case file `{0}` contains no cases")]
    Empty(PathBuf),
}

pub fn load_cases(path: &Path) -> Result<Vec<MonitorCase>, MonitorCaseError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| MonitorCaseError::Read { path: path.to_path_buf(), source })?;
    let cases: Vec<MonitorCase> = serde_json::from_str(&raw)
        .map_err(|source| MonitorCaseError::Parse { path: path.to_path_buf(), source })?;
    if cases.is_empty() {
        return Err(MonitorCaseError::Empty(path.to_path_buf()));
    }
    Ok(cases)
}

pub struct MonitorCaseRun {
    pub case: MonitorCase,
    pub outcome: Result<StageOutput, StageError>,
}

impl MonitorCaseRun {
    /// `[MONITOR METRICS]` payload: `policy=.. case=.. time_s=.. tokens=..`
    pub fn metrics_line(&self) -> String {
        let (elapsed, tokens) = match &self.outcome {
            Ok(output) => (output.usage.elapsed, output.usage.tokens),
            Err(_) => (Duration::ZERO, TokenUsage::default()),
        };
        let case = match &self.case.case {
            Some(case) => format!(" case={case}"),
            None => " runs=1".to_string(),
        };
        format!(
            "policy={}{} time_s={:.3} tokens_total={} (prompt={}, completion={})",
            self.case.policy_id,
            case,
            elapsed.as_secs_f64(),
            tokens.total_tokens,
            tokens.prompt_tokens,
            tokens.completion_tokens
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MonitorSummary {
    pub runs: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub usage: TokenUsage,
}

impl MonitorSummary {
    pub fn summary_line(&self) -> String {
        format!(
            "Total runs={} | failed={} | total_time_s={:.3} | tokens_total={} (prompt={}, completion={})",
            self.runs,
            self.failed,
            self.elapsed.as_secs_f64(),
            self.usage.total_tokens,
            self.usage.prompt_tokens,
            self.usage.completion_tokens
        )
    }
}

pub trait MonitorObserver {
    fn case_started(&self, _case: &MonitorCase) {}
    fn case_finished(&self, _run: &MonitorCaseRun) {}
}

pub struct MonitorEvaluation {
    pub runs: Vec<MonitorCaseRun>,
    pub summary: MonitorSummary,
}

pub async fn evaluate_cases(
    monitor: &Monitor,
    cases: Vec<MonitorCase>,
    observer: &dyn MonitorObserver,
) -> MonitorEvaluation {
    let mut runs = Vec::with_capacity(cases.len());
    let mut summary = MonitorSummary::default();

    for case in cases {
        observer.case_started(&case);
        let started = Instant::now();
        let outcome = monitor
            .run(&case.pcc_rules, &case.effective_orchestrator_result(), &case.observed_state)
            .await;

        summary.runs += 1;
        match &outcome {
            Ok(output) => {
                summary.elapsed += output.usage.elapsed;
                summary.usage += output.usage.tokens;
                let status = output.result.get("status").and_then(Value::as_str).unwrap_or("-");
                info!(
                    event_name = "monitor.case.completed",
                    policy_id = %case.policy_id,
                    case = case.case.as_deref().unwrap_or("-"),
                    status,
                    "monitor case completed"
                );
            }
            Err(error) => {
                summary.failed += 1;
                summary.elapsed += started.elapsed();
                warn!(
                    event_name = "monitor.case.failed",
                    policy_id = %case.policy_id,
                    error_class = error.error_class(),
                    error = %error,
                    "monitor case failed"
                );
            }
        }

        let run = MonitorCaseRun { case, outcome };
        observer.case_finished(&run);
        runs.push(run);
    }

    MonitorEvaluation { runs, summary }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use intentchain_core::config::StageConfig;
    use intentchain_core::domain::stage::StageKind;
    use intentchain_core::usage::TokenUsage;
    use serde_json::json;
    use tempfile::TempDir;

    use super::{evaluate_cases, load_cases, MonitorCase, MonitorCaseError, MonitorObserver};
    use crate::llm::ScriptedLlmClient;
    use crate::stages::{Monitor, StageRunner};

    struct Quiet;
    impl MonitorObserver for Quiet {}

    fn case(policy_id: &str, case: Option<&str>) -> MonitorCase {
        MonitorCase {
            policy_id: policy_id.to_string(),
            case: case.map(str::to_string),
            intent: None,
            pcc_rules: vec![json!({"rule_id": "r-dl", "direction": "downlink", "qos": {"pdb_ms": 100}})],
            orchestrator_result: None,
            observed_state: json!({"modules_ready": true, "telemetry": {"downlink_latency_ms": 60}}),
        }
    }

    fn monitor(client: Arc<ScriptedLlmClient>) -> Monitor {
        let config = StageConfig { model: "gpt-4.1".to_string(), temperature: 0.0, timeout_secs: 30 };
        Monitor::new(StageRunner::new(StageKind::Monitor, client, config))
    }

    #[test]
    fn missing_orchestrator_result_defaults_to_accept() {
        let case = case("intent_2", Some("MET"));
        assert_eq!(case.effective_orchestrator_result(), json!({"status": "applied", "reason": null}));
        assert_eq!(case.label(), "intent_2 (MET)");
    }

    #[test]
    fn case_file_round_trip_and_empty_file() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err| err.to_string())?;
        let path = dir.path().join("cases.json");
        fs::write(
            &path,
            r#"[{"policy_id": "intent_1", "pcc_rules": [], "observed_state": {"telemetry": {}}}]"#,
        )
        .map_err(|err| err.to_string())?;
        let cases = load_cases(&path).map_err(|err| err.to_string())?;
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].case, None);

        fs::write(&path, "[]").map_err(|err| err.to_string())?;
        assert!(matches!(load_cases(&path), Err(MonitorCaseError::Empty(_))));
        Ok(())
    }

    #[tokio::test]
    async fn failed_case_does_not_stop_evaluation() {
        let assessment = json!({
            "status": "passed",
            "checks_summary": [{"name": "nfr_compliance", "result": "pass"}],
            "next_hop": "Done",
            "details": {},
            "orchestrator_feedback": null,
            "rationale": "downlink latency within budget",
            "assumptions": [],
            "confidence": 95
        });
        let client = Arc::new(
            ScriptedLlmClient::new()
                .with_reply("no assessment today")
                .with_reply_and_usage(assessment.to_string(), TokenUsage::new(700, 90, 790)),
        );

        let evaluation = evaluate_cases(
            &monitor(client.clone()),
            vec![case("intent_2", Some("MET")), case("intent_2", Some("NOT_MET"))],
            &Quiet,
        )
        .await;

        assert_eq!(evaluation.summary.runs, 2);
        assert_eq!(evaluation.summary.failed, 1);
        assert_eq!(evaluation.summary.usage, TokenUsage::new(700, 90, 790));
        assert!(evaluation.runs[0].outcome.is_err());
        let status =
            evaluation.runs[1].outcome.as_ref().ok().map(|output| output.result["status"].clone());
        assert_eq!(status, Some(json!("passed")));
        assert!(evaluation.runs[1].metrics_line().starts_with("policy=intent_2 case=NOT_MET time_s="));
        assert!(evaluation.runs[1].metrics_line().ends_with("tokens_total=790 (prompt=700, completion=90)"));

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].system_prompt.contains("\"applied\""));
        assert!(requests[1].system_prompt.contains("downlink_latency_ms"));
    }
}
