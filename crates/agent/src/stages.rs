//! One type per model-backed stage.
//!
//! Every stage does the same thing: render its prompt with the JSON it was
//! given, call the model once, time the call, pull usage out of the provider
//! envelope, extract the JSON object from the reply and validate it. The
//! typed wrappers only differ in which inputs they bind and which validator
//! they apply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use intentchain_core::config::{AppConfig, StageConfig};
use intentchain_core::domain::stage::StageKind;
use intentchain_core::errors::{SchemaError, StageError};
use intentchain_core::extract::extract_json_object;
use intentchain_core::usage::{extract_usage, UsageMetrics};
use serde_json::Value;
use tracing::debug;

use crate::llm::{CompletionRequest, LlmClient};
use crate::{prompts, schema};

/// A validated stage result and the usage of the call that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct StageOutput {
    pub result: Value,
    pub usage: UsageMetrics,
}

#[derive(Clone)]
pub struct StageRunner {
    kind: StageKind,
    client: Arc<dyn LlmClient>,
    config: StageConfig,
}

impl StageRunner {
    pub fn new(kind: StageKind, client: Arc<dyn LlmClient>, config: StageConfig) -> Self {
        Self { kind, client, config }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn invoke<F>(&self, bindings: &[(&str, &str)], validate: F) -> Result<StageOutput, StageError>
    where
        F: FnOnce(&Value) -> Result<(), SchemaError>,
    {
        self.invoke_normalized(bindings, |_| {}, validate).await
    }

    /// Like `invoke`, with `normalize` applied to the parsed reply before validation.
    async fn invoke_normalized<N, F>(
        &self,
        bindings: &[(&str, &str)],
        normalize: N,
        validate: F,
    ) -> Result<StageOutput, StageError>
    where
        N: FnOnce(&mut Value),
        F: FnOnce(&Value) -> Result<(), SchemaError>,
    {
        let request = CompletionRequest {
            stage: self.kind,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            timeout: Duration::from_secs(self.config.timeout_secs),
            system_prompt: prompts::render(self.kind, bindings),
        };

        let started = Instant::now();
        let completion = self
            .client
            .complete(&request)
            .await
            .map_err(|error| StageError::Transport { stage: self.kind, message: error.to_string() })?;
        let usage = UsageMetrics::new(started.elapsed(), extract_usage(&completion.raw));

        debug!(
            event_name = "stage.model.replied",
            stage = self.kind.as_str(),
            elapsed_ms = usage.elapsed.as_millis() as u64,
            total_tokens = usage.tokens.total_tokens,
            "model replied"
        );

        let mut result = extract_json_object(&completion.content)
            .map_err(|error| StageError::Parse { stage: self.kind, message: error.to_string() })?;
        normalize(&mut result);
        validate(&result).map_err(|source| StageError::Schema { stage: self.kind, source })?;

        Ok(StageOutput { result, usage })
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn pretty_list(values: &[Value]) -> String {
    serde_json::to_string_pretty(values).unwrap_or_else(|_| "[]".to_string())
}

/// Turns raw operator text into a structured intent.
#[derive(Clone)]
pub struct IntentHandler {
    runner: StageRunner,
}

impl IntentHandler {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    pub async fn run(&self, intent_text: &str) -> Result<StageOutput, StageError> {
        self.runner
            .invoke(&[("operator_intent", intent_text.trim())], schema::validate_structured_intent)
            .await
    }
}

#[derive(Clone)]
pub struct PolicyCreator {
    runner: StageRunner,
}

impl PolicyCreator {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    pub async fn run(&self, structured_intent: &Value) -> Result<StageOutput, StageError> {
        let ihf_json = pretty(structured_intent);
        self.runner.invoke(&[("ihf_json", ihf_json.as_str())], schema::validate_policy).await
    }
}

#[derive(Clone)]
pub struct Selector {
    runner: StageRunner,
}

impl Selector {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    pub async fn run(&self, pcc_rules: &[Value]) -> Result<StageOutput, StageError> {
        let pcc_rules_json = pretty_list(pcc_rules);
        self.runner
            .invoke(&[("pcc_rules_json", pcc_rules_json.as_str())], schema::validate_selection)
            .await
    }
}

#[derive(Clone)]
pub struct Configurator {
    runner: StageRunner,
}

impl Configurator {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    pub async fn run(
        &self,
        selected_modules: &[Value],
        pcc_rules: &[Value],
    ) -> Result<StageOutput, StageError> {
        let selected_modules_json = pretty_list(selected_modules);
        let pcc_rules_json = pretty_list(pcc_rules);
        self.runner
            .invoke_normalized(
                &[
                    ("selected_modules_json", selected_modules_json.as_str()),
                    ("pcc_rules_json", pcc_rules_json.as_str()),
                ],
                clear_outer_header_objects,
                schema::validate_pfcp_config,
            )
            .await
    }
}

/// FAR `outer_header_creation` is only kept when it is not an object.
fn clear_outer_header_objects(configuration: &mut Value) {
    let Some(fars) =
        configuration.pointer_mut("/pfcp_config/far_list").and_then(Value::as_array_mut)
    else {
        return;
    };
    for far in fars.iter_mut().filter_map(Value::as_object_mut) {
        if far.get("outer_header_creation").is_some_and(Value::is_object) {
            far.insert("outer_header_creation".to_string(), Value::Null);
        }
    }
}

#[derive(Clone)]
pub struct Executor {
    runner: StageRunner,
}

impl Executor {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    pub async fn run(
        &self,
        pcc_rules: &[Value],
        selected_modules: &[Value],
        configuration: &Value,
    ) -> Result<StageOutput, StageError> {
        let pcc_rules_json = pretty_list(pcc_rules);
        let selected_modules_json = pretty_list(selected_modules);
        let pfcp_rules_json = pretty(configuration);
        self.runner
            .invoke(
                &[
                    ("pcc_rules_json", pcc_rules_json.as_str()),
                    ("selected_modules_json", selected_modules_json.as_str()),
                    ("pfcp_rules_json", pfcp_rules_json.as_str()),
                ],
                |result| schema::validate_deployment_plan(result, selected_modules, configuration),
            )
            .await
    }
}

#[derive(Clone)]
pub struct Monitor {
    runner: StageRunner,
}

impl Monitor {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    pub async fn run(
        &self,
        pcc_rules: &[Value],
        orchestrator_result: &Value,
        observed_state: &Value,
    ) -> Result<StageOutput, StageError> {
        let pcc_rules_json = pretty_list(pcc_rules);
        let orchestrator_result_json = pretty(orchestrator_result);
        let observed_state_json = pretty(observed_state);
        self.runner
            .invoke(
                &[
                    ("pcc_rules_json", pcc_rules_json.as_str()),
                    ("orchestrator_result_json", orchestrator_result_json.as_str()),
                    ("observed_state_json", observed_state_json.as_str()),
                ],
                schema::validate_assessment,
            )
            .await
    }
}

/// All six stages sharing one client, each with its own model settings.
#[derive(Clone)]
pub struct Stages {
    pub intent_handler: IntentHandler,
    pub policy_creator: PolicyCreator,
    pub selector: Selector,
    pub configurator: Configurator,
    pub executor: Executor,
    pub monitor: Monitor,
}

impl Stages {
    pub fn from_config(config: &AppConfig, client: Arc<dyn LlmClient>) -> Self {
        let runner =
            |kind: StageKind| StageRunner::new(kind, client.clone(), config.stage_config(kind));
        Self {
            intent_handler: IntentHandler::new(runner(StageKind::Ihf)),
            policy_creator: PolicyCreator::new(runner(StageKind::PolicyCreator)),
            selector: Selector::new(runner(StageKind::Selector)),
            configurator: Configurator::new(runner(StageKind::Configurator)),
            executor: Executor::new(runner(StageKind::Executor)),
            monitor: Monitor::new(runner(StageKind::Monitor)),
        }
    }
}

/// The `pcc_rules` list of a Policy Creator result; empty when absent.
pub fn pcc_rules(policy: &Value) -> Vec<Value> {
    list_field(policy, "pcc_rules")
}

pub fn selected_modules(selection: &Value) -> Vec<Value> {
    list_field(selection, "selected_modules")
}

fn list_field(value: &Value, key: &str) -> Vec<Value> {
    value.get(key).and_then(Value::as_array).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use intentchain_core::config::StageConfig;
    use intentchain_core::domain::stage::StageKind;
    use intentchain_core::errors::StageError;
    use intentchain_core::usage::TokenUsage;
    use serde_json::json;

    use super::{pcc_rules, Configurator, IntentHandler, Selector, StageRunner};
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn stage_config() -> StageConfig {
        StageConfig { model: "gpt-4.1".to_string(), temperature: 0.0, timeout_secs: 30 }
    }

    fn ihf_reply() -> serde_json::Value {
        json!({
            "functional_requirements": "bidirectional connectivity for AR/VR traffic",
            "service_category": "AR",
            "application(s)": ["AR/VR"],
            "non_functional_requirements": {"uplink": {"pdb_ms": 50}, "downlink": {"pdb_ms": 50}},
            "constraints": [],
            "assumptions": [],
            "rationale": "explicit latency target",
            "confidence": 91
        })
    }

    #[tokio::test]
    async fn intent_handler_returns_parsed_object_with_usage() {
        let client = Arc::new(
            ScriptedLlmClient::new().with_reply_and_usage(
                format!("```json\n{}\n```", ihf_reply()),
                TokenUsage::new(900, 120, 1020),
            ),
        );
        let handler =
            IntentHandler::new(StageRunner::new(StageKind::Ihf, client.clone(), stage_config()));

        let output = handler.run("  guarantee 50ms latency for AR/VR traffic ").await;
        let output = match output {
            Ok(output) => output,
            Err(error) => panic!("stage failed: {error}"),
        };

        assert_eq!(output.result, ihf_reply());
        assert_eq!(output.usage.tokens, TokenUsage::new(900, 120, 1020));

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4.1");
        assert!(requests[0].system_prompt.contains("guarantee 50ms latency for AR/VR traffic\n"));
    }

    #[tokio::test]
    async fn non_json_reply_is_a_parse_failure() {
        let client = Arc::new(ScriptedLlmClient::new().with_reply("not json"));
        let handler = IntentHandler::new(StageRunner::new(StageKind::Ihf, client, stage_config()));

        let error = handler.run("anything").await.err();
        assert!(matches!(error, Some(StageError::Parse { stage: StageKind::Ihf, .. })));
    }

    #[tokio::test]
    async fn empty_reply_is_a_parse_failure() {
        let client = Arc::new(ScriptedLlmClient::new().with_reply("").with_reply("  \n"));
        let handler = IntentHandler::new(StageRunner::new(StageKind::Ihf, client, stage_config()));

        for _ in 0..2 {
            let error = handler.run("anything").await.err();
            assert_eq!(error.as_ref().map(StageError::error_class), Some("parse"));
        }
    }

    #[tokio::test]
    async fn configurator_clears_outer_header_objects() {
        let reply = json!({
            "pfcp_config": {
                "pdr_list": [{"pdr_id": "pdr-dl-1", "bound_module": "DLF", "far_id": "far-dl-1"}],
                "far_list": [
                    {"far_id": "far-dl-1", "bound_module": "DLF", "outer_header_creation": {"teid": "0x1", "ipv4": "10.0.0.1"}},
                    {"far_id": "far-dl-2", "bound_module": "DLF", "outer_header_creation": "GTP-U/UDP/IPv4"}
                ],
                "qer_list": [],
                "urr_list": []
            },
            "rationale": ["one FAR per downlink path"],
            "assumptions": [],
            "confidence": 77
        });
        let client = Arc::new(ScriptedLlmClient::new().with_json_reply(&reply));
        let configurator =
            Configurator::new(StageRunner::new(StageKind::Configurator, client, stage_config()));

        let output = match configurator.run(&[json!({"module": "DLF", "profile": "DLF_sw"})], &[]).await {
            Ok(output) => output,
            Err(error) => panic!("stage failed: {error}"),
        };

        let fars = &output.result["pfcp_config"]["far_list"];
        assert_eq!(fars[0]["outer_header_creation"], serde_json::Value::Null);
        assert_eq!(fars[0]["far_id"], "far-dl-1");
        assert_eq!(fars[1]["outer_header_creation"], "GTP-U/UDP/IPv4");
    }

    #[tokio::test]
    async fn transport_failure_is_reported_with_stage() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .with_failure(LlmError::Status { status: 401, body: "bad key".to_string() }),
        );
        let selector = Selector::new(StageRunner::new(StageKind::Selector, client, stage_config()));

        let error = selector.run(&[]).await.err();
        assert!(matches!(
            error,
            Some(StageError::Transport { stage: StageKind::Selector, ref message }) if message.contains("401")
        ));
    }

    #[tokio::test]
    async fn invalid_selection_is_a_schema_failure() {
        let reply = json!({
            "selected_modules": [{"module": "ISF", "profile": "ISF_fast"}],
            "rationale": ["ingress always needed"],
            "assumptions": [],
            "confidence": 80
        });
        let client = Arc::new(ScriptedLlmClient::new().with_json_reply(&reply));
        let selector = Selector::new(StageRunner::new(StageKind::Selector, client, stage_config()));

        let error = selector.run(&[json!({"rule_id": "r1"})]).await.err();
        assert!(matches!(error, Some(StageError::Schema { stage: StageKind::Selector, .. })));
    }

    #[test]
    fn pcc_rules_default_to_empty() {
        assert!(pcc_rules(&json!({"pcc_rules": "none"})).is_empty());
        assert_eq!(pcc_rules(&json!({"pcc_rules": [{"rule_id": "r1"}]})).len(), 1);
    }
}
