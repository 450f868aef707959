use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use intentchain_core::config::AppConfig;
use intentchain_core::domain::intent::Intent;
use intentchain_core::domain::run::{BatchReport, GateVerdict, IntentOutcome, IntentRun, StageRecord};
use intentchain_core::domain::stage::StageKind;
use intentchain_core::errors::PipelineError;
use intentchain_core::usage::TokenUsage;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::guardrails::{ConfidenceGate, OperatorDecision};
use crate::llm::LlmClient;
use crate::stages::{pcc_rules, selected_modules, StageOutput, Stages};

pub const UPSTREAM_INCLUDES: &str = "IHF+PolicyCreator+Selector+Configurator+Executor";

/// Stand-in for the cloud orchestrator: every deployment plan is accepted.
pub fn orchestrator_apply(_deployment_plan: &Value) -> Value {
    json!({"status": "applied", "reason": null})
}

/// `intent=.. | time_s=.. | tokens_total=.. (prompt=.., completion=..) | includes=..`
pub fn upstream_metrics_line(run: &IntentRun) -> String {
    format!(
        "intent={} | time_s={:.3} | tokens_total={} (prompt={}, completion={}) | includes={}",
        run.intent.id,
        run.elapsed.as_secs_f64(),
        run.usage.total_tokens,
        run.usage.prompt_tokens,
        run.usage.completion_tokens,
        UPSTREAM_INCLUDES
    )
}

/// Progress hooks for whoever presents the run. Stage output is reported
/// before the confidence gate looks at it.
pub trait RunObserver {
    fn intent_started(&self, _intent: &Intent) {}
    fn stage_completed(&self, _intent: &Intent, _stage: StageKind, _output: &StageOutput) {}
    fn orchestrator_applied(&self, _intent: &Intent, _result: &Value) {}
    fn intent_finished(&self, _run: &IntentRun) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

#[derive(Default)]
struct IntentProgress {
    records: Vec<StageRecord>,
    usage: TokenUsage,
}

pub struct PipelineRuntime {
    stages: Stages,
    gate: ConfidenceGate,
    operator: Arc<dyn OperatorDecision>,
    stop_on_failure: bool,
}

impl PipelineRuntime {
    pub fn new(stages: Stages, gate: ConfidenceGate, operator: Arc<dyn OperatorDecision>) -> Self {
        Self { stages, gate, operator, stop_on_failure: false }
    }

    pub fn from_config(
        config: &AppConfig,
        client: Arc<dyn LlmClient>,
        operator: Arc<dyn OperatorDecision>,
    ) -> Self {
        Self::new(
            Stages::from_config(config, client),
            ConfidenceGate::new(config.pipeline.confidence_threshold),
            operator,
        )
        .with_stop_on_failure(config.pipeline.stop_on_failure)
    }

    pub fn with_stop_on_failure(mut self, stop_on_failure: bool) -> Self {
        self.stop_on_failure = stop_on_failure;
        self
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    /// Runs every intent in order. A failed or aborted intent does not stop
    /// the batch unless `stop_on_failure` is set.
    pub async fn run_batch(&self, intents: &[Intent], observer: &dyn RunObserver) -> BatchReport {
        let run_id = Uuid::new_v4();
        let mut report = BatchReport::new(run_id, Utc::now());
        info!(
            event_name = "pipeline.batch.started",
            run_id = %run_id,
            intents = intents.len(),
            threshold = self.gate.threshold,
            "batch started"
        );

        for (index, intent) in intents.iter().enumerate() {
            let span = info_span!("intent", run_id = %run_id, intent_id = %intent.id);
            let run = self.run_intent(intent, observer).instrument(span).await;
            let completed = run.outcome.is_completed();
            report.push(run);

            if !completed && self.stop_on_failure && index + 1 < intents.len() {
                warn!(
                    event_name = "pipeline.batch.stopped",
                    run_id = %run_id,
                    intent_id = %intent.id,
                    skipped = intents.len() - index - 1,
                    "stopping batch after failed intent"
                );
                report.stopped_early = true;
                break;
            }
        }

        info!(
            event_name = "pipeline.batch.finished",
            run_id = %run_id,
            completed = report.completed_count(),
            total = report.intents.len(),
            total_tokens = report.usage.total_tokens,
            "batch finished"
        );
        report
    }

    pub async fn run_intent(&self, intent: &Intent, observer: &dyn RunObserver) -> IntentRun {
        let started_at = Utc::now();
        let started = Instant::now();
        observer.intent_started(intent);
        info!(event_name = "pipeline.intent.started", intent_id = %intent.id, "intent started");

        let mut progress = IntentProgress::default();
        let (orchestrator_result, outcome) =
            match self.drive(intent, &mut progress, observer).await {
                Ok(result) => (Some(result), IntentOutcome::Completed),
                Err(error) => {
                    match &error {
                        PipelineError::ThresholdAbort { .. } => warn!(
                            event_name = "pipeline.intent.aborted",
                            intent_id = %intent.id,
                            stage = error.stage().as_str(),
                            error = %error,
                            "intent aborted by operator"
                        ),
                        PipelineError::Stage(_) => warn!(
                            event_name = "pipeline.intent.failed",
                            intent_id = %intent.id,
                            stage = error.stage().as_str(),
                            error_class = error.error_class(),
                            error = %error,
                            "intent failed"
                        ),
                    }
                    (None, IntentOutcome::from_error(&error))
                }
            };

        let run = IntentRun {
            intent: intent.clone(),
            started_at,
            stages: progress.records,
            orchestrator_result,
            usage: progress.usage,
            elapsed: started.elapsed(),
            outcome,
        };
        info!(
            event_name = "pipeline.intent.finished",
            intent_id = %intent.id,
            completed = run.outcome.is_completed(),
            elapsed_ms = run.elapsed.as_millis() as u64,
            total_tokens = run.usage.total_tokens,
            "intent finished"
        );
        observer.intent_finished(&run);
        run
    }

    async fn drive(
        &self,
        intent: &Intent,
        progress: &mut IntentProgress,
        observer: &dyn RunObserver,
    ) -> Result<Value, PipelineError> {
        let structured = self.stages.intent_handler.run(&intent.text).await?;
        self.checkpoint(intent, StageKind::Ihf, &structured, progress, observer)?;

        let policy = self.stages.policy_creator.run(&structured.result).await?;
        self.checkpoint(intent, StageKind::PolicyCreator, &policy, progress, observer)?;
        let rules = pcc_rules(&policy.result);

        let selection = self.stages.selector.run(&rules).await?;
        self.checkpoint(intent, StageKind::Selector, &selection, progress, observer)?;
        let modules = selected_modules(&selection.result);

        let configuration = self.stages.configurator.run(&modules, &rules).await?;
        self.checkpoint(intent, StageKind::Configurator, &configuration, progress, observer)?;

        let plan = self.stages.executor.run(&rules, &modules, &configuration.result).await?;
        self.checkpoint(intent, StageKind::Executor, &plan, progress, observer)?;

        let deployment_plan = plan.result.get("deployment_plan").cloned().unwrap_or_else(|| json!({}));
        let orchestrator_result = orchestrator_apply(&deployment_plan);
        observer.orchestrator_applied(intent, &orchestrator_result);
        Ok(orchestrator_result)
    }

    /// Reports the stage, records it and applies the confidence gate.
    fn checkpoint(
        &self,
        intent: &Intent,
        stage: StageKind,
        output: &StageOutput,
        progress: &mut IntentProgress,
        observer: &dyn RunObserver,
    ) -> Result<(), PipelineError> {
        progress.usage += output.usage.tokens;
        observer.stage_completed(intent, stage, output);

        let gate = self.gate.evaluate(stage, &output.result, self.operator.as_ref());
        let verdict = match &gate {
            Ok(verdict) => *verdict,
            Err(PipelineError::ThresholdAbort { confidence, .. }) => {
                GateVerdict::OperatorAborted { confidence: *confidence }
            }
            Err(_) => GateVerdict::OperatorAborted { confidence: 0.0 },
        };

        info!(
            event_name = "pipeline.stage.completed",
            intent_id = %intent.id,
            stage = stage.as_str(),
            confidence = verdict.confidence(),
            proceeds = verdict.proceeds(),
            elapsed_ms = output.usage.elapsed.as_millis() as u64,
            total_tokens = output.usage.tokens.total_tokens,
            "stage completed"
        );

        progress.records.push(StageRecord {
            stage,
            result: output.result.clone(),
            usage: output.usage,
            gate: verdict,
        });
        gate.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use intentchain_core::domain::intent::Intent;
    use intentchain_core::domain::run::{IntentOutcome, IntentRun};
    use intentchain_core::usage::TokenUsage;
    use serde_json::json;

    use super::{orchestrator_apply, upstream_metrics_line};

    #[test]
    fn orchestrator_accepts_every_plan() {
        let result = orchestrator_apply(&json!({"chain": []}));
        assert_eq!(result, json!({"status": "applied", "reason": null}));
    }

    #[test]
    fn upstream_metrics_line_lists_included_stages() {
        let run = IntentRun {
            intent: Intent::new("intent_2", "text"),
            started_at: Utc::now(),
            stages: Vec::new(),
            orchestrator_result: None,
            usage: TokenUsage::new(1200, 300, 0),
            elapsed: Duration::from_millis(4250),
            outcome: IntentOutcome::Completed,
        };

        assert_eq!(
            upstream_metrics_line(&run),
            "intent=intent_2 | time_s=4.250 | tokens_total=1500 (prompt=1200, completion=300) | includes=IHF+PolicyCreator+Selector+Configurator+Executor"
        );
    }
}
