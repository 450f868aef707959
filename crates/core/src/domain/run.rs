use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::intent::Intent;
use crate::domain::stage::StageKind;
use crate::errors::PipelineError;
use crate::usage::{serialize_secs, TokenUsage, UsageMetrics};

/// What the confidence gate made of a stage result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    Passed { confidence: f64 },
    OperatorContinued { confidence: f64 },
    OperatorAborted { confidence: f64 },
}

impl GateVerdict {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Passed { confidence }
            | Self::OperatorContinued { confidence }
            | Self::OperatorAborted { confidence } => *confidence,
        }
    }

    pub fn proceeds(&self) -> bool {
        !matches!(self, Self::OperatorAborted { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub result: Value,
    pub usage: UsageMetrics,
    pub gate: GateVerdict,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntentOutcome {
    Completed,
    Failed { stage: StageKind, error_class: String, message: String },
    Aborted { stage: StageKind, confidence: f64, threshold: f64 },
}

impl IntentOutcome {
    pub fn from_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::ThresholdAbort { stage, confidence, threshold } => {
                Self::Aborted { stage: *stage, confidence: *confidence, threshold: *threshold }
            }
            PipelineError::Stage(stage_error) => Self::Failed {
                stage: stage_error.stage(),
                error_class: stage_error.error_class().to_string(),
                message: stage_error.to_string(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Everything recorded while one intent went through the upstream stages.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntentRun {
    pub intent: Intent,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
    pub orchestrator_result: Option<Value>,
    pub usage: TokenUsage,
    #[serde(rename = "time_s", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub outcome: IntentOutcome,
}

impl IntentRun {
    pub fn stage(&self, kind: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.stage == kind)
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|record| record.stage).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub intents: Vec<IntentRun>,
    pub usage: TokenUsage,
    pub stopped_early: bool,
}

impl BatchReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            intents: Vec::new(),
            usage: TokenUsage::default(),
            stopped_early: false,
        }
    }

    pub fn push(&mut self, run: IntentRun) {
        self.usage += run.usage;
        self.intents.push(run);
    }

    pub fn completed_count(&self) -> usize {
        self.intents.iter().filter(|run| run.outcome.is_completed()).count()
    }

    pub fn all_completed(&self) -> bool {
        !self.stopped_early && self.intents.iter().all(|run| run.outcome.is_completed())
    }
}
