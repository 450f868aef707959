use std::collections::VecDeque;
use std::sync::Mutex;

use intentchain_core::domain::confidence::{assumptions, normalized_confidence};
use intentchain_core::domain::run::GateVerdict;
use intentchain_core::domain::stage::StageKind;
use intentchain_core::errors::PipelineError;
use serde_json::Value;

/// What the operator is shown when a stage reports low confidence.
#[derive(Clone, Debug, PartialEq)]
pub struct LowConfidenceReview {
    pub stage: StageKind,
    pub confidence: f64,
    pub threshold: f64,
    pub assumptions: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

pub trait OperatorDecision: Send + Sync {
    fn decide(&self, review: &LowConfidenceReview) -> Decision;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysContinue;

impl OperatorDecision for AlwaysContinue {
    fn decide(&self, _review: &LowConfidenceReview) -> Decision {
        Decision::Continue
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysAbort;

impl OperatorDecision for AlwaysAbort {
    fn decide(&self, _review: &LowConfidenceReview) -> Decision {
        Decision::Abort
    }
}

/// Answers from a queue and remembers every review it was asked about.
/// An exhausted queue aborts.
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    answers: Mutex<VecDeque<Decision>>,
    reviews: Mutex<Vec<LowConfidenceReview>>,
}

impl ScriptedDecisions {
    pub fn new(answers: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            reviews: Mutex::new(Vec::new()),
        }
    }

    pub fn reviews(&self) -> Vec<LowConfidenceReview> {
        self.reviews.lock().map(|reviews| reviews.clone()).unwrap_or_default()
    }
}

impl OperatorDecision for ScriptedDecisions {
    fn decide(&self, review: &LowConfidenceReview) -> Decision {
        if let Ok(mut reviews) = self.reviews.lock() {
            reviews.push(review.clone());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(Decision::Abort)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceGate {
    pub threshold: f64,
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Passes results at or above the threshold. Anything lower goes to the
    /// operator, and only an explicit `Continue` lets it through.
    pub fn evaluate(
        &self,
        stage: StageKind,
        result: &Value,
        operator: &dyn OperatorDecision,
    ) -> Result<GateVerdict, PipelineError> {
        let confidence = normalized_confidence(result);
        if confidence >= self.threshold {
            return Ok(GateVerdict::Passed { confidence });
        }

        let review = LowConfidenceReview {
            stage,
            confidence,
            threshold: self.threshold,
            assumptions: assumptions(result),
        };
        match operator.decide(&review) {
            Decision::Continue => Ok(GateVerdict::OperatorContinued { confidence }),
            Decision::Abort => Err(PipelineError::ThresholdAbort {
                stage,
                confidence,
                threshold: self.threshold,
            }),
        }
    }
}
