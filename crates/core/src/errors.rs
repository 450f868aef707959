use thiserror::Error;

use crate::domain::stage::StageKind;

/// A stage reply parsed as JSON but does not have the shape the next stage
/// relies on.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SchemaError {
    pub message: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("{stage} model call failed: {message}")]
    Transport { stage: StageKind, message: String },
    #[error("{stage} did not return a JSON object: {message}")]
    Parse { stage: StageKind, message: String },
    #[error("{stage} output failed validation: {source}")]
    Schema {
        stage: StageKind,
        #[source]
        source: SchemaError,
    },
}

impl StageError {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Transport { stage, .. } | Self::Parse { stage, .. } | Self::Schema { stage, .. } => {
                *stage
            }
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Parse { .. } => "parse",
            Self::Schema { .. } => "schema",
        }
    }
}

/// Everything that ends a single intent's run.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("stopped by operator due to low confidence in {stage}: {confidence:.1} < {threshold:.1}")]
    ThresholdAbort { stage: StageKind, confidence: f64, threshold: f64 },
}

impl PipelineError {
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Stage(error) => error.stage(),
            Self::ThresholdAbort { stage, .. } => *stage,
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Stage(error) => error.error_class(),
            Self::ThresholdAbort { .. } => "threshold_abort",
        }
    }
}
