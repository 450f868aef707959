pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod usage;

pub use config::{AppConfig, ConfigError, LlmProvider, LoadOptions, StageConfig};
pub use domain::intent::{builtin_intents, Intent};
pub use domain::run::{BatchReport, GateVerdict, IntentOutcome, IntentRun, StageRecord};
pub use domain::stage::StageKind;
pub use errors::{PipelineError, SchemaError, StageError};
pub use extract::{extract_json_object, ExtractError};
pub use usage::{extract_usage, TokenUsage, UsageMetrics};
