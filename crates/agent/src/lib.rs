//! Agent runtime: the model-backed stages of the intent-to-deployment chain.
//!
//! An operator intent goes through five stages, each one prompt and one
//! model call:
//! 1. **IHF** (`stages::IntentHandler`) - free text -> structured intent
//! 2. **Policy Creator** - structured intent -> PCC rules
//! 3. **Selector** - PCC rules -> UPF modules and profiles
//! 4. **Configurator** - modules + rules -> PFCP-like PDR/FAR/QER/URR
//! 5. **Executor** - everything above -> deployment plan
//!
//! The Monitor stage judges an applied deployment against observed state and
//! is driven separately (`monitor_eval`).
//!
//! # Key Types
//!
//! - `LlmClient` - pluggable model transport (`providers` for HTTP,
//!   `ScriptedLlmClient` for tests)
//! - `PipelineRuntime` - runs intents through the stages (see `runtime`)
//! - `ConfidenceGate` / `OperatorDecision` - low-confidence handling
//!
//! # Safety Principle
//!
//! Model replies are never trusted blindly: every reply is parsed and
//! structurally validated (`schema`) before the next stage sees it, and a
//! low-confidence reply only proceeds with an explicit operator decision.

pub mod guardrails;
pub mod llm;
pub mod monitor_eval;
pub mod prompts;
pub mod providers;
pub mod runtime;
pub mod schema;
pub mod stages;

pub use guardrails::{
    AlwaysAbort, AlwaysContinue, ConfidenceGate, Decision, LowConfidenceReview, OperatorDecision,
    ScriptedDecisions,
};
pub use llm::{Completion, CompletionRequest, LlmClient, LlmError, ScriptedLlmClient};
pub use runtime::{PipelineRuntime, RunObserver, SilentObserver};
pub use stages::{StageOutput, Stages};
