use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, ValueEnum};
use intentchain_agent::guardrails::{AlwaysAbort, AlwaysContinue, OperatorDecision};
use intentchain_agent::llm::LlmClient;
use intentchain_agent::providers::build_client;
use intentchain_agent::runtime::{PipelineRuntime, RunObserver, SilentObserver};
use intentchain_core::config::{AppConfig, ConfigOverrides};
use intentchain_core::domain::intent::{builtin_intents, Intent};
use intentchain_core::domain::run::BatchReport;
use tracing::info;

use crate::commands::{
    current_thread_runtime, load_config, CommandResult, EXIT_CONFIG, EXIT_INCOMPLETE, EXIT_OK,
    EXIT_RUNTIME,
};
use crate::console::{ConsoleReporter, PromptDecision};
use crate::logging::init_logging;

const COMMAND: &str = "run";

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[arg(long, value_name = "FILE", help = "JSON list of {id, text} intents instead of the built-in set")]
    pub intents: Option<PathBuf>,
    #[arg(long, value_name = "ID", help = "Run only this intent id (repeatable)")]
    pub only: Vec<String>,
    #[arg(long, help = "Print the batch report as JSON instead of the stage-by-stage report")]
    pub json: bool,
    #[arg(
        long,
        value_enum,
        value_name = "ANSWER",
        help = "Answer low-confidence prompts without asking"
    )]
    pub non_interactive: Option<NonInteractive>,
    #[arg(long, help = "Stop the batch at the first failed or aborted intent")]
    pub fail_fast: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum NonInteractive {
    Continue,
    Abort,
}

impl NonInteractive {
    fn operator(self) -> Arc<dyn OperatorDecision> {
        match self {
            Self::Continue => Arc::new(AlwaysContinue),
            Self::Abort => Arc::new(AlwaysAbort),
        }
    }
}

pub fn run(args: &RunArgs, config_path: Option<&Path>) -> CommandResult {
    let overrides = ConfigOverrides {
        stop_on_failure: args.fail_fast.then_some(true),
        ..ConfigOverrides::default()
    };
    // Credential problems surface here, before any client exists.
    let config = match load_config(config_path, overrides) {
        Ok(config) => config,
        Err(error) => return CommandResult::config_failure(COMMAND, &error),
    };
    init_logging(&config.logging);

    let intents = match select_intents(args) {
        Ok(intents) => intents,
        Err(error) => {
            return CommandResult::failure(COMMAND, "intents_input", format!("{error:#}"), EXIT_CONFIG)
        }
    };

    let client = match build_client(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(COMMAND, "llm_client", error.to_string(), EXIT_RUNTIME)
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        }
    };

    let operator: Arc<dyn OperatorDecision> = match args.non_interactive {
        Some(answer) => answer.operator(),
        None => Arc::new(PromptDecision::stdio()),
    };
    info!(
        event_name = "cli.run.configured",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        intents = intents.len(),
        interactive = args.non_interactive.is_none(),
        "running intents"
    );
    let observer: Box<dyn RunObserver> =
        if args.json { Box::new(SilentObserver) } else { Box::new(ConsoleReporter::stdout()) };

    runtime.block_on(execute(&config, client, operator, &intents, args.json, observer.as_ref()))
}

/// Runs the batch and turns the report into the command result: exit 0 only
/// when every intent completed.
pub async fn execute(
    config: &AppConfig,
    client: Arc<dyn LlmClient>,
    operator: Arc<dyn OperatorDecision>,
    intents: &[Intent],
    json_output: bool,
    observer: &dyn RunObserver,
) -> CommandResult {
    let pipeline = PipelineRuntime::from_config(config, client, operator);
    let report = pipeline.run_batch(intents, observer).await;

    let exit_code = if report.all_completed() { EXIT_OK } else { EXIT_INCOMPLETE };
    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            CommandResult::failure(COMMAND, "serialization", error.to_string(), EXIT_RUNTIME).output
        })
    } else {
        summary_line(&report)
    };
    CommandResult::new(exit_code, output)
}

pub fn select_intents(args: &RunArgs) -> Result<Vec<Intent>> {
    let intents = match &args.intents {
        Some(path) => load_intents(path)?,
        None => builtin_intents(),
    };
    if args.only.is_empty() {
        return Ok(intents);
    }

    for id in &args.only {
        if !intents.iter().any(|intent| &intent.id == id) {
            bail!("unknown intent id `{id}`");
        }
    }
    Ok(intents.into_iter().filter(|intent| args.only.contains(&intent.id)).collect())
}

pub fn load_intents(path: &Path) -> Result<Vec<Intent>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read intents file `{}`", path.display()))?;
    let intents: Vec<Intent> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse intents file `{}`", path.display()))?;

    ensure!(!intents.is_empty(), "intents file `{}` contains no intents", path.display());
    for intent in &intents {
        ensure!(!intent.id.trim().is_empty(), "intent ids must not be blank");
        ensure!(!intent.text.trim().is_empty(), "intent `{}` has no text", intent.id);
    }
    Ok(intents)
}

fn summary_line(report: &BatchReport) -> String {
    let mut line = format!(
        "\nrun {}: completed {}/{} intents | tokens_total={} (prompt={}, completion={})",
        report.run_id,
        report.completed_count(),
        report.intents.len(),
        report.usage.total_tokens,
        report.usage.prompt_tokens,
        report.usage.completion_tokens
    );
    if report.stopped_early {
        line.push_str(" | stopped early");
    }
    line
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{load_intents, select_intents, RunArgs};

    #[test]
    fn only_filters_builtin_intents() -> Result<(), String> {
        let args = RunArgs { only: vec!["intent_6".to_string()], ..RunArgs::default() };
        let intents = select_intents(&args).map_err(|err| err.to_string())?;

        assert_eq!(intents.len(), 1);
        assert!(intents[0].text.contains("lawful intercept"));
        Ok(())
    }

    #[test]
    fn unknown_only_id_is_rejected() {
        let args = RunArgs { only: vec!["intent_42".to_string()], ..RunArgs::default() };
        let error = select_intents(&args).err().map(|err| err.to_string()).unwrap_or_default();
        assert_eq!(error, "unknown intent id `intent_42`");
    }

    #[test]
    fn intents_file_must_not_be_empty() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err| err.to_string())?;
        let path = dir.path().join("intents.json");

        fs::write(&path, r#"[{"id": "ar", "text": "guarantee 50ms latency for AR/VR traffic"}]"#)
            .map_err(|err| err.to_string())?;
        let intents = load_intents(&path).map_err(|err| err.to_string())?;
        assert_eq!(intents[0].id, "ar");

        fs::write(&path, "[]").map_err(|err| err.to_string())?;
        assert!(load_intents(&path).is_err());

        fs::write(&path, r#"[{"id": "blank", "text": "  "}]"#).map_err(|err| err.to_string())?;
        assert!(load_intents(&path).is_err());
        Ok(())
    }
}
