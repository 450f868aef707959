use std::path::Path;
use std::sync::Arc;

use intentchain_agent::llm::LlmClient;
use intentchain_agent::monitor_eval::{evaluate_cases, load_cases, MonitorCase};
use intentchain_agent::providers::build_client;
use intentchain_agent::stages::Stages;
use intentchain_core::config::{AppConfig, ConfigOverrides};
use tracing::info;

use crate::commands::{
    current_thread_runtime, load_config, CommandResult, EXIT_CONFIG, EXIT_INCOMPLETE, EXIT_OK,
    EXIT_RUNTIME,
};
use crate::console::ConsoleReporter;
use crate::logging::init_logging;

const COMMAND: &str = "monitor";

pub fn run(cases_path: &Path, config_path: Option<&Path>) -> CommandResult {
    let config = match load_config(config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::config_failure(COMMAND, &error),
    };
    init_logging(&config.logging);

    let cases = match load_cases(cases_path) {
        Ok(cases) => cases,
        Err(error) => {
            return CommandResult::failure(COMMAND, "monitor_cases", error.to_string(), EXIT_CONFIG)
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

    info!(
        event_name = "cli.monitor.configured",
        cases = cases.len(),
        path = %cases_path.display(),
        "evaluating monitor cases"
    );
    let reporter = ConsoleReporter::stdout();
    let failed = runtime.block_on(execute(&config, client, cases, &reporter));
    exit_for_failures(failed)
}

/// Evaluates every case and prints the summary banner. Returns the number of
/// failed cases.
pub async fn execute<W: std::io::Write>(
    config: &AppConfig,
    client: Arc<dyn LlmClient>,
    cases: Vec<MonitorCase>,
    reporter: &ConsoleReporter<W>,
) -> usize {
    let stages = Stages::from_config(config, client);
    let evaluation = evaluate_cases(&stages.monitor, cases, reporter).await;
    reporter.monitor_summary(&evaluation.summary);
    evaluation.summary.failed
}

fn exit_for_failures(failed: usize) -> CommandResult {
    let exit_code = if failed == 0 { EXIT_OK } else { EXIT_INCOMPLETE };
    CommandResult::new(exit_code, String::new())
}
