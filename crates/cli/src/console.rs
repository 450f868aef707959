//! Human-readable run output and the interactive low-confidence prompt.

use std::cell::RefCell;
use std::io::{self, BufRead, BufReader, Stdin, Write};
use std::sync::Mutex;

use intentchain_agent::guardrails::{Decision, LowConfidenceReview, OperatorDecision};
use intentchain_agent::monitor_eval::{MonitorCase, MonitorCaseRun, MonitorObserver, MonitorSummary};
use intentchain_agent::runtime::{upstream_metrics_line, RunObserver};
use intentchain_agent::stages::StageOutput;
use intentchain_core::domain::intent::Intent;
use intentchain_core::domain::run::{IntentOutcome, IntentRun};
use intentchain_core::domain::stage::StageKind;
use serde_json::{json, Value};

const BANNER_WIDTH: usize = 90;

/// Writes the per-intent report as stages complete. Write errors are
/// ignored: a closed stdout must not fail the pipeline.
pub struct ConsoleReporter<W: Write> {
    out: RefCell<W>,
    current_policy: RefCell<Option<String>>,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out: RefCell::new(out), current_policy: RefCell::new(None) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    pub fn banner(&self, text: &str) {
        let rule = "=".repeat(BANNER_WIDTH);
        self.emit(&format!("\n{rule}\n{text}\n{rule}\n"));
    }

    pub fn monitor_summary(&self, summary: &MonitorSummary) {
        self.banner("SUMMARY");
        self.emit(&summary.summary_line());
    }

    fn section(&self, title: &str, value: &Value) {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        self.emit(&format!("\n[{title}]\n{body}"));
    }

    fn emit(&self, text: &str) {
        if let Ok(mut out) = self.out.try_borrow_mut() {
            let _ = writeln!(out, "{text}");
            let _ = out.flush();
        }
    }
}

impl<W: Write> RunObserver for ConsoleReporter<W> {
    fn intent_started(&self, intent: &Intent) {
        self.banner(&format!("INTENT: {}", intent.id));
        self.emit(&format!("\n[OPERATOR INTENT]\n{}", intent.text));
    }

    fn stage_completed(&self, _intent: &Intent, stage: StageKind, output: &StageOutput) {
        self.section(&stage.output_title(), &output.result);
        self.emit(&format!("\n[METRICS] stage={} | {}", stage.as_str(), output.usage.summary_line()));
    }

    fn orchestrator_applied(&self, _intent: &Intent, result: &Value) {
        self.section("ORCHESTRATOR RESULT (default)", result);
    }

    fn intent_finished(&self, run: &IntentRun) {
        match &run.outcome {
            IntentOutcome::Completed => {}
            IntentOutcome::Failed { stage, error_class, message } => {
                self.emit(&format!("\n[INTENT FAILED] {stage} ({error_class}): {message}"));
            }
            IntentOutcome::Aborted { stage, confidence, threshold } => {
                self.emit(&format!(
                    "\n[INTENT ABORTED] Stopped by operator due to low confidence in {stage} \
                     ({confidence:.1} < {threshold:.1})"
                ));
            }
        }
        self.emit(&format!("\n[UPSTREAM METRICS] {}", upstream_metrics_line(run)));
    }
}

impl<W: Write> MonitorObserver for ConsoleReporter<W> {
    fn case_started(&self, case: &MonitorCase) {
        let is_new_policy = self.current_policy.borrow().as_deref() != Some(case.policy_id.as_str());
        if !is_new_policy {
            return;
        }

        self.banner(&format!("POLICY: {}", case.policy_id));
        self.emit(&format!(
            "\n[OPERATOR INTENT]\n{}",
            case.intent.as_deref().unwrap_or("(missing intent text)")
        ));
        self.section("GROUND TRUTH PCC POLICY", &json!({"pcc_rules": &case.pcc_rules}));
        *self.current_policy.borrow_mut() = Some(case.policy_id.clone());
    }

    fn case_finished(&self, run: &MonitorCaseRun) {
        let suffix = run.case.case.as_deref().map(|case| format!(" ({case})")).unwrap_or_default();
        self.section(&format!("OBSERVED STATE{suffix}"), &run.case.observed_state);
        match &run.outcome {
            Ok(output) => self.section(&format!("MONITOR OUTPUT{suffix}"), &output.result),
            Err(error) => self.emit(&format!("\n[MONITOR FAILED{suffix}] {error}")),
        }
        self.emit(&format!("\n[MONITOR METRICS] {}", run.metrics_line()));
    }
}

/// Asks the operator on a terminal whether to keep a low-confidence result.
/// Only `y` continues; anything else, including end of input, aborts.
pub struct PromptDecision<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl PromptDecision<BufReader<Stdin>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R, W> PromptDecision<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input: Mutex::new(input), output: Mutex::new(output) }
    }
}

impl<R: BufRead + Send, W: Write + Send> PromptDecision<R, W> {
    fn ask(&self, review: &LowConfidenceReview) -> Option<String> {
        {
            let mut out = self.output.lock().ok()?;
            let _ = writeln!(
                out,
                "\nWARNING: Low confidence from {}: {:.1}",
                review.stage, review.confidence
            );
            if !review.assumptions.is_empty() {
                let _ = writeln!(out, "Assumptions:");
                for assumption in &review.assumptions {
                    let _ = writeln!(out, " - {assumption}");
                }
            }
            let _ = write!(out, "Continue anyway? (y/n): ");
            let _ = out.flush();
        }

        let mut answer = String::new();
        let read = self.input.lock().ok()?.read_line(&mut answer).ok()?;
        (read > 0).then_some(answer)
    }
}

impl<R: BufRead + Send, W: Write + Send> OperatorDecision for PromptDecision<R, W> {
    fn decide(&self, review: &LowConfidenceReview) -> Decision {
        match self.ask(review) {
            Some(answer) => parse_answer(&answer),
            None => Decision::Abort,
        }
    }
}

pub fn parse_answer(answer: &str) -> Decision {
    if answer.trim().eq_ignore_ascii_case("y") {
        Decision::Continue
    } else {
        Decision::Abort
    }
}
