#[cfg(feature = "colored-output")]
use colored::*;
use reface::{RunOutcome, RunReport, StatusEvent, StatusSink};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

/// Writes each status event as one JSON line on stdout.
pub struct JsonLinesStatusSink;

impl StatusSink for JsonLinesStatusSink {
    fn emit(&self, event: &StatusEvent) {
        if let Ok(line) = serde_json::to_string(&JsonLine::Status(event)) {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
            let _ = stdout.flush();
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonLine<'a> {
    Status(&'a StatusEvent),
    Result(RunSummary<'a>),
}

#[derive(Serialize)]
struct RunSummary<'a> {
    outcome: &'static str,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a Path>,
    elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<String>,
}

impl<'a> RunSummary<'a> {
    fn new(report: &'a RunReport) -> Self {
        Self {
            outcome: outcome_name(&report.outcome),
            state: report.state.to_string(),
            output: report.output_path.as_deref(),
            elapsed_secs: report.elapsed.as_secs_f64(),
            error: report.error().map(|e| e.to_string()),
            error_kind: report.error().map(|e| e.kind().to_string()),
        }
    }
}

fn outcome_name(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Succeeded => "succeeded",
        RunOutcome::PolicyRejected => "policy_rejected",
        RunOutcome::Failed(_) => "failed",
    }
}

/// Exit status for a finished run: 0 succeeded, 2 rejected, 1 failed.
pub fn exit_code(report: &RunReport) -> ExitCode {
    match report.outcome {
        RunOutcome::Succeeded => ExitCode::SUCCESS,
        RunOutcome::PolicyRejected => ExitCode::from(2),
        RunOutcome::Failed(_) => ExitCode::from(1),
    }
}

/// Print the final result, as a JSON line or a human-readable line.
pub fn print_report(report: &RunReport, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(&JsonLine::Result(RunSummary::new(report))) {
            println!("{line}");
        }
        return;
    }

    let elapsed = format!("{:.1}s", report.elapsed.as_secs_f64());
    match &report.outcome {
        RunOutcome::Succeeded => {
            let output = report
                .output_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("{} {} ({})", label("Done:", Tone::Good), output, elapsed);
        }
        RunOutcome::PolicyRejected => {
            println!(
                "{} target rejected by the content filter",
                label("Skipped:", Tone::Warn)
            );
        }
        RunOutcome::Failed(e) => {
            eprintln!("{} {} ({})", label("Failed:", Tone::Bad), e, elapsed);
        }
    }
}

/// Print processor identifiers, one per line.
pub fn print_processors(names: &[String], json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(names) {
            println!("{line}");
        }
        return;
    }
    for name in names {
        println!("{name}");
    }
}

#[derive(Clone, Copy)]
pub enum Tone {
    Good,
    Warn,
    Bad,
}

#[cfg(feature = "colored-output")]
pub fn label(text: &str, tone: Tone) -> String {
    match tone {
        Tone::Good => text.green().bold().to_string(),
        Tone::Warn => text.yellow().bold().to_string(),
        Tone::Bad => text.red().bold().to_string(),
    }
}

#[cfg(not(feature = "colored-output"))]
pub fn label(text: &str, _tone: Tone) -> String {
    text.to_string()
}
