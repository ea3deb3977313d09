//! Report formatting for JSON, YAML and human-readable text

use anyhow::{Context, Result};

use crate::identity::{CleanupReport, CleanupResult};
use crate::workflow::{RunFailure, RunReport, StepOutcome, StepStatus};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize run report to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize run report to YAML")
            }
            OutputFormat::Human => Ok(self.format_report_human(report, None)),
        }
    }

    /// Formats a run that stopped on a fatal error
    pub fn format_failure(&self, failure: &RunFailure) -> Result<String> {
        let output = serde_json::json!({
            "error": failure.error.to_string(),
            "report": failure.report,
        });
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&output)
                .context("Failed to serialize run failure to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(&output).context("Failed to serialize run failure to YAML")
            }
            OutputFormat::Human => Ok(self.format_report_human(
                &failure.report,
                Some(&failure.error.to_string()),
            )),
        }
    }

    pub fn format_cleanup(&self, report: &CleanupReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize cleanup report to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize cleanup report to YAML")
            }
            OutputFormat::Human => {
                let mut output = String::from("Cleanup:\n");
                push_cleanup_lines(&mut output, report);
                Ok(output)
            }
        }
    }

    fn format_report_human(&self, report: &RunReport, fatal: Option<&str>) -> String {
        let mut output = String::new();

        match fatal {
            Some(_) => output.push_str("\u{2717} Bootstrap Aborted\n"),
            None if report.failures().next().is_some() => {
                output.push_str("\u{26A0} Bootstrap Completed With Failures\n")
            }
            None => output.push_str("\u{2713} Bootstrap Completed\n"),
        }
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Run:     {}\n", report.run_id));
        if let Some(ref caller) = report.caller {
            output.push_str(&format!("Caller:  {}\n", caller.arn));
        }
        output.push('\n');

        output.push_str("Steps:\n");
        for (i, step) in report.steps.iter().enumerate() {
            let connector = if i + 1 == report.steps.len() {
                "\u{2514}"
            } else {
                "\u{251C}"
            };
            output.push_str(&format!("{}\u{2500} {}\n", connector, step_line(step)));
        }
        output.push('\n');

        output.push_str("Resources:\n");
        match report.bucket {
            Some(ref bucket) => output.push_str(&format!(
                "\u{251C}\u{2500} Bucket:    {} ({}{})\n",
                bucket.name,
                bucket.region,
                if bucket.already_owned { ", already owned" } else { "" }
            )),
            None => output.push_str("\u{251C}\u{2500} Bucket:    (not created)\n"),
        }
        match report.artifact {
            Some(ref artifact) => output.push_str(&format!(
                "\u{251C}\u{2500} Image:     {} ({} build lines)\n",
                artifact.tag, artifact.log_lines
            )),
            None => output.push_str("\u{251C}\u{2500} Image:     (not built)\n"),
        }
        match report.published {
            Some(ref image) => output.push_str(&format!(
                "\u{2514}\u{2500} Published: {}:{} [{} platforms] {}\n",
                image.repository,
                image.tag,
                image.platforms,
                image.digest.as_deref().unwrap_or("")
            )),
            None => output.push_str("\u{2514}\u{2500} Published: (nothing)\n"),
        }

        if let Some(ref cleanup) = report.cleanup {
            output.push_str("\nCleanup:\n");
            push_cleanup_lines(&mut output, cleanup);
        }

        if let Some(error) = fatal {
            output.push_str(&format!("\n\u{2717} {}\n", error));
        }

        if let Some(finished) = report.finished_at {
            let elapsed = finished - report.started_at;
            output.push_str(&format!("\nFinished in {}ms\n", elapsed.num_milliseconds()));
        }

        output
    }
}

fn step_line(step: &StepOutcome) -> String {
    let index = step.record.index();
    match step.status {
        StepStatus::Succeeded => format!("\u{2713} {}. {}", index, step.title),
        StepStatus::Failed { ref error, fatal } => format!(
            "\u{2717} {}. {}: {}{}",
            index,
            step.title,
            error,
            if fatal { " (fatal)" } else { "" }
        ),
        StepStatus::Skipped { ref reason } => {
            format!("- {}. {} (skipped: {})", index, step.title, reason)
        }
    }
}

fn push_cleanup_lines(output: &mut String, report: &CleanupReport) {
    for (i, (action, result)) in report.actions.iter().enumerate() {
        let connector = if i + 1 == report.actions.len() {
            "\u{2514}"
        } else {
            "\u{251C}"
        };
        let result = match result {
            CleanupResult::Removed => "removed".to_string(),
            CleanupResult::Absent => "absent".to_string(),
            CleanupResult::Failed(e) => format!("failed: {}", e),
        };
        output.push_str(&format!("{}\u{2500} {}: {}\n", connector, action, result));
    }
}
