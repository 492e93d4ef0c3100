//! Member-wide commands

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;

use clusternet_apply::BatchReport;

use crate::cli::OutputFormat;
use crate::commands::render;
use crate::context::CliContext;

#[derive(Serialize)]
struct BatchOutput<'a> {
    action: &'a str,
    succeeded: &'a [String],
    failed: &'a [String],
}

pub struct ClusterCommand {
    context: Arc<CliContext>,
    format: OutputFormat,
}

impl ClusterCommand {
    pub fn new(context: Arc<CliContext>, format: OutputFormat) -> Self {
        Self { context, format }
    }

    /// Start every network created on this member.
    pub async fn startup(&self) -> Result<String> {
        let report = self.context.orchestrator.start_all().await?;
        self.report("started", &report)
    }

    /// Stop every network created on this member, uplink users first.
    pub async fn shutdown(&self) -> Result<String> {
        let report = self.context.orchestrator.stop_all().await?;
        self.report("stopped", &report)
    }

    fn report(&self, action: &str, report: &BatchReport) -> Result<String> {
        let output = BatchOutput {
            action,
            succeeded: &report.succeeded,
            failed: &report.failed,
        };
        let rendered = render(self.format, &output, |output| {
            let mut out = format!("{} network(s) {}", output.succeeded.len(), output.action);
            for failure in output.failed {
                out.push_str(&format!("\nfailed: {}", failure));
            }
            out
        })?;

        if !report.failed.is_empty() {
            bail!(
                "{} network(s) could not be {}\n{}",
                report.failed.len(),
                action,
                rendered
            );
        }
        Ok(rendered)
    }

    pub async fn warnings(&self) -> Result<String> {
        let warnings = self.context.orchestrator.warnings().await?;
        render(self.format, &warnings, |warnings| {
            if warnings.is_empty() {
                return "No warnings".to_string();
            }
            let mut out = String::new();
            for warning in warnings {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!(
                    "[{:?}] {} {} ({}): {} (seen {} time(s))",
                    warning.status,
                    warning.node,
                    warning.warning_type,
                    warning.project,
                    warning.last_message,
                    warning.count
                ));
            }
            out
        })
    }
}
