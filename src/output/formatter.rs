//! Output formatting

use serde::Serialize;

use crate::container::{CommandOutput, Container, FloatingIp, UploadSummary};
use crate::output::human::format_human;
use crate::output::json::format_json;
use crate::sequencer::{RunReport, StepReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Anything a subcommand prints on stdout
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    Name { name: String },
    Container(Container),
    Address(FloatingIp),
    Command { command: String, result: CommandOutput },
    Upload { remote: String, summary: UploadSummary },
    Step(StepReport),
    Run(RunReport),
    Message { message: String },
}

pub fn format_output(report: &Report, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(report),
        OutputFormat::Json => format_json(report),
    }
}
