//! Human-readable output formatting

use bytesize::ByteSize;

use crate::output::formatter::Report;
use crate::sequencer::{RunReport, StepReport};

pub fn format_human(report: &Report) -> String {
    match report {
        Report::Name { name } => name.clone(),
        Report::Container(c) => {
            let ports: Vec<String> = c.exposed_ports.iter().map(|p| p.to_string()).collect();
            let mut output = format!(
                "Container {}\n\
                 ---------{}\n\
                 ID:          {}\n\
                 Image:       {}\n\
                 State:       {}\n\
                 Reservation: {}\n\
                 Ports:       {}\n\
                 Created:     {}",
                c.name,
                "-".repeat(c.name.len() + 1),
                c.id,
                c.image,
                c.state,
                c.reservation_id,
                if ports.is_empty() { "-".to_string() } else { ports.join(", ") },
                c.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(ref reason) = c.status_reason {
                output.push_str(&format!("\nReason:      {}", reason));
            }
            output
        }
        Report::Address(ip) => format!("{} ({}) -> {}", ip.address, ip.id, ip.container_id),
        Report::Command { command, result } => {
            let mut output = result.output.trim_end().to_string();
            if !result.success() {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&format!("`{}` exited with status {}", command, result.exit_status));
            }
            output
        }
        Report::Upload { remote, summary } => format!(
            "Uploaded {} files ({}) to {}",
            summary.files,
            ByteSize(summary.bytes),
            remote
        ),
        Report::Step(step) => format_step(step),
        Report::Run(run) => format_run(run),
        Report::Message { message } => message.clone(),
    }
}

pub fn format_step(step: &StepReport) -> String {
    format!("[{:>6} ms] {:<22} {}", step.elapsed_ms, step.step.to_string(), step.detail)
}

/// Summary printed after a run; the individual steps are streamed as they finish
fn format_run(run: &RunReport) -> String {
    let mut output = String::from("Run Summary\n-----------\n");
    output.push_str(&format!("Container: {}", run.container_name));
    if let Some(ref id) = run.container_id {
        output.push_str(&format!(" ({})", id));
    }
    output.push('\n');
    let total_ms: u64 = run.steps.iter().map(|s| s.elapsed_ms).sum();
    output.push_str(&format!("Steps:     {} in {:.1}s\n", run.steps.len(), total_ms as f64 / 1000.0));

    if let Some(ref inference) = run.inference {
        output.push_str(&format!(
            "\nPrediction: {} (score {:.6})\nInference:  {:.4}s\n",
            inference.label,
            inference.score,
            inference.elapsed.as_secs_f64()
        ));
    }
    if run.kept {
        if let Some(ref endpoint) = run.endpoint {
            output.push_str(&format!("\nResources kept. Connect with: {}\n", endpoint));
        } else {
            output.push_str("\nResources kept.\n");
        }
    }
    output.trim_end().to_string()
}
