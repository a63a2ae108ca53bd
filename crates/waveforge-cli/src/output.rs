// Output formatting for the CLI.

use serde::Serialize;
use waveforge_exec::OverallStatus;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json)
    }

    pub fn print_value<T: Serialize>(&self, value: &T) {
        println!("{}", serde_json::to_string_pretty(value).expect("value is always serializable"));
    }
}

pub fn status_str(status: OverallStatus) -> &'static str {
    match status {
        OverallStatus::Pending => "PENDING",
        OverallStatus::Succeeded => "SUCCEEDED",
        OverallStatus::Failed => "FAILED",
        OverallStatus::Cancelled => "CANCELLED",
    }
}

/// `Workflow <name> <STATUS> (succeeded: <s>, failed: <f>, skipped: <k>, duration: <d.dd>s)`
pub fn print_summary_line(name: &str, status: OverallStatus, succeeded: u32, failed: u32, skipped: u32, duration_ms: u64) {
    println!(
        "Workflow {name} {} (succeeded: {succeeded}, failed: {failed}, skipped: {skipped}, duration: {:.2}s)",
        status_str(status),
        duration_ms as f64 / 1000.0,
    );
}

pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{label}:"), value);
}

pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{name:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{header}");
}

pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| {
            let s = if val.len() > *width {
                format!("{}...", &val[..(width.saturating_sub(3))])
            } else {
                val.to_string()
            };
            format!("{s:<width$}")
        })
        .collect::<Vec<_>>()
        .join("  ");
    println!("{row}");
}
