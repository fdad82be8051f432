pub mod config;
pub mod reconcile;
pub mod show;

use colored::Colorize;
use comfy_table::{Table, presets::UTF8_FULL};
use converge_core::{Outcome, Status};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct OutputContext {
    pub json: bool,
    pub verbose: bool,
}

impl OutputContext {
    pub fn print_table(&self, columns: &[String], rows: &[Vec<Value>]) {
        if self.json {
            let result = serde_json::json!({
                "columns": columns,
                "rows": rows,
            });
            self.print_json(&result);
            return;
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(columns);

        for row in rows {
            let values: Vec<String> = row.iter().map(value_to_string).collect();
            table.add_row(values);
        }

        println!("{table}");
    }

    pub fn print_json<T: serde::Serialize>(&self, data: &T) {
        match serde_json::to_string_pretty(data) {
            Ok(text) => println!("{}", text),
            Err(e) => self.print_error(&format!("Failed to encode output: {}", e)),
        }
    }

    pub fn print_success(&self, message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    pub fn print_unchanged(&self, message: &str) {
        println!("{} {}", "•".blue(), message);
    }

    pub fn print_warning(&self, message: &str) {
        println!("{} {}", "!".yellow(), message);
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn print_info(&self, message: &str) {
        println!("{} {}", "ℹ".blue(), message);
    }

    /// One line per step; unchanged steps only when verbose
    pub fn print_outcome(&self, outcome: &Outcome) {
        for step in &outcome.steps {
            let line = format!("{} {}: {}", outcome.component, step.target.bold(), step.message);
            match step.status {
                Status::Applied => self.print_success(&line),
                Status::Unchanged if self.verbose => self.print_unchanged(&line),
                Status::Unchanged => {}
                Status::Skipped => self.print_warning(&line),
                Status::Failed => self.print_error(&line),
            }
        }

        let summary = format!("{}: {}", outcome.component, status_label(outcome.status()));
        match outcome.status() {
            Status::Failed => self.print_error(&summary),
            Status::Skipped => self.print_warning(&summary),
            Status::Applied => self.print_success(&summary),
            Status::Unchanged => self.print_unchanged(&summary),
        }
    }

    pub fn print_outcomes(&self, outcomes: &[Outcome]) {
        if self.json {
            self.print_json(&outcomes);
            return;
        }
        for outcome in outcomes {
            self.print_outcome(outcome);
        }
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Applied => "changes applied",
        Status::Unchanged => "already converged",
        Status::Skipped => "skipped",
        Status::Failed => "failed",
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(value_to_string).collect();
            items.join(", ")
        }
        Value::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}
