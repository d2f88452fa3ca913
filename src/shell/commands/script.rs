use anyhow::Result;
use async_trait::async_trait;
use colored::*;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{Command, check_subcommand, data, unknown_subcommand};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::store::Script;

/// Deepest allowed nesting of `script run`
pub const MAX_SCRIPT_DEPTH: usize = 8;

const SUBCOMMANDS: &[(&str, usize, &str)] = &[
    ("list", 0, "script list"),
    ("show", 1, "script show NAME"),
    ("add", 2, "script add NAME LINE..."),
    ("rm", 1, "script rm NAME"),
    ("run", 1, "script run NAME [--continue]"),
];

pub struct ScriptCommand;

#[derive(Debug, Serialize)]
struct LineResult {
    line: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<CommandError>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    name: String,
    executed: usize,
    failures: usize,
    results: Vec<LineResult>,
}

#[async_trait]
impl Command for ScriptCommand {
    fn name(&self) -> &str {
        "script"
    }

    fn usage(&self) -> &str {
        "script list|show|add|rm|run ..."
    }

    fn description(&self) -> &str {
        "Save and run sequences of command lines"
    }

    fn supports_json(&self) -> bool {
        true
    }

    fn validate(&self, args: &[String]) -> Option<CommandError> {
        check_subcommand(self.name(), args, SUBCOMMANDS, self.usage())
    }

    async fn execute(
        &self,
        state: &mut ShellState,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<Option<CommandResult>> {
        let sub = args[0].as_str();
        let name = args[1..].first().map(String::as_str).unwrap_or_default();
        match sub {
            "list" => data(&json!({ "scripts": state.store().all::<Script>() })),
            "show" => data(&find_script(state, name)?),
            "add" => {
                // Raw tokens: flags belong to the saved line, not to `script`
                let line = args[2..].join(" ");
                let mut script = state.store().get::<Script>(name).unwrap_or(Script {
                    name: name.to_string(),
                    lines: Vec::new(),
                });
                script.lines.push(line);
                state.store().put(script.clone()).map_err(CommandError::from)?;
                data(&script)
            }
            "rm" => {
                let script = find_script(state, name)?;
                state.store().delete::<Script>(&script.name);
                Ok(Some(
                    CommandResult::from_data(&json!({ "name": script.name, "removed": true }))?
                        .message(format!("Removed script {name}")),
                ))
            }
            "run" => {
                let parsed = ParsedArgs::parse(&args[1..], &["continue"]);
                let name = parsed.arg(0).unwrap_or_default();
                let script = find_script(state, name)?;
                run(state, script, parsed.flag("continue"), options).await
            }
            other => Err(unknown_subcommand(self.name(), other, self.usage()).into()),
        }
    }

    fn render(&self, data: &Value) -> Vec<String> {
        if let Some(scripts) = data["scripts"].as_array() {
            if scripts.is_empty() {
                return vec!["No scripts".to_string()];
            }
            return scripts
                .iter()
                .map(|s| {
                    format!(
                        "{:<20} {} lines",
                        s["name"].as_str().unwrap_or_default(),
                        s["lines"].as_array().map(Vec::len).unwrap_or(0)
                    )
                })
                .collect();
        }
        if let Some(results) = data["results"].as_array() {
            let mut lines: Vec<String> = results
                .iter()
                .map(|r| {
                    let status = if r["success"].as_bool().unwrap_or(false) {
                        "ok".green()
                    } else {
                        "FAILED".red()
                    };
                    format!("{status:>6}  {}", r["line"].as_str().unwrap_or_default())
                })
                .collect();
            lines.push(format!(
                "executed {}, failures {}",
                data["executed"], data["failures"]
            ));
            return lines;
        }
        data["lines"]
            .as_array()
            .map(|lines| {
                lines
                    .iter()
                    .enumerate()
                    .map(|(i, l)| format!("{:>3}  {}", i + 1, l.as_str().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_script(state: &ShellState, name: &str) -> Result<Script, CommandError> {
    state.store().get::<Script>(name).ok_or_else(|| {
        CommandError::new(ErrorKind::EntityNotFound, format!("No script named '{name}'"))
    })
}

/// Run every line in order.
///
/// Without `keep_going` the first failing line ends the run and the whole
/// result fails, still carrying the report. Nothing already applied is undone.
async fn run(
    state: &mut ShellState,
    script: Script,
    keep_going: bool,
    options: &ExecOptions,
) -> Result<Option<CommandResult>> {
    if state.script_depth() >= MAX_SCRIPT_DEPTH {
        return Err(CommandError::operation_failed(format!(
            "Script nesting deeper than {MAX_SCRIPT_DEPTH} levels (running '{}')",
            script.name
        ))
        .into());
    }

    let nested = ExecOptions {
        json: false,
        silent: options.silent || options.json,
    };
    let mut report = RunReport {
        name: script.name.clone(),
        executed: 0,
        failures: 0,
        results: Vec::new(),
    };
    let mut first_error = None;

    state.enter_script();
    for line in &script.lines {
        debug!(script = %script.name, %line, "running script line");
        let result = state.execute_with(line, nested).await;
        report.executed += 1;
        if !result.success {
            report.failures += 1;
            if first_error.is_none() {
                first_error = result.error.clone();
            }
        }
        report.results.push(LineResult {
            line: line.clone(),
            success: result.success,
            error: result.error,
        });
        if !result.success && !keep_going {
            break;
        }
    }
    state.leave_script();
    info!(script = %report.name, executed = report.executed, failures = report.failures, "script finished");

    match first_error {
        Some(error) if !keep_going => {
            let error = CommandError::operation_failed(format!(
                "Script '{}' stopped at line {}: {}",
                report.name, report.executed, error.message
            ))
            .with_details(serde_json::to_value(&error)?);
            Ok(Some(CommandResult::failure(error).attach(&report)?))
        }
        _ => data(&report),
    }
}
