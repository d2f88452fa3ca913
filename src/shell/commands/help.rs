use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Command, data};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::shell::{ExecOptions, ShellState};

pub struct HelpCommand;

#[derive(Serialize)]
struct HelpEntry<'a> {
    name: &'a str,
    usage: &'a str,
    description: &'a str,
}

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn usage(&self) -> &str {
        "help [COMMAND]"
    }

    fn description(&self) -> &str {
        "List commands, or show usage for one command"
    }

    fn supports_json(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut ShellState,
        args: &[String],
        _options: &ExecOptions,
    ) -> Result<Option<CommandResult>> {
        let commands = match args.first() {
            Some(name) => match state.command(name) {
                Some(command) => vec![command],
                None => {
                    return Err(CommandError::new(
                        ErrorKind::InvalidArgument,
                        format!("No help for unknown command: {name}"),
                    )
                    .into());
                }
            },
            None => state.commands(),
        };

        let entries: Vec<HelpEntry> = commands
            .iter()
            .map(|c| HelpEntry {
                name: c.name(),
                usage: c.usage(),
                description: c.description(),
            })
            .collect();
        data(&serde_json::json!({ "commands": entries }))
    }

    fn render(&self, data: &Value) -> Vec<String> {
        let Some(commands) = data["commands"].as_array() else {
            return Vec::new();
        };
        let mut lines: Vec<String> = commands
            .iter()
            .map(|c| {
                format!(
                    "  {:<44} {}",
                    c["usage"].as_str().unwrap_or_default(),
                    c["description"].as_str().unwrap_or_default()
                )
            })
            .collect();
        if commands.len() > 1 {
            lines.insert(0, "Available commands:".to_string());
            lines.push("  exit, quit                                   Leave the shell".to_string());
        }
        lines
    }
}
