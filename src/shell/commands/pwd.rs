use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Command, data};
use crate::error::CommandResult;
use crate::shell::{ExecOptions, ShellState};

pub struct PwdCommand;

#[async_trait]
impl Command for PwdCommand {
    fn name(&self) -> &str {
        "pwd"
    }

    fn usage(&self) -> &str {
        "pwd"
    }

    fn description(&self) -> &str {
        "Print the current location"
    }

    fn supports_json(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut ShellState,
        _args: &[String],
        _options: &ExecOptions,
    ) -> Result<Option<CommandResult>> {
        data(&json!({ "url": state.current() }))
    }

    fn render(&self, data: &Value) -> Vec<String> {
        data["url"].as_str().map(String::from).into_iter().collect()
    }
}
