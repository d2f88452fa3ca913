use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::{Command, data};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::shell::{ExecOptions, ShellState};
use crate::vfs::path::is_container;

pub struct CdCommand;

#[async_trait]
impl Command for CdCommand {
    fn name(&self) -> &str {
        "cd"
    }

    fn usage(&self) -> &str {
        "cd [PATH]"
    }

    fn description(&self) -> &str {
        "Change the current container"
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
        // cd with no args goes to root
        let Some(path) = args.first() else {
            let root = state.root().to_string();
            state.set_current(&root);
            return data(&json!({ "url": root }));
        };

        let resolved = state.resolve(path)?;
        let Some(url) = state.locate(&resolved) else {
            return Err(CommandError::new(
                ErrorKind::PathNotFound,
                format!("No such directory: {path}"),
            )
            .into());
        };
        if !is_container(&url) {
            return Err(
                CommandError::new(ErrorKind::NotADirectory, format!("Not a directory: {path}")).into(),
            );
        }

        state.set_current(&url);
        data(&json!({ "url": url }))
    }
}
