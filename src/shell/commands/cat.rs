use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Command, data, not_found, pod_error, require_args};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::pod::{CONTENT_TYPE, DEFAULT_CONTENT_TYPE, PodRequest};
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::vfs::path::is_container;

pub struct CatCommand;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileContent {
    url: String,
    content_type: String,
    content: String,
}

#[async_trait]
impl Command for CatCommand {
    fn name(&self) -> &str {
        "cat"
    }

    fn usage(&self) -> &str {
        "cat FILE"
    }

    fn description(&self) -> &str {
        "Print the content of a resource"
    }

    fn supports_json(&self) -> bool {
        true
    }

    fn validate(&self, args: &[String]) -> Option<CommandError> {
        require_args(args, 1, self.usage())
    }

    async fn execute(
        &self,
        state: &mut ShellState,
        args: &[String],
        _options: &ExecOptions,
    ) -> Result<Option<CommandResult>> {
        let args = ParsedArgs::parse(args, &[]);
        let path = args.arg(0).unwrap_or_default();
        let resolved = state.resolve(path)?;
        let url = state.locate(&resolved).ok_or_else(|| not_found(path))?;
        if is_container(&url) {
            return Err(CommandError::new(ErrorKind::NotAFile, format!("Is a directory: {path}")).into());
        }

        let response = state.request(PodRequest::get(&url));
        let Some(content) = response.content() else {
            return Err(pod_error(response.status, &url).into());
        };
        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        data(&FileContent {
            content: content.to_string(),
            url,
            content_type,
        })
    }

    fn render(&self, data: &Value) -> Vec<String> {
        data["content"]
            .as_str()
            .map(|c| c.lines().map(String::from).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::shell::ShellState;

    #[tokio::test]
    async fn test_cat() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        state.run_command("write notes.md # Title --type=text/markdown").await;
        let result = state.run_command("cat notes.md").await;
        let data = result.data.unwrap();
        assert_eq!(data["content"], "# Title");
        assert_eq!(data["contentType"], "text/markdown");
        assert_eq!(data["url"], "https://pod.example/notes.md");
    }

    #[tokio::test]
    async fn test_cat_errors() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        state.run_command("mkdir docs").await;
        assert_eq!(
            state.run_command("cat docs").await.error_kind(),
            Some(ErrorKind::NotAFile)
        );
        assert_eq!(
            state.run_command("cat nope.txt").await.error_kind(),
            Some(ErrorKind::PathNotFound)
        );
        assert_eq!(
            state.run_command("cat").await.error_kind(),
            Some(ErrorKind::MissingArgument)
        );
    }
}
