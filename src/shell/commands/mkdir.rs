use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Command, data, pod_error, require_args};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::pod::PodRequest;
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::vfs::path::{child_url, segments};

pub struct MkdirCommand;

#[derive(Serialize)]
struct Created {
    url: String,
    created: Vec<String>,
}

#[async_trait]
impl Command for MkdirCommand {
    fn name(&self) -> &str {
        "mkdir"
    }

    fn usage(&self) -> &str {
        "mkdir PATH [-p]"
    }

    fn description(&self) -> &str {
        "Create a container (-p creates missing parents)"
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
        let args = ParsedArgs::parse(args, &["parents"]);
        let path = args.arg(0).unwrap_or_default();
        let parents = args.any_flag(&["p", "parents"]);
        let resolved = state.resolve(path)?;
        let names = segments(&resolved.url, state.root())?;
        if names.is_empty() {
            return Err(CommandError::new(ErrorKind::AlreadyExists, "The root always exists").into());
        }

        let mut created = Vec::new();
        let mut url = state.root().to_string();
        for (i, name) in names.iter().enumerate() {
            let last = i + 1 == names.len();
            url = child_url(&url, name, true);
            let leaf = url.trim_end_matches('/');

            if state.request(PodRequest::get(leaf)).is_success() {
                return Err(CommandError::new(
                    if last { ErrorKind::AlreadyExists } else { ErrorKind::NotADirectory },
                    format!("A file already exists at {leaf}"),
                )
                .into());
            }
            if state.request(PodRequest::get(&url)).is_success() {
                if last {
                    return Err(CommandError::new(
                        ErrorKind::AlreadyExists,
                        format!("Directory already exists: {path}"),
                    )
                    .into());
                }
                continue;
            }
            if !last && !parents {
                return Err(CommandError::new(
                    ErrorKind::ParentNotFound,
                    format!("Parent directory does not exist: {url} (use -p)"),
                )
                .into());
            }

            let response = state.request(PodRequest::put(&url, None));
            if !response.is_success() {
                return Err(pod_error(response.status, &url).into());
            }
            created.push(url.clone());
        }

        data(&Created { url, created })
    }

    fn render(&self, data: &Value) -> Vec<String> {
        data["created"]
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .map(|u| format!("created {u}"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::shell::ShellState;

    #[tokio::test]
    async fn test_mkdir() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        let result = state.run_command("mkdir docs").await;
        let data = result.data.unwrap();
        assert_eq!(data["url"], "https://pod.example/docs/");
        assert_eq!(data["created"][0], "https://pod.example/docs/");

        let result = state.run_command("mkdir docs/").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::AlreadyExists));
    }

    #[tokio::test]
    async fn test_mkdir_parents() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        let result = state.run_command("mkdir a/b/c").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ParentNotFound));

        let result = state.run_command("mkdir -p a/b/c").await;
        let created = result.data.unwrap()["created"].as_array().unwrap().len();
        assert_eq!(created, 3);
        assert!(state.run_command("cd a/b/c").await.success);
    }

    #[tokio::test]
    async fn test_mkdir_over_file() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        state.run_command("touch notes").await;
        let result = state.run_command("mkdir notes").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::AlreadyExists));
    }

    #[tokio::test]
    async fn test_mkdir_encodes_names() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        let result = state.run_command("mkdir my%20docs").await;
        assert_eq!(result.data.unwrap()["url"], "https://pod.example/my%20docs/");
    }
}
