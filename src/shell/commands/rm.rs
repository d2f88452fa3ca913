use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Command, data, not_found, pod_error, require_args};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::pod::PodRequest;
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::vfs::path::is_container;

pub struct RmCommand;

#[derive(Serialize)]
struct Removed {
    url: String,
    removed: Vec<String>,
}

#[async_trait]
impl Command for RmCommand {
    fn name(&self) -> &str {
        "rm"
    }

    fn usage(&self) -> &str {
        "rm PATH [-r]"
    }

    fn description(&self) -> &str {
        "Remove a resource (-r removes a container and its contents)"
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
        let args = ParsedArgs::parse(args, &["recursive"]);
        let path = args.arg(0).unwrap_or_default();
        let recursive = args.any_flag(&["r", "R", "recursive"]);

        let resolved = state.resolve(path)?;
        if resolved.url == state.root() {
            return Err(CommandError::new(
                ErrorKind::PermissionDenied,
                "Refusing to remove the root container",
            )
            .into());
        }
        let url = state.locate(&resolved).ok_or_else(|| not_found(path))?;

        let mut targets = Vec::new();
        collect(state, &url, &mut targets);
        if targets.len() > 1 && !recursive {
            return Err(CommandError::new(
                ErrorKind::DirectoryNotEmpty,
                format!("Directory not empty: {path} (use -r)"),
            )
            .into());
        }

        // Children were collected before their parents
        let mut removed = Vec::new();
        for target in targets {
            let response = state.request(PodRequest::delete(&target));
            if !response.is_success() {
                return Err(pod_error(response.status, &target).into());
            }
            removed.push(target);
        }

        // Never leave the shell inside a removed container
        if state.current().starts_with(&url) && is_container(&url) {
            let root = state.root().to_string();
            state.set_current(&root);
        }
        data(&Removed { url, removed })
    }

    fn render(&self, data: &Value) -> Vec<String> {
        data["removed"]
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .map(|u| format!("removed {u}"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Post-order walk: every child precedes its container.
fn collect(state: &ShellState, url: &str, out: &mut Vec<String>) {
    if is_container(url) {
        let response = state.request(PodRequest::get(url));
        if let Some(children) = response.listing() {
            for child in children {
                collect(state, &child.url, out);
            }
        }
    }
    out.push(url.to_string());
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::shell::ShellState;

    async fn shell() -> ShellState {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        for line in ["mkdir -p docs/sub", "touch docs/sub/a.txt", "touch docs/b.txt", "touch c.txt"] {
            assert!(state.run_command(line).await.success, "{line}");
        }
        state
    }

    #[tokio::test]
    async fn test_rm_file() {
        let mut state = shell().await;
        let result = state.run_command("rm c.txt").await;
        assert_eq!(result.data.unwrap()["removed"][0], "https://pod.example/c.txt");
        assert_eq!(
            state.run_command("cat c.txt").await.error_kind(),
            Some(ErrorKind::PathNotFound)
        );
    }

    #[tokio::test]
    async fn test_rm_non_empty_needs_recursive() {
        let mut state = shell().await;
        let result = state.run_command("rm docs").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::DirectoryNotEmpty));

        state.run_command("cd docs/sub").await;
        let result = state.run_command("rm -r /docs").await;
        let removed = result.data.unwrap()["removed"].as_array().unwrap().clone();
        assert_eq!(removed.len(), 4);
        assert_eq!(removed.last().unwrap(), "https://pod.example/docs/");
        assert_eq!(state.current(), "https://pod.example/");
    }

    #[tokio::test]
    async fn test_rm_root_and_missing() {
        let mut state = shell().await;
        assert_eq!(
            state.run_command("rm /").await.error_kind(),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(
            state.run_command("rm -r ..").await.error_kind(),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(
            state.run_command("rm ghost").await.error_kind(),
            Some(ErrorKind::PathNotFound)
        );
    }
}
