use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{Command, data, not_found, pod_error, require_args, writable_leaf};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::pod::{CONTENT_TYPE, PodRequest};
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::vfs::path::is_container;

const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

pub struct ExportCommand;

#[async_trait]
impl Command for ExportCommand {
    fn name(&self) -> &str {
        "export"
    }

    fn usage(&self) -> &str {
        "export FILE"
    }

    fn description(&self) -> &str {
        "Write a JSON snapshot of every table to a resource"
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
        let url = writable_leaf(state, args.arg(0).unwrap_or_default())?;

        let snapshot = state.store().export();
        let records = snapshot.records.len();
        let text = serde_json::to_string_pretty(&snapshot)?;
        let bytes = text.len();

        let request =
            PodRequest::put(&url, Some(text)).header(CONTENT_TYPE, SNAPSHOT_CONTENT_TYPE);
        let response = state.request(request);
        if !response.is_success() {
            return Err(pod_error(response.status, &url).into());
        }
        info!(%url, records, "exported snapshot");
        data(&json!({ "url": url, "records": records, "bytes": bytes }))
    }

    fn render(&self, data: &Value) -> Vec<String> {
        vec![format!(
            "exported {} records to {}",
            data["records"],
            data["url"].as_str().unwrap_or_default()
        )]
    }
}

pub struct ImportCommand;

#[async_trait]
impl Command for ImportCommand {
    fn name(&self) -> &str {
        "import"
    }

    fn usage(&self) -> &str {
        "import FILE [--strict]"
    }

    fn description(&self) -> &str {
        "Merge a JSON snapshot into the tables (--strict rejects any invalid row)"
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
        let args = ParsedArgs::parse(args, &["strict"]);
        let path = args.arg(0).unwrap_or_default();
        let strict = args.flag("strict");

        let resolved = state.resolve(path)?;
        let url = state.locate(&resolved).ok_or_else(|| not_found(path))?;
        if is_container(&url) {
            return Err(CommandError::new(ErrorKind::NotAFile, format!("Is a directory: {path}")).into());
        }
        let response = state.request(PodRequest::get(&url));
        let Some(text) = response.content() else {
            return Err(pod_error(response.status, &url).into());
        };

        let report = state
            .store()
            .import_json(text, strict, state.root())
            .map_err(CommandError::from)?;
        info!(%url, imported = report.imported, skipped = report.skipped.len(), "imported snapshot");
        data(&json!({
            "url": url,
            "strict": strict,
            "imported": report.imported,
            "skipped": report.skipped,
        }))
    }

    fn render(&self, data: &Value) -> Vec<String> {
        let mut lines = vec![format!("imported {} records", data["imported"])];
        for row in data["skipped"].as_array().into_iter().flatten() {
            lines.push(format!(
                "  skipped #{} ({}): {}",
                row["index"],
                row["key"].as_str().unwrap_or("?"),
                row["reason"].as_str().unwrap_or_default()
            ));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::shell::ShellState;
    use crate::store::{Contact, Script};

    #[tokio::test]
    async fn test_export_then_import_into_fresh_shell() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        state.run_command("script add hello pwd").await;
        state.run_command("contact add Ada").await;
        let data = state.run_command("export backup.json").await.data.unwrap();
        assert!(data["records"].as_u64().unwrap() >= 2);
        let snapshot = state.run_command("cat backup.json").await.data.unwrap();
        assert_eq!(snapshot["contentType"], "application/json");

        let mut other = ShellState::new("https://pod.example/").unwrap();
        let text = snapshot["content"].as_str().unwrap().replace('\n', " ");
        other.run_command(&format!("write copy.json {text}")).await;
        let data = other.run_command("import copy.json --strict").await.data.unwrap();
        assert!(data["skipped"].as_array().unwrap().is_empty());
        assert_eq!(other.store().all::<Script>().len(), 1);
        assert_eq!(other.store().all::<Contact>().len(), 1);
    }

    #[tokio::test]
    async fn test_import_errors() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        state.run_command("write junk.json not json").await;
        assert_eq!(
            state.run_command("import junk.json").await.error_kind(),
            Some(ErrorKind::InvalidArgument)
        );
        assert_eq!(
            state.run_command("import nothing.json").await.error_kind(),
            Some(ErrorKind::PathNotFound)
        );
    }
}
