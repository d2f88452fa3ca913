use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Command, data, pod_error, require_args, writable_leaf};
use crate::error::{CommandError, CommandResult};
use crate::pod::{CONTENT_TYPE, DEFAULT_CONTENT_TYPE, PodRequest};
use crate::shell::{ExecOptions, ShellState};

pub struct WriteCommand;

#[async_trait]
impl Command for WriteCommand {
    fn name(&self) -> &str {
        "write"
    }

    fn usage(&self) -> &str {
        "write FILE TEXT... [--type MIME]"
    }

    fn description(&self) -> &str {
        "Replace the content of a resource"
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
        let (words, content_type) = content_words(args);
        let url = writable_leaf(state, words.first().copied().unwrap_or_default())?;
        let text = words.get(1..).unwrap_or_default().join(" ");
        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);

        let bytes = text.len();
        let request = PodRequest::put(&url, Some(text)).header(CONTENT_TYPE, content_type);
        let response = state.request(request);
        if !response.is_success() {
            return Err(pod_error(response.status, &url).into());
        }
        data(&json!({ "url": url, "bytes": bytes }))
    }

    fn render(&self, data: &Value) -> Vec<String> {
        vec![format!(
            "wrote {} bytes to {}",
            data["bytes"],
            data["url"].as_str().unwrap_or_default()
        )]
    }
}

/// Split out `--type`; every other token, dashed or not, is content.
fn content_words(tokens: &[String]) -> (Vec<&str>, Option<&str>) {
    let mut words = Vec::new();
    let mut content_type = None;
    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        match token.as_str() {
            "--" => {
                words.extend(iter.by_ref().map(String::as_str));
                break;
            }
            "--type" => content_type = iter.next().map(String::as_str),
            other => match other.strip_prefix("--type=") {
                Some(value) => content_type = Some(value),
                None => words.push(other),
            },
        }
    }
    (words, content_type)
}
