use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::{Command, data, pod_error, require_args, writable_leaf};
use crate::error::{CommandError, CommandResult};
use crate::pod::{CONTENT_TYPE, PodRequest, status};
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};

pub struct TouchCommand;

#[async_trait]
impl Command for TouchCommand {
    fn name(&self) -> &str {
        "touch"
    }

    fn usage(&self) -> &str {
        "touch FILE"
    }

    fn description(&self) -> &str {
        "Create an empty resource or refresh its timestamp"
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

        // Rewrite existing content so only the timestamp changes
        let existing = state.request(PodRequest::get(&url));
        let mut request = PodRequest::put(&url, existing.content().map(String::from));
        if let Some(content_type) = existing.headers.get(CONTENT_TYPE) {
            request = request.header(CONTENT_TYPE, content_type);
        }
        let response = state.request(request);
        if !response.is_success() {
            return Err(pod_error(response.status, &url).into());
        }
        data(&json!({ "url": url, "created": response.status == status::CREATED }))
    }
}
