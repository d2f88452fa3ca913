use anyhow::Result;
use async_trait::async_trait;
use colored::*;
use serde::Serialize;
use serde_json::Value;

use super::{Command, data, pod_error};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::pod::PodRequest;
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::vfs::ChildEntry;
use crate::vfs::path::is_container;

pub struct LsCommand;

#[derive(Serialize)]
struct Listing {
    url: String,
    children: Vec<ChildEntry>,
}

#[async_trait]
impl Command for LsCommand {
    fn name(&self) -> &str {
        "ls"
    }

    fn usage(&self) -> &str {
        "ls [PATH] [-l]"
    }

    fn description(&self) -> &str {
        "List container contents"
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
        let args = ParsedArgs::parse(args, &[]);
        let target = args.arg(0).unwrap_or(".");
        let resolved = state.resolve(target)?;
        let Some(url) = state.locate(&resolved) else {
            return Err(CommandError::new(
                ErrorKind::PathNotFound,
                format!("No such file or directory: {target}"),
            )
            .into());
        };
        if !is_container(&url) {
            return Err(
                CommandError::new(ErrorKind::NotADirectory, format!("Not a directory: {target}"))
                    .into(),
            );
        }

        let response = state.request(PodRequest::get(&url));
        let Some(children) = response.listing() else {
            return Err(pod_error(response.status, &url).into());
        };
        let mut listing = Listing {
            url: url.clone(),
            children: children.to_vec(),
        };
        if !args.flag("l") {
            for child in &mut listing.children {
                child.size = None;
            }
        }
        data(&listing)
    }

    fn render(&self, data: &Value) -> Vec<String> {
        let Ok(listing) =
            serde_json::from_value::<Vec<ChildEntry>>(data["children"].clone())
        else {
            return Vec::new();
        };
        // Size is only present in long format
        let long_format = listing.iter().any(|c| c.size.is_some());

        if !long_format {
            return listing
                .iter()
                .map(|child| {
                    if child.kind.is_container() {
                        child.display_name().blue().bold().to_string()
                    } else {
                        child.display_name()
                    }
                })
                .collect();
        }

        let mut lines = vec![
            format!("{:<40} {:>12} {:<20} MODIFIED", "NAME", "SIZE", "TYPE"),
            "-".repeat(100),
        ];
        for child in &listing {
            let name = if child.kind.is_container() {
                format!("{:<40}", child.display_name()).blue().bold().to_string()
            } else {
                format!("{:<40}", child.display_name())
            };
            let size = child
                .size
                .map(|s| humansize::format_size(s, humansize::BINARY))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "{name} {size:>12} {:<20} {}",
                child.content_type.as_deref().unwrap_or("-"),
                child.updated.as_deref().unwrap_or("-"),
            ));
        }
        lines
    }
}
