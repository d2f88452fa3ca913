use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub mod cat;
pub mod cd;
pub mod contact;
pub mod group;
pub mod help;
pub mod ls;
pub mod mkdir;
pub mod profile;
pub mod pwd;
pub mod rm;
pub mod script;
pub mod touch;
pub mod transfer;
pub mod typeindex;
pub mod write;

use super::{ExecOptions, ShellState};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::lookup::{self, Lookup};
use crate::pod::{PodRequest, status};
use crate::store::TableRecord;
use crate::vfs::path::parent_url;

/// Trait for shell commands
#[async_trait]
pub trait Command: Send + Sync {
    /// Get the command name
    fn name(&self) -> &str;

    /// Get command usage help
    fn usage(&self) -> &str;

    /// One-line description for `help`
    fn description(&self) -> &str;

    /// Whether `--json` / `-j` is stripped from the arguments and honored
    fn supports_json(&self) -> bool {
        false
    }

    /// Checks that need no store access; an error here skips `execute`
    fn validate(&self, _args: &[String]) -> Option<CommandError> {
        None
    }

    /// Execute the command; `Ok(None)` is a plain success
    async fn execute(
        &self,
        state: &mut ShellState,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<Option<CommandResult>>;

    /// Human-readable rendering of a successful result's data
    fn render(&self, _data: &Value) -> Vec<String> {
        Vec::new()
    }
}

/// Every command the shell ships with
pub fn builtin() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(help::HelpCommand),
        Arc::new(pwd::PwdCommand),
        Arc::new(cd::CdCommand),
        Arc::new(ls::LsCommand),
        Arc::new(cat::CatCommand),
        Arc::new(mkdir::MkdirCommand),
        Arc::new(touch::TouchCommand),
        Arc::new(write::WriteCommand),
        Arc::new(rm::RmCommand),
        Arc::new(contact::ContactCommand),
        Arc::new(group::GroupCommand),
        Arc::new(profile::ProfileCommand),
        Arc::new(typeindex::TypeIndexCommand),
        Arc::new(script::ScriptCommand),
        Arc::new(transfer::ExportCommand),
        Arc::new(transfer::ImportCommand),
    ]
}

/// Require at least `count` positional arguments
pub(crate) fn require_args(args: &[String], count: usize, usage: &str) -> Option<CommandError> {
    let positional = args.iter().filter(|a| !a.starts_with('-')).count();
    (positional < count).then(|| CommandError::missing_argument(usage))
}

/// Map a failed pod status to an error for `url`
pub(crate) fn pod_error(status: u16, url: &str) -> CommandError {
    match status {
        status::NOT_FOUND => CommandError::new(ErrorKind::PathNotFound, format!("No such resource: {url}")),
        status::CONFLICT => CommandError::new(ErrorKind::OperationFailed, format!("Conflict at {url}")),
        status::METHOD_NOT_ALLOWED => CommandError::new(
            ErrorKind::PermissionDenied,
            format!("Operation not allowed on {url}"),
        ),
        other => CommandError::operation_failed(format!("Pod returned status {other} for {url}")),
    }
}

/// Resolve `input` to a leaf locator that may be written.
///
/// The parent container must exist and no container may share the name.
pub(crate) fn writable_leaf(state: &ShellState, input: &str) -> Result<String, CommandError> {
    let resolved = state.resolve(input)?;
    if resolved.is_container || resolved.url == state.root() {
        return Err(CommandError::new(ErrorKind::NotAFile, format!("Not a file: {input}")));
    }
    let twin = format!("{}/", resolved.url);
    if state.request(PodRequest::get(&twin)).is_success() {
        return Err(CommandError::new(ErrorKind::NotAFile, format!("Is a directory: {input}")));
    }
    let parent = parent_url(&resolved.url, state.root());
    if !state.request(PodRequest::get(&parent)).is_success() {
        return Err(CommandError::new(
            ErrorKind::ParentNotFound,
            format!("Parent directory does not exist: {parent}"),
        ));
    }
    Ok(resolved.url)
}

pub(crate) fn not_found(input: &str) -> CommandError {
    CommandError::new(ErrorKind::PathNotFound, format!("No such file or directory: {input}"))
}

/// Resolve a loose identifier to a stored record.
pub(crate) fn find_entity<T>(state: &ShellState, query: &str, label: &str) -> Result<T, CommandError>
where
    T: Lookup + TableRecord,
{
    let rows = state.store().all::<T>();
    lookup::find(&rows, query)
        .id()
        .and_then(|id| state.store().get::<T>(id))
        .ok_or_else(|| CommandError::new(ErrorKind::EntityNotFound, format!("No {label} matches '{query}'")))
}

/// First container registered for `class`, or `fallback` under the root.
pub(crate) fn class_container(
    state: &ShellState,
    class: &str,
    fallback: &str,
) -> Result<String, CommandError> {
    let locations = state.registry().locations_for(class)?;
    Ok(locations
        .containers
        .into_iter()
        .next()
        .unwrap_or_else(|| format!("{}{fallback}", state.root())))
}

/// Validate `SUBCOMMAND ARGS...` against a table of (name, required args, usage).
pub(crate) fn check_subcommand(
    command: &str,
    args: &[String],
    table: &[(&str, usize, &str)],
    usage: &str,
) -> Option<CommandError> {
    let Some(sub) = args.first() else {
        return Some(CommandError::missing_argument(usage));
    };
    let Some((_, required, sub_usage)) = table.iter().find(|(name, _, _)| *name == sub.as_str()) else {
        return Some(unknown_subcommand(command, sub, usage));
    };
    require_args(&args[1..], *required, sub_usage)
}

pub(crate) fn unknown_subcommand(command: &str, sub: &str, usage: &str) -> CommandError {
    CommandError::new(
        ErrorKind::UnknownSubcommand,
        format!("Unknown subcommand '{command} {sub}'. Usage: {usage}"),
    )
}

/// Build a successful result from serializable data
pub(crate) fn data<D: serde::Serialize>(payload: &D) -> Result<Option<CommandResult>> {
    Ok(Some(CommandResult::from_data(payload)?))
}
