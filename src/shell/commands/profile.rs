use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Command, check_subcommand, class_container, data, find_entity, unknown_subcommand};
use crate::error::{CommandError, CommandResult};
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::store::Profile;

const PERSON: &str = "foaf:Person";

const SUBCOMMANDS: &[(&str, usize, &str)] = &[
    ("list", 0, "profile list"),
    ("show", 1, "profile show PROFILE"),
    ("add", 1, "profile add NAME... [--nick=NICK]"),
];

pub struct ProfileCommand;

#[async_trait]
impl Command for ProfileCommand {
    fn name(&self) -> &str {
        "profile"
    }

    fn usage(&self) -> &str {
        "profile list|show|add ..."
    }

    fn description(&self) -> &str {
        "Manage identity profiles"
    }

    fn supports_json(&self) -> bool {
        true
    }

    fn validate(&self, args: &[String]) -> Option<CommandError> {
        check_subcommand(self.name(), args, SUBCOMMANDS, self.usage())
    }

    async fn execute(
        &self,
        state: &mut ShellState,
        args: &[String],
        _options: &ExecOptions,
    ) -> Result<Option<CommandResult>> {
        let args = ParsedArgs::parse(args, &[]);
        match args.arg(0).unwrap_or_default() {
            "list" => data(&json!({ "profiles": state.store().all::<Profile>() })),
            "show" => {
                let profile: Profile = find_entity(state, &args.rest(1), "profile")?;
                data(&profile)
            }
            "add" => {
                let name = args.rest(1);
                let container = class_container(state, PERSON, "profile/")?;
                let id = unique_id(state, &container, &slug(&name));
                let profile = Profile {
                    id,
                    name,
                    nick: args.value("nick").map(String::from),
                };
                state.store().put(profile.clone()).map_err(CommandError::from)?;
                data(&profile)
            }
            other => Err(unknown_subcommand(self.name(), other, self.usage()).into()),
        }
    }

    fn render(&self, data: &Value) -> Vec<String> {
        let line = |p: &Value| match p["nick"].as_str() {
            Some(nick) => format!("{} ({nick})", p["name"].as_str().unwrap_or_default()),
            None => p["name"].as_str().unwrap_or_default().to_string(),
        };
        match data["profiles"].as_array() {
            Some(profiles) if profiles.is_empty() => vec!["No profiles".to_string()],
            Some(profiles) => profiles.iter().map(line).collect(),
            None => vec![line(data), data["id"].as_str().unwrap_or_default().to_string()],
        }
    }
}

/// Lowercase ASCII words joined by `-`; `me` when nothing is left.
fn slug(name: &str) -> String {
    let words: Vec<String> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    if words.is_empty() {
        "me".to_string()
    } else {
        words.join("-")
    }
}

/// `{container}card#{slug}`, suffixed with a counter when taken.
fn unique_id(state: &ShellState, container: &str, slug: &str) -> String {
    let base = format!("{container}card#{slug}");
    let mut id = base.clone();
    let mut n = 2;
    while state.store().contains::<Profile>(&id) {
        id = format!("{base}-{n}");
        n += 1;
    }
    id
}
