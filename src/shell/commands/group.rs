use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{Command, check_subcommand, class_container, data, find_entity, unknown_subcommand};
use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::store::{Contact, Group};

const GROUP_CLASS: &str = "vcard:Group";

const SUBCOMMANDS: &[(&str, usize, &str)] = &[
    ("list", 0, "group list"),
    ("show", 1, "group show GROUP"),
    ("add", 1, "group add NAME..."),
    ("rm", 1, "group rm GROUP"),
    ("add-member", 2, "group add-member GROUP CONTACT"),
    ("remove-member", 2, "group remove-member GROUP CONTACT"),
];

pub struct GroupCommand;

#[derive(Serialize)]
struct Member {
    id: String,
    name: Option<String>,
}

#[derive(Serialize)]
struct GroupView {
    id: String,
    name: String,
    members: Vec<Member>,
}

impl GroupView {
    /// Attach contact names; members whose contact is gone keep a null name.
    fn new(state: &ShellState, group: Group) -> Self {
        let members = group
            .members
            .into_iter()
            .map(|id| Member {
                name: state.store().get::<Contact>(&id).map(|c| c.name),
                id,
            })
            .collect();
        GroupView {
            id: group.id,
            name: group.name,
            members,
        }
    }
}

#[async_trait]
impl Command for GroupCommand {
    fn name(&self) -> &str {
        "group"
    }

    fn usage(&self) -> &str {
        "group list|show|add|rm|add-member|remove-member ..."
    }

    fn description(&self) -> &str {
        "Manage contact groups"
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
            "list" => {
                let groups: Vec<GroupView> = state
                    .store()
                    .all::<Group>()
                    .into_iter()
                    .map(|g| GroupView::new(state, g))
                    .collect();
                data(&json!({ "groups": groups }))
            }
            "show" => {
                let group: Group = find_entity(state, &args.rest(1), "group")?;
                data(&GroupView::new(state, group))
            }
            "add" => {
                let name = args.rest(1);
                let taken = state
                    .store()
                    .all::<Group>()
                    .iter()
                    .any(|g| g.name.eq_ignore_ascii_case(&name));
                if taken {
                    return Err(CommandError::new(
                        ErrorKind::DuplicateEntity,
                        format!("A group named '{name}' already exists"),
                    )
                    .into());
                }
                let container = class_container(state, GROUP_CLASS, "groups/")?;
                let group = Group {
                    id: format!("{container}index.ttl#{}", Uuid::new_v4().simple()),
                    name,
                    members: Vec::new(),
                };
                state.store().put(group.clone()).map_err(CommandError::from)?;
                data(&GroupView::new(state, group))
            }
            "rm" => {
                let group: Group = find_entity(state, &args.rest(1), "group")?;
                state.store().delete::<Group>(&group.id);
                Ok(Some(
                    CommandResult::from_data(&json!({ "id": group.id, "removed": true }))?
                        .message(format!("Removed group {}", group.name)),
                ))
            }
            sub @ ("add-member" | "remove-member") => {
                let mut group: Group = find_entity(state, args.arg(1).unwrap_or_default(), "group")?;
                let contact: Contact = find_entity(state, &args.rest(2), "contact")?;
                let is_member = group.members.contains(&contact.id);
                if sub == "add-member" {
                    if is_member {
                        return Err(CommandError::new(
                            ErrorKind::DuplicateEntity,
                            format!("{} is already a member of {}", contact.name, group.name),
                        )
                        .into());
                    }
                    group.members.push(contact.id);
                } else {
                    if !is_member {
                        return Err(CommandError::new(
                            ErrorKind::EntityNotFound,
                            format!("{} is not a member of {}", contact.name, group.name),
                        )
                        .into());
                    }
                    group.members.retain(|m| m != &contact.id);
                }
                state.store().put(group.clone()).map_err(CommandError::from)?;
                data(&GroupView::new(state, group))
            }
            other => Err(unknown_subcommand(self.name(), other, self.usage()).into()),
        }
    }

    fn render(&self, data: &Value) -> Vec<String> {
        if let Some(groups) = data["groups"].as_array() {
            if groups.is_empty() {
                return vec!["No groups".to_string()];
            }
            return groups
                .iter()
                .map(|g| {
                    format!(
                        "{} ({} members)",
                        g["name"].as_str().unwrap_or_default(),
                        g["members"].as_array().map(Vec::len).unwrap_or(0)
                    )
                })
                .collect();
        }
        let Some(members) = data["members"].as_array() else {
            return Vec::new();
        };
        let mut lines = vec![data["name"].as_str().unwrap_or_default().to_string()];
        for member in members {
            let label = member["name"]
                .as_str()
                .or_else(|| member["id"].as_str())
                .unwrap_or_default();
            lines.push(format!("  - {label}"));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::shell::ShellState;

    async fn shell() -> ShellState {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        for line in ["contact add Grace Hopper", "contact add Alan Turing", "group add Pioneers"] {
            assert!(state.run_command(line).await.success, "{line}");
        }
        state
    }

    #[tokio::test]
    async fn test_group_members() {
        let mut state = shell().await;
        let result = state.run_command("group add-member pioneers grace").await;
        let data = result.data.unwrap();
        assert_eq!(data["members"][0]["name"], "Grace Hopper");
        assert!(
            data["id"]
                .as_str()
                .unwrap()
                .starts_with("https://pod.example/groups/index.ttl#")
        );

        let result = state.run_command("group add-member Pioneers Grace Hopper").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::DuplicateEntity));

        let result = state.run_command("group remove-member Pioneers turing").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::EntityNotFound));

        state.run_command("contact rm grace").await;
        let data = state.run_command("group show pioneers").await.data.unwrap();
        assert!(data["members"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_duplicates_and_removal() {
        let mut state = shell().await;
        assert_eq!(
            state.run_command("group add pioneers").await.error_kind(),
            Some(ErrorKind::DuplicateEntity)
        );
        assert!(state.run_command("group rm Pioneers").await.success);
        let data = state.run_command("group list").await.data.unwrap();
        assert!(data["groups"].as_array().unwrap().is_empty());
        assert_eq!(
            state.run_command("group add-member").await.error_kind(),
            Some(ErrorKind::MissingArgument)
        );
    }
}
