use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use super::{Command, check_subcommand, class_container, data, find_entity, unknown_subcommand};
use crate::error::{CommandError, CommandResult};
use crate::lookup::Lookup;
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::store::{Contact, Group, IndexType};

const ADDRESS_BOOK: &str = "vcard:AddressBook";
const INDIVIDUAL: &str = "vcard:Individual";

const SUBCOMMANDS: &[(&str, usize, &str)] = &[
    ("list", 0, "contact list"),
    ("show", 1, "contact show CONTACT"),
    ("add", 1, "contact add NAME... [--email=ADDR] [--phone=NUMBER]"),
    ("rm", 1, "contact rm CONTACT"),
];

pub struct ContactCommand;

#[async_trait]
impl Command for ContactCommand {
    fn name(&self) -> &str {
        "contact"
    }

    fn usage(&self) -> &str {
        "contact list|show|add|rm ..."
    }

    fn description(&self) -> &str {
        "Manage address book contacts"
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
            "list" => data(&json!({ "contacts": state.store().all::<Contact>() })),
            "show" => {
                let contact: Contact = find_entity(state, &args.rest(1), "contact")?;
                data(&contact)
            }
            "add" => {
                let container = class_container(state, ADDRESS_BOOK, "contacts/")?;
                let contact = Contact {
                    id: format!("{container}{}", Uuid::new_v4().simple()),
                    name: args.rest(1),
                    email: args.value("email").map(String::from),
                    phone: args.value("phone").map(String::from),
                };
                state.store().put(contact.clone()).map_err(CommandError::from)?;
                state
                    .registry()
                    .add_instance(INDIVIDUAL, IndexType::Public, &contact.id)?;
                debug!(id = %contact.id, "contact added");
                Ok(Some(CommandResult::from_data(&contact)?.message(format!("Added {}", contact.name))))
            }
            "rm" => {
                let contact: Contact = find_entity(state, &args.rest(1), "contact")?;
                state.store().delete::<Contact>(&contact.id);
                state
                    .registry()
                    .remove_instance(INDIVIDUAL, IndexType::Public, &contact.id)?;
                // Drop the contact from every group it belonged to
                for mut group in state.store().all::<Group>() {
                    if group.members.contains(&contact.id) {
                        group.members.retain(|m| m != &contact.id);
                        state.store().put(group).map_err(CommandError::from)?;
                    }
                }
                Ok(Some(
                    CommandResult::from_data(&json!({ "id": contact.id, "removed": true }))?
                        .message(format!("Removed {}", contact.name)),
                ))
            }
            other => Err(unknown_subcommand(self.name(), other, self.usage()).into()),
        }
    }

    fn render(&self, data: &Value) -> Vec<String> {
        if let Some(contacts) = data["contacts"].as_array() {
            if contacts.is_empty() {
                return vec!["No contacts".to_string()];
            }
            return contacts.iter().map(contact_line).collect();
        }
        if data.get("name").is_some() {
            return vec![contact_line(data)];
        }
        Vec::new()
    }
}

fn contact_line(contact: &Value) -> String {
    let id = contact["id"].as_str().unwrap_or_default();
    let mut line = format!(
        "{:<10} {}",
        Contact::short_id(id).chars().take(8).collect::<String>(),
        contact["name"].as_str().unwrap_or_default()
    );
    for field in ["email", "phone"] {
        if let Some(value) = contact[field].as_str() {
            line.push_str(&format!("  {value}"));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::shell::ShellState;

    #[tokio::test]
    async fn test_contact_lifecycle() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        let result = state
            .run_command("contact add Ada Lovelace --email=ada@example.org")
            .await;
        let id = result.data.unwrap()["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("https://pod.example/contacts/"));

        let shown = state.run_command("contact show lovelace").await.data.unwrap();
        assert_eq!(shown["id"], id.as_str());
        assert_eq!(shown["email"], "ada@example.org");

        let locations = state.registry().locations_for("vcard:Individual").unwrap();
        assert_eq!(locations.instances, vec![id.clone()]);

        assert!(state.run_command("contact rm Lovelace").await.success);
        assert!(state.registry().find_by_class("vcard:Individual").unwrap().is_empty());
        assert_eq!(
            state.run_command("contact show lovelace").await.error_kind(),
            Some(ErrorKind::EntityNotFound)
        );
    }

    #[tokio::test]
    async fn test_contact_argument_errors() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        assert_eq!(
            state.run_command("contact").await.error_kind(),
            Some(ErrorKind::MissingArgument)
        );
        assert_eq!(
            state.run_command("contact frob").await.error_kind(),
            Some(ErrorKind::UnknownSubcommand)
        );
        assert_eq!(
            state.run_command("contact add").await.error_kind(),
            Some(ErrorKind::MissingArgument)
        );
        assert_eq!(
            state.run_command("contact add Bob --email=nope").await.error_kind(),
            Some(ErrorKind::InvalidEntity)
        );
        assert!(state.store().all::<crate::store::Contact>().is_empty());
    }
}
