use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Command, check_subcommand, data, unknown_subcommand};
use crate::error::{CommandError, CommandResult};
use crate::registry::expand_class;
use crate::shell::args::ParsedArgs;
use crate::shell::{ExecOptions, ShellState};
use crate::store::{IndexType, TypeRegistration};
use crate::vfs::path::as_container;

const SUBCOMMANDS: &[(&str, usize, &str)] = &[
    ("list", 0, "typeindex list [--public|--private]"),
    ("show", 1, "typeindex show CLASS"),
    ("register", 2, "typeindex register CLASS URL [--private] [--container]"),
    ("unregister", 1, "typeindex unregister CLASS [--public|--private]"),
    ("add-instance", 2, "typeindex add-instance CLASS URL [--private]"),
    ("remove-instance", 2, "typeindex remove-instance CLASS URL [--private]"),
    ("locations", 1, "typeindex locations CLASS"),
];

const BOOLEAN_FLAGS: &[&str] = &["public", "private", "container"];

pub struct TypeIndexCommand;

#[async_trait]
impl Command for TypeIndexCommand {
    fn name(&self) -> &str {
        "typeindex"
    }

    fn usage(&self) -> &str {
        "typeindex list|show|register|unregister|add-instance|remove-instance|locations ..."
    }

    fn description(&self) -> &str {
        "Inspect and edit the type registry"
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
        let args = ParsedArgs::parse(args, BOOLEAN_FLAGS);
        let class = args.arg(1).unwrap_or_default();
        let index_type = if args.flag("private") {
            IndexType::Private
        } else {
            IndexType::Public
        };
        let registry = state.registry();

        match args.arg(0).unwrap_or_default() {
            "list" => {
                let registrations = match explicit_index_type(&args) {
                    Some(t) => registry.list_by_index_type(t)?,
                    None => registry.list_all()?,
                };
                data(&json!({ "registrations": registrations }))
            }
            "show" => {
                let registrations = registry.find_by_class(class)?;
                data(&json!({ "forClass": expand_class(class)?, "registrations": registrations }))
            }
            "register" => {
                let url = locator(state, args.arg(2).unwrap_or_default(), args.flag("container"))?;
                let registration = if args.flag("container") {
                    registry.register(class, index_type, Vec::new(), Some(url))?
                } else {
                    registry.register(class, index_type, vec![url], None)?
                };
                data(&registration)
            }
            "unregister" => {
                let removed = registry.unregister(class, explicit_index_type(&args))?;
                let message = if removed {
                    format!("Unregistered {class}")
                } else {
                    format!("Nothing registered for {class}")
                };
                Ok(Some(
                    CommandResult::from_data(
                        &json!({ "forClass": expand_class(class)?, "removed": removed }),
                    )?
                    .message(message),
                ))
            }
            "add-instance" => {
                let url = locator(state, args.arg(2).unwrap_or_default(), false)?;
                data(&registry.add_instance(class, index_type, &url)?)
            }
            "remove-instance" => {
                let url = locator(state, args.arg(2).unwrap_or_default(), false)?;
                let removed = registry.remove_instance(class, index_type, &url)?;
                data(&json!({ "forClass": expand_class(class)?, "url": url, "removed": removed }))
            }
            "locations" => data(&registry.locations_for(class)?),
            other => Err(unknown_subcommand(self.name(), other, self.usage()).into()),
        }
    }

    fn render(&self, data: &Value) -> Vec<String> {
        if let Some(registrations) = data["registrations"].as_array() {
            if registrations.is_empty() {
                return vec!["No registrations".to_string()];
            }
            return registrations
                .iter()
                .filter_map(|r| serde_json::from_value::<TypeRegistration>(r.clone()).ok())
                .map(|r| registration_line(&r))
                .collect();
        }
        if data.get("containers").is_some() {
            let mut lines = Vec::new();
            for (label, key) in [("instance", "instances"), ("container", "containers")] {
                for url in data[key].as_array().into_iter().flatten() {
                    lines.push(format!("{label:<10} {}", url.as_str().unwrap_or_default()));
                }
            }
            return lines;
        }
        serde_json::from_value::<TypeRegistration>(data.clone())
            .map(|r| vec![registration_line(&r)])
            .unwrap_or_default()
    }
}

fn registration_line(r: &TypeRegistration) -> String {
    let mut targets = r.instances();
    targets.extend(r.instance_container.iter().cloned());
    format!("{:<8} {} -> {}", r.index_type.as_str(), r.for_class, targets.join(", "))
}

fn explicit_index_type(args: &ParsedArgs) -> Option<IndexType> {
    if args.flag("private") {
        Some(IndexType::Private)
    } else if args.flag("public") {
        Some(IndexType::Public)
    } else {
        None
    }
}

/// Absolute locators pass through; anything else is a pod path.
fn locator(state: &ShellState, input: &str, container: bool) -> Result<String, CommandError> {
    let url = if input.contains("://") {
        input.to_string()
    } else {
        state.resolve(input)?.url
    };
    Ok(if container { as_container(&url) } else { url })
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::shell::ShellState;
    use serde_json::json;

    const INDIVIDUAL: &str = "http://www.w3.org/2006/vcard/ns#Individual";

    #[tokio::test]
    async fn test_register_and_locations() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        let data = state
            .run_command("typeindex register vcard:Individual https://pod.example/contacts/a")
            .await
            .data
            .unwrap();
        assert_eq!(data["forClass"], INDIVIDUAL);
        assert_eq!(data["instance"], "https://pod.example/contacts/a");

        state
            .run_command("typeindex add-instance vcard:Individual /contacts/b")
            .await;
        let data = state.run_command("typeindex locations vcard:Individual").await.data.unwrap();
        assert_eq!(
            data,
            json!({
                "instances": ["https://pod.example/contacts/a", "https://pod.example/contacts/b"],
                "containers": []
            })
        );
    }

    #[tokio::test]
    async fn test_register_private_container() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        let data = state
            .run_command("typeindex register meeting:Meeting meetings --private --container")
            .await
            .data
            .unwrap();
        assert_eq!(data["indexType"], "private");
        assert_eq!(data["instanceContainer"], "https://pod.example/meetings/");

        let data = state.run_command("typeindex list --private").await.data.unwrap();
        let classes: Vec<&str> = data["registrations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["indexType"].as_str().unwrap())
            .collect();
        assert!(classes.iter().all(|t| *t == "private"));

        let data = state
            .run_command("typeindex unregister meeting:Meeting --public")
            .await
            .data
            .unwrap();
        assert_eq!(data["removed"], false);
        let data = state.run_command("typeindex unregister meeting:Meeting").await.data.unwrap();
        assert_eq!(data["removed"], true);
    }

    #[tokio::test]
    async fn test_remove_last_instance_drops_registration() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        state.run_command("typeindex add-instance as:Note /notes/1").await;
        let data = state
            .run_command("typeindex remove-instance as:Note /notes/1")
            .await
            .data
            .unwrap();
        assert_eq!(data["removed"], true);
        let data = state.run_command("typeindex show as:Note").await.data.unwrap();
        assert!(data["registrations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_typeindex_errors() {
        let mut state = ShellState::new("https://pod.example/").unwrap();
        assert_eq!(
            state.run_command("typeindex show nope:Thing").await.error_kind(),
            Some(ErrorKind::InvalidArgument)
        );
        assert_eq!(
            state.run_command("typeindex register vcard:Individual").await.error_kind(),
            Some(ErrorKind::MissingArgument)
        );
        assert_eq!(
            state.run_command("typeindex add-instance vcard:Individual ../../x%2Fy").await.error_kind(),
            Some(ErrorKind::InvalidPath)
        );
    }
}
