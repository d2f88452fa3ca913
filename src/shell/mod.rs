pub mod args;
pub mod commands;
pub mod completion;
pub mod output;

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CommandError, CommandResult, ErrorKind};
use crate::pod::{PodRequest, PodResponse, ResourceStore, VirtualPod};
use crate::registry::TypeRegistry;
use crate::store::{Store, StoreEvent, Table};
use crate::vfs::path::{is_container, normalize_root};
use crate::vfs::{ResolvedPath, resolve_path};
use args::{extract_json_flag, tokenize};
use commands::Command;
pub use completion::{CompletionCache, ShellCompleter};
pub use output::{CaptureOutput, Output, StdoutOutput};

/// Per-invocation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Render the whole result as JSON
    pub json: bool,
    /// Suppress all output; the caller only wants the result
    pub silent: bool,
}

impl ExecOptions {
    pub fn silent() -> Self {
        ExecOptions {
            json: false,
            silent: true,
        }
    }
}

/// Shell state - tracks current location and provides command execution
pub struct ShellState {
    /// Current container locator
    current: String,
    /// Fixed root every locator lives under
    root: String,
    /// Typed tables
    store: Store,
    /// Resource CRUD backend
    pod: Arc<dyn ResourceStore>,
    /// Type registry over the same store
    registry: Arc<TypeRegistry>,
    /// Where rendered results go
    output: Arc<dyn Output>,
    /// Tab completion cache
    completion_cache: CompletionCache,
    /// Registered commands, by lowercase name
    commands: BTreeMap<String, Arc<dyn Command>>,
    /// Nesting of `script run`
    script_depth: usize,
}

impl ShellState {
    /// Create a shell over a fresh in-memory pod
    pub fn new(root: &str) -> Result<Self> {
        Self::with_output(root, Arc::new(StdoutOutput))
    }

    /// Create a shell over a fresh in-memory pod with a custom output
    pub fn with_output(root: &str, output: Arc<dyn Output>) -> Result<Self> {
        let root = normalize_root(root)?;
        let store = Store::new();
        let pod: Arc<dyn ResourceStore> = Arc::new(VirtualPod::new(store.clone(), &root));
        let mut state = Self::from_components(store, pod, output);
        state.register_builtin_commands();
        Ok(state)
    }

    /// Create a shell from components without registering any command
    pub fn from_components(
        store: Store,
        pod: Arc<dyn ResourceStore>,
        output: Arc<dyn Output>,
    ) -> Self {
        let root = pod.root().to_string();
        let registry = Arc::new(TypeRegistry::new(store.clone(), &root));
        let completion_cache = CompletionCache::new(Arc::clone(&pod));

        let cache = completion_cache.clone();
        store.subscribe(Arc::new(move |event: &StoreEvent| {
            if event.table == Table::Resource {
                cache.invalidate();
            }
        }));

        ShellState {
            current: root.clone(),
            root,
            store,
            pod,
            registry,
            output,
            completion_cache,
            commands: BTreeMap::new(),
            script_depth: 0,
        }
    }

    fn register_builtin_commands(&mut self) {
        for command in commands::builtin() {
            self.register_command(command);
        }
    }

    /// Register a command under its lowercase name
    pub fn register_command(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_lowercase();
        self.completion_cache.add_command(&name);
        self.commands.insert(name, command);
    }

    /// Execute a command line, rendering the result
    pub async fn execute(&mut self, line: &str) -> CommandResult {
        self.execute_with(line, ExecOptions::default()).await
    }

    /// Execute a command line for a programmatic caller; nothing is rendered
    pub async fn run_command(&mut self, line: &str) -> CommandResult {
        self.execute_with(line, ExecOptions::silent()).await
    }

    /// Execute a command line.
    ///
    /// Total over all inputs: every failure, including unknown commands,
    /// validation errors, handler errors and malformed handler results, comes
    /// back as a failed [`CommandResult`].
    pub async fn execute_with(&mut self, line: &str, options: ExecOptions) -> CommandResult {
        let tokens = tokenize(line);
        if tokens.is_empty() {
            return CommandResult::ok().message("");
        }

        let name = tokens[0].to_lowercase();
        let Some(command) = self.commands.get(&name).cloned() else {
            let error = CommandError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "Unknown command: {}. Type 'help' to list available commands.",
                    tokens[0]
                ),
            );
            return self.fail(error, &options);
        };

        let mut options = options;
        let mut args = tokens[1..].to_vec();
        if command.supports_json() {
            let (rest, json) = extract_json_flag(args);
            args = rest;
            if let Some(json) = json {
                options.json = json;
            }
        }

        if let Some(error) = command.validate(&args) {
            return self.fail(error, &options);
        }

        debug!(command = %name, ?args, "dispatching command");
        let result = match command.execute(self, &args, &options).await {
            Ok(None) => CommandResult::ok(),
            Ok(Some(result)) if result.is_well_formed() => result,
            Ok(Some(_)) => CommandResult::failure(CommandError::operation_failed(format!(
                "{name} reported a failure without an error"
            ))),
            Err(e) => match e.downcast::<CommandError>() {
                Ok(error) => CommandResult::failure(error),
                Err(e) => CommandResult::failure(CommandError::operation_failed(e.to_string())),
            },
        };

        if let Some(error) = &result.error {
            debug!(command = %name, code = %error.code, "command failed: {}", error.message);
        }
        self.report(command.as_ref(), &result, &options);
        result
    }

    fn fail(&self, error: CommandError, options: &ExecOptions) -> CommandResult {
        let result = CommandResult::failure(error);
        if !options.silent {
            if options.json {
                self.emit_json(&result);
            }
            if let Some(error) = &result.error {
                self.output.error(&error.message);
            }
        }
        result
    }

    /// Render a finished result through the output side-channel
    fn report(&self, command: &dyn Command, result: &CommandResult, options: &ExecOptions) {
        if options.silent {
            return;
        }
        if options.json {
            self.emit_json(result);
        } else if result.success {
            if let Some(message) = result.message.as_deref().filter(|m| !m.is_empty()) {
                self.output.line(message);
            }
            if let Some(data) = &result.data {
                for line in command.render(data) {
                    self.output.line(&line);
                }
            }
        }
        if let Some(error) = &result.error {
            self.output.error(&error.message);
        }
    }

    fn emit_json(&self, result: &CommandResult) {
        match serde_json::to_string_pretty(result) {
            Ok(text) => self.output.line(&text),
            Err(e) => warn!(error = %e, "failed to serialize result"),
        }
    }

    /// Resolve a user path against the current location
    pub fn resolve(&self, input: &str) -> Result<ResolvedPath, CommandError> {
        resolve_path(&self.current, input, &self.root)
    }

    /// Send a request to the pod
    pub fn request(&self, request: PodRequest) -> PodResponse {
        self.pod.handle(request)
    }

    /// Find the stored locator for a resolved path.
    ///
    /// `docs` finds the container `docs/` when no leaf of that name exists.
    pub fn locate(&self, resolved: &ResolvedPath) -> Option<String> {
        if self.request(PodRequest::get(&resolved.url)).is_success() {
            return Some(resolved.url.clone());
        }
        if !is_container(&resolved.url) {
            let container = format!("{}/", resolved.url);
            if self.request(PodRequest::get(&container)).is_success() {
                return Some(container);
            }
        }
        None
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Move to another container
    pub fn set_current(&mut self, url: &str) {
        self.current = url.to_string();
        self.completion_cache.set_current(url);
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn completion_cache(&self) -> &CompletionCache {
        &self.completion_cache
    }

    /// Registered commands, sorted by name
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        self.commands.values().cloned().collect()
    }

    pub fn command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_lowercase()).cloned()
    }

    pub(crate) fn script_depth(&self) -> usize {
        self.script_depth
    }

    pub(crate) fn enter_script(&mut self) {
        self.script_depth += 1;
    }

    pub(crate) fn leave_script(&mut self) {
        self.script_depth = self.script_depth.saturating_sub(1);
    }

    /// Prompt shown by the interactive shell
    pub fn prompt(&self) -> String {
        let path = self.current.strip_prefix(&self.root).unwrap_or(&self.current);
        format!("podsh:/{path} $ ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ROOT: &str = "https://pod.example/";

    /// Test command whose behavior is picked by its first argument
    struct Probe {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Command for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn usage(&self) -> &str {
            "probe MODE"
        }

        fn description(&self) -> &str {
            "Exercise the executor"
        }

        fn supports_json(&self) -> bool {
            true
        }

        fn validate(&self, args: &[String]) -> Option<CommandError> {
            (args.first().map(String::as_str) == Some("invalid"))
                .then(|| CommandError::new(ErrorKind::InvalidArgument, "rejected early"))
        }

        async fn execute(
            &self,
            _state: &mut ShellState,
            args: &[String],
            _options: &ExecOptions,
        ) -> Result<Option<CommandResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match args.first().map(String::as_str) {
                Some("nothing") => Ok(None),
                Some("malformed") => Ok(Some(CommandResult {
                    success: false,
                    data: None,
                    message: None,
                    error: None,
                })),
                Some("throw") => Err(anyhow::anyhow!("boom")),
                Some("typed") => Err(CommandError::new(ErrorKind::NotSupported, "nope").into()),
                _ => Ok(Some(CommandResult::with_data(json!({"args": args})))),
            }
        }

        fn render(&self, data: &Value) -> Vec<String> {
            vec![data["args"].to_string()]
        }
    }

    fn shell() -> (ShellState, CaptureOutput, Arc<AtomicUsize>) {
        let output = CaptureOutput::new();
        let mut state = ShellState::with_output(ROOT, Arc::new(output.clone())).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        state.register_command(Arc::new(Probe {
            calls: Arc::clone(&calls),
        }));
        (state, output, calls)
    }

    #[tokio::test]
    async fn test_empty_line_is_silent_success() {
        let (mut state, output, calls) = shell();
        for line in ["", "   ", "\t \n"] {
            let result = state.execute(line).await;
            assert!(result.success);
            assert_eq!(result.message.as_deref(), Some(""));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (mut state, output, _) = shell();
        let result = state.execute("frobnicate now").await;
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
        assert!(result.error.unwrap().message.contains("help"));
        assert_eq!(output.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_command_name_is_case_insensitive() {
        let (mut state, _, calls) = shell();
        assert!(state.run_command("PROBE ok").await.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_json_flag_is_stripped() {
        let (mut state, output, _) = shell();
        let result = state.execute("probe a --json b").await;
        assert_eq!(result.data, Some(json!({"args": ["a", "b"]})));
        let printed: Value = serde_json::from_str(&output.lines()[0]).unwrap();
        assert_eq!(printed["success"], true);

        let result = state.execute("probe a --json=false").await;
        assert_eq!(result.data, Some(json!({"args": ["a"]})));
        assert_eq!(output.lines().last().map(String::as_str), Some(r#"["a"]"#));
    }

    #[tokio::test]
    async fn test_validation_short_circuits() {
        let (mut state, _, calls) = shell();
        let result = state.run_command("probe invalid").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_coercion() {
        let (mut state, _, _) = shell();

        let result = state.run_command("probe nothing").await;
        assert!(result.success);
        assert!(result.data.is_none());

        let result = state.run_command("probe malformed").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::OperationFailed));

        let result = state.run_command("probe throw").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::OperationFailed));
        assert_eq!(result.error.unwrap().message, "boom");

        let result = state.run_command("probe typed").await;
        assert_eq!(result.error_kind(), Some(ErrorKind::NotSupported));
    }

    #[tokio::test]
    async fn test_silent_never_writes() {
        let (mut state, output, _) = shell();
        state.run_command("probe throw").await;
        state.run_command("nope").await;
        state.run_command("probe ok").await;
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_tracks_location() {
        let (mut state, _, _) = shell();
        assert_eq!(state.prompt(), "podsh:/ $ ");
        state.set_current("https://pod.example/docs/");
        assert_eq!(state.prompt(), "podsh:/docs/ $ ");
    }

    #[test]
    fn test_rejects_bad_root() {
        assert!(ShellState::new("").is_err());
        assert!(ShellState::new("not a url").is_err());
    }
}
