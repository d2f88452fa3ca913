use rustyline::Context;
use rustyline::completion::{Completer, Pair};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::pod::{PodRequest, ResourceStore};
use crate::vfs::{encode_segment, resolve_path};

/// Entry in completion cache with metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Cache of available completions, keyed by container locator
#[derive(Clone)]
pub struct CompletionCache {
    entries: Arc<RwLock<HashMap<String, Vec<CompletionEntry>>>>,
    commands: Arc<RwLock<Vec<String>>>,
    current: Arc<RwLock<String>>,
    pod: Arc<dyn ResourceStore>,
}

impl CompletionCache {
    pub fn new(pod: Arc<dyn ResourceStore>) -> Self {
        let root = pod.root().to_string();
        CompletionCache {
            entries: Arc::new(RwLock::new(HashMap::new())),
            commands: Arc::new(RwLock::new(vec!["exit".to_string(), "quit".to_string()])),
            current: Arc::new(RwLock::new(root)),
            pod,
        }
    }

    /// Add a command name to complete at the start of a line
    pub fn add_command(&self, name: &str) {
        if let Ok(mut commands) = self.commands.write() {
            if !commands.iter().any(|c| c == name) {
                commands.push(name.to_string());
                commands.sort();
            }
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.read().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn set_current(&self, url: &str) {
        if let Ok(mut current) = self.current.write() {
            *current = url.to_string();
        }
    }

    pub fn current(&self) -> String {
        self.current
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|_| self.pod.root().to_string())
    }

    /// Drop every cached listing (called when the pod changes)
    pub fn invalidate(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Children of a container, from cache or fetched from the pod
    pub fn entries_for(&self, container: &str) -> Vec<CompletionEntry> {
        if let Some(cached) = self
            .entries
            .read()
            .ok()
            .and_then(|cache| cache.get(container).cloned())
        {
            return cached;
        }

        let response = self.pod.handle(PodRequest::get(container));
        let entries: Vec<CompletionEntry> = response
            .listing()
            .map(|children| {
                children
                    .iter()
                    .map(|child| CompletionEntry {
                        name: child.name.clone(),
                        is_dir: child.kind.is_container(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Ok(mut cache) = self.entries.write() {
            cache.insert(container.to_string(), entries.clone());
        }
        entries
    }
}

/// Tab completion helper for the shell
pub struct ShellCompleter {
    cache: CompletionCache,
}

impl ShellCompleter {
    pub fn new(cache: CompletionCache) -> Self {
        ShellCompleter { cache }
    }

    fn complete_command(&self, prefix: &str) -> Vec<Pair> {
        self.cache
            .commands()
            .into_iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd,
            })
            .collect()
    }

    /// Complete the last path argument; `cd` only offers containers.
    /// Replacements are percent-encoded so they survive whitespace tokenizing.
    fn complete_path(&self, path: &str, command: &str) -> Vec<Pair> {
        let (dir_path, name_prefix) = match path.rfind('/') {
            Some(pos) => path.split_at(pos + 1),
            None => ("", path),
        };

        let current = self.cache.current();
        let root = self.cache.pod.root().to_string();
        let Ok(resolved) = resolve_path(&current, dir_path, &root) else {
            return Vec::new();
        };
        if !resolved.is_container {
            return Vec::new();
        }

        self.cache
            .entries_for(&resolved.url)
            .into_iter()
            .filter(|entry| entry.name.starts_with(name_prefix))
            .filter(|entry| command != "cd" || entry.is_dir)
            .map(|entry| {
                let suffix = if entry.is_dir { "/" } else { "" };
                Pair {
                    display: format!("{}{suffix}", entry.name),
                    replacement: format!("{dir_path}{}{suffix}", encode_segment(&entry.name)),
                }
            })
            .collect()
    }
}

impl Completer for ShellCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        let words: Vec<&str> = line.split_whitespace().collect();

        if words.is_empty() {
            return Ok((0, Vec::new()));
        }

        // First word: complete command names
        if words.len() == 1 && !line.ends_with(char::is_whitespace) {
            let start = line.len() - words[0].len();
            return Ok((start, self.complete_command(words[0])));
        }

        let command = words[0];
        let path = if line.ends_with(char::is_whitespace) {
            ""
        } else {
            words.last().copied().unwrap_or("")
        };
        if path.starts_with('-') {
            return Ok((pos, Vec::new()));
        }

        Ok((pos - path.len(), self.complete_path(path, command)))
    }
}

impl rustyline::Helper for ShellCompleter {}
impl rustyline::highlight::Highlighter for ShellCompleter {}
impl rustyline::hint::Hinter for ShellCompleter {
    type Hint = String;
}
impl rustyline::validate::Validator for ShellCompleter {}
