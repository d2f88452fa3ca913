//! Command-line tokenizing and flag parsing.
//!
//! Lines are split on whitespace only; there is no quoting. Long flags are
//! `--key`, `--key=value` or `--key value`; `-x` is a boolean short flag and
//! `-lr` sets both `l` and `r`.

use std::collections::BTreeMap;

/// Split a command line on whitespace.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "" | "true" | "1" | "yes" | "on"
    )
}

/// Pull `--json`, `-j` or `--json=<value>` out of `tokens`.
///
/// Returns the remaining tokens and the requested JSON mode, `None` when no
/// JSON flag was present.
pub fn extract_json_flag(tokens: Vec<String>) -> (Vec<String>, Option<bool>) {
    let mut json = None;
    let rest = tokens
        .into_iter()
        .filter(|token| {
            if token == "--json" || token == "-j" {
                json = Some(true);
                return false;
            }
            if let Some(value) = token.strip_prefix("--json=") {
                json = Some(is_truthy(value));
                return false;
            }
            true
        })
        .collect();
    (rest, json)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Bool(bool),
    Str(String),
}

/// Positional arguments and flags of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    pub positional: Vec<String>,
    pub flags: BTreeMap<String, FlagValue>,
}

impl ParsedArgs {
    /// Parse tokens. Long flags listed in `boolean` never consume the next token.
    pub fn parse(tokens: &[String], boolean: &[&str]) -> Self {
        let mut parsed = ParsedArgs::default();
        let mut iter = tokens.iter().peekable();
        let mut flags_done = false;

        while let Some(token) = iter.next() {
            if flags_done {
                parsed.positional.push(token.clone());
                continue;
            }
            if token == "--" {
                flags_done = true;
                continue;
            }
            if let Some(long) = token.strip_prefix("--") {
                if let Some((key, value)) = long.split_once('=') {
                    parsed
                        .flags
                        .insert(key.to_string(), FlagValue::Str(value.to_string()));
                    continue;
                }
                let takes_value = !boolean.contains(&long)
                    && iter.peek().is_some_and(|next| !next.starts_with('-'));
                let value = match iter.next_if(|_| takes_value) {
                    Some(next) => FlagValue::Str(next.clone()),
                    None => FlagValue::Bool(true),
                };
                parsed.flags.insert(long.to_string(), value);
                continue;
            }
            if let Some(short) = token.strip_prefix('-')
                && !short.is_empty()
            {
                for c in short.chars() {
                    parsed.flags.insert(c.to_string(), FlagValue::Bool(true));
                }
                continue;
            }
            parsed.positional.push(token.clone());
        }
        parsed
    }

    /// Whether a flag is present and not explicitly false.
    pub fn flag(&self, name: &str) -> bool {
        match self.flags.get(name) {
            Some(FlagValue::Bool(b)) => *b,
            Some(FlagValue::Str(s)) => is_truthy(s),
            None => false,
        }
    }

    /// Either spelling of a flag, e.g. `-r` / `--recursive`.
    pub fn any_flag(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.flag(n))
    }

    /// String value of a flag.
    pub fn value(&self, name: &str) -> Option<&str> {
        match self.flags.get(name) {
            Some(FlagValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// Positional arguments from `index` on, joined by single spaces.
    pub fn rest(&self, index: usize) -> String {
        self.positional
            .get(index..)
            .map(|s| s.join(" "))
            .unwrap_or_default()
    }
}
