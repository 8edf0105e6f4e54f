//! Command-line construction for VBoxManage

use std::borrow::Cow;

use crate::escape::EscapeMode;

/// Value of a `--key` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Rendered as `--key` alone
    Flag,
    /// Rendered as `--key <escaped value>`
    Value(String),
}

/// Ordered `--key [value]` options. Setting an existing key replaces it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    entries: Vec<(String, OptionValue)>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.set(key, OptionValue::Flag);
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, OptionValue::Value(value.into()));
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: OptionValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Apply every entry of `other` on top of these options
    pub fn merge(mut self, other: CommandOptions) -> Self {
        for (key, value) in other.entries {
            self.set(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One VBoxManage call: command, positional arguments, options and
/// an optional argument list passed through after `--`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    command: String,
    args: Vec<String>,
    options: CommandOptions,
    trailing: Vec<String>,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            options: CommandOptions::new(),
            trailing: Vec::new(),
        }
    }

    /// Positional argument, rendered verbatim
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Positional argument rendered as a double-quoted string literal
    pub fn quoted(self, value: &str) -> Self {
        self.arg(quote_literal(value))
    }

    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.options.set(key, OptionValue::Flag);
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.set(key, OptionValue::Value(value.into()));
        self
    }

    pub fn options(mut self, options: CommandOptions) -> Self {
        self.options = std::mem::take(&mut self.options).merge(options);
        self
    }

    /// Arguments rendered verbatim after a `--` separator, behind the options
    pub fn trailing<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trailing.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the command or any positional argument is exactly `token`
    pub fn has_token(&self, token: &str) -> bool {
        self.command == token || self.args.iter().any(|a| a == token)
    }

    /// Render the argument list (without the executable)
    pub fn render(&self, mode: EscapeMode) -> Vec<String> {
        let mut parts = Vec::with_capacity(1 + self.args.len() + 2 * self.options.entries.len());
        parts.push(self.command.clone());
        parts.extend(self.args.iter().cloned());

        for (key, value) in self.options.iter() {
            parts.push(format!("--{}", key));
            if let OptionValue::Value(v) = value {
                parts.push(shell_word(mode, v));
            }
        }

        if !self.trailing.is_empty() {
            parts.push("--".to_string());
            parts.extend(self.trailing.iter().cloned());
        }

        parts
    }

    /// Full shell command line, starting with the executable
    pub fn command_line(&self, executable: &str, mode: EscapeMode) -> String {
        let exe = if executable.chars().any(char::is_whitespace) {
            format!("\"{}\"", executable)
        } else {
            executable.to_string()
        };

        let mut line = exe;
        for part in self.render(mode) {
            line.push(' ');
            line.push_str(&part);
        }
        line
    }
}

/// An option value as a single shell word.
///
/// POSIX escapes only hold inside double quotes, so an escaped value is
/// wrapped and `$` and backticks are escaped as well.
fn shell_word(mode: EscapeMode, value: &str) -> String {
    match (mode, mode.escape(value)) {
        (EscapeMode::Posix, Cow::Owned(escaped)) => {
            format!("\"{}\"", escaped.replace('$', "\\$").replace('`', "\\`"))
        }
        (_, escaped) => escaped.into_owned(),
    }
}

/// Render `value` as a JSON string literal (`"name"`, with `\` and `"` escaped)
pub fn quote_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
