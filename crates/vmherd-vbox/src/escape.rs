//! Platform argument escaping for shell command lines

use std::borrow::Cow;
use vmherd_util::HostPlatform;

/// How option values are escaped before they reach the host shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeMode {
    /// Backslash-escape `\` and `"`
    Posix,
    /// Wrap in double quotes, tripling embedded quotes
    Windows,
}

impl EscapeMode {
    pub fn for_platform(platform: HostPlatform) -> Self {
        match platform {
            HostPlatform::Windows => EscapeMode::Windows,
            HostPlatform::Unix => EscapeMode::Posix,
        }
    }

    /// Escape one argument. Arguments without special characters are returned as is.
    pub fn escape<'a>(&self, arg: &'a str) -> Cow<'a, str> {
        match self {
            EscapeMode::Posix => {
                if !arg.chars().any(|c| c.is_whitespace() || c == '\\' || c == '"') {
                    return Cow::Borrowed(arg);
                }
                let mut escaped = String::with_capacity(arg.len() + 4);
                for c in arg.chars() {
                    if c == '\\' || c == '"' {
                        escaped.push('\\');
                    }
                    escaped.push(c);
                }
                Cow::Owned(escaped)
            }
            EscapeMode::Windows => {
                if !arg.chars().any(|c| c.is_whitespace() || c == '"') {
                    return Cow::Borrowed(arg);
                }
                Cow::Owned(format!("\"{}\"", arg.replace('"', "\"\"\"")))
            }
        }
    }
}
