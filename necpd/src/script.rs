//! # Command Scripts
//!
//! Scripts are line-based. Blank lines are skipped and `#` starts a comment,
//! either on its own line or after a command.
//!
//! ## Example
//!
//! ```text
//! # Drop apple.com unless an earlier policy passes it
//! policy add 10 drop domain=apple.com
//! policy apply
//! client add domain=www.apple.com
//! client result 1
//! ```

use std::collections::VecDeque;
use thiserror::Error;

use crate::commands::{ScriptCommand, ScriptCommandParser};

/// Script error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Empty script")]
    EmptyScript,
}

/// A parsed command and the line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub text: String,
    pub command: ScriptCommand,
}

/// A parsed script, consumed front to back
#[derive(Debug, Clone, Default)]
pub struct Script {
    lines: VecDeque<ScriptLine>,
}

impl Script {
    /// Parses a whole script, failing on the first bad line
    pub fn from_text(text: &str) -> Result<Self, ScriptError> {
        let mut lines = VecDeque::new();
        for (index, raw) in text.lines().enumerate() {
            let content = raw.split('#').next().unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }
            let command =
                ScriptCommandParser::parse(content).map_err(|e| ScriptError::ParseError {
                    line: index + 1,
                    message: e.to_string(),
                })?;
            lines.push_back(ScriptLine {
                line: index + 1,
                text: content.to_string(),
                command,
            });
        }

        if lines.is_empty() {
            return Err(ScriptError::EmptyScript);
        }
        Ok(Self { lines })
    }

    pub fn has_more(&self) -> bool {
        !self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Iterator for Script {
    type Item = ScriptLine;

    fn next(&mut self) -> Option<ScriptLine> {
        self.lines.pop_front()
    }
}
