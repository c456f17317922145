//! Per-run session state.
//!
//! A [`Session`] lives for exactly one run of the suite. It holds the bearer
//! token obtained from the admin login, every value captured from earlier
//! responses, and the run/pass tally that decides the exit code.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Keyword used in `requires` for the admin bearer token.
pub const TOKEN_KEY: &str = "token";

/// A piece of session state a case needs before it can be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Token,
    Captured(String),
}

impl Requirement {
    pub fn from_key(key: &str) -> Self {
        if key == TOKEN_KEY {
            Requirement::Token
        } else {
            Requirement::Captured(key.to_string())
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Token => write!(f, "admin token"),
            Requirement::Captured(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("no captured value for `{0}`")]
    Missing(String),
}

#[derive(Debug)]
pub struct Session {
    base_url: String,
    pub token: Option<String>,
    captured: HashMap<String, Value>,
    pub tests_run: usize,
    pub tests_passed: usize,
}

impl Session {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            captured: HashMap::new(),
            tests_run: 0,
            tests_passed: 0,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn captured(&self, name: &str) -> Option<&Value> {
        self.captured.get(name)
    }

    pub fn capture(&mut self, name: impl Into<String>, value: Value) {
        self.captured.insert(name.into(), value);
    }

    /// Returns the requirements that the current state cannot satisfy, in the
    /// order they were declared.
    pub fn missing(&self, requires: &[Requirement]) -> Vec<Requirement> {
        requires
            .iter()
            .filter(|r| match r {
                Requirement::Token => self.token.is_none(),
                Requirement::Captured(name) => !self.captured.contains_key(name),
            })
            .cloned()
            .collect()
    }

    pub fn all_passed(&self) -> bool {
        self.tests_passed == self.tests_run
    }

    pub fn tests_failed(&self) -> usize {
        self.tests_run - self.tests_passed
    }

    /// Substitutes every `{name}` placeholder in `template` with the text form
    /// of the captured value.
    pub fn render_str(&self, template: &str) -> Result<String, RenderError> {
        self.render_with(template, |text| text)
    }

    /// Like [`Session::render_str`], but percent-encodes every substituted
    /// value so a captured id stays a single path segment or query value.
    pub fn render_endpoint(&self, template: &str) -> Result<String, RenderError> {
        self.render_with(template, |text| urlencoding::encode(&text).into_owned())
    }

    fn render_with(
        &self,
        template: &str,
        escape: impl Fn(String) -> String,
    ) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some((start, end)) = next_placeholder(rest) {
            let name = &rest[start + 1..end];
            let value = self
                .captured(name)
                .ok_or_else(|| RenderError::Missing(name.to_string()))?;

            out.push_str(&rest[..start]);
            out.push_str(&escape(value_as_text(value)));
            rest = &rest[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Renders placeholders inside every string of a JSON value. A string that
    /// is exactly one placeholder takes the captured value as is, so numeric
    /// ids stay numeric.
    pub fn render_value(&self, value: &Value) -> Result<Value, RenderError> {
        match value {
            Value::String(s) => {
                if let Some(name) = whole_placeholder(s) {
                    return self
                        .captured(name)
                        .cloned()
                        .ok_or_else(|| RenderError::Missing(name.to_string()));
                }
                Ok(Value::String(self.render_str(s)?))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut rendered = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    rendered.insert(k.clone(), self.render_value(v)?);
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Finds the byte offsets of the braces around the next `{identifier}`.
fn next_placeholder(s: &str) -> Option<(usize, usize)> {
    let mut search_from = 0;

    while let Some(offset) = s[search_from..].find('{') {
        let start = search_from + offset;
        let close = s[start + 1..].find('}').map(|i| start + 1 + i)?;

        if is_identifier(&s[start + 1..close]) {
            return Some((start, close));
        }
        search_from = start + 1;
    }

    None
}

fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    is_identifier(inner).then_some(inner)
}

/// Lists the placeholder names referenced by a template string.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = vec![];
    let mut rest = template;

    while let Some((start, end)) = next_placeholder(rest) {
        names.push(&rest[start + 1..end]);
        rest = &rest[end + 1..];
    }

    names
}

/// Lists the placeholder names referenced anywhere inside a JSON value.
pub fn value_placeholders(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => placeholders(s),
        Value::Array(items) => items.iter().flat_map(value_placeholders).collect(),
        Value::Object(map) => map.values().flat_map(value_placeholders).collect(),
        _ => vec![],
    }
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Looks up a dotted field path (`data.id`) in a JSON body.
pub fn lookup_path<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(body, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
