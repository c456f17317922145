use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::header::HeaderMap;
use serde_json::Value;
use thiserror::Error;

mod parse_headers;

use crate::parser;
use crate::parser::Suite;
use crate::session;
use crate::session::Requirement;

const BASE_URL_ENDS_WITH: &str =
    "The base URL can't end with a /, and endpoints in tests must not start with one";
const ENDPOINT_LEADING_SLASH: &str =
    "The endpoint of a test is relative to the base URL and can't begin with a /.";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct Validator {
    suite: Suite,
    toml_src: String,
    file_name: String,
}

#[derive(Debug, Clone)]
pub enum Assertion {
    Status(StatusCode),
    Field { path: String, expected: Value },
}

/// A value copied from a passing response into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub path: String,
}

#[derive(Debug)]
pub struct EnvSetup {
    pub name: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct IR {
    pub global_headers: HeaderMap,
    pub cases: Vec<ValidatedCase>,
}

#[derive(Debug, Clone)]
pub struct ValidatedCase {
    pub name: String,
    pub method: Method,
    pub endpoint: String,
    pub requires: Vec<Requirement>,
    /// `Some` when the case supplied its own header table. Its presence alone
    /// stops the bearer token from being attached.
    pub headers: Option<HeaderMap>,
    pub body: Option<Value>,
    pub without_token: bool,
    pub captures: Vec<Capture>,
    pub capture_token: Option<String>,
    pub assertions: Vec<Assertion>,
}

impl ValidatedCase {
    pub fn expected_status(&self) -> Option<StatusCode> {
        self.assertions.iter().find_map(|a| match a {
            Assertion::Status(status) => Some(*status),
            _ => None,
        })
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid field `{field}`: {message}")]
pub struct ValidationError {
    field: String,
    message: String,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("invalid value here")]
    span: Option<SourceSpan>,
}

macro_rules! validation_err {
    ($field:expr, $msg:expr, $self:expr, $snippet:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
            src: Some(NamedSource::new(
                $self.file_name.clone(),
                $self.toml_src.clone(),
            )),
            span: find_span($snippet, &$self.toml_src),
        }
    };
}

impl Validator {
    pub fn new(suite: &Suite, toml_src: &str, file_name: &str) -> Self {
        Self {
            suite: suite.clone(),
            toml_src: toml_src.into(),
            file_name: file_name.into(),
        }
    }

    pub fn validate(&self) -> miette::Result<(IR, EnvSetup), ValidationError> {
        let setup = self.validate_setup()?;
        let ir = self.validate_cases(&setup.base_url)?;

        Ok((ir, setup))
    }

    fn src(&self) -> (String, String) {
        (self.file_name.clone(), self.toml_src.clone())
    }

    fn validate_setup(&self) -> Result<EnvSetup, ValidationError> {
        let setup = &self.suite.setup;

        if setup.base_url.ends_with('/') {
            return Err(validation_err!(
                "setup.base_url",
                BASE_URL_ENDS_WITH,
                self,
                &setup.base_url
            ));
        }

        let url = Url::parse(&setup.base_url).map_err(|e| {
            validation_err!(
                "setup.base_url",
                format!("Failed to parse URL: {e}"),
                self,
                &setup.base_url
            )
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(validation_err!(
                "setup.base_url",
                format!("Unsupported scheme `{}`, expected http or https", url.scheme()),
                self,
                &setup.base_url
            ));
        }

        let timeout_secs = setup.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(validation_err!(
                "setup.timeout_secs",
                "The request timeout must be at least one second",
                self,
                "timeout_secs"
            ));
        }

        Ok(EnvSetup {
            name: setup
                .name
                .clone()
                .unwrap_or_else(|| "API Conformance Suite".into()),
            base_url: setup.base_url.clone(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn validate_cases(&self, base_url: &str) -> Result<IR, ValidationError> {
        let src = self.src();

        let global_headers = match &self.suite.global.headers {
            Some(value) => parse_headers::parse_header_map(value, Some(&src))?,
            None => HeaderMap::new(),
        };

        // Names captured by the cases validated so far.
        let mut available: HashSet<String> = HashSet::new();
        let mut cases = Vec::with_capacity(self.suite.tests.len());

        for test in &self.suite.tests {
            let case = self.create_case(test, base_url, &available, &src)?;
            available.extend(case.captures.iter().map(|c| c.name.clone()));
            cases.push(case);
        }

        Ok(IR {
            global_headers,
            cases,
        })
    }

    fn create_case(
        &self,
        test: &parser::Test,
        base_url: &str,
        available: &HashSet<String>,
        src: &(String, String),
    ) -> Result<ValidatedCase, ValidationError> {
        let method = parse_method(&test.method.to_uppercase()).map_err(|e| {
            validation_err!(format!("{} - method", test.name), e, self, &test.method)
        })?;

        let expected_status = parse_status(test.assert_status).map_err(|e| {
            validation_err!(
                format!("{} - assert_status", test.name),
                e,
                self,
                &test.assert_status.to_string()
            )
        })?;

        let requires = self.create_requires(test, available)?;
        let captured_requires: Vec<&str> = requires
            .iter()
            .filter_map(|r| match r {
                Requirement::Captured(name) => Some(name.as_str()),
                Requirement::Token => None,
            })
            .collect();

        if test.without_token && requires.contains(&Requirement::Token) {
            return Err(validation_err!(
                format!("{} - requires", test.name),
                "A case that runs without the token can't also require it",
                self,
                session::TOKEN_KEY
            ));
        }

        // Every placeholder has to be backed by a captured requirement.
        let mut referenced: Vec<&str> = session::placeholders(&test.endpoint);
        if let Some(body) = &test.body {
            referenced.extend(session::value_placeholders(body));
        }
        for expected in test.assert_fields.values() {
            referenced.extend(session::value_placeholders(expected));
        }
        if let Some(name) = referenced
            .iter()
            .find(|name| !captured_requires.contains(*name))
        {
            return Err(validation_err!(
                format!("{} - placeholder", test.name),
                format!("`{{{name}}}` is used but `{name}` is not listed in requires"),
                self,
                &format!("{{{name}}}")
            ));
        }

        if test.endpoint.starts_with('/') {
            return Err(validation_err!(
                format!("{} - endpoint", test.name),
                ENDPOINT_LEADING_SLASH,
                self,
                &test.endpoint
            ));
        }
        probe_url(base_url, &test.endpoint).map_err(|e| {
            validation_err!(
                format!("{} - endpoint", test.name),
                format!("Failed to parse URL: {e}"),
                self,
                &test.endpoint
            )
        })?;

        let headers = match &test.headers {
            Some(value) => Some(parse_headers::parse_header_map(value, Some(src))?),
            None => None,
        };

        let mut captures = Vec::with_capacity(test.capture.len());
        for (name, path) in &test.capture {
            if !session::is_identifier(name) || name == session::TOKEN_KEY {
                return Err(validation_err!(
                    format!("{} - capture", test.name),
                    format!("`{name}` can't be used as a capture name"),
                    self,
                    name
                ));
            }
            if path.is_empty() {
                return Err(validation_err!(
                    format!("{} - capture", test.name),
                    format!("The field path captured as `{name}` is empty"),
                    self,
                    name
                ));
            }
            captures.push(Capture {
                name: name.clone(),
                path: path.clone(),
            });
        }

        if test.capture_token.as_deref() == Some("") {
            return Err(validation_err!(
                format!("{} - capture_token", test.name),
                "The field path of the token is empty",
                self,
                "capture_token"
            ));
        }

        let mut assertions = vec![Assertion::Status(expected_status)];
        for (path, expected) in &test.assert_fields {
            assertions.push(Assertion::Field {
                path: path.clone(),
                expected: expected.clone(),
            });
        }

        Ok(ValidatedCase {
            name: test.name.clone(),
            method,
            endpoint: test.endpoint.clone(),
            requires,
            headers,
            body: test.body.clone(),
            without_token: test.without_token,
            captures,
            capture_token: test.capture_token.clone(),
            assertions,
        })
    }

    fn create_requires(
        &self,
        test: &parser::Test,
        available: &HashSet<String>,
    ) -> Result<Vec<Requirement>, ValidationError> {
        test.requires
            .iter()
            .map(|key| {
                if key != session::TOKEN_KEY && !session::is_identifier(key) {
                    return Err(validation_err!(
                        format!("{} - requires", test.name),
                        format!("`{key}` is not a valid requirement name"),
                        self,
                        key
                    ));
                }

                let requirement = Requirement::from_key(key);
                if let Requirement::Captured(name) = &requirement
                    && !available.contains(name)
                {
                    return Err(validation_err!(
                        format!("{} - requires", test.name),
                        format!("`{name}` is required but no earlier case captures it"),
                        self,
                        key
                    ));
                }

                Ok(requirement)
            })
            .collect()
    }
}

/// Joins a base URL and a relative endpoint the way the runner does.
pub fn join_url(base_url: &str, endpoint: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{base_url}/{endpoint}"))
}

/// Parses the endpoint with every placeholder stood in for by a dummy id.
fn probe_url(base_url: &str, endpoint: &str) -> Result<Url, url::ParseError> {
    let mut probe = endpoint.to_string();
    for name in session::placeholders(endpoint) {
        probe = probe.replace(&format!("{{{name}}}"), "0");
    }
    join_url(base_url, &probe)
}

fn parse_method(method: &str) -> Result<Method, String> {
    let method = Method::from_str(method).map_err(|e| e.to_string())?;

    if !matches!(method, Method::GET | Method::POST | Method::PUT) {
        return Err(format!(
            "Unsupported HTTP method: {method}, expected GET, POST or PUT"
        ));
    }

    Ok(method)
}

fn parse_status(status: i32) -> Result<StatusCode, String> {
    u16::try_from(status)
        .ok()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .ok_or_else(|| format!("{status} is not a valid HTTP status code"))
}

fn find_span(needle: &str, toml_src: &str) -> Option<SourceSpan> {
    let pattern = format!("\"{needle}\"");
    match toml_src.find(&pattern) {
        Some(start) => Some(SourceSpan::new((start + 1).into(), needle.len())),
        None => toml_src
            .find(needle)
            .map(|start| SourceSpan::new(start.into(), needle.len())),
    }
}
