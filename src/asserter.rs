use core::fmt;
use std::fmt::Display;

use reqwest::StatusCode;
use serde_json::Value;

use crate::runner::CapturedResponse;
use crate::session;
use crate::session::Requirement;
use crate::validator::Assertion;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TestResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone)]
pub struct AssertResult {
    pub status: TestResult,
    pub expected: Assertion,
    pub actual: Actual,
}

#[derive(Debug, Clone)]
pub enum Actual {
    Status(StatusCode),
    Field(Option<Value>),
}

/// How a single case ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The request went out and a response came back.
    Completed(Vec<AssertResult>),
    /// Network error, timeout, or a request that could not be built.
    RequestFailed(String),
    /// Required session state was absent; nothing was sent.
    Skipped(Vec<Requirement>),
}

impl Outcome {
    pub fn passed(&self) -> bool {
        match self {
            Outcome::Completed(results) => results.iter().all(|r| r.status == TestResult::Pass),
            Outcome::RequestFailed(_) | Outcome::Skipped(_) => false,
        }
    }

    pub fn status_mismatch(&self) -> Option<(StatusCode, StatusCode)> {
        let Outcome::Completed(results) = self else {
            return None;
        };

        results.iter().find_map(|r| match (&r.status, &r.expected, &r.actual) {
            (TestResult::Fail, Assertion::Status(expected), Actual::Status(actual)) => {
                Some((*expected, *actual))
            }
            _ => None,
        })
    }
}

impl Display for AssertResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.expected, &self.actual) {
            (TestResult::Pass, _, actual) => {
                write!(
                    f,
                    "{} {} - {}",
                    console::style("✔").green().bold(),
                    console::style("PASS!").green().bold(),
                    actual
                )
            }

            (TestResult::Fail, Assertion::Status(exp), Actual::Status(act)) => {
                write!(
                    f,
                    "{} {} - Expected {}, got {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                    console::style(exp.as_u16()).green(),
                    console::style(act.as_u16()).red(),
                )
            }

            (TestResult::Fail, Assertion::Field { path, expected }, Actual::Field(got)) => {
                write!(
                    f,
                    "{} {} - Field `{}`: expected {}, got {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                    path,
                    console::style(expected).green(),
                    match got {
                        Some(value) => console::style(value.to_string()).red(),
                        None => console::style("<missing>".to_string()).red().bold(),
                    }
                )
            }

            _ => {
                write!(
                    f,
                    "{} {} (unhandled combination)",
                    console::style("⚠").yellow(),
                    console::style("UNKNOWN RESULT").yellow().bold()
                )
            }
        }
    }
}

impl Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Status(status) => write!(f, "Status {}", status.as_u16()),
            Assertion::Field { path, expected } => write!(f, "Field `{path}` == {expected}"),
        }
    }
}

impl Display for Actual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actual::Status(status_code) => write!(f, "Status: {}", status_code.as_u16()),
            Actual::Field(Some(value)) => write!(f, "Field: {value}"),
            Actual::Field(None) => write!(f, "Field missing"),
        }
    }
}

/// Checks every assertion against the response. Assertions are expected to
/// be fully rendered already.
pub fn check(assertions: &[Assertion], response: &CapturedResponse) -> Vec<AssertResult> {
    assertions
        .iter()
        .map(|a| match a {
            Assertion::Status(expected) => AssertResult {
                status: assert_status(*expected, response.status),
                expected: a.clone(),
                actual: Actual::Status(response.status),
            },
            Assertion::Field { path, expected } => {
                let got = response
                    .body_json
                    .as_ref()
                    .and_then(|body| session::lookup_path(body, path));

                AssertResult {
                    status: assert_field(expected, got),
                    expected: a.clone(),
                    actual: Actual::Field(got.cloned()),
                }
            }
        })
        .collect()
}

fn assert_status(expected: StatusCode, status: StatusCode) -> TestResult {
    if expected != status {
        return TestResult::Fail;
    }

    TestResult::Pass
}

fn assert_field(expected: &Value, got: Option<&Value>) -> TestResult {
    match got {
        Some(got) if got == expected => TestResult::Pass,
        _ => TestResult::Fail,
    }
}
