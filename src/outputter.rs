use std::fmt::Write;

use console::Style;

use crate::asserter::Outcome;
use crate::asserter::TestResult;
use crate::runner::CaseReport;
use crate::session::Session;
use crate::validator::ValidatedCase;

/// Responses longer than this are not echoed on success.
const ECHO_LIMIT: usize = 500;
const TOKEN_PREVIEW: usize = 20;

pub struct OutPutter {
    n_cases: usize,
    failed: Vec<(String, String)>,
}

impl OutPutter {
    pub fn new(n_cases: usize) -> Self {
        Self {
            n_cases,
            failed: vec![],
        }
    }

    /// Names of the failed cases with a one-line reason each.
    pub fn failed(&self) -> &[(String, String)] {
        &self.failed
    }

    pub fn start(&self, suite_name: &str, base_url: &str) {
        let style = Style::new().bold().cyan();
        println!("{}", style.apply_to(format!("🏥 {suite_name}")));
        println!("{}", "=".repeat(50));
        println!("Target: {base_url}");
        println!(
            "\n{}\n",
            style.apply_to(format!("🚀 Running {} tests...", self.n_cases))
        );
    }

    pub fn case(&mut self, index: usize, report: &CaseReport) {
        println!("{}", format_case(index, self.n_cases, report));

        if !report.passed() {
            self.failed
                .push((report.name.clone(), failure_reason(&report.outcome)));
        }
    }

    pub fn summary(&self, session: &Session) {
        println!("{}", format_summary(session, self.failed()));
    }

    /// Prints the cases without running them.
    pub fn list(cases: &[ValidatedCase], base_url: &str) {
        print!("{}", format_list(cases, base_url));
    }
}

pub fn format_list(cases: &[ValidatedCase], base_url: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Target: {base_url}");

    for (i, case) in cases.iter().enumerate() {
        let requires = if case.requires.is_empty() {
            String::new()
        } else {
            let names: Vec<String> = case.requires.iter().map(ToString::to_string).collect();
            format!(" (requires {})", names.join(", "))
        };
        let status = case
            .expected_status()
            .map(|s| s.as_u16().to_string())
            .unwrap_or_default();

        let _ = writeln!(
            out,
            "{:>3}. {} {} {} -> {}{}",
            i + 1,
            console::style(&case.name).bold(),
            case.method,
            if case.endpoint.is_empty() { "/" } else { case.endpoint.as_str() },
            status,
            console::style(requires).dim(),
        );
    }

    out
}

pub fn format_case(index: usize, n_cases: usize, report: &CaseReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{index}/{n_cases}] 🔍 Testing {}...", report.name);

    match &report.outcome {
        Outcome::Skipped(missing) => {
            let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
            let _ = write!(
                out,
                "   {} {} - No {}",
                console::style("✘").red().bold(),
                console::style("SKIPPED").red().bold(),
                names.join(" or ")
            );
            return out;
        }
        Outcome::RequestFailed(error) => {
            let _ = writeln!(out, "   URL: {}", report.url);
            let _ = write!(
                out,
                "   {} {} - Error: {}",
                console::style("✘").red().bold(),
                console::style("FAIL!").red().bold(),
                console::style(error).red()
            );
            return out;
        }
        Outcome::Completed(results) => {
            let _ = writeln!(out, "   URL: {}", report.url);
            for result in results {
                if result.status == TestResult::Fail || report.passed() {
                    let _ = writeln!(out, "   {result}");
                }
                if report.passed() {
                    // One pass line is enough.
                    break;
                }
            }
        }
    }

    if let Some(response) = &report.response {
        if report.passed() {
            let body = response.body();
            let text = body.to_string();
            if response.is_json() && body.is_object() && text.len() < ECHO_LIMIT {
                let _ = writeln!(out, "   Response: {text}");
            }
        } else {
            let error = match &response.body_json {
                Some(body) => body.to_string(),
                None => response.body_text.clone(),
            };
            let _ = writeln!(out, "   Error: {}", console::style(error).dim());
        }
    }

    if let Some(token) = &report.token_captured {
        let preview: String = token.chars().take(TOKEN_PREVIEW).collect();
        let _ = writeln!(out, "   Token obtained: {preview}...");
    }
    for (name, value) in &report.captured {
        let _ = writeln!(
            out,
            "   Captured {name}: {}",
            crate::session::value_as_text(value)
        );
    }

    out.trim_end().to_string()
}

pub fn format_summary(session: &Session, failed: &[(String, String)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", "=".repeat(50));
    let _ = writeln!(
        out,
        "📊 Test Results: {}/{} passed",
        session.tests_passed, session.tests_run
    );

    if session.all_passed() {
        let _ = write!(
            out,
            "{}",
            console::style("🎉 All tests passed!").bold().green()
        );
        return out;
    }

    let _ = writeln!(
        out,
        "{}",
        console::style(format!("⚠️  {} tests failed", session.tests_failed()))
            .bold()
            .red()
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{}",
        console::style("Summary of Failed Tests:").bold().red()
    );
    for (idx, (name, reason)) in failed.iter().enumerate() {
        let _ = writeln!(out, "  {}. {name}: {reason}", idx + 1);
    }

    out.trim_end().to_string()
}

fn failure_reason(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Skipped(missing) => {
            let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
            format!("skipped, no {}", names.join(" or "))
        }
        Outcome::RequestFailed(error) => error.clone(),
        Outcome::Completed(results) => {
            if let Some((expected, actual)) = outcome.status_mismatch() {
                return format!("expected {}, got {}", expected.as_u16(), actual.as_u16());
            }
            results
                .iter()
                .find(|r| r.status == TestResult::Fail)
                .map(|r| format!("{} failed", r.expected))
                .unwrap_or_default()
        }
    }
}
