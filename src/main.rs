#![allow(clippy::result_large_err)]

use std::process::ExitCode;

use clap::Parser;
use miette::Diagnostic;
use miette::Result;
use thiserror::Error;
use tracing::info;

use crate::cli::Cli;
use crate::outputter::OutPutter;
use crate::parser::BUILTIN_SUITE;
use crate::parser::BUILTIN_SUITE_NAME;
use crate::parser::Suite;
use crate::runner::Runner;
use crate::session::Session;
use crate::validator::EnvSetup;
use crate::validator::IR;
use crate::validator::ValidationError;
use crate::validator::Validator;

mod asserter;
mod cli;
#[cfg(test)]
mod fake_backend;
mod logging;
mod outputter;
mod parser;
mod runner;
mod session;
mod validator;

#[derive(Error, Debug, Diagnostic)]
pub enum ConformanceError {
    #[error("Failed to read suite file")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse suite file: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ValidationError(#[from] ValidationError),

    #[error("Failed to build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Loads the suite and validates it.
///
/// The suite comes from `--path` when given, otherwise from the copy embedded
/// in the binary. `--base-url` and `--timeout` replace the matching `setup`
/// values before validation, so overrides are checked like everything else.
///
/// # Errors
/// Returns a `ConformanceError` if the file cannot be read, the TOML fails to
/// parse, or validation fails.
fn load_and_validate_config(cli: &Cli) -> Result<(IR, EnvSetup), ConformanceError> {
    let (contents, file_name) = match &cli.path {
        Some(path) => (
            std::fs::read_to_string(path).map_err(ConformanceError::FileError)?,
            path.clone(),
        ),
        None => (BUILTIN_SUITE.to_string(), BUILTIN_SUITE_NAME.to_string()),
    };

    let mut suite: Suite = toml::from_str(&contents).map_err(ConformanceError::TomlParsing)?;

    if let Some(base_url) = &cli.base_url {
        suite.setup.base_url = base_url.clone();
    }
    if let Some(timeout) = cli.timeout {
        suite.setup.timeout_secs = Some(timeout);
    }

    let (ir, setup) = Validator::new(&suite, &contents, &file_name)
        .validate()
        .map_err(ConformanceError::ValidationError)?;

    Ok((ir, setup))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let (ir, setup) = load_and_validate_config(&cli)?;

    if cli.list {
        OutPutter::list(&ir.cases, &setup.base_url);
        return Ok(ExitCode::SUCCESS);
    }

    let runner = Runner::new(setup.timeout, ir.global_headers.clone())
        .map_err(ConformanceError::HttpClient)?;
    let mut session = Session::new(setup.base_url.clone());
    let mut out = OutPutter::new(ir.cases.len());

    out.start(&setup.name, session.base_url());
    runner.run_suite(&ir.cases, &mut session, &mut out).await;
    out.summary(&session);

    info!(
        run = session.tests_run,
        passed = session.tests_passed,
        "suite finished"
    );

    if session.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
