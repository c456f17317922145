use clap::Parser;

/// Sequential conformance checks against a TeleCareZone backend
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suite file to run instead of the built-in TeleCareZone suite
    #[arg(short, long)]
    pub path: Option<String>,

    /// Base URL of the API, overriding `setup.base_url` (no trailing /)
    #[arg(long, env = "TCZ_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds, overriding `setup.timeout_secs`
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Validate the suite and print its cases without sending requests
    #[arg(long)]
    pub list: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
