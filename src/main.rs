use clap::Parser;
use enroll::config::CliOverrides;
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "enroll")]
#[command(version, about = "Resumable bulk enrollment of contacts into a messaging group")]
pub struct Cli {
    /// Display name of the group to add participants to
    pub group: String,

    /// Newline-delimited file of phone numbers
    pub roster: PathBuf,

    /// Directory for progress, manual selections and batch files [default: .enroll]
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Path to enroll.toml. Defaults to <state-dir>/enroll.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use this target for every batch instead of asking
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Country code prepended to numbers without a leading '+'
    #[arg(long)]
    pub country_code: Option<String>,

    /// Attach to a running Chrome (remote debugging) instead of launching one
    #[arg(long)]
    pub debugging_url: Option<String>,

    /// Start the next batch without asking. Adds are still confirmed.
    #[arg(long)]
    pub yes: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            state_dir: self.state_dir.clone(),
            config_file: self.config.clone(),
            batch_size: self.batch_size,
            country_code: self.country_code.clone(),
            debugging_url: self.debugging_url.clone(),
            yes: self.yes,
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ENROLL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cmd::run_enrollment(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", console::style("Error:").red().bold(), err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
