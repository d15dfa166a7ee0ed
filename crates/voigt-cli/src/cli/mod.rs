mod commands;
mod helpers;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use voigt_core::VoigtError;

const DEFAULT_LOG_FILTER: &str = "warn";

pub fn run_from_env() -> i32 {
    match run(std::env::args().skip(1)) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_voigt_error();
            eprintln!("{}", error.diagnostic_line());
            if let Some(summary_line) = error.fatal_exit_line() {
                eprintln!("{summary_line}");
            }
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("voigt-rs".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_logging(cli.log_level.as_deref())?;
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// Installs the stderr subscriber; `--log-level` wins over `RUST_LOG`.
fn init_logging(level: Option<&str>) -> Result<(), CliError> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|error| CliError::Usage(format!("invalid --log-level '{level}': {error}")))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    // A subscriber may already be installed when `run` is called more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "voigt-rs",
    version,
    about = "Voigt absorption-line models convolved with instrumental LSFs"
)]
struct Cli {
    /// Tracing filter, e.g. `info` or `voigt_core=debug`
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Evaluate the convolved model flux for a request document
    Model(commands::ModelArgs),
    /// Print the convolution regions, clusters and warnings for a request document
    Regions(commands::RegionsArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Model(args) => commands::run_model_command(args),
        CliCommand::Regions(args) => commands::run_regions_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(VoigtError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<VoigtError> for CliError {
    fn from(error: VoigtError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_voigt_error(&self) -> VoigtError {
        match self {
            Self::Usage(message) => VoigtError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => VoigtError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
