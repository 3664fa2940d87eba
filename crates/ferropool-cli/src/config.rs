use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use ferropool::{BatchConfig, DEFAULT_BURST, ErrorPolicy};
use std::path::PathBuf;

/// Which engine processes the items.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read the whole input, then dispatch it as one rate-limited batch.
    Batch,
    /// Feed items to a worker pool as they are read.
    Stream,
}

/// Log output format on stderr.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration for the `ferropool` binary.
///
/// Every option can also be set through its environment variable, including
/// from a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ferropool",
    version,
    about = "Run a command once per input line with bounded concurrency",
    after_help = "Example: ls *.png | ferropool -j 4 -- convert {} {}.jpg"
)]
pub struct CliArgs {
    /// Engine used to process items.
    ///
    /// `batch` reads all input first and supports rate limiting and error
    /// policies. `stream` starts work as soon as each line arrives.
    ///
    /// Environment variable: `FERROPOOL_MODE`
    #[arg(long, env = "FERROPOOL_MODE", value_enum, default_value_t = Mode::Batch)]
    pub mode: Mode,

    /// Maximum number of commands running at once.
    ///
    /// Environment variable: `FERROPOOL_CONCURRENCY`
    #[arg(short = 'j', long, env = "FERROPOOL_CONCURRENCY", default_value_t = num_cpus::get())]
    pub concurrency: usize,

    /// Maximum number of commands started per second. `0` disables the limit.
    ///
    /// Only applies in `batch` mode.
    ///
    /// Environment variable: `FERROPOOL_RATE_LIMIT`
    #[arg(long, env = "FERROPOOL_RATE_LIMIT", default_value_t = 0)]
    pub rate_limit: u32,

    /// Number of commands that may start back to back before the rate limit
    /// applies.
    ///
    /// Environment variable: `FERROPOOL_BURST`
    #[arg(long, env = "FERROPOOL_BURST", default_value_t = DEFAULT_BURST)]
    pub burst: usize,

    /// Keep going after a command fails and report every failure at the end.
    ///
    /// Without this flag the first failure stops new commands from starting.
    ///
    /// Environment variable: `FERROPOOL_IGNORE_ERRORS`
    #[arg(long, env = "FERROPOOL_IGNORE_ERRORS", default_value_t = false)]
    pub ignore_errors: bool,

    /// File with one item per line. Reads stdin when omitted.
    ///
    /// Environment variable: `FERROPOOL_INPUT`
    #[arg(short, long, env = "FERROPOOL_INPUT")]
    pub input: Option<PathBuf>,

    /// Placeholder replaced by the item in each command argument.
    ///
    /// If no argument contains it, the item is appended as the last argument.
    ///
    /// Environment variable: `FERROPOOL_REPLACE`
    #[arg(long, env = "FERROPOOL_REPLACE", default_value_t = String::from("{}"))]
    pub replace: String,

    /// Cancel all work after this many seconds.
    ///
    /// Environment variable: `FERROPOOL_TIMEOUT`
    #[arg(long, env = "FERROPOOL_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Log output format.
    ///
    /// Environment variable: `FERROPOOL_LOG_FORMAT`
    #[arg(long, env = "FERROPOOL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Program to run, followed by its arguments.
    #[arg(last = true, required = true, num_args = 1.., value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    pub batch: BatchConfig,
    pub input: Option<PathBuf>,
    pub program: String,
    pub args: Vec<String>,
    pub placeholder: String,
    pub timeout: Option<Duration>,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.concurrency == 0 {
            bail!("FERROPOOL_CONCURRENCY must be greater than 0");
        }

        if args.burst == 0 {
            bail!("FERROPOOL_BURST must be greater than 0");
        }

        if args.replace.is_empty() {
            bail!("FERROPOOL_REPLACE must not be empty");
        }

        if args.timeout == Some(0) {
            bail!("FERROPOOL_TIMEOUT must be greater than 0");
        }

        if let Some(path) = &args.input {
            if !path.is_file() {
                bail!("FERROPOOL_INPUT ({}) is not a readable file", path.display());
            }
        }

        let mut command = args.command.into_iter();
        let Some(program) = command.next() else {
            bail!("a command to run is required");
        };

        let error_policy = if args.ignore_errors {
            ErrorPolicy::CollectAndContinue
        } else {
            ErrorPolicy::FailFast
        };

        Ok(Self {
            mode: args.mode,
            batch: BatchConfig::new(
                args.concurrency,
                Some(args.rate_limit),
                args.burst,
                error_policy,
            ),
            input: args.input,
            program,
            args: command.collect(),
            placeholder: args.replace,
            timeout: args.timeout.map(Duration::from_secs),
            log_format: args.log_format,
        })
    }
}
