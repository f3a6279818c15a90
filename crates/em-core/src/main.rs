//! em-core: executor metrics reporter CLI.

use clap::{Args, Parser, Subcommand};
use em_common::Error;
use em_config::{resolve_config, ConfigError, ResolvedConfig, SinkConfig};
use em_core::clock::ManualClock;
use em_core::exit_codes::ExitCode;
use em_core::logging::{init_logging, level_for_verbosity, LogFormat};
use em_core::replay::replay;
use em_core::sink::{BrokerConnector, InMemoryBroker, MqttConnector};
use em_core::Reporter;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "em-core", version, about = "Executor metrics batching reporter")]
struct Cli {
    /// Config file (TOML or JSON). Falls back to $EM_CONFIG, then the user config dir.
    #[arg(long, global = true, env = "EM_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recorded snapshots (one JSON frame per line) through the reporter.
    Replay(ReplayArgs),
    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Input file; `-` reads stdin.
    #[arg(long, short)]
    input: PathBuf,

    /// Override the durable log directory.
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Publish sinks go to an in-process broker and are counted instead of
    /// being sent to the configured broker.
    #[arg(long)]
    dry_run: bool,

    /// Override the hostname used in host tags.
    #[arg(long)]
    hostname: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the resolved configuration as JSON.
    Show,
    /// Print the configuration JSON Schema.
    Schema,
    /// Validate configuration and exit.
    Validate,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, level_for_verbosity(cli.verbose, cli.quiet));

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            let code = ExitCode::from(&e);
            error!(error = %e, code = e.code(), "em-core failed");
            eprintln!("error: {}", e);
            code
        }
    };
    std::process::exit(code.as_i32());
}

fn run(cli: &Cli) -> Result<ExitCode, Error> {
    match &cli.command {
        Command::Config(ConfigCommand::Schema) => {
            print_json(&em_config::config_schema())?;
            Ok(ExitCode::Clean)
        }
        Command::Config(ConfigCommand::Show) => {
            let resolved = load_config(cli)?;
            print_json(&resolved.config)?;
            Ok(ExitCode::Clean)
        }
        Command::Config(ConfigCommand::Validate) => {
            let resolved = load_config(cli)?;
            info!(source = ?resolved.source, "configuration valid");
            Ok(ExitCode::Clean)
        }
        Command::Replay(args) => run_replay(cli, args),
    }
}

fn load_config(cli: &Cli) -> Result<ResolvedConfig, Error> {
    resolve_config(cli.config.as_deref()).map_err(config_error)
}

fn config_error(e: ConfigError) -> Error {
    Error::Config(e.to_string())
}

fn run_replay(cli: &Cli, args: &ReplayArgs) -> Result<ExitCode, Error> {
    let mut config = load_config(cli)?.config;
    if let Some(directory) = &args.directory {
        config.sink = SinkConfig::DurableLog {
            directory: directory.clone(),
        };
    }
    if let Some(hostname) = &args.hostname {
        config.hostname = Some(hostname.clone());
    }

    let broker = InMemoryBroker::new();
    let connector: Option<Box<dyn BrokerConnector>> = match (&config.sink, args.dry_run) {
        (SinkConfig::Publish { .. }, true) => Some(Box::new(broker.clone())),
        (SinkConfig::Publish { .. }, false) => Some(Box::new(MqttConnector::new())),
        _ => None,
    };
    info!(
        sink = config.sink.kind_name(),
        dry_run = args.dry_run,
        input = %args.input.display(),
        "starting replay"
    );

    let clock = Arc::new(ManualClock::new(0));
    let mut reporter = Reporter::from_config(&config, clock.clone(), connector)?;

    let summary = if args.input.as_os_str() == "-" {
        replay(&mut reporter, &clock, io::stdin().lock())?
    } else {
        let file = File::open(&args.input).map_err(|e| Error::io_at(&args.input, e))?;
        replay(&mut reporter, &clock, BufReader::new(file))?
    };

    let mut output = serde_json::to_value(&summary)?;
    if args.dry_run {
        output["published"] = serde_json::to_value(broker.messages().len())?;
    }
    print_json(&output)?;

    if summary.skipped_lines > 0 {
        Ok(ExitCode::PartialInput)
    } else {
        Ok(ExitCode::Clean)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
