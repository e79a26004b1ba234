//! AVS Devnet CLI
//!
//! The `avs-devnet` command runs local AVS development networks inside
//! Kurtosis enclaves.
//!
//! ## Commands
//!
//! - `init`: Write a starter devnet configuration
//! - `start`: Build images, upload files and start the devnet
//! - `stop`: Tear the devnet down
//! - `get-address`: Print contract addresses produced by the devnet

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use devnet_config::{
    devnet_name_from_path, ensure_abs, DevnetConfig, DEFAULT_CONFIG_FILE, DEFAULT_DEVNET_NAME,
};
use devnet_core::{
    get_addresses, init_tracing, DevnetError, LogReporter, ProgressBarReporter, Reporter,
    SilentReporter, StartOptions, ToolConfig, Toolchain,
};
use devnet_engine::{Engine, KurtosisCli, PackageLocator, DEFAULT_PACKAGE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Level};

#[derive(Parser)]
#[command(name = "avs-devnet")]
#[command(author = "Layr Labs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Start an AVS devnet", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// How run progress is displayed
    #[arg(long, global = true, value_enum, default_value_t = ProgressStyle::Bar)]
    progress: ProgressStyle,

    /// Locator for the Kurtosis package to run
    #[arg(
        long,
        global = true,
        hide = true,
        env = "AVS_DEVNET__KURTOSIS_PACKAGE",
        default_value = DEFAULT_PACKAGE
    )]
    kurtosis_package: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a devnet configuration file
    Init {
        /// Config file to create (default: devnet.yaml)
        config: Option<PathBuf>,
    },

    /// Start devnet from configuration file
    Start {
        /// Devnet configuration file (default: devnet.yaml)
        config: Option<PathBuf>,
    },

    /// Stop devnet from configuration file
    Stop {
        /// Devnet configuration file (default: devnet.yaml)
        config: Option<PathBuf>,
    },

    /// Get a devnet contract or EOA address
    GetAddress {
        /// Path to the devnet configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config_file: PathBuf,

        /// Queries of the form `<artifact>:<contract>`
        #[arg(value_name = "ARTIFACT:CONTRACT")]
        queries: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProgressStyle {
    /// Single-line progress bar
    Bar,
    /// One log line per event
    Log,
    /// No progress output
    Silent,
}

/// A command failure and the exit code it maps to.
#[derive(Debug)]
struct Exit {
    code: u8,
    error: anyhow::Error,
}

impl Exit {
    fn new(code: u8, error: impl Into<anyhow::Error>) -> Self {
        Self {
            code,
            error: error.into(),
        }
    }
}

type CmdResult = std::result::Result<(), Exit>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = u8::from(err.use_stderr());
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Init { ref config } => cmd_init(config.as_deref()).await,
        Commands::Start { ref config } => cmd_start(&cli, config.as_deref()).await,
        Commands::Stop { ref config } => cmd_stop(config.as_deref()).await,
        Commands::GetAddress {
            ref config_file,
            ref queries,
        } => cmd_get_address(config_file, queries).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(exit) => {
            eprintln!("{:#}", exit.error);
            ExitCode::from(exit.code)
        }
    }
}

/// Config path and devnet name for an optional positional config argument.
fn parse_config_arg(config: Option<&Path>) -> anyhow::Result<(PathBuf, String)> {
    match config {
        None => Ok((
            PathBuf::from(DEFAULT_CONFIG_FILE),
            DEFAULT_DEVNET_NAME.to_string(),
        )),
        Some(path) => {
            let name = devnet_name_from_path(path)?;
            Ok((path.to_path_buf(), name))
        }
    }
}

async fn connect_engine() -> anyhow::Result<Arc<dyn Engine>> {
    let tools = ToolConfig::from_env();
    let cli = KurtosisCli::connect(tools.kurtosis.as_str())
        .await
        .context("Ensure that the kurtosis engine is running. You can check the status with `kurtosis engine status`, and start the engine with `kurtosis engine start`")?;
    Ok(Arc::new(cli))
}

fn make_reporter(style: ProgressStyle, verbose: bool) -> Box<dyn Reporter> {
    match style {
        ProgressStyle::Bar => Box::new(ProgressBarReporter::stdout(verbose)),
        ProgressStyle::Log => Box::new(LogReporter::new(verbose)),
        ProgressStyle::Silent => Box::new(SilentReporter),
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

fn not_running(name: &str) -> anyhow::Error {
    anyhow!("Failed to find '{name}'. Maybe it's not running?")
}

/// Write the starter config
async fn cmd_init(config: Option<&Path>) -> CmdResult {
    let (config_path, _) = parse_config_arg(config).map_err(|e| Exit::new(1, e))?;
    devnet_core::init(&config_path)
        .await
        .map_err(|e| Exit::new(2, e))?;
    println!("Initialized configuration file: {}", config_path.display());
    Ok(())
}

/// Build, upload and run the devnet described by the config
async fn cmd_start(cli: &Cli, config: Option<&Path>) -> CmdResult {
    let (config_path, devnet_name) = parse_config_arg(config).map_err(|e| Exit::new(1, e))?;
    let cwd = std::env::current_dir()
        .context("Failed to get current directory")
        .map_err(|e| Exit::new(1, e))?;
    let config_path = ensure_abs(&cwd, &config_path);

    if !config_path.exists() {
        return Err(Exit::new(
            2,
            anyhow!("Config file doesn't exist: {}", config_path.display()),
        ));
    }
    let devnet_config = DevnetConfig::load_from_path(&config_path).map_err(|e| Exit::new(3, e))?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.clone());
    let package = PackageLocator::parse(&cli.kurtosis_package).resolve(&cwd);
    debug!(%package, base_dir = %base_dir.display(), "resolved start inputs");

    let engine = connect_engine().await.map_err(|e| Exit::new(4, e))?;
    let opts = StartOptions {
        devnet_name,
        base_dir,
        config: devnet_config,
        package,
    };
    let tools = Toolchain::from_config(&ToolConfig::from_env());
    let mut reporter = make_reporter(cli.progress, cli.verbose);
    let cancel = cancel_on_ctrl_c();

    devnet_core::start(engine, &opts, &tools, reporter.as_mut(), &cancel)
        .await
        .map_err(|e| Exit::new(4, e))
}

/// Destroy the devnet's enclave
async fn cmd_stop(config: Option<&Path>) -> CmdResult {
    let (_, devnet_name) = parse_config_arg(config).map_err(|e| Exit::new(1, e))?;
    println!("Stopping devnet...");
    let engine = connect_engine().await.map_err(|e| Exit::new(1, e))?;
    match devnet_core::stop(engine, &devnet_name).await {
        Ok(()) => {
            println!("Devnet stopped!");
            Ok(())
        }
        Err(DevnetError::EnclaveNotFound(_)) => Err(Exit::new(1, not_running(&devnet_name))),
        Err(err) => Err(Exit::new(1, err)),
    }
}

/// Print the answer to every address query, one per line
async fn cmd_get_address(config_file: &Path, queries: &[String]) -> CmdResult {
    let devnet_name = devnet_name_from_path(config_file).map_err(|e| Exit::new(1, e))?;
    let engine = connect_engine().await.map_err(|e| Exit::new(2, e))?;
    let answers = match get_addresses(engine, &devnet_name, queries).await {
        Ok(answers) => answers,
        Err(DevnetError::EnclaveNotFound(_)) => return Err(Exit::new(2, not_running(&devnet_name))),
        Err(err) => return Err(Exit::new(2, err)),
    };

    let mut failed = false;
    for answer in answers {
        match answer.result {
            Ok(value) => println!("{}", value.trim()),
            Err(DevnetError::InvalidQuery(query)) => {
                println!("Invalid contract name: {query}");
                failed = true;
            }
            Err(err @ DevnetError::ArtifactUnavailable { .. }) => {
                println!("Error getting {}: {err}", answer.query);
                failed = true;
            }
            Err(err) => {
                debug!(query = %answer.query, error = %err, "address lookup failed");
                println!("Error getting {}", answer.query);
                failed = true;
            }
        }
    }

    if failed {
        return Err(Exit::new(2, anyhow!("failed to get some addresses")));
    }
    Ok(())
}
