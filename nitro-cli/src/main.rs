//! CLI for driving a hub through the nitro bridge.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

#[cfg(not(unix))]
compile_error!("nitro-cli reaches the bridge over a Unix socket");

mod drive;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use nitro::{BridgeLink, DeviceDescriptor, Discovery, DriveCommand, Link, Program, SessionConfig};

#[derive(Parser)]
#[command(name = "nitro", version, about = "Remote driving for motorized hubs")]
struct Cli {
    /// Bridge socket path (default: <runtime dir>/nitro/bridge.sock).
    #[arg(long, global = true, env = "NITRO_BRIDGE")]
    bridge: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List nearby hubs that advertise a name.
    Scan {
        /// Scan duration in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },

    /// Connect to a hub and drive it from stdin.
    ///
    /// One command per line: f t b l r c s x (or full names), q to quit.
    Drive(drive::DriveArgs),

    /// Print the program uploaded for one command in program mode.
    Program {
        /// Drive command (e.g. forward, l, stop).
        command: DriveCommand,
        /// Session config file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the resident listener program used in streaming mode.
    Listener {
        /// Session config file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Upload a program file to a hub and run it to completion.
    Run {
        /// Hub radio address.
        address: String,
        /// Program source file.
        file: PathBuf,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    if let Err(e) = cli.dispatch().await {
        eprintln!("nitro: {e:#}");
        std::process::exit(1);
    }
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        let socket = self.bridge;
        match self.command {
            Command::Scan { timeout } => scan(&link(socket)?, timeout).await,
            Command::Drive(args) => drive::drive(link(socket)?, args).await,
            Command::Program { command, config } => {
                let tuning = load_config(config.as_deref())?.tuning;
                print!("{}", nitro_proto::discrete_program(command, &tuning).source);
                Ok(())
            }
            Command::Listener { config } => {
                let tuning = load_config(config.as_deref())?.tuning;
                print!("{}", nitro_proto::listener_program(&tuning).source);
                Ok(())
            }
            Command::Run { address, file } => run(&link(socket)?, address, &file).await,
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "nitro", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}

/// Builds the bridge link from `--bridge`/`NITRO_BRIDGE` or the default path.
fn link(socket: Option<PathBuf>) -> Result<BridgeLink> {
    let socket = match socket {
        Some(path) => path,
        None => dirs::runtime_dir()
            .ok_or_else(|| anyhow::anyhow!("no runtime directory; pass --bridge"))?
            .join("nitro")
            .join("bridge.sock"),
    };
    tracing::debug!(socket = %socket.display(), "using bridge");
    Ok(BridgeLink::new(socket))
}

/// Loads `path`, or the defaults when none is given.
pub(crate) fn load_config(path: Option<&std::path::Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(path).context("failed to load session config"),
        None => Ok(SessionConfig::default()),
    }
}

async fn scan(link: &BridgeLink, timeout: u64) -> Result<()> {
    eprintln!("Scanning for {timeout}s...");
    let found = link.scan(Duration::from_secs(timeout)).await?;
    let named: Vec<_> = found.iter().filter(|d| d.is_named()).collect();
    if named.is_empty() {
        println!("No hubs found.");
        return Ok(());
    }
    println!("{:<20} NAME", "ADDRESS");
    for device in named {
        println!("{:<20} {}", device.address(), device.name());
    }
    Ok(())
}

async fn run(link: &BridgeLink, address: String, file: &std::path::Path) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_stem()
        .map_or_else(|| "program".to_owned(), |s| s.to_string_lossy().into_owned());
    let program = Program { name, source };

    let device = DeviceDescriptor::new(address, "");
    eprintln!("Connecting to {}...", device.name());
    let mut handle = link.open(&device).await?;
    let outcome = link.run_program(&mut handle, &program).await;
    if let Err(e) = link.close(handle).await {
        tracing::warn!(error = %e, "close failed");
    }
    outcome?;
    println!("Executed: {}", program.name);
    Ok(())
}
