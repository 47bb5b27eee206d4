//! `nitro drive`: interactive session over stdin.

use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use nitro::{
    BridgeLink, DeviceDescriptor, DriveCommand, EventReceiver, Level, Mode, SessionManager,
    SessionState,
};
use tokio::sync::mpsc;

/// How often status lines are polled from the session.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arguments for `nitro drive`.
#[derive(clap::Args)]
pub struct DriveArgs {
    /// Hub radio address (see `nitro scan`).
    pub address: String,

    /// Display name for status lines.
    #[arg(long, default_value = "")]
    pub name: String,

    /// Deployment mode; overrides the config file.
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Session config file (JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// What one line of input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    /// Blank line.
    Nothing,
    /// End the session.
    Quit,
    /// Send a command.
    Command(DriveCommand),
}

fn parse_line(line: &str) -> Result<Input, nitro::ParseCommandError> {
    match line.trim() {
        "" => Ok(Input::Nothing),
        "q" | "quit" | "exit" => Ok(Input::Quit),
        other => other.parse().map(Input::Command),
    }
}

/// Reads stdin on a plain thread so a pending read never holds up exit.
fn stdin_lines() -> io::Result<mpsc::UnboundedReceiver<io::Result<String>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("nitro-stdin".to_owned())
        .spawn(move || {
            for line in io::stdin().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

pub async fn drive(link: BridgeLink, args: DriveArgs) -> Result<()> {
    let mut config = crate::load_config(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config = config.with_mode(mode);
    }

    let (session, mut events) = SessionManager::start(link, config)?;
    session.connect(DeviceDescriptor::new(args.address, args.name))?;

    let mut lines = stdin_lines()?;
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.recv() => match line.transpose()? {
                None => break,
                Some(line) => match parse_line(&line) {
                    Ok(Input::Nothing) => {}
                    Ok(Input::Quit) => break,
                    Ok(Input::Command(cmd)) => {
                        if !session.enqueue(cmd) {
                            eprintln!("Not connected; {cmd} dropped");
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
            },
            _ = tick.tick() => {
                print_events(&mut events);
                if session.state() == SessionState::Idle {
                    // The session ended on its own.
                    session.stop();
                    print_events(&mut events);
                    return Ok(());
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    session.disconnect();
    while session.state() != SessionState::Idle {
        tick.tick().await;
        print_events(&mut events);
    }
    session.stop();
    print_events(&mut events);
    Ok(())
}

fn print_events(events: &mut EventReceiver) {
    for event in events.drain() {
        match event.level {
            Level::Info => println!("{event}"),
            _ => eprintln!("{event}"),
        }
    }
}
