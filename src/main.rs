#![forbid(unsafe_code)]

mod config;
mod constants;
mod daemon;
mod geometry;
mod ipc;
mod manager;
mod store;
mod tracker;
mod types;
mod window_system;
mod x11;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level as TraceLevel;
use tracing_subscriber::FmtSubscriber;

use config::{Config, Overrides};
use daemon::DaemonOptions;
use ipc::{DaemonStatus, ListedDialog, ManagerClient, ManagerRequest, ManagerResponse};

#[derive(Parser, Debug)]
#[command(
    name = "dialog-keeper",
    version,
    about = "Remembers where dialog windows were and puts them back there"
)]
struct Cli {
    /// Config file (defaults to <config dir>/dialog-keeper/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Daemon socket (defaults to $XDG_RUNTIME_DIR/dialog-keeper/daemon.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the tracking daemon
    Run {
        /// Host application WM_CLASS (case-insensitive substring)
        #[arg(long)]
        wm_class: Option<String>,
        /// Host application process id
        #[arg(long)]
        pid: Option<u32>,
        /// Track only these titles (repeatable); disables track-all
        #[arg(long)]
        targeted: Vec<String>,
        /// Do not persist positions
        #[arg(long)]
        ephemeral: bool,
    },
    /// List known dialogs
    List {
        /// Keep polling and reprint whenever the list changes
        #[arg(long)]
        watch: bool,
    },
    /// Center a dialog on the primary screen
    Center { id: String },
    /// Raise and focus a showing dialog
    Front { id: String },
    /// Close a showing dialog
    Close { id: String },
    /// Forget a dialog's saved position
    Reset { id: String },
    /// Move every off-screen dialog back onto the primary screen
    Recover,
    /// Forget every saved position
    Clear,
    /// Track every dialog (true) or only targeted titles (false)
    TrackAll {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Edit the targeted title list
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Never track this dialog id
    Exclude { id: String },
    /// Undo `exclude`
    Include { id: String },
    /// Show the screen layout the daemon sees
    Screens,
    /// Show the tracking policy and counters
    Status,
    /// Check that the daemon is alive
    Ping,
    /// Stop the daemon, persisting every tracked dialog
    Shutdown,
}

#[derive(Subcommand, Debug)]
enum TargetAction {
    Add { title: String },
    Remove { title: String },
}

impl Command {
    fn into_request(self) -> Option<ManagerRequest> {
        Some(match self {
            Command::Run { .. } => return None,
            Command::List { .. } => ManagerRequest::List,
            Command::Center { id } => ManagerRequest::Center(id),
            Command::Front { id } => ManagerRequest::BringToFront(id),
            Command::Close { id } => ManagerRequest::Close(id),
            Command::Reset { id } => ManagerRequest::Reset(id),
            Command::Recover => ManagerRequest::RecoverOffScreen,
            Command::Clear => ManagerRequest::ClearAll,
            Command::TrackAll { enabled } => ManagerRequest::SetTrackAllWindows(enabled),
            Command::Target {
                action: TargetAction::Add { title },
            } => ManagerRequest::AddTargetedTitle(title),
            Command::Target {
                action: TargetAction::Remove { title },
            } => ManagerRequest::RemoveTargetedTitle(title),
            Command::Exclude { id } => ManagerRequest::Exclude(id),
            Command::Include { id } => ManagerRequest::Include(id),
            Command::Screens => ManagerRequest::Screens,
            Command::Status => ManagerRequest::Status,
            Command::Ping => ManagerRequest::Ping,
            Command::Shutdown => ManagerRequest::Shutdown,
        })
    }
}

fn init_tracing(config_level: &str) -> Result<()> {
    // LOG_LEVEL wins over the config file
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| config_level.to_string());
    let log_level = match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn print_dialogs(dialogs: &[ListedDialog]) {
    if dialogs.is_empty() {
        println!("No dialogs known");
    }
    for dialog in dialogs {
        let marker = if dialog.on_screen { "" } else { " OFF-SCREEN" };
        println!("{}{}", dialog.record, marker);
    }
}

fn print_status(status: &DaemonStatus) {
    println!("track all windows: {}", status.track_all);
    println!("targeted titles: {}", status.targeted_titles.join(", "));
    if !status.excluded_ids.is_empty() {
        println!("excluded: {}", status.excluded_ids.join(", "));
    }
    println!("tracked windows: {}", status.tracked);
    println!("listed dialogs: {}", status.listed);
    println!("storage budget: {} chars", status.storage_budget);
}

/// Reprint the list each time its generation moves; ends when the daemon goes away
fn watch_list(client: &mut ManagerClient) -> Result<()> {
    let mut seen = None;
    loop {
        match client.request(&ManagerRequest::List)? {
            ManagerResponse::Records { generation, dialogs } => {
                if seen != Some(generation) {
                    if seen.is_some() {
                        println!();
                    }
                    print_dialogs(&dialogs);
                    seen = Some(generation);
                }
            }
            other => return print_response(other),
        }
        std::thread::sleep(constants::ipc::WATCH_INTERVAL);
    }
}

fn print_response(response: ManagerResponse) -> Result<()> {
    match response {
        ManagerResponse::Records { dialogs, .. } => print_dialogs(&dialogs),
        ManagerResponse::Status(status) => print_status(&status),
        ManagerResponse::Done(true) => println!("ok"),
        ManagerResponse::Done(false) => bail!("No such dialog, or it is not in a state that allows this"),
        ManagerResponse::Recovered(count) => println!("Recovered {count} dialog(s)"),
        ManagerResponse::Screens(text) => println!("{text}"),
        ManagerResponse::Pong => println!("pong"),
        ManagerResponse::Ready => println!("ok"),
        ManagerResponse::Error(message) => bail!("Daemon error: {}", message),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let socket_path = match cli.socket {
        Some(path) => path,
        None => ipc::default_socket_path()?,
    };

    match cli.command {
        Command::Run {
            wm_class,
            pid,
            targeted,
            ephemeral,
        } => {
            // Peek at log_level before logging exists; real load errors surface below
            let config_level = std::fs::read_to_string(&config_path)
                .ok()
                .and_then(|contents| serde_json::from_str::<Config>(&contents).ok())
                .map(|cfg| cfg.log_level)
                .unwrap_or_else(|| constants::config::DEFAULT_LOG_LEVEL.to_string());
            init_tracing(&config_level)?;

            let config = Config::load_from(&config_path)?;
            daemon::run(
                config,
                DaemonOptions {
                    config_path,
                    socket_path,
                    overrides: Overrides {
                        wm_class,
                        pid,
                        targeted,
                    },
                    ephemeral,
                },
            )
        }
        Command::List { watch: true } => {
            init_tracing(constants::config::DEFAULT_LOG_LEVEL)?;
            let mut client = ManagerClient::connect_to(&socket_path)?;
            watch_list(&mut client)
        }
        command => {
            init_tracing(constants::config::DEFAULT_LOG_LEVEL)?;
            let Some(request) = command.into_request() else {
                bail!("Not a client command");
            };
            let mut client = ManagerClient::connect_to(&socket_path)?;
            let response = client
                .request(&request)
                .context("Failed to talk to the daemon")?;
            print_response(response)
        }
    }
}
