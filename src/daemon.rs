//! The `run` subcommand: X11 event loop plus the IPC listener

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Config, Overrides};
use crate::constants::daemon::POLL_INTERVAL;
use crate::ipc::handler::{IpcCommand, execute, spawn_ipc_listener};
use crate::ipc::{ManagerRequest, ManagerServer};
use crate::manager::PositionManager;
use crate::store::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore, RecordStore};
use crate::x11::{HostFilter, X11WindowSystem};

pub struct DaemonOptions {
    pub config_path: PathBuf,
    pub socket_path: PathBuf,
    pub overrides: Overrides,
    /// Keep records in memory only; nothing touches the preference file
    pub ephemeral: bool,
}

pub fn run(mut config: Config, options: DaemonOptions) -> Result<()> {
    config.apply_overrides(&options.overrides);
    info!(config = ?options.config_path, socket = ?options.socket_path, "Starting daemon");

    let prefs: Box<dyn PreferenceStore> = if options.ephemeral {
        info!("Ephemeral mode, positions are not persisted");
        Box::new(MemoryPreferenceStore::default())
    } else {
        let store = FilePreferenceStore::open_default();
        info!(path = %store.path().display(), "Using preference store");
        Box::new(store)
    };
    let store = RecordStore::new(prefs, config.storage.max_chars);

    let filter = HostFilter {
        wm_class: config.host.wm_class.clone(),
        pid: config.host.pid,
        main_window_title: config.host.main_window_title.clone(),
        own_pid: std::process::id(),
    };
    let ws = X11WindowSystem::connect(filter)?;

    let mut manager = PositionManager::new(Box::new(ws), store, config.tracking_policy());
    manager
        .initialize()
        .context("Failed to initialize position manager")?;

    let server = ManagerServer::bind_to(options.socket_path)?;
    let (command_tx, command_rx) = mpsc::channel();
    let _listener = spawn_ipc_listener(server, command_tx);

    let stop = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .context(format!("Failed to register handler for signal {}", signal))?;
    }

    run_loop(&mut manager, &command_rx, &stop);
    manager.shutdown();
    info!("Daemon stopped");
    Ok(())
}

/// Pump events, answer IPC requests and run deferred work until told to stop
pub fn run_loop(manager: &mut PositionManager, commands: &mpsc::Receiver<IpcCommand>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        let mut busy = manager.pump() > 0;

        while let Ok(command) = commands.try_recv() {
            busy = true;
            let response = execute(manager, &command.request);
            if command.reply.send(response).is_err() {
                warn!("IPC client went away before the reply");
            }
            if command.request == ManagerRequest::Shutdown {
                info!("Shutdown requested over IPC");
                return;
            }
        }

        busy |= manager.run_deferred() > 0;

        if !busy {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
    debug!("Stop signal received");
}
