//! IPC listener thread and request dispatch
//!
//! The listener never touches manager state. It forwards each request, with a
//! reply channel, to the event thread, which answers via `execute`.

use anyhow::Result;
use std::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{Connection, DaemonStatus, ListedDialog, ManagerRequest, ManagerResponse, ManagerServer};
use crate::constants::daemon::REPLY_TIMEOUT;
use crate::manager::PositionManager;

/// A request waiting for the event thread
pub struct IpcCommand {
    pub request: ManagerRequest,
    pub reply: mpsc::Sender<ManagerResponse>,
}

/// Spawn IPC listener thread to handle client requests
pub fn spawn_ipc_listener(
    server: ManagerServer,
    command_tx: mpsc::Sender<IpcCommand>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(e) = run_ipc_loop(&server, &command_tx) {
            error!(error = ?e, "IPC listener thread crashed");
        }
    })
}

fn run_ipc_loop(server: &ManagerServer, command_tx: &mpsc::Sender<IpcCommand>) -> Result<()> {
    info!(socket = ?server.path(), "IPC listener started");

    loop {
        let mut client = server.accept()?;
        debug!("Client connected");

        match serve_client(&mut client, command_tx) {
            Ok(true) => {}
            Ok(false) => {
                info!("Event loop gone, stopping IPC listener");
                break Ok(());
            }
            Err(e) => warn!(error = ?e, "IPC client error"),
        }
        debug!("Client disconnected");
    }
}

/// Answer requests until the client hangs up; false once the event loop is gone
fn serve_client(client: &mut Connection, command_tx: &mpsc::Sender<IpcCommand>) -> Result<bool> {
    loop {
        let request = match client.recv::<ManagerRequest>() {
            Ok(request) => request,
            Err(e) => {
                debug!(error = ?e, "IPC connection closed");
                return Ok(true);
            }
        };
        debug!(request = ?request, "Received IPC request");

        let (reply_tx, reply_rx) = mpsc::channel();
        if command_tx
            .send(IpcCommand {
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            return Ok(false);
        }

        let response = reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .unwrap_or_else(|e| ManagerResponse::Error(format!("Daemon did not answer: {e}")));
        client.send(&response)?;
    }
}

/// Run one request against the manager on the event thread
///
/// `Shutdown` only acknowledges here; stopping the loop is the caller's job.
pub fn execute(manager: &mut PositionManager, request: &ManagerRequest) -> ManagerResponse {
    match request {
        ManagerRequest::List => ManagerResponse::Records {
            generation: manager.generation(),
            dialogs: manager
                .records()
                .iter()
                .map(|record| ListedDialog {
                    record: record.clone(),
                    on_screen: manager.is_on_screen(record),
                })
                .collect(),
        },
        ManagerRequest::Center(id) => ManagerResponse::Done(manager.center(id)),
        ManagerRequest::BringToFront(id) => ManagerResponse::Done(manager.bring_to_front(id)),
        ManagerRequest::Close(id) => ManagerResponse::Done(manager.close(id)),
        ManagerRequest::Reset(id) => ManagerResponse::Done(manager.reset(id)),
        ManagerRequest::RecoverOffScreen => ManagerResponse::Recovered(manager.recover_off_screen()),
        ManagerRequest::ClearAll => {
            manager.clear_all();
            ManagerResponse::Ready
        }
        ManagerRequest::SetTrackAllWindows(track_all) => {
            manager.set_track_all_windows(*track_all);
            ManagerResponse::Ready
        }
        ManagerRequest::AddTargetedTitle(title) => {
            manager.add_targeted_title(title);
            ManagerResponse::Ready
        }
        ManagerRequest::RemoveTargetedTitle(title) => {
            manager.remove_targeted_title(title);
            ManagerResponse::Ready
        }
        ManagerRequest::Exclude(id) => {
            manager.exclude(id);
            ManagerResponse::Ready
        }
        ManagerRequest::Include(id) => {
            manager.include(id);
            ManagerResponse::Ready
        }
        ManagerRequest::Screens => ManagerResponse::Screens(manager.screen_diagnostics()),
        ManagerRequest::Status => {
            let policy = manager.policy();
            ManagerResponse::Status(DaemonStatus {
                track_all: policy.track_all(),
                targeted_titles: policy.targeted_titles().map(str::to_owned).collect(),
                excluded_ids: policy.excluded_ids().map(str::to_owned).collect(),
                tracked: manager.tracked_count(),
                listed: manager.records().len(),
                storage_budget: manager.storage_budget(),
            })
        }
        ManagerRequest::Ping => ManagerResponse::Pong,
        ManagerRequest::Shutdown => ManagerResponse::Ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ManagerClient;
    use crate::manager::TrackingPolicy;
    use crate::store::{MemoryPreferenceStore, RecordStore};
    use crate::types::{Rect, Screen};
    use crate::window_system::WindowHandle;
    use crate::window_system::fake::FakeWindowSystem;

    fn manager() -> (FakeWindowSystem, PositionManager) {
        let fake = FakeWindowSystem::new(vec![Screen::new(
            "HD",
            Rect::new(0.0, 0.0, 1920.0, 1080.0),
            1.0,
            true,
        )]);
        let mut info = FakeWindowSystem::dialog(Some("Log"), Rect::new(0.0, 0.0, 400.0, 300.0));
        info.showing = true;
        fake.preexisting(WindowHandle(1), info);

        let store = RecordStore::new(Box::new(MemoryPreferenceStore::default()), 7500);
        let mut manager = PositionManager::new(Box::new(fake.clone()), store, TrackingPolicy::default());
        manager.initialize().unwrap();
        (fake, manager)
    }

    #[test]
    fn test_execute_maps_operations() {
        let (_fake, mut manager) = manager();

        match execute(&mut manager, &ManagerRequest::List) {
            ManagerResponse::Records { dialogs, .. } => assert_eq!(dialogs.len(), 1),
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(execute(&mut manager, &ManagerRequest::Center("Log".into())), ManagerResponse::Done(true));
        assert_eq!(execute(&mut manager, &ManagerRequest::Center("Nope".into())), ManagerResponse::Done(false));
        assert_eq!(execute(&mut manager, &ManagerRequest::RecoverOffScreen), ManagerResponse::Recovered(0));
        assert_eq!(execute(&mut manager, &ManagerRequest::Ping), ManagerResponse::Pong);
        assert_eq!(
            execute(&mut manager, &ManagerRequest::SetTrackAllWindows(false)),
            ManagerResponse::Ready
        );
        assert!(!manager.policy().track_all());
    }

    #[test]
    fn test_list_flags_off_screen_dialogs() {
        let (fake, mut manager) = manager();
        let generation = match execute(&mut manager, &ManagerRequest::List) {
            ManagerResponse::Records { generation, dialogs } => {
                assert!(dialogs[0].on_screen);
                generation
            }
            other => panic!("unexpected response: {other:?}"),
        };

        fake.move_window(WindowHandle(1), Rect::new(5000.0, 5000.0, 400.0, 300.0));
        manager.pump();
        match execute(&mut manager, &ManagerRequest::List) {
            ManagerResponse::Records { generation: later, dialogs } => {
                assert!(later > generation);
                assert_eq!(dialogs[0].record.id, "Log");
                assert!(!dialogs[0].on_screen);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_status_reports_policy() {
        let (_fake, mut manager) = manager();
        execute(&mut manager, &ManagerRequest::Exclude("Objects".into()));
        execute(&mut manager, &ManagerRequest::SetTrackAllWindows(false));

        match execute(&mut manager, &ManagerRequest::Status) {
            ManagerResponse::Status(status) => {
                assert!(!status.track_all);
                assert!(status.targeted_titles.contains(&"Log".to_string()));
                assert_eq!(status.excluded_ids, vec!["Objects".to_string()]);
                assert_eq!(status.tracked, 1);
                assert_eq!(status.listed, 1);
                assert_eq!(status.storage_budget, 7500);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_listener_forwards_to_event_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let server = ManagerServer::bind_to(path.clone()).unwrap();
        let (command_tx, command_rx) = mpsc::channel::<IpcCommand>();
        let _listener = spawn_ipc_listener(server, command_tx);

        let answering = std::thread::spawn(move || {
            let command = command_rx.recv().unwrap();
            assert_eq!(command.request, ManagerRequest::Ping);
            command.reply.send(ManagerResponse::Pong).unwrap();
        });

        let mut client = ManagerClient::connect_to(&path).unwrap();
        assert_eq!(client.request(&ManagerRequest::Ping).unwrap(), ManagerResponse::Pong);
        answering.join().unwrap();
    }
}
