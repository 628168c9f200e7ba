use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::KeyEvent;
use log::{debug, warn};

use crate::{
    model::Torrent,
    rpc::{Daemon, TransmissionError},
};

/// Deferred daemon call. Runs on a worker thread and comes back as a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListTorrents,
    FetchDetail { id: i64 },
    FetchSelection { id: i64 },
    /// `batch` identifies the relocate confirm that issued the move.
    SetLocation { batch: u64, id: i64, path: String },
}

/// Everything the event loop reacts to.
#[derive(Debug)]
pub enum Message {
    Resize { width: u16, height: u16 },
    Key(KeyEvent),
    Paste(String),
    Tick,
    Torrents(Vec<Torrent>),
    Detail(Torrent),
    Selected(Torrent),
    Relocated {
        batch: u64,
        id: i64,
        error: Option<String>,
    },
    Fatal(TransmissionError),
}

/// Transitions a component asks the application to perform on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    OpenInfo,
    OpenRelocate,
    ReturnToTable { reload: bool },
    Quit,
}

/// What a component hands back after reacting to a message.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Update {
    pub commands: Vec<Command>,
    pub transition: Option<Transition>,
}

impl Update {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn command(command: Command) -> Self {
        Self {
            commands: vec![command],
            transition: None,
        }
    }

    pub fn transition(transition: Transition) -> Self {
        Self {
            commands: Vec::new(),
            transition: Some(transition),
        }
    }

}

impl From<Option<Command>> for Update {
    fn from(command: Option<Command>) -> Self {
        Self {
            commands: command.into_iter().collect(),
            transition: None,
        }
    }
}

/// Runs one command against the daemon. Fetch failures are fatal; relocate
/// failures are reported per torrent.
pub fn execute(daemon: &dyn Daemon, command: Command) -> Message {
    match command {
        Command::ListTorrents => match daemon.list_torrents() {
            Ok(torrents) => Message::Torrents(torrents),
            Err(err) => Message::Fatal(err),
        },
        Command::FetchDetail { id } => match daemon.get_torrent(id) {
            Ok(torrent) => Message::Detail(torrent),
            Err(err) => Message::Fatal(err),
        },
        Command::FetchSelection { id } => match daemon.get_torrent(id) {
            Ok(torrent) => Message::Selected(torrent),
            Err(err) => Message::Fatal(err),
        },
        Command::SetLocation { batch, id, path } => {
            let error = daemon
                .set_location(id, &path)
                .err()
                .map(|err| err.to_string());
            if let Some(error) = &error {
                warn!("moving torrent {id} to {path:?} failed: {error}");
            }
            Message::Relocated { batch, id, error }
        }
    }
}

/// Fixed pool of workers draining one shared command queue.
pub struct Dispatcher {
    tx: Sender<Command>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn(daemon: Arc<dyn Daemon>, events: Sender<Message>, worker_count: usize) -> Self {
        let (tx, rx) = unbounded();
        let workers = (0..worker_count.max(1))
            .map(|index| {
                let daemon = Arc::clone(&daemon);
                let rx = rx.clone();
                let events = events.clone();
                thread::spawn(move || worker_loop(index, daemon, rx, events))
            })
            .collect();
        Self { tx, workers }
    }

    pub fn submit(&self, command: Command) -> Result<()> {
        debug!("dispatching {command:?}");
        self.tx
            .send(command)
            .context("command workers are no longer running")
    }

    /// Closes the queue and waits up to `grace` for the workers. Workers still
    /// inside a daemon call after that are left to finish on their own.
    pub fn shutdown(self, grace: Duration) {
        drop(self.tx);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && !self.workers.iter().all(JoinHandle::is_finished) {
            thread::sleep(Duration::from_millis(10));
        }
        for worker in self.workers {
            if worker.is_finished() {
                worker.join().ok();
            } else {
                debug!("leaving busy command worker behind");
            }
        }
    }
}

fn worker_loop(
    index: usize,
    daemon: Arc<dyn Daemon>,
    rx: Receiver<Command>,
    events: Sender<Message>,
) {
    while let Ok(command) = rx.recv() {
        let message = execute(daemon.as_ref(), command);
        if events.send(message).is_err() {
            break;
        }
    }
    debug!("command worker {index} stopped");
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::rpc::RpcResult;

    /// In-memory daemon recording every relocate call.
    #[derive(Default)]
    pub struct FakeDaemon {
        pub torrents: Mutex<Vec<Torrent>>,
        pub relocations: Mutex<Vec<(i64, String)>>,
        pub fail_list: bool,
        pub fail_relocate: Vec<i64>,
    }

    impl FakeDaemon {
        pub fn with_torrents(torrents: Vec<Torrent>) -> Self {
            Self {
                torrents: Mutex::new(torrents),
                ..Self::default()
            }
        }

        pub fn relocations(&self) -> Vec<(i64, String)> {
            self.relocations.lock().unwrap().clone()
        }
    }

    impl Daemon for FakeDaemon {
        fn list_torrents(&self) -> RpcResult<Vec<Torrent>> {
            if self.fail_list {
                return Err(TransmissionError::Rpc("connection refused".to_string()));
            }
            Ok(self.torrents.lock().unwrap().clone())
        }

        fn get_torrent(&self, id: i64) -> RpcResult<Torrent> {
            self.torrents
                .lock()
                .unwrap()
                .iter()
                .find(|torrent| torrent.id == id)
                .cloned()
                .ok_or(TransmissionError::NotFound(id))
        }

        fn set_location(&self, id: i64, location: &str) -> RpcResult<()> {
            self.relocations
                .lock()
                .unwrap()
                .push((id, location.to_string()));
            if self.fail_relocate.contains(&id) {
                return Err(TransmissionError::Rpc("permission denied".to_string()));
            }
            let mut torrents = self.torrents.lock().unwrap();
            if let Some(torrent) = torrents.iter_mut().find(|torrent| torrent.id == id) {
                torrent.download_dir = location.to_string();
            }
            Ok(())
        }
    }
}
