//! Work kept off the caller's thread: opening an archive, and decoding selections where only
//! the most recent request matters.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::path::EntryPath;
use crate::preview::Renderable;
use crate::preview::dispatch::DecodeDispatcher;
use crate::session::{DecodeRequest, PreviewSession, render};

/// Pending result of `spawn_load`.
pub struct LoadHandle {
    rx: Receiver<Result<PreviewSession>>,
}

impl LoadHandle {
    /// Block until the archive is open.
    pub fn wait(self) -> Result<PreviewSession> {
        self.rx
            .recv()
            .map_err(|_| PreviewError::Io(std::io::Error::other("loader thread vanished")))?
    }

    /// The session if loading finished, `None` while it is still running.
    pub fn try_take(&self) -> Option<Result<PreviewSession>> {
        match self.rx.try_recv() {
            Ok(r) => Some(r),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PreviewError::Io(std::io::Error::other(
                "loader thread vanished",
            )))),
        }
    }
}

/// Open `archive` on a worker thread.
pub fn spawn_load(archive: impl Into<PathBuf>, config: PreviewConfig) -> LoadHandle {
    let archive = archive.into();
    let (tx, rx) = channel::bounded(1);
    thread::spawn(move || {
        let res = PreviewSession::load(&archive, config);
        if let Err(e) = &res {
            warn!("loading {} failed: {e}", archive.display());
        }
        // receiver may have given up
        let _ = tx.send(res);
    });
    LoadHandle { rx }
}

/// A finished decode, tagged with the ticket it was submitted under.
pub struct Decoded {
    pub ticket: u64,
    pub path: EntryPath,
    pub renderable: Renderable,
}

/// Decodes requests on the rayon pool. Each submission supersedes the previous ones; results
/// of superseded requests are discarded when collected.
pub struct DecodeQueue {
    dispatcher: Arc<DecodeDispatcher>,
    tx: Sender<Decoded>,
    rx: Receiver<Decoded>,
    current: u64,
}

impl DecodeQueue {
    pub fn new(dispatcher: Arc<DecodeDispatcher>) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            dispatcher,
            tx,
            rx,
            current: 0,
        }
    }

    pub fn submit(&mut self, req: DecodeRequest) -> u64 {
        self.current += 1;
        let ticket = self.current;
        let dispatcher = self.dispatcher.clone();
        let tx = self.tx.clone();
        rayon::spawn(move || {
            let renderable = render(&dispatcher, &req);
            let _ = tx.send(Decoded {
                ticket,
                path: req.path,
                renderable,
            });
        });
        ticket
    }

    pub fn current_ticket(&self) -> u64 {
        self.current
    }

    fn keep(&self, d: Decoded) -> Option<Decoded> {
        if d.ticket == self.current {
            Some(d)
        } else {
            debug!(ticket = d.ticket, current = self.current, "dropping stale decode of {}", d.path);
            None
        }
    }

    /// Result of the latest submission if it has arrived. Stale results are drained.
    pub fn latest(&self) -> Option<Decoded> {
        let mut found = None;
        while let Ok(d) = self.rx.try_recv() {
            if let Some(d) = self.keep(d) {
                found = Some(d);
            }
        }
        found
    }

    /// Wait up to `timeout` for the latest submission's result.
    pub fn wait_latest(&self, timeout: Duration) -> Option<Decoded> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(d) => {
                    if let Some(d) = self.keep(d) {
                        return Some(d);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}
