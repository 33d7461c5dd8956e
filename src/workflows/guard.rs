use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::models::resource::ResourceRef;
use crate::utils::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Events,
    Logs,
}

/// A background event watcher or log streamer. Closing is idempotent; a handle dropped without
/// being closed aborts its task without waiting for it.
pub struct ListenerHandle {
    kind: ListenerKind,
    target: ResourceRef,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn new(kind: ListenerKind, target: ResourceRef, task: JoinHandle<()>) -> Self {
        ListenerHandle {
            kind,
            target,
            task: Some(task),
        }
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn target(&self) -> &ResourceRef {
        &self.target
    }

    /// Stops the listener and waits until its task, and with it the underlying stream, is gone.
    /// If this is interrupted the handle stays open and can be closed again.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.as_mut() {
            task.abort();
            if let Err(err) = task.await {
                if err.is_panic() {
                    warn!("{:?} listener on {} panicked", self.kind, self.target);
                }
            }
            self.task = None;
            debug!("closed {:?} listener on {}", self.kind, self.target);
        }
    }

    pub fn is_open(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The listeners opened during one phase, released together in reverse order of acquisition.
pub struct PhaseGuard {
    phase: &'static str,
    handles: Vec<ListenerHandle>,
}

impl PhaseGuard {
    pub fn new(phase: &'static str) -> Self {
        PhaseGuard {
            phase,
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: ListenerHandle) {
        debug!(
            "{} phase acquired {:?} listener on {}",
            self.phase,
            handle.kind(),
            handle.target()
        );
        self.handles.push(handle);
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    /// Closes the handles from the most recent one down. A handle leaves the guard only once it
    /// is closed, so an interrupted release can be resumed.
    pub async fn release(&mut self) {
        while let Some(handle) = self.handles.last_mut() {
            handle.close().await;
            self.handles.pop();
        }
        debug!("{} phase released", self.phase);
    }

    /// Releases the guard and hands `result` back untouched.
    pub async fn seal<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        self.release().await;
        result
    }
}

/// Guards of the phases a run is currently in, outermost first.
///
/// The stack is owned outside of the work it guards, so whatever that work leaves behind when
/// it fails or is dropped mid-way can still be released in order.
#[derive(Default)]
pub struct GuardStack {
    guards: Vec<PhaseGuard>,
}

impl GuardStack {
    /// Enters `phase` and returns its guard.
    pub fn open(&mut self, phase: &'static str) -> &mut PhaseGuard {
        self.guards.push(PhaseGuard::new(phase));
        let last = self.guards.len() - 1;
        &mut self.guards[last]
    }

    /// Releases the guard of `phase`, wherever it sits in the stack.
    pub async fn release(&mut self, phase: &str) {
        if let Some(index) = self.guards.iter().position(|g| g.phase() == phase) {
            self.guards[index].release().await;
            self.guards.remove(index);
        }
    }

    /// Releases every guard still held, innermost first.
    pub async fn release_all(&mut self) {
        while let Some(guard) = self.guards.last_mut() {
            guard.release().await;
            self.guards.pop();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}
