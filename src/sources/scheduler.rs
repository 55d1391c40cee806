//! Debounce thread: collects janitor tasks and scan requests, and hands them
//! to a [`Dispatch`] once each stream has been quiet for its delay.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, SyncError};

use super::janitor::{Action, JanitorTask, Target, WatchEvent};

/// Called on the scan thread once the reconciliation pass it was queued with
/// has finished.
pub type DoneCallback = Box<dyn FnOnce() + Send>;

pub enum SchedulerMsg {
    Fs(WatchEvent),
    Tasks(Vec<JanitorTask>),
    ScanRequest(Option<DoneCallback>),
    Shutdown,
}

/// Where the scheduler hands its work.
pub trait Dispatch: Send + Sync {
    /// Turn a raw change into a task, or `None` when it does not concern any
    /// source.
    fn classify(&self, event: WatchEvent) -> Option<JanitorTask>;

    fn run_tasks(&self, tasks: Vec<JanitorTask>);

    fn scan_now(&self, callbacks: Vec<DoneCallback>);
}

/// Pending janitor tasks with burst coalescing.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<JanitorTask>,
}

impl TaskQueue {
    /// Queue `task` unless it only repeats what is already queued. Returns
    /// whether the queue changed.
    pub fn push(&mut self, task: JanitorTask) -> bool {
        use Action::*;

        if self.tasks.contains(&task) {
            return false;
        }

        if task.job.action == Rename {
            let from = task.from.clone();
            let before = self.tasks.len();
            self.tasks.retain(|t| {
                let stale_delete = t.job.action == Delete && Some(&t.path) == from.as_ref();
                let stale_create = t.job.action == Create && t.path == task.path;
                !(stale_delete || stale_create)
            });
            if before != self.tasks.len() {
                debug!("Rename absorbed queued tasks for {}", task.path.display());
            }
            self.tasks.push(task);
            return true;
        }

        let last = self
            .tasks
            .iter()
            .rposition(|t| t.path == task.path && t.job.target == task.job.target);

        if let Some(idx) = last {
            let prev = self.tasks[idx].job.action;
            match (prev, task.job.action) {
                (Create | Rename, Update) => return false,
                (Delete, Update) => {
                    self.tasks[idx].job.action = Update;
                    return true;
                }
                (Update, Delete) => return false,
                _ => {}
            }
        } else if task.job.action == Update && task.job.target == Target::File {
            // A write inside a freshly created folder is covered by its rescan.
            let in_new_folder = self.tasks.iter().any(|t| {
                t.job.action == Create && t.job.target == Target::Folder && task.path.starts_with(&t.path)
            });
            if in_new_folder {
                return false;
            }
        }

        self.tasks.push(task);
        true
    }

    pub fn take(&mut self) -> Vec<JanitorTask> {
        std::mem::take(&mut self.tasks)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn as_slice(&self) -> &[JanitorTask] {
        &self.tasks
    }
}

/// Quiet periods for the two debounced streams.
#[derive(Debug, Copy, Clone)]
pub struct Delays {
    pub janitor: Duration,
    pub scan: Duration,
}

/// Run the scheduler loop on its own thread until `Shutdown` arrives or every
/// sender is dropped.
pub fn spawn<D>(rx: Receiver<SchedulerMsg>, dispatch: D, delays: Delays) -> Result<JoinHandle<()>>
where
    D: Dispatch + 'static,
{
    thread::Builder::new()
        .name("tracksync-scheduler".into())
        .spawn(move || run(rx, dispatch, delays))
        .map_err(SyncError::Spawn)
}

fn run<D: Dispatch>(rx: Receiver<SchedulerMsg>, dispatch: D, delays: Delays) {
    let mut queue = TaskQueue::default();
    let mut janitor_due: Option<Instant> = None;

    let mut callbacks: Vec<DoneCallback> = Vec::new();
    let mut scan_due: Option<Instant> = None;

    loop {
        let next = [janitor_due, scan_due].into_iter().flatten().min();
        let msg = match next {
            Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match msg {
            Ok(SchedulerMsg::Fs(event)) => {
                let accepted = dispatch.classify(event).is_some_and(|task| queue.push(task));
                if accepted {
                    janitor_due = Some(Instant::now() + delays.janitor);
                }
            }
            Ok(SchedulerMsg::Tasks(tasks)) => {
                let mut accepted = false;
                for task in tasks {
                    accepted |= queue.push(task);
                }
                if accepted {
                    janitor_due = Some(Instant::now() + delays.janitor);
                }
            }
            Ok(SchedulerMsg::ScanRequest(done)) => {
                callbacks.extend(done);
                scan_due = Some(Instant::now() + delays.scan);
            }
            Ok(SchedulerMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        if janitor_due.is_some_and(|at| at <= now) {
            janitor_due = None;
            let tasks = queue.take();
            debug!("Dispatching {} janitor task(s)", tasks.len());
            dispatch.run_tasks(tasks);
        }
        if scan_due.is_some_and(|at| at <= now) {
            scan_due = None;
            dispatch.scan_now(std::mem::take(&mut callbacks));
        }
    }

    debug!("Scheduler stopped");
}
