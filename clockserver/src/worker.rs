//! Worker threads for threaded clocking.
//!
//! Each worker owns a private mutex/condvar pair rather than participating
//! in one shared barrier primitive: the server signals every worker with
//! pending tasks through its wake-to-work condition, then joins them one by
//! one through their finished-condition. A slow worker therefore never
//! delays the signalling of unrelated workers; only the server's join loop
//! waits.
//!
//! The strict fan-out/fan-in alternation is what makes the task lists safe:
//! the server appends tasks only before the wake signal, and the worker
//! drains its list only after it, so the two sides never touch the list
//! concurrently.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::server::registry::ClockTask;

/// Identifier of a worker thread mapped by the clock server.
///
/// Worker identifiers are handed out by the server when a clock domain is
/// created (each domain gets a default worker) or on explicit request; they
/// can then be used as placement hints at registration time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId(pub(crate) usize);

impl WorkerId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// One worker of the fixed pool, executing a static subset of callbacks per
/// cycle.
pub(crate) struct Worker {
    id: WorkerId,
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

struct WorkerShared {
    state: Mutex<WorkerState>,
    /// Signalled by the server once the task list for the cycle is complete.
    wake: Condvar,
    /// Signalled by the worker once its task list is drained.
    done: Condvar,
}

struct WorkerState {
    tasks: Vec<ClockTask>,
    active: bool,
    finished: bool,
    force_exit: bool,
    /// Payload of a callback panic, propagated to the dispatch thread at the
    /// barrier.
    panic: Option<Box<dyn Any + Send>>,
}

impl Worker {
    /// Creates a new, unspawned worker.
    pub(crate) fn new(id: WorkerId) -> Self {
        Self {
            id,
            shared: Arc::new(WorkerShared {
                state: Mutex::new(WorkerState {
                    tasks: Vec::new(),
                    active: false,
                    finished: false,
                    force_exit: false,
                    panic: None,
                }),
                wake: Condvar::new(),
                done: Condvar::new(),
            }),
            thread: None,
        }
    }

    /// Starts the OS thread backing this worker.
    pub(crate) fn spawn(&mut self) {
        if self.thread.is_some() {
            return;
        }
        let id = self.id;
        let shared = self.shared.clone();
        let thread = thread::Builder::new()
            .name(format!("clock-worker-{}", id.index()))
            .spawn(move || worker_main(id, shared))
            .expect("failed to spawn clock worker thread");
        self.thread = Some(thread);
    }

    /// Appends a task to the list for the current cycle.
    ///
    /// Must only be called between barriers, i.e. while the worker is idle.
    pub(crate) fn push_task(&self, task: ClockTask) {
        let mut state = self.shared.state.lock().unwrap();
        debug_assert!(!state.active);
        state.tasks.push(task);
    }

    /// Wakes the worker to process its task list.
    pub(crate) fn begin_batch(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.active = true;
            state.finished = false;
        }
        self.shared.wake.notify_one();
    }

    /// Blocks until the worker has drained its task list.
    ///
    /// If a callback panicked on the worker thread, the panic is resumed
    /// here, on the dispatch thread.
    pub(crate) fn wait_finished(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !state.finished {
            state = self.shared.done.wait(state).unwrap();
        }
        if let Some(payload) = state.panic.take() {
            drop(state);
            panic::resume_unwind(payload);
        }
    }

    /// Stops and joins the backing thread, if any.
    ///
    /// The worker must be idle; tearing down an active worker is a fatal
    /// precondition violation.
    pub(crate) fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        {
            let mut state = self.shared.state.lock().unwrap();
            if !thread::panicking() {
                assert!(
                    !state.active,
                    "worker {} torn down while active",
                    self.id.index()
                );
            }
            state.force_exit = true;
        }
        self.shared.wake.notify_one();
        if thread.join().is_err() && !thread::panicking() {
            panic!("worker {} panicked", self.id.index());
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main(id: WorkerId, shared: Arc<WorkerShared>) {
    debug!(worker = id.index(), "worker thread started");

    let mut state = shared.state.lock().unwrap();
    loop {
        // The force-exit flag is only honored between task batches.
        if state.force_exit {
            break;
        }
        if !state.active {
            state = shared.wake.wait(state).unwrap();
            continue;
        }

        let batch = mem::take(&mut state.tasks);
        drop(state);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for task in batch {
                task.run();
            }
        }));

        state = shared.state.lock().unwrap();
        if let Err(payload) = outcome {
            state.panic.get_or_insert(payload);
        }
        state.active = false;
        state.finished = true;
        shared.done.notify_one();
    }

    debug!(worker = id.index(), "worker thread exiting");
}
