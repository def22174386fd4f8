//! One worker: a bounded FIFO drained by a dedicated thread.

use super::job::Job;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[derive(Default)]
struct State {
    queue: VecDeque<Box<dyn Job>>,
    stop: bool,
    running: bool,
}

/// State shared between a worker handle and its thread.
#[derive(Default)]
pub(crate) struct Shared {
    state: Mutex<State>,
    /// Signalled on submission and on stop
    work: Condvar,
    /// Signalled when the queue drains and nothing is running
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `job` unless the queue is full or the worker is stopping.
    pub(crate) fn try_push(&self, job: Box<dyn Job>, capacity: usize) -> Result<(), Box<dyn Job>> {
        let mut state = self.lock();
        if state.stop || state.queue.len() >= capacity {
            return Err(job);
        }
        state.queue.push_back(job);
        self.work.notify_one();
        Ok(())
    }

    /// Number of queued, not yet started jobs.
    pub(crate) fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Block until the queue is empty and no job is running.
    ///
    /// Returns whether it had to wait.
    pub(crate) fn wait_idle(&self) -> bool {
        let mut state = self.lock();
        let mut waited = false;
        while !state.stop && (state.running || !state.queue.is_empty()) {
            waited = true;
            state = self.idle.wait(state).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        waited
    }

    pub(crate) fn stop(&self) {
        self.lock().stop = true;
        self.work.notify_all();
        self.idle.notify_all();
    }

    /// Pop the next job, or `None` once stopped.
    fn next(&self) -> Option<Box<dyn Job>> {
        let mut state = self.lock();
        loop {
            if state.stop {
                return None;
            }
            if let Some(job) = state.queue.pop_front() {
                state.running = true;
                return Some(job);
            }
            state = self.work.wait(state).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.running = false;
        if state.queue.is_empty() {
            self.idle.notify_all();
        }
    }
}

/// Handle to a worker thread. Dropping it stops and joins the thread.
pub(crate) struct Worker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start an idle worker.
    pub(crate) fn spawn(index: usize) -> io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(format!("mapc-worker-{}", index))
            .spawn(move || run_loop(index, &thread_shared))?;

        tracing::debug!(worker = index, "worker started");
        Ok(Self { shared, thread: Some(thread) })
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shared.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("worker thread panicked outside a job");
            }
        }
    }
}

fn run_loop(index: usize, shared: &Shared) {
    while let Some(job) = shared.next() {
        let kind = job.kind();
        tracing::debug!(worker = index, %kind, "job started");
        if panic::catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
            tracing::error!(worker = index, %kind, "job panicked");
        }
        shared.finish();
    }
    tracing::debug!(worker = index, "worker stopped");
}
