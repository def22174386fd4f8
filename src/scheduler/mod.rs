//! Bounded multi-worker job scheduler.
//!
//! Each worker owns a FIFO of at most `capacity` jobs and one thread.
//! Submissions are spread round-robin, starting after the worker that took
//! the previous job. Workers are created lazily when every existing queue is
//! full, up to `max_workers`, and never shrink.
//!
//! # Example
//!
//! ```
//! use mapc::scheduler::{job, JobScheduler};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let scheduler = JobScheduler::new(2, 8);
//! let count = Arc::new(AtomicUsize::new(0));
//! let c = Arc::clone(&count);
//! assert!(scheduler.submit(job(move || {
//!     c.fetch_add(1, Ordering::SeqCst);
//! })));
//! scheduler.wait_for_idle();
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! ```

mod job;
mod worker;

pub use job::{job, FnJob, Job, JobKind};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use worker::{Shared, Worker};

/// Fixed-capacity worker pool.
pub struct JobScheduler {
    workers: Mutex<Vec<Worker>>,
    /// Index of the worker that accepted the last job
    cursor: AtomicUsize,
    max_workers: usize,
    capacity: usize,
}

impl JobScheduler {
    /// Create a scheduler with no running workers.
    ///
    /// Zero limits are raised to one.
    pub fn new(max_workers: usize, capacity: usize) -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            max_workers: max_workers.max(1),
            capacity: capacity.max(1),
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<Worker>> {
        self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a job.
    ///
    /// Returns false when every queue is full and no more workers may be
    /// created. That is backpressure; the job is dropped.
    pub fn submit(&self, job: impl Job) -> bool {
        self.submit_boxed(Box::new(job)).is_ok()
    }

    /// Queue a boxed job, handing it back when rejected.
    pub fn submit_boxed(&self, job: Box<dyn Job>) -> Result<(), Box<dyn Job>> {
        let mut workers = self.lock_workers();
        let count = workers.len();
        let start = self.cursor.load(Ordering::SeqCst) + 1;

        let mut job = job;
        for offset in 0..count {
            let index = (start + offset) % count;
            match workers[index].shared().try_push(job, self.capacity) {
                Ok(()) => {
                    self.cursor.store(index, Ordering::SeqCst);
                    return Ok(());
                }
                Err(rejected) => job = rejected,
            }
        }

        if count >= self.max_workers {
            tracing::warn!(workers = count, capacity = self.capacity, "scheduler full, job rejected");
            return Err(job);
        }

        let worker = match Worker::spawn(count) {
            Ok(worker) => worker,
            Err(e) => {
                tracing::error!(error = %e, "failed to start worker thread");
                return Err(job);
            }
        };
        worker.shared().try_push(job, self.capacity)?;
        workers.push(worker);
        self.cursor.store(count, Ordering::SeqCst);
        Ok(())
    }

    /// Number of workers created so far.
    pub fn worker_count(&self) -> usize {
        self.lock_workers().len()
    }

    /// Number of jobs waiting to start, across all workers.
    pub fn queued(&self) -> usize {
        self.lock_workers().iter().map(|w| w.shared().queued()).sum()
    }

    /// Block until every queue is empty and no job is running.
    ///
    /// Jobs may submit more jobs while this waits; it returns only after a
    /// full pass finds every worker idle.
    pub fn wait_for_idle(&self) {
        loop {
            let shared: Vec<Arc<Shared>> =
                self.lock_workers().iter().map(|w| Arc::clone(w.shared())).collect();
            let waited = shared.iter().fold(false, |acc, s| s.wait_idle() || acc);
            if !waited {
                return;
            }
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        let workers = std::mem::take(&mut *self.lock_workers());
        // Stop all first so workers wind down concurrently, then join.
        for worker in &workers {
            worker.shared().stop();
        }
        drop(workers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until(what: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !what() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Job that counts its start and blocks until `gate` opens.
    fn blocking(started: &Arc<AtomicUsize>, gate: &Arc<AtomicBool>) -> Box<dyn Job> {
        let started = Arc::clone(started);
        let gate = Arc::clone(gate);
        Box::new(FnJob::new(JobKind::Generic, move || {
            started.fetch_add(1, Ordering::SeqCst);
            while !gate.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        }))
    }

    #[test]
    fn test_runs_jobs() {
        let scheduler = JobScheduler::new(2, 4);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let c = Arc::clone(&count);
            assert!(scheduler.submit(job(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })));
        }
        scheduler.wait_for_idle();
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(scheduler.queued(), 0);
    }

    #[test]
    fn test_fifo_within_worker() {
        let scheduler = JobScheduler::new(1, 16);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let o = Arc::clone(&order);
            assert!(scheduler.submit(job(move || o.lock().unwrap().push(i))));
        }
        scheduler.wait_for_idle();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_workers_created_lazily() {
        let scheduler = JobScheduler::new(4, 16);
        assert_eq!(scheduler.worker_count(), 0);
        for _ in 0..3 {
            assert!(scheduler.submit(job(|| {})));
        }
        assert_eq!(scheduler.worker_count(), 1);
        scheduler.wait_for_idle();
    }

    #[test]
    fn test_rejects_when_full() {
        let scheduler = JobScheduler::new(2, 2);
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(AtomicBool::new(false));

        // Worker 0: one running, two queued.
        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());
        wait_until(|| started.load(Ordering::SeqCst) == 1);
        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());
        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());
        assert_eq!(scheduler.worker_count(), 1);

        // Overflow creates worker 1.
        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());
        assert_eq!(scheduler.worker_count(), 2);
        wait_until(|| started.load(Ordering::SeqCst) == 2);
        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());
        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());

        assert_eq!(scheduler.queued(), 4);
        assert!(!scheduler.submit(job(|| {})));
        assert!(scheduler.submit_boxed(Box::new(job(|| {}))).is_err());

        gate.store(true, Ordering::SeqCst);
        scheduler.wait_for_idle();
        assert_eq!(started.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_round_robin_starts_after_last_assigned() {
        let scheduler = JobScheduler::new(2, 1);
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(AtomicBool::new(false));

        // Worker 0 busy with a full queue, so the third job opens worker 1.
        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());
        wait_until(|| started.load(Ordering::SeqCst) == 1);
        assert!(scheduler.submit(job(|| {})));
        assert!(scheduler.submit(job(|| {})));
        assert_eq!(scheduler.worker_count(), 2);
        gate.store(true, Ordering::SeqCst);
        scheduler.wait_for_idle();

        // Both workers idle; worker 1 took the last job.
        let names = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..4 {
            let n = Arc::clone(&names);
            assert!(scheduler.submit(job(move || {
                let name = thread::current().name().map(str::to_string);
                n.lock().unwrap().push(name.unwrap_or_default());
            })));
            scheduler.wait_for_idle();
        }

        assert_eq!(
            *names.lock().unwrap(),
            vec!["mapc-worker-0", "mapc-worker-1", "mapc-worker-0", "mapc-worker-1"]
        );
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let scheduler = JobScheduler::new(1, 4);
        let count = Arc::new(AtomicUsize::new(0));
        assert!(scheduler.submit(job(|| panic!("boom"))));
        let c = Arc::clone(&count);
        assert!(scheduler.submit(job(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })));

        scheduler.wait_for_idle();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.worker_count(), 1);
    }

    #[test]
    fn test_drop_discards_queued_jobs() {
        let scheduler = JobScheduler::new(1, 8);
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(AtomicBool::new(false));
        let ran = Arc::new(AtomicUsize::new(0));

        assert!(scheduler.submit_boxed(blocking(&started, &gate)).is_ok());
        wait_until(|| started.load(Ordering::SeqCst) == 1);
        for _ in 0..3 {
            let r = Arc::clone(&ran);
            assert!(scheduler.submit(job(move || {
                r.fetch_add(1, Ordering::SeqCst);
            })));
        }

        let opener = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                gate.store(true, Ordering::SeqCst);
            })
        };
        drop(scheduler);
        opener.join().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_limits_are_raised() {
        let scheduler = JobScheduler::new(0, 0);
        assert!(scheduler.submit(job(|| {})));
        scheduler.wait_for_idle();
        assert_eq!(scheduler.worker_count(), 1);
    }
}
