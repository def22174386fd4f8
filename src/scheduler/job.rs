//! Units of work accepted by the scheduler.

use std::fmt;

/// Classification tag carried by every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// A full build pipeline
    Build,
    /// A single configured tool
    Tool,
    /// An ad-hoc shell command
    Shell,
    /// Anything else
    Generic,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Build => write!(f, "build"),
            JobKind::Tool => write!(f, "tool"),
            JobKind::Shell => write!(f, "shell"),
            JobKind::Generic => write!(f, "generic"),
        }
    }
}

/// A unit of work run once on a worker thread.
///
/// Jobs own everything they need; they never see scheduler internals.
pub trait Job: Send + 'static {
    /// Consume and run the job.
    fn run(self: Box<Self>);

    /// Tag used for logging.
    fn kind(&self) -> JobKind {
        JobKind::Generic
    }
}

/// A closure job. Any payload is captured by the closure.
pub struct FnJob<F> {
    kind: JobKind,
    f: F,
}

impl<F> FnJob<F>
where
    F: FnOnce() + Send + 'static,
{
    /// Wrap a closure with a tag.
    pub fn new(kind: JobKind, f: F) -> Self {
        Self { kind, f }
    }
}

impl<F> Job for FnJob<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (self.f)()
    }

    fn kind(&self) -> JobKind {
        self.kind
    }
}

/// Wrap a closure as a [`JobKind::Generic`] job.
pub fn job<F>(f: F) -> FnJob<F>
where
    F: FnOnce() + Send + 'static,
{
    FnJob::new(JobKind::Generic, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fn_job_runs_closure() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let boxed: Box<dyn Job> = Box::new(job(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(boxed.kind(), JobKind::Generic);
        boxed.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fn_job_kind() {
        let shell = FnJob::new(JobKind::Shell, || {});
        assert_eq!(shell.kind(), JobKind::Shell);
        assert_eq!(JobKind::Build.to_string(), "build");
    }
}
