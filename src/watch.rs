//! Watch mode for automatic rebuilds on map changes
//!
//! Watches the map file with debouncing for the `mapc watch` command. Every
//! save re-parses the map and starts a build that supersedes the one in
//! progress; tool output is drained to the terminal once per tick.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::build::{BuildController, BuildOptions, BuildReport};
use crate::config::schema::WatchConfig;
use crate::parser;

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    Channel(String),
    /// Map file not found
    #[error("Map file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// Map could not be read
    #[error("Failed to read map: {0}")]
    Io(#[from] io::Error),
}

/// Options for watch mode
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Map file to watch
    pub map_path: PathBuf,
    /// Watch configuration (debounce, clear screen, tick)
    pub config: WatchConfig,
    /// Launch the engine after each successful build
    pub run_target: bool,
}

impl WatchOptions {
    pub fn new(map_path: PathBuf, config: WatchConfig) -> Self {
        Self { map_path, config, run_target: false }
    }

    pub fn with_run_target(mut self, run_target: bool) -> Self {
        self.run_target = run_target;
        self
    }
}

/// State of one watch session: the last text seen and the build in flight.
pub struct WatchSession<'a> {
    controller: &'a BuildController,
    options: WatchOptions,
    last_text: Option<String>,
    pending: Option<(Receiver<BuildReport>, Instant)>,
}

impl<'a> WatchSession<'a> {
    pub fn new(controller: &'a BuildController, options: WatchOptions) -> Self {
        Self { controller, options, last_text: None, pending: None }
    }

    /// Re-read the map and start a build if its text changed.
    ///
    /// Returns whether a build was started.
    pub fn rebuild(&mut self) -> Result<bool, WatchError> {
        let text = std::fs::read_to_string(&self.options.map_path)?;
        if self.last_text.as_deref() == Some(text.as_str()) {
            tracing::debug!("map unchanged, skipping build");
            return Ok(false);
        }

        let doc = Arc::new(parser::parse(&text));
        self.last_text = Some(text);
        tracing::info!(entities = doc.entities().len(), "starting build");

        let options = BuildOptions { run_target: self.options.run_target, force_full: false };
        match self.controller.start_build(doc, options) {
            Some(rx) => {
                self.pending = Some((rx, Instant::now()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write buffered tool output and return the report of a build that
    /// just finished.
    pub fn poll(&mut self, out: &mut impl Write) -> io::Result<Option<BuildReport>> {
        let text = self.controller.output().drain();
        if !text.is_empty() {
            out.write_all(text.as_bytes())?;
            out.flush()?;
        }

        let Some((rx, started)) = &self.pending else {
            return Ok(None);
        };
        let started = *started;
        match rx.try_recv() {
            Ok(mut report) => {
                report.total_duration = started.elapsed();
                self.pending = None;
                Ok(Some(report))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                Ok(None)
            }
        }
    }

    /// Whether a build started by this session has not reported yet.
    pub fn is_building(&self) -> bool {
        self.pending.is_some()
    }
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Get current timestamp for logging
fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Whether a changed path is the watched map.
fn is_relevant_file(path: &Path, map_path: &Path) -> bool {
    path.file_name().is_some() && path.file_name() == map_path.file_name()
}

fn print_report(report: &BuildReport) {
    if report.is_success() {
        println!("[{}] Build complete ({})", timestamp(), format_duration(report.total_duration));
    } else {
        println!("[{}] {}", timestamp(), report.summary());
    }
}

/// Watch the map and rebuild on every change.
///
/// Blocks until interrupted (Ctrl+C). The directory containing the map is
/// watched rather than the file, so editors that save by renaming a temp
/// file are still seen.
pub fn watch_and_rebuild(controller: &BuildController, options: WatchOptions) -> Result<(), WatchError> {
    let map_path = options.map_path.clone();
    if !map_path.is_file() {
        return Err(WatchError::SourceNotFound(map_path));
    }
    let watch_dir = map_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let clear = options.config.clear_screen;
    let tick = Duration::from_millis(options.config.poll_ms.max(1));

    let (tx, rx) = channel();
    let debounce_duration = Duration::from_millis(options.config.debounce_ms as u64);
    let mut debouncer = new_debouncer(debounce_duration, tx).map_err(WatchError::WatcherInit)?;
    debouncer
        .watcher()
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(WatchError::WatchPath)?;

    let mut session = WatchSession::new(controller, options);
    let mut stdout = io::stdout();

    if clear {
        clear_screen();
    }
    println!("[{}] Building...", timestamp());
    session.rebuild()?;
    println!("[{}] Watching {} for changes...", timestamp(), map_path.display());

    loop {
        match rx.recv_timeout(tick) {
            Ok(Ok(events)) => {
                let changed = events
                    .iter()
                    .any(|e| matches!(e.kind, DebouncedEventKind::Any) && is_relevant_file(&e.path, &map_path));
                if changed {
                    if clear {
                        clear_screen();
                    }
                    println!("[{}] Changed: {}", timestamp(), map_path.display());
                    match session.rebuild() {
                        Ok(true) => println!("[{}] Building...", timestamp()),
                        Ok(false) => {}
                        // Editors can briefly remove the file mid-save.
                        Err(e) => eprintln!("[{}] {}", timestamp(), e),
                    }
                }
            }
            Ok(Err(error)) => {
                eprintln!("[{}] Watch error: {:?}", timestamp(), error);
                eprintln!("[{}] Continuing to watch...", timestamp());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(WatchError::Channel("watcher disconnected".to_string()));
            }
        }

        if let Some(report) = session.poll(&mut stdout)? {
            print_report(&report);
            println!("[{}] Watching {} for changes...", timestamp(), map_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::test_support::{project, RecordingExecutor, BASE};
    use crate::build::StepExecutor;

    fn wait_for_report(session: &mut WatchSession<'_>, out: &mut Vec<u8>) -> BuildReport {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(report) = session.poll(out).unwrap() {
                return report;
            }
            assert!(Instant::now() < deadline, "build never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_is_relevant_file() {
        let map = Path::new("/p/maps/start.map");
        assert!(is_relevant_file(Path::new("/p/maps/start.map"), map));
        assert!(!is_relevant_file(Path::new("/p/maps/start.map.autosave"), map));
        assert!(!is_relevant_file(Path::new("/p/maps/other.map"), map));
        assert!(!is_relevant_file(Path::new("/"), map));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
        assert_eq!(format_duration(Duration::from_millis(1000)), "1.00s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_watch_error_source_not_found() {
        let (_dir, ctx) = project(BASE);
        let controller = BuildController::new(ctx);
        let options = WatchOptions::new(PathBuf::from("/nonexistent/start.map"), WatchConfig::default());
        let result = watch_and_rebuild(&controller, options);
        assert!(matches!(result, Err(WatchError::SourceNotFound(_))));
    }

    #[test]
    fn test_session_rebuilds_on_change_only() {
        let (_dir, ctx) = project(BASE);
        let executor = Arc::new(RecordingExecutor::producing());
        let dyn_executor: Arc<dyn StepExecutor> = executor.clone();
        let controller = BuildController::with_executor(ctx.clone(), dyn_executor);
        let mut session =
            WatchSession::new(&controller, WatchOptions::new(ctx.map_path(), WatchConfig::default()));
        let mut out = Vec::new();

        assert!(session.rebuild().unwrap());
        assert!(session.is_building());
        assert!(wait_for_report(&mut session, &mut out).is_success());
        assert_eq!(executor.call_count(), 3);

        // Touch without edits
        assert!(!session.rebuild().unwrap());

        let edited = BASE.replace("\"_sunlight\" \"1\"", "\"_sunlight\" \"3\"");
        std::fs::write(ctx.map_path(), edited).unwrap();
        assert!(session.rebuild().unwrap());
        assert!(wait_for_report(&mut session, &mut out).is_success());
        assert_eq!(executor.labels()[3..], ["bsp (qbsp)".to_string(), "light (light)".to_string()]);

        controller.wait_for_idle();
        session.poll(&mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("tool output"));
        assert!(printed.contains("Changed: lighting"));
    }

    #[test]
    fn test_session_missing_map() {
        let (dir, ctx) = project(BASE);
        let controller = BuildController::new(ctx.clone());
        let mut session =
            WatchSession::new(&controller, WatchOptions::new(ctx.map_path(), WatchConfig::default()));
        std::fs::remove_file(dir.path().join("maps/start.map")).unwrap();

        assert!(matches!(session.rebuild(), Err(WatchError::Io(_))));
        assert!(!session.is_building());
    }
}
