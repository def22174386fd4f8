//! Subprocess execution with a pull-based output stream.
//!
//! A [`ProcessRunner`] owns one child process. Its stdout and stderr are
//! read on two helper threads and merged into a single byte stream that the
//! caller pulls one byte at a time. Dropping the runner kills the child
//! and everything it started.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

const READ_CHUNK: usize = 4096;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// An executable with pre-split arguments
    Program { exe: PathBuf, args: Vec<String> },
    /// A command string for the platform shell
    Shell(String),
}

impl CommandLine {
    /// Build a program invocation.
    pub fn program(exe: impl Into<PathBuf>, args: Vec<String>) -> Self {
        CommandLine::Program { exe: exe.into(), args }
    }

    /// Build a shell invocation.
    pub fn shell(command: impl Into<String>) -> Self {
        CommandLine::Shell(command.into())
    }

    fn to_command(&self) -> Command {
        match self {
            CommandLine::Program { exe, args } => {
                let mut cmd = Command::new(exe);
                cmd.args(args);
                cmd
            }
            CommandLine::Shell(command) => {
                #[cfg(windows)]
                let (shell, shell_arg) = ("cmd", "/C");
                #[cfg(not(windows))]
                let (shell, shell_arg) = ("sh", "-c");

                let mut cmd = Command::new(shell);
                cmd.arg(shell_arg).arg(command);
                cmd
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Program { exe, args } => {
                write!(f, "{}", exe.display())?;
                for arg in args {
                    if arg.is_empty() || arg.contains(char::is_whitespace) {
                        write!(f, " \"{}\"", arg)?;
                    } else {
                        write!(f, " {}", arg)?;
                    }
                }
                Ok(())
            }
            CommandLine::Shell(command) => write!(f, "{}", command),
        }
    }
}

/// Result of a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Next byte of output
    Byte(u8),
    /// No output within the timeout; the process may still produce more
    Pending,
    /// Both output streams are closed
    End,
}

/// A running child process.
pub struct ProcessRunner {
    child: Option<Child>,
    chunks: Option<Receiver<Vec<u8>>>,
    pending: VecDeque<u8>,
    spawn_error: Option<io::Error>,
}

impl ProcessRunner {
    /// Start `command` in `working_dir`.
    ///
    /// Never fails outright: a spawn failure is reported by [`good`]
    /// and [`spawn_error`], and the runner yields no bytes.
    ///
    /// [`good`]: ProcessRunner::good
    /// [`spawn_error`]: ProcessRunner::spawn_error
    pub fn spawn(command: &CommandLine, working_dir: &Path) -> Self {
        let mut cmd = command.to_command();
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so shell pipelines can be killed as a whole.
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(%command, error = %e, "spawn failed");
                return Self { child: None, chunks: None, pending: VecDeque::new(), spawn_error: Some(e) };
            }
        };

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward(stderr, tx);
        }

        tracing::debug!(%command, pid = child.id(), "spawned");
        Self { child: Some(child), chunks: Some(rx), pending: VecDeque::new(), spawn_error: None }
    }

    /// Whether the process was created.
    pub fn good(&self) -> bool {
        self.child.is_some()
    }

    /// Why the process could not be created.
    pub fn spawn_error(&self) -> Option<&io::Error> {
        self.spawn_error.as_ref()
    }

    /// OS process id, when running.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Block until the next output byte, or `None` once output has ended.
    pub fn next_byte(&mut self) -> Option<u8> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Some(byte);
            }
            let chunk = self.chunks.as_ref()?.recv().ok()?;
            self.pending.extend(chunk);
        }
    }

    /// Wait at most `timeout` for the next output byte.
    pub fn poll_byte(&mut self, timeout: Duration) -> Poll {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Poll::Byte(byte);
            }
            let Some(chunks) = self.chunks.as_ref() else {
                return Poll::End;
            };
            match chunks.recv_timeout(timeout) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return Poll::Pending,
                Err(RecvTimeoutError::Disconnected) => return Poll::End,
            }
        }
    }
}

impl Iterator for ProcessRunner {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        self.next_byte()
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_tree(&mut child);
            let _ = child.wait();
        }
    }
}

/// Kill the child's process group. Falls back to the child alone when the
/// group is already gone.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // The unreaped child pins its pid, so the group id cannot be reused yet.
    if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        tracing::trace!(pgid, error = %e, "killpg failed");
        let _ = child.kill();
    }
}

/// Kill the child and its descendants with `taskkill /T`.
#[cfg(windows)]
fn kill_tree(child: &mut Child) {
    let killed = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &child.id().to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if !killed {
        let _ = child.kill();
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Copy a pipe into the merged channel until EOF or the runner goes away.
fn forward(mut pipe: impl Read + Send + 'static, tx: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

/// Start a process that outlives the caller, with output discarded.
pub fn launch_detached(command: &CommandLine, working_dir: &Path) -> io::Result<u32> {
    let child = command
        .to_command()
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(child.id())
}

/// Split an argument string on whitespace, keeping double-quoted runs
/// together. Quotes are removed; `""` yields an empty argument.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Locate an executable.
///
/// Names with a directory part are checked as given. Bare names are
/// searched on `PATH` (with `.exe` appended on Windows).
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if name.is_empty() {
        return None;
    }
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", name));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain() {
        assert_eq!(split_command_line("-extra4 -soft"), vec!["-extra4", "-soft"]);
        assert_eq!(split_command_line("  a   b  "), vec!["a", "b"]);
        assert!(split_command_line("").is_empty());
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_command_line("-basedir \"C:/Program Files/Quake\" +map start"),
            vec!["-basedir", "C:/Program Files/Quake", "+map", "start"]
        );
        assert_eq!(split_command_line("a \"\" b"), vec!["a", "", "b"]);
        assert_eq!(split_command_line("pre\"fix post\""), vec!["prefix post"]);
    }

    #[test]
    fn test_command_line_display() {
        let cmd = CommandLine::program("qbsp", vec!["-onlyents".into(), "my map.map".into()]);
        assert_eq!(cmd.to_string(), "qbsp -onlyents \"my map.map\"");
        assert_eq!(CommandLine::shell("echo hi").to_string(), "echo hi");
    }

    #[test]
    fn test_find_executable_missing() {
        assert!(find_executable("").is_none());
        assert!(find_executable("definitely-not-a-real-tool-xyz").is_none());
        assert!(find_executable("./no/such/tool").is_none());
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::time::Instant;

        fn collect(runner: ProcessRunner) -> String {
            String::from_utf8_lossy(&runner.collect::<Vec<u8>>()).into_owned()
        }

        #[test]
        fn test_find_executable_on_path() {
            assert!(find_executable("sh").is_some());
        }

        #[test]
        fn test_program_output() {
            let cmd = CommandLine::program("echo", vec!["hello".into(), "world".into()]);
            let runner = ProcessRunner::spawn(&cmd, Path::new("."));
            assert!(runner.good());
            assert_eq!(collect(runner), "hello world\n");
        }

        #[test]
        fn test_shell_merges_stderr() {
            let cmd = CommandLine::shell("echo out; echo err 1>&2");
            let out = collect(ProcessRunner::spawn(&cmd, Path::new(".")));
            assert!(out.contains("out\n"));
            assert!(out.contains("err\n"));
        }

        #[test]
        fn test_working_directory() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
            let out = collect(ProcessRunner::spawn(&CommandLine::shell("ls"), dir.path()));
            assert!(out.contains("marker.txt"));
        }

        #[test]
        fn test_spawn_failure() {
            let cmd = CommandLine::program("/nonexistent/tool", vec![]);
            let mut runner = ProcessRunner::spawn(&cmd, Path::new("."));
            assert!(!runner.good());
            assert!(runner.spawn_error().is_some());
            assert_eq!(runner.next_byte(), None);
            assert_eq!(runner.poll_byte(Duration::from_millis(10)), Poll::End);
        }

        #[test]
        fn test_poll_pending_while_silent() {
            let cmd = CommandLine::shell("sleep 5");
            let mut runner = ProcessRunner::spawn(&cmd, Path::new("."));
            assert_eq!(runner.poll_byte(Duration::from_millis(20)), Poll::Pending);
        }

        #[test]
        fn test_drop_kills_child() {
            let cmd = CommandLine::program("sleep", vec!["30".into()]);
            let runner = ProcessRunner::spawn(&cmd, Path::new("."));
            assert!(runner.good());

            let start = Instant::now();
            drop(runner);
            assert!(start.elapsed() < Duration::from_secs(10));
        }

        /// Whether `pid` names a live, non-zombie process.
        fn is_alive(pid: &str) -> bool {
            let out = Command::new("ps").args(["-o", "stat=", "-p", pid]).output().unwrap();
            let stat = String::from_utf8_lossy(&out.stdout).trim().to_string();
            !stat.is_empty() && !stat.starts_with('Z')
        }

        fn read_line(runner: &mut ProcessRunner) -> String {
            let deadline = Instant::now() + Duration::from_secs(10);
            let mut line = Vec::new();
            while Instant::now() < deadline {
                match runner.poll_byte(Duration::from_millis(20)) {
                    Poll::Byte(b'\n') => break,
                    Poll::Byte(byte) => line.push(byte),
                    Poll::Pending => {}
                    Poll::End => break,
                }
            }
            String::from_utf8(line).unwrap()
        }

        #[test]
        fn test_drop_kills_shell_descendants() {
            let cmd = CommandLine::shell("sleep 41.5 & echo $!; wait");
            let mut runner = ProcessRunner::spawn(&cmd, Path::new("."));
            let pid = read_line(&mut runner);
            assert!(!pid.is_empty());
            assert!(is_alive(&pid));

            drop(runner);

            let deadline = Instant::now() + Duration::from_secs(10);
            while is_alive(&pid) {
                assert!(Instant::now() < deadline, "background sleep {} survived", pid);
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}
