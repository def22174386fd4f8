//! Persistent record of the last successful build.
//!
//! Everything lives under `.mapc/` in the working directory:
//!
//! - `manifest.json` lists the source and the steps that ran;
//! - `last-built.map` is the source text the compiled map was built from.
//!
//! The snapshot lets a one-shot `mapc build` diff against the previous run
//! the same way watch mode diffs against its in-memory copy.
//!
//! ```json
//! {
//!   "version": 1,
//!   "built_at": "2026-03-01T10:35:00Z",
//!   "source": "/home/me/quake/maps/start.map",
//!   "reduced": true,
//!   "steps": [
//!     { "kind": "bsp", "label": "bsp (qbsp)", "duration_ms": 420 },
//!     { "kind": "light", "label": "light (light)", "duration_ms": 1800 }
//!   ]
//! }
//! ```

use crate::build::step::StepKind;
use crate::models::MapDocument;
use crate::parser;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Current manifest format version.
const MANIFEST_VERSION: u32 = 1;

/// State directory inside the working directory.
pub const STATE_DIR: &str = ".mapc";

/// Manifest filename inside [`STATE_DIR`].
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Snapshot filename inside [`STATE_DIR`].
pub const SNAPSHOT_FILENAME: &str = "last-built.map";

/// Error during manifest operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Version mismatch
    #[error("Manifest version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// One step that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step kind
    pub kind: StepKind,
    /// Step label
    pub label: String,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

/// Record of the last successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Manifest format version
    pub version: u32,
    /// When the build finished
    pub built_at: String,
    /// Source map path
    pub source: PathBuf,
    /// Whether the plan was reduced from the full step list
    #[serde(default)]
    pub reduced: bool,
    /// Steps that ran, in order
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl BuildManifest {
    /// Create a manifest for `source` with no steps.
    pub fn new(source: PathBuf) -> Self {
        Self {
            version: MANIFEST_VERSION,
            built_at: format_timestamp(SystemTime::now()),
            source,
            reduced: false,
            steps: Vec::new(),
        }
    }

    /// Record a step that ran.
    pub fn record_step(&mut self, kind: StepKind, label: &str, duration: Duration) {
        self.steps.push(StepRecord {
            kind,
            label: label.to_string(),
            duration_ms: duration.as_millis() as u64,
        });
    }

    /// Load a manifest from a file.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        if !path.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(File::open(path)?);
        let manifest: BuildManifest = serde_json::from_reader(reader)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::VersionMismatch {
                expected: MANIFEST_VERSION,
                found: manifest.version,
            });
        }

        Ok(Some(manifest))
    }

    /// Load the manifest from a working directory.
    pub fn load_from_dir(work_dir: &Path) -> Result<Option<Self>, ManifestError> {
        Self::load(&state_dir(work_dir).join(MANIFEST_FILENAME))
    }

    /// Save the manifest to a file, stamping the current time.
    pub fn save(&mut self, path: &Path) -> Result<(), ManifestError> {
        self.built_at = format_timestamp(SystemTime::now());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Save the manifest into a working directory.
    pub fn save_to_dir(&mut self, work_dir: &Path) -> Result<(), ManifestError> {
        self.save(&state_dir(work_dir).join(MANIFEST_FILENAME))
    }
}

/// State directory for a working directory.
pub fn state_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(STATE_DIR)
}

/// Store the source text of a successful build.
pub fn save_snapshot(work_dir: &Path, doc: &MapDocument) -> io::Result<()> {
    let dir = state_dir(work_dir);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(SNAPSHOT_FILENAME), doc.text())
}

/// Load the source of the last successful build, if any.
pub fn load_snapshot(work_dir: &Path) -> io::Result<Option<MapDocument>> {
    let path = state_dir(work_dir).join(SNAPSHOT_FILENAME);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(Some(parser::parse(&text))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove the snapshot and manifest so the next build starts from scratch.
pub fn clear_build_state(work_dir: &Path) -> io::Result<()> {
    let dir = state_dir(work_dir);
    for name in [SNAPSHOT_FILENAME, MANIFEST_FILENAME] {
        match fs::remove_file(dir.join(name)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

/// Format a time as an ISO 8601 UTC timestamp.
fn format_timestamp(time: SystemTime) -> String {
    let secs = time.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let rem = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
