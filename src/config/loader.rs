//! Discovery and loading of `mapc.toml`.
//!
//! The CLI finds the nearest config, loads and validates it, then layers
//! its own flags on top with [`merge_cli_overrides`].

use super::schema::{
    DiffConfig, EngineConfig, MapcConfig, ProjectConfig, SchedulerConfig, WatchConfig,
};
use crate::build::step::default_steps;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "mapc.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse mapc.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// TOML serialization error
    #[error("Failed to write mapc.toml: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// Command-line values that replace config file values when set
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override map source file
    pub map: Option<PathBuf>,
    /// Override working directory
    pub work_dir: Option<PathBuf>,
    /// Override output directory
    pub out_dir: Option<PathBuf>,
    /// Override automatic step reduction
    pub auto_reduce: Option<bool>,
    /// Override engine launch
    pub launch: Option<bool>,
    /// Override worker count
    pub jobs: Option<usize>,
}

/// Locate the project config for the current directory.
///
/// The nearest `mapc.toml` at or above the current directory wins; the
/// per-user file under the XDG config directory is the fallback.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir()
        .ok()
        .and_then(|cwd| find_config_from(&cwd))
        .or_else(find_xdg_config)
}

/// Per-user config at `$XDG_CONFIG_HOME/mapc/mapc.toml`, falling back to
/// `~/.config/mapc/mapc.toml`.
pub fn find_xdg_config() -> Option<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("mapc").join(CONFIG_FILE)).filter(|path| path.is_file())
}

/// Nearest `mapc.toml` in `start` or one of its ancestors.
pub fn find_config_from(start: &Path) -> Option<PathBuf> {
    start.ancestors().map(|dir| dir.join(CONFIG_FILE)).find(|path| path.is_file())
}

/// Load and validate a config file.
///
/// With no path, the file is discovered with [`find_config`]; when nothing
/// is found the built-in defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<MapcConfig, ConfigError> {
    match path.map(Path::to_path_buf).or_else(find_config) {
        Some(path) => {
            let config: MapcConfig = toml::from_str(&fs::read_to_string(&path)?)?;
            check(&config)?;
            Ok(config)
        }
        None => Ok(default_config()),
    }
}

fn check(config: &MapcConfig) -> Result<(), ConfigError> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    Err(ConfigError::Validation(errors.iter().map(ToString::to_string).collect()))
}

/// Create a default configuration when no mapc.toml is found.
///
/// The project name is taken from the current directory name.
pub fn default_config() -> MapcConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    MapcConfig {
        project: ProjectConfig {
            name: project_name,
            map: PathBuf::from("maps/start.map"),
            work_dir: PathBuf::from("build/work"),
            out_dir: PathBuf::from("build/maps"),
        },
        steps: default_steps(),
        diff: DiffConfig::default(),
        engine: EngineConfig::default(),
        scheduler: SchedulerConfig::default(),
        watch: WatchConfig::default(),
    }
}

/// Write a configuration to disk, validating it first.
pub fn save_config(config: &MapcConfig, path: &Path) -> Result<(), ConfigError> {
    check(config)?;
    let contents = toml::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Apply command-line overrides on top of file values.
pub fn merge_cli_overrides(config: &mut MapcConfig, overrides: &CliOverrides) {
    let project = &mut config.project;
    for (target, value) in [
        (&mut project.map, &overrides.map),
        (&mut project.work_dir, &overrides.work_dir),
        (&mut project.out_dir, &overrides.out_dir),
    ] {
        if let Some(value) = value {
            target.clone_from(value);
        }
    }

    if let Some(auto_reduce) = overrides.auto_reduce {
        config.diff.auto_reduce = auto_reduce;
    }
    if let Some(launch) = overrides.launch {
        config.engine.launch = launch;
    }
    if let Some(jobs) = overrides.jobs {
        config.scheduler.max_workers = jobs.max(1);
    }
}

/// Directory a config file roots its project at.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

/// Join a relative path onto the project root; absolute paths pass through.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    project_root.join(path)
}
