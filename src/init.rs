//! Project initialization for mapc
//!
//! Writes a default `mapc.toml` and, when the map does not exist yet, a
//! starter map containing only worldspawn.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::loader::{save_config, CONFIG_FILE};
use crate::config::{default_config, ConfigError};

/// Error during project initialization
#[derive(Debug, Error)]
pub enum InitError {
    /// mapc.toml already exists
    #[error("Project already initialized: {}", .0.display())]
    AlreadyInitialized(PathBuf),
    /// Failed to create a directory or file
    #[error("Failed to create project files: {0}")]
    Io(#[from] std::io::Error),
    /// Config could not be written
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Map written when the configured map does not exist.
const STARTER_MAP: &str = "// Game: Quake\n// Format: Standard\n// entity 0\n{\n\"classname\" \"worldspawn\"\n\"wad\" \"\"\n}\n";

const GITIGNORE: &str = "/build/\n";

/// Initialize a mapc project in `path`.
///
/// Returns the path of the written `mapc.toml`.
pub fn init_project(path: &Path, name: &str, map: Option<&Path>) -> Result<PathBuf, InitError> {
    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() {
        return Err(InitError::AlreadyInitialized(config_path));
    }
    fs::create_dir_all(path)?;

    let mut config = default_config();
    config.project.name = name.to_string();
    if let Some(map) = map {
        config.project.map = map.to_path_buf();
    }
    save_config(&config, &config_path)?;

    let map_path = path.join(&config.project.map);
    if !map_path.exists() {
        if let Some(parent) = map_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&map_path, STARTER_MAP)?;
    }

    let gitignore = path.join(".gitignore");
    if !gitignore.exists() {
        fs::write(gitignore, GITIGNORE)?;
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::parser::parse_file;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_config_and_map() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("e1m1");

        let config_path = init_project(&root, "e1m1", None).unwrap();
        assert_eq!(config_path, root.join("mapc.toml"));

        let config = load_config(Some(&config_path)).unwrap();
        assert_eq!(config.project.name, "e1m1");
        assert_eq!(config.steps.len(), 3);

        let doc = parse_file(&root.join("maps/start.map")).unwrap();
        assert!(doc.worldspawn().is_some());
        assert!(root.join(".gitignore").exists());
    }

    #[test]
    fn test_init_custom_map_keeps_existing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/dm1.map"), "{\n\"classname\" \"worldspawn\"\n\"message\" \"mine\"\n}\n").unwrap();

        init_project(temp.path(), "dm", Some(Path::new("src/dm1.map"))).unwrap();

        let config = load_config(Some(&temp.path().join("mapc.toml"))).unwrap();
        assert_eq!(config.project.map, PathBuf::from("src/dm1.map"));
        let content = fs::read_to_string(temp.path().join("src/dm1.map")).unwrap();
        assert!(content.contains("mine"));
    }

    #[test]
    fn test_init_refuses_existing_project() {
        let temp = TempDir::new().unwrap();
        init_project(temp.path(), "a", None).unwrap();
        let err = init_project(temp.path(), "b", None).unwrap_err();
        assert!(matches!(err, InitError::AlreadyInitialized(_)));
    }
}
