//! Init command implementation

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::init::{init_project, InitError};

/// Run the init command
pub fn run_init(path: Option<&Path>, name: Option<&str>, map: Option<&Path>) -> ExitCode {
    let project_path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let project_name = name
        .map(|n| n.to_string())
        .or_else(|| project_path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    match init_project(&project_path, &project_name, map) {
        Ok(config_path) => {
            println!("Created mapc project '{}' at {}", project_name, project_path.display());
            println!("  {}", config_path.display());
            println!();
            println!("Next steps:");
            println!("  cd {}", project_path.display());
            println!("  mapc build");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(InitError::AlreadyInitialized(path)) => {
            eprintln!("Error: {} already exists", path.display());
            eprintln!("Edit it directly or initialize a different directory");
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
