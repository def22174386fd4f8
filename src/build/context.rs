//! Build context containing configuration and paths for a build.

use crate::config::{loader, MapcConfig};
use std::path::{Path, PathBuf};

/// Settings and resolved paths for one project.
///
/// The context is the only place a build reads settings from. It is cloned
/// into every job so that a config reload never affects a running build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    config: MapcConfig,
    /// Directory relative config paths are resolved against
    project_root: PathBuf,
    verbose: bool,
}

impl BuildContext {
    /// Context for `config`, rooted at `project_root`.
    pub fn new(config: MapcConfig, project_root: PathBuf) -> Self {
        Self { config, project_root, verbose: false }
    }

    pub fn config(&self) -> &MapcConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Absolute path of the source map.
    pub fn map_path(&self) -> PathBuf {
        self.resolve_path(&self.config.project.map)
    }

    /// Directory containing the source map.
    pub fn source_dir(&self) -> PathBuf {
        let map = self.map_path();
        map.parent().map(Path::to_path_buf).unwrap_or_else(|| self.project_root.clone())
    }

    /// Map file stem, e.g. `start` for `maps/start.map`.
    pub fn map_name(&self) -> String {
        self.config
            .project
            .map
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Working directory where tools run (resolved to absolute path).
    pub fn work_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.work_dir)
    }

    /// Output directory for compiled artifacts (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out_dir)
    }

    /// Path of the map copy inside the working directory.
    pub fn work_map(&self) -> PathBuf {
        self.work_dir().join(self.work_file("map"))
    }

    /// File name of a work-dir artifact with the given extension.
    pub fn work_file(&self, ext: &str) -> String {
        format!("{}.{}", self.map_name(), ext)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolve a config path against the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        loader::resolve_path(&self.project_root, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    fn ctx() -> BuildContext {
        BuildContext::new(default_config(), PathBuf::from("/project"))
    }

    #[test]
    fn test_build_context_new() {
        let ctx = ctx();
        assert_eq!(ctx.project_root(), Path::new("/project"));
        assert!(!ctx.is_verbose());
        assert!(ctx.with_verbose(true).is_verbose());
    }

    #[test]
    fn test_build_context_resolve_path() {
        let ctx = ctx();
        assert_eq!(ctx.resolve_path(Path::new("/other/path")), PathBuf::from("/other/path"));
        assert_eq!(ctx.resolve_path(Path::new("maps")), PathBuf::from("/project/maps"));
    }

    #[test]
    fn test_build_context_paths() {
        let ctx = ctx();
        assert_eq!(ctx.map_path(), PathBuf::from("/project/maps/start.map"));
        assert_eq!(ctx.source_dir(), PathBuf::from("/project/maps"));
        assert_eq!(ctx.work_dir(), PathBuf::from("/project/build/work"));
        assert_eq!(ctx.out_dir(), PathBuf::from("/project/build/maps"));
        assert_eq!(ctx.work_map(), PathBuf::from("/project/build/work/start.map"));
    }

    #[test]
    fn test_build_context_map_name() {
        let mut config = default_config();
        config.project.map = PathBuf::from("src/e1m1.map");
        let ctx = BuildContext::new(config, PathBuf::from("/project"));

        assert_eq!(ctx.map_name(), "e1m1");
        assert_eq!(ctx.work_file("bsp"), "e1m1.bsp");
    }
}
