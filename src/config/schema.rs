//! Configuration schema types for `mapc.toml`
//!
//! Defines the structure and validation rules for a map project.

use crate::build::step::{default_steps, BuildStep, StepKind};
use crate::diff::ClassifyOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Map source file
    #[serde(default = "default_map")]
    pub map: PathBuf,
    /// Scratch directory the tools run in
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Directory that receives the compiled artifacts
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

fn default_map() -> PathBuf {
    PathBuf::from("maps/start.map")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("build/work")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("build/maps")
}

fn default_true() -> bool {
    true
}

/// Change classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Reduce the step list based on what changed
    #[serde(default = "default_true")]
    pub auto_reduce: bool,
    /// Worldspawn fields that only affect lighting
    #[serde(default = "default_worldspawn_light_fields")]
    pub worldspawn_light_fields: Vec<String>,
    /// Brush entity fields that only affect lighting
    #[serde(default = "default_brush_light_fields")]
    pub brush_light_fields: Vec<String>,
    /// Classname substring identifying light entities
    #[serde(default = "default_light_entity_substring")]
    pub light_entity_substring: String,
    /// Fields ignored entirely (editor bookkeeping)
    #[serde(default = "default_ignored_fields")]
    pub ignored_fields: Vec<String>,
    /// Argument that limits the BSP compiler to entity data
    #[serde(default = "default_entities_only_arg")]
    pub entities_only_arg: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_worldspawn_light_fields() -> Vec<String> {
    strings(&[
        "light",
        "_sunlight",
        "_sunlight_mangle",
        "_sun_mangle",
        "_sunlight_color",
        "_sunlight2",
        "_sunlight2_color",
        "_sunlight3",
        "_sunlight_penumbra",
        "_dist",
        "_range",
        "_gamma",
        "_minlight_color",
        "_dirt",
        "_dirtscale",
        "_dirtgain",
        "_bounce",
        "_bouncescale",
        "_anglescale",
    ])
}

fn default_brush_light_fields() -> Vec<String> {
    strings(&[
        "_minlight",
        "_mincolor",
        "_minlight_color",
        "_shadow",
        "_shadowself",
        "_dirt",
        "_phong",
        "_phong_angle",
        "_lmscale",
    ])
}

fn default_light_entity_substring() -> String {
    "light".to_string()
}

fn default_ignored_fields() -> Vec<String> {
    strings(&[
        "_tb_id",
        "_tb_name",
        "_tb_type",
        "_tb_layer",
        "_tb_group",
        "_tb_layer_sort_index",
        "_tb_layer_locked",
        "_tb_layer_hidden",
        "_tb_linked_group_id",
        "_tb_transformation",
        "_tb_textures",
        "_tb_mod",
        "_tb_def",
    ])
}

fn default_entities_only_arg() -> String {
    "-onlyents".to_string()
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            auto_reduce: true,
            worldspawn_light_fields: default_worldspawn_light_fields(),
            brush_light_fields: default_brush_light_fields(),
            light_entity_substring: default_light_entity_substring(),
            ignored_fields: default_ignored_fields(),
            entities_only_arg: default_entities_only_arg(),
        }
    }
}

impl DiffConfig {
    /// Classifier options for these settings.
    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions::new(
            self.worldspawn_light_fields.as_slice(),
            self.brush_light_fields.as_slice(),
            &self.light_entity_substring,
            self.ignored_fields.as_slice(),
        )
    }
}

/// Engine launched after a successful build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe: Option<String>,
    /// Arguments placed before `+map <name>`
    #[serde(default)]
    pub args: String,
    /// Launch after every successful build
    #[serde(default)]
    pub launch: bool,
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on worker threads
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Jobs each worker may hold queued
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    16
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_workers: default_max_workers(), queue_capacity: default_queue_capacity() }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default = "default_true")]
    pub clear_screen: bool,
    /// How often build output is drained, in milliseconds
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_debounce_ms() -> u32 {
    100
}

fn default_poll_ms() -> u64 {
    50
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100, clear_screen: true, poll_ms: 50 }
    }
}

/// Complete mapc.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapcConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// Full step list, in execution order
    #[serde(default = "default_steps")]
    pub steps: Vec<BuildStep>,
    /// Change classification settings
    #[serde(default)]
    pub diff: DiffConfig,
    /// Engine launch settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Worker pool settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "steps[1].exe")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mapc.toml: '{}' {}", self.field, self.message)
    }
}

impl MapcConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut error = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        if self.project.name.is_empty() {
            error("project.name".to_string(), "must be a non-empty string");
        }

        if self.project.map.as_os_str().is_empty() {
            error("project.map".to_string(), "must name a map file");
        }

        if self.project.work_dir == self.project.out_dir {
            error("project.work_dir".to_string(), "must differ from project.out_dir");
        }

        // Tool steps must follow bsp -> light -> vis; custom steps go anywhere.
        let mut last_order: Option<usize> = None;
        for (i, step) in self.steps.iter().enumerate() {
            match step.kind {
                StepKind::Custom => {
                    if step.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                        error(format!("steps[{}].command", i), "is required for custom steps");
                    }
                }
                kind => {
                    if step.exe.trim().is_empty() {
                        error(format!("steps[{}].exe", i), "is required for tool steps");
                    }
                    let order = kind.order();
                    if last_order.is_some() && order <= last_order {
                        error(
                            format!("steps[{}].kind", i),
                            "tool steps must appear once each, in bsp, light, vis order",
                        );
                    }
                    last_order = order;
                }
            }
        }

        if self.diff.light_entity_substring.is_empty() {
            error(
                "diff.light_entity_substring".to_string(),
                "must be non-empty (an empty substring marks every entity as a light)",
            );
        }

        if self.scheduler.max_workers == 0 {
            error("scheduler.max_workers".to_string(), "must be a positive integer");
        }

        if self.scheduler.queue_capacity == 0 {
            error("scheduler.queue_capacity".to_string(), "must be a positive integer");
        }

        if self.watch.poll_ms == 0 {
            error("watch.poll_ms".to_string(), "must be a positive integer");
        }

        if self.engine.launch && self.engine.exe.is_none() {
            error("engine.exe".to_string(), "is required when engine.launch is set");
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Find the configured step for a tool kind.
    pub fn step(&self, kind: StepKind) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }
}
