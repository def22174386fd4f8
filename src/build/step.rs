//! Build step definitions.
//!
//! A step is one invocation in the compile chain: one of the three map
//! compilers, or a user-defined shell command.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Step flag bits.
pub mod flags {
    /// Run the step through the platform shell (implied for custom steps).
    pub const SHELL: u32 = 1;
    /// Do not append the map file name to a tool invocation.
    pub const NO_MAP_ARG: u32 = 1 << 1;
}

/// Kind of build step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// BSP compiler: geometry to compiled level
    Bsp,
    /// Light compiler: lightmaps
    Light,
    /// Visibility compiler: potentially visible sets
    Vis,
    /// User-defined shell command
    #[value(skip)]
    Custom,
}

impl StepKind {
    /// Tool kinds in full-build order.
    pub const TOOLS: [StepKind; 3] = [StepKind::Bsp, StepKind::Light, StepKind::Vis];

    /// Whether this is one of the map compilers.
    pub fn is_tool(self) -> bool {
        !matches!(self, StepKind::Custom)
    }

    /// Position in the full-build order (custom steps have none).
    pub fn order(self) -> Option<usize> {
        StepKind::TOOLS.iter().position(|k| *k == self)
    }

    /// Artifacts produced by this step as `(extension, required)`.
    pub fn artifacts(self) -> &'static [(&'static str, bool)] {
        match self {
            StepKind::Bsp | StepKind::Vis => &[("bsp", true)],
            StepKind::Light => &[("bsp", true), ("lit", false)],
            StepKind::Custom => &[],
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Bsp => write!(f, "bsp"),
            StepKind::Light => write!(f, "light"),
            StepKind::Vis => write!(f, "vis"),
            StepKind::Custom => write!(f, "custom"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single configured step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Step kind
    pub kind: StepKind,
    /// Tool executable (name on PATH or path)
    #[serde(default)]
    pub exe: String,
    /// Tool arguments, appended before the map file name
    #[serde(default)]
    pub args: String,
    /// Disabled steps are kept in the plan but not executed
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bitwise OR of [`flags`] values
    #[serde(default)]
    pub flags: u32,
    /// Shell command for custom steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl BuildStep {
    /// Create a tool step.
    pub fn tool(kind: StepKind, exe: impl Into<String>, args: impl Into<String>) -> Self {
        Self { kind, exe: exe.into(), args: args.into(), enabled: true, flags: 0, command: None }
    }

    /// Create a custom shell step.
    pub fn custom(command: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Custom,
            exe: String::new(),
            args: String::new(),
            enabled: true,
            flags: flags::SHELL,
            command: Some(command.into()),
        }
    }

    /// Set whether the step is enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replace the flag bits.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Check a flag bit.
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// Whether the step runs through the shell.
    pub fn uses_shell(&self) -> bool {
        self.kind == StepKind::Custom || self.has_flag(flags::SHELL)
    }

    /// Short description for output and reports.
    pub fn label(&self) -> String {
        match self.kind {
            StepKind::Custom => {
                format!("custom: {}", self.command.as_deref().unwrap_or_default())
            }
            kind => format!("{} ({})", kind, self.exe),
        }
    }
}

/// The stock Quake compile chain.
pub fn default_steps() -> Vec<BuildStep> {
    vec![
        BuildStep::tool(StepKind::Bsp, "qbsp", ""),
        BuildStep::tool(StepKind::Light, "light", "-extra4"),
        BuildStep::tool(StepKind::Vis, "vis", ""),
    ]
}
