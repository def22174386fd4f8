//! `${NAME}` substitution in step arguments and commands.

use crate::build::BuildContext;
use regex::{Captures, Regex};
use std::sync::OnceLock;

static PATTERN: OnceLock<Regex> = OnceLock::new();

/// `${NAME}` reference with the name captured.
fn pattern() -> &'static Regex {
    PATTERN.get_or_init(|| Regex::new(r"\$\{(\w+)\}").expect("variable pattern is valid"))
}

/// Ordered name to value table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    entries: Vec<(String, String)>,
}

impl Variables {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard build variables for a context.
    ///
    /// | Name       | Value                         |
    /// |------------|-------------------------------|
    /// | `MAP`      | map file name in the work dir |
    /// | `MAP_NAME` | map file stem                 |
    /// | `WORK_DIR` | absolute working directory    |
    /// | `OUT_DIR`  | absolute output directory     |
    /// | `BSP`      | compiled file name            |
    pub fn for_context(ctx: &BuildContext) -> Self {
        Self::new()
            .with("MAP", ctx.work_file("map"))
            .with("MAP_NAME", ctx.map_name())
            .with("WORK_DIR", ctx.work_dir().display().to_string())
            .with("OUT_DIR", ctx.out_dir().display().to_string())
            .with("BSP", ctx.work_file("bsp"))
    }

    /// Add or replace a variable.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Replace every known `${NAME}`; unknown references are left as written.
    pub fn expand(&self, text: &str) -> String {
        pattern()
            .replace_all(text, |caps: &Captures| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
