//! Semantic map comparison
//!
//! Classifies the difference between two versions of a map into three
//! independent categories:
//! - Geometry (brushes and patches)
//! - Entity logic (fields of non-light entities)
//! - Lighting (light entities, per-brush light fields, worldspawn light settings)
//!
//! Each category is decided by projecting both documents into a normalized
//! content stream and comparing the streams byte for byte.

use crate::models::{Entity, MapDocument};
use crate::parser::parse_file;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

/// Which categories changed between two documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapDiff {
    /// Brush or patch geometry differs
    pub geometry: bool,
    /// Non-light entity fields differ
    pub entity: bool,
    /// Light-related fields differ
    pub light: bool,
}

impl MapDiff {
    /// No category changed.
    pub const NONE: MapDiff = MapDiff { geometry: false, entity: false, light: false };

    /// Returns true if nothing changed
    pub fn is_empty(&self) -> bool {
        !self.geometry && !self.entity && !self.light
    }

    /// Human-readable summary of the diff
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.geometry {
            parts.push("geometry");
        }
        if self.entity {
            parts.push("entities");
        }
        if self.light {
            parts.push("lighting");
        }

        if parts.is_empty() {
            "No differences".to_string()
        } else {
            format!("Changed: {}", parts.join(", "))
        }
    }
}

/// Field selection rules for classification.
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    /// Fields on `worldspawn` that only affect lighting
    pub worldspawn_light_fields: HashSet<String>,
    /// Fields on brush entities that only affect lighting
    pub brush_light_fields: HashSet<String>,
    /// Classname substring that marks a light entity
    pub light_entity_substring: String,
    /// Fields that never trigger a rebuild (editor metadata)
    pub ignored_fields: HashSet<String>,
}

impl ClassifyOptions {
    /// Build options from plain string lists.
    pub fn new<S: AsRef<str>>(
        worldspawn_light_fields: &[S],
        brush_light_fields: &[S],
        light_entity_substring: &str,
        ignored_fields: &[S],
    ) -> Self {
        let set = |fields: &[S]| fields.iter().map(|f| f.as_ref().to_string()).collect();
        Self {
            worldspawn_light_fields: set(worldspawn_light_fields),
            brush_light_fields: set(brush_light_fields),
            light_entity_substring: light_entity_substring.to_string(),
            ignored_fields: set(ignored_fields),
        }
    }

    fn is_light_entity(&self, classname: &str) -> bool {
        classname.contains(&self.light_entity_substring)
    }

    /// Whether `key` on `entity` belongs to the light stream rather than the entity stream.
    fn is_light_field(&self, entity: &Entity, key: &str) -> bool {
        (entity.is_worldspawn() && self.worldspawn_light_fields.contains(key))
            || (entity.has_geometry() && self.brush_light_fields.contains(key))
    }
}

/// Classify the changes between two documents.
pub fn classify(prev: &MapDocument, curr: &MapDocument, options: &ClassifyOptions) -> MapDiff {
    MapDiff {
        geometry: geometry_stream(prev) != geometry_stream(curr),
        entity: entity_stream(prev, options) != entity_stream(curr, options),
        light: light_stream(prev, options) != light_stream(curr, options),
    }
}

fn push_field(out: &mut String, key: &str, value: &str) {
    // Quoting keeps adjacent pairs from aliasing ("ab" "c" vs "a" "bc").
    let _ = writeln!(out, "{:?} {:?}", key, value);
}

fn end_entity(out: &mut String) {
    out.push_str("}\n");
}

/// All geometry blocks, verbatim.
pub fn geometry_stream(doc: &MapDocument) -> String {
    let mut out = String::new();
    for entity in doc.entities().iter().filter(|e| e.classname().is_some()) {
        for block in &entity.geometry {
            out.push_str(block);
            out.push('\n');
        }
    }
    out
}

/// Fields of non-light entities, minus ignored and light-only fields.
pub fn entity_stream(doc: &MapDocument, options: &ClassifyOptions) -> String {
    let mut out = String::new();
    for entity in doc.entities() {
        let Some(classname) = entity.classname() else { continue };
        if options.is_light_entity(classname) {
            continue;
        }

        for (key, value) in &entity.fields {
            if options.ignored_fields.contains(key) || options.is_light_field(entity, key) {
                continue;
            }
            push_field(&mut out, key, value);
        }
        end_entity(&mut out);
    }
    out
}

/// Light entities, per-brush light fields, and worldspawn light fields.
pub fn light_stream(doc: &MapDocument, options: &ClassifyOptions) -> String {
    let mut out = String::new();
    for entity in doc.entities() {
        let Some(classname) = entity.classname() else { continue };
        let mut wrote = false;

        if options.is_light_entity(classname) && !entity.has_geometry() {
            for (key, value) in &entity.fields {
                if !options.ignored_fields.contains(key) {
                    push_field(&mut out, key, value);
                    wrote = true;
                }
            }
        }

        if entity.has_geometry() {
            for (key, value) in &entity.fields {
                if options.brush_light_fields.contains(key) {
                    push_field(&mut out, key, value);
                    wrote = true;
                }
            }
        }

        if entity.is_worldspawn() {
            for (key, value) in &entity.fields {
                if options.worldspawn_light_fields.contains(key) {
                    push_field(&mut out, key, value);
                    wrote = true;
                }
            }
        }

        if wrote {
            end_entity(&mut out);
        }
    }
    out
}

/// Parse and classify two map files.
pub fn diff_files(
    path_a: &Path,
    path_b: &Path,
    options: &ClassifyOptions,
) -> Result<MapDiff, String> {
    let doc_a = parse_file(path_a).map_err(|e| format!("Cannot open '{}': {}", path_a.display(), e))?;
    let doc_b = parse_file(path_b).map_err(|e| format!("Cannot open '{}': {}", path_b.display(), e))?;
    Ok(classify(&doc_a, &doc_b, options))
}

/// Format a diff for display
pub fn format_diff(diff: &MapDiff, file_a: &str, file_b: &str) -> String {
    let mark = |changed: bool| if changed { "changed" } else { "unchanged" };
    let mut output = Vec::new();
    output.push(format!("Comparing {} vs {}:", file_a, file_b));
    output.push(format!("  Geometry: {}", mark(diff.geometry)));
    output.push(format!("  Entities: {}", mark(diff.entity)));
    output.push(format!("  Lighting: {}", mark(diff.light)));
    output.push(String::new());
    output.push(diff.summary());
    output.join("\n")
}
