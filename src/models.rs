//! Data model for parsed map sources
//!
//! A map is a flat sequence of entities. Each entity carries quoted
//! key/value fields and zero or more geometry blocks (brushes or patches)
//! kept as verbatim text.

use std::collections::BTreeMap;

/// Classname of the world entity.
pub const WORLDSPAWN: &str = "worldspawn";

/// Field holding an entity's class.
pub const CLASSNAME: &str = "classname";

/// A single map entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    /// Fields keyed by name. Iteration is sorted by key.
    pub fields: BTreeMap<String, String>,
    /// Raw geometry blocks, each including its outer braces.
    pub geometry: Vec<String>,
}

impl Entity {
    /// Create an empty entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. A repeated key replaces the earlier value.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Look up a field value.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The entity's `classname`, if it has one.
    pub fn classname(&self) -> Option<&str> {
        self.field(CLASSNAME)
    }

    /// Whether this entity owns brush or patch geometry.
    pub fn has_geometry(&self) -> bool {
        !self.geometry.is_empty()
    }

    /// Whether this is the world entity.
    pub fn is_worldspawn(&self) -> bool {
        self.classname() == Some(WORLDSPAWN)
    }
}

/// A parsed map source.
///
/// Owns the text it was parsed from. Documents are never edited in place;
/// every read of the file produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapDocument {
    text: String,
    entities: Vec<Entity>,
}

impl MapDocument {
    pub(crate) fn from_parts(text: String, entities: Vec<Entity>) -> Self {
        Self { text, entities }
    }

    /// The source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Entities in source order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Whether the document contains no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The first `worldspawn` entity.
    pub fn worldspawn(&self) -> Option<&Entity> {
        self.entities.iter().find(|e| e.is_worldspawn())
    }

    /// Total number of geometry blocks across all entities.
    pub fn geometry_count(&self) -> usize {
        self.entities.iter().map(|e| e.geometry.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_last_write_wins() {
        let mut entity = Entity::new();
        entity.set_field("light", "200");
        entity.set_field("light", "300");

        assert_eq!(entity.fields.len(), 1);
        assert_eq!(entity.field("light"), Some("300"));
    }

    #[test]
    fn test_entity_classname() {
        let mut entity = Entity::new();
        assert_eq!(entity.classname(), None);
        assert!(!entity.is_worldspawn());

        entity.set_field("classname", "worldspawn");
        assert_eq!(entity.classname(), Some("worldspawn"));
        assert!(entity.is_worldspawn());
    }

    #[test]
    fn test_document_worldspawn_lookup() {
        let mut world = Entity::new();
        world.set_field("classname", "worldspawn");
        world.geometry.push("{ brush }".to_string());
        let mut light = Entity::new();
        light.set_field("classname", "light");

        let doc = MapDocument::from_parts(String::new(), vec![light, world]);
        assert_eq!(doc.worldspawn().and_then(|e| e.classname()), Some("worldspawn"));
        assert_eq!(doc.geometry_count(), 1);
        assert!(!doc.is_empty());
    }
}
