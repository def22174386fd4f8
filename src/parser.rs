//! Map source parsing
//!
//! A single left-to-right scan driven by an explicit state machine over
//! braces, quotes and `//` line comments. Parsing never fails: malformed
//! input yields whatever entities could be recovered.

use crate::models::{Entity, MapDocument};
use std::fs;
use std::io;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Outside any entity
    Default,
    /// Inside an entity, between fields
    EntityFieldsWaiting,
    /// A key was read, waiting for the value's opening quote
    EntityAfterKeyWaiting,
    ReadingFieldKey,
    ReadingFieldValue,
    /// Inside a nested `{ ... }` block of an entity
    ReadingGeometryBlock,
    /// Inside a `//` comment, until end of line
    InComment,
}

/// Parse map source text into a document.
///
/// # Examples
///
/// ```
/// use mapc::parser::parse;
///
/// let doc = parse(r#"{ "classname" "worldspawn" { ( 0 0 0 ) } }"#);
/// assert_eq!(doc.entities().len(), 1);
/// assert_eq!(doc.entities()[0].classname(), Some("worldspawn"));
/// assert_eq!(doc.entities()[0].geometry.len(), 1);
/// ```
pub fn parse(text: &str) -> MapDocument {
    let entities = Scanner::new().run(text);
    MapDocument::from_parts(text.to_string(), entities)
}

/// Read and parse a map file.
pub fn parse_file(path: &Path) -> io::Result<MapDocument> {
    let text = fs::read_to_string(path)?;
    Ok(parse(&text))
}

struct Scanner {
    state: State,
    /// State to return to when a comment ends
    resume: State,
    current: Option<Entity>,
    key: String,
    value: String,
    block: String,
    /// Brace depth inside the current geometry block
    depth: usize,
    /// Inside a comment that is part of a geometry block
    block_comment: bool,
    entities: Vec<Entity>,
}

impl Scanner {
    fn new() -> Self {
        Self {
            state: State::Default,
            resume: State::Default,
            current: None,
            key: String::new(),
            value: String::new(),
            block: String::new(),
            depth: 0,
            block_comment: false,
            entities: Vec::new(),
        }
    }

    fn run(mut self, text: &str) -> Vec<Entity> {
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match self.state {
                State::Default => match c {
                    '{' => {
                        self.current = Some(Entity::new());
                        self.state = State::EntityFieldsWaiting;
                    }
                    '/' => self.maybe_comment(&mut chars),
                    _ => {}
                },
                State::EntityFieldsWaiting => match c {
                    '"' => {
                        self.key.clear();
                        self.state = State::ReadingFieldKey;
                    }
                    '{' => {
                        self.block.clear();
                        self.block.push('{');
                        self.depth = 1;
                        self.block_comment = false;
                        self.state = State::ReadingGeometryBlock;
                    }
                    '}' => {
                        if let Some(entity) = self.current.take() {
                            self.entities.push(entity);
                        }
                        self.state = State::Default;
                    }
                    '/' => self.maybe_comment(&mut chars),
                    _ => {}
                },
                State::ReadingFieldKey => {
                    if c == '"' {
                        self.state = State::EntityAfterKeyWaiting;
                    } else {
                        self.key.push(c);
                    }
                }
                State::EntityAfterKeyWaiting => match c {
                    '"' => {
                        self.value.clear();
                        self.state = State::ReadingFieldValue;
                    }
                    '/' => self.maybe_comment(&mut chars),
                    _ => {}
                },
                State::ReadingFieldValue => {
                    if c == '"' {
                        if let Some(entity) = self.current.as_mut() {
                            entity.set_field(
                                std::mem::take(&mut self.key),
                                std::mem::take(&mut self.value),
                            );
                        }
                        self.state = State::EntityFieldsWaiting;
                    } else {
                        self.value.push(c);
                    }
                }
                State::ReadingGeometryBlock => self.geometry_char(c, &mut chars),
                State::InComment => {
                    if c == '\n' {
                        self.state = self.resume;
                    }
                }
            }
        }

        self.finish()
    }

    /// Enter a comment if `/` is followed by another `/`.
    fn maybe_comment(&mut self, chars: &mut Peekable<Chars<'_>>) {
        if chars.peek() == Some(&'/') {
            chars.next();
            self.resume = self.state;
            self.state = State::InComment;
        }
    }

    fn geometry_char(&mut self, c: char, chars: &mut Peekable<Chars<'_>>) {
        self.block.push(c);

        if self.block_comment {
            if c == '\n' {
                self.block_comment = false;
            }
            return;
        }

        match c {
            '/' if chars.peek() == Some(&'/') => {
                self.block_comment = true;
            }
            '{' => self.depth += 1,
            '}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    if let Some(entity) = self.current.as_mut() {
                        entity.geometry.push(std::mem::take(&mut self.block));
                    }
                    self.state = State::EntityFieldsWaiting;
                }
            }
            _ => {}
        }
    }

    /// Flush a partially read entity at end of input.
    fn finish(mut self) -> Vec<Entity> {
        if let Some(mut entity) = self.current.take() {
            let state = if self.state == State::InComment { self.resume } else { self.state };
            if state == State::ReadingGeometryBlock && !self.block.is_empty() {
                entity.geometry.push(std::mem::take(&mut self.block));
            }
            self.entities.push(entity);
        }
        self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_MAP: &str = r#"// Game: Quake
// Format: Standard
// entity 0
{
"classname" "worldspawn"
"wad" "gfx/base.wad"
// brush 0
{
( -64 -64 -16 ) ( -64 -63 -16 ) ( -64 -64 -15 ) base 0 0 0 1 1
( 64 64 16 ) ( 64 64 17 ) ( 64 65 16 ) base 0 0 0 1 1
}
}
// entity 1
{
"classname" "light"
"origin" "0 0 64"
"light" "300"
}
"#;

    #[test]
    fn test_parse_simple_map() {
        let doc = parse(SIMPLE_MAP);
        assert_eq!(doc.entities().len(), 2);

        let world = &doc.entities()[0];
        assert_eq!(world.classname(), Some("worldspawn"));
        assert_eq!(world.field("wad"), Some("gfx/base.wad"));
        assert_eq!(world.geometry.len(), 1);
        assert!(world.geometry[0].starts_with('{'));
        assert!(world.geometry[0].ends_with('}'));
        assert!(world.geometry[0].contains("( 64 64 16 )"));

        let light = &doc.entities()[1];
        assert_eq!(light.classname(), Some("light"));
        assert_eq!(light.field("light"), Some("300"));
        assert!(!light.has_geometry());
    }

    #[test]
    fn test_parse_keeps_source_text() {
        let doc = parse(SIMPLE_MAP);
        assert_eq!(doc.text(), SIMPLE_MAP);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse("").is_empty());
        assert!(parse("   \n// only a comment\n").is_empty());
    }

    #[test]
    fn test_parse_single_line_entity() {
        let doc = parse(r#"{"classname" "worldspawn" "_sunlight" "1"}"#);
        assert_eq!(doc.entities().len(), 1);
        assert_eq!(doc.entities()[0].field("_sunlight"), Some("1"));
    }

    #[test]
    fn test_parse_nested_patch_block() {
        let text = r#"{
"classname" "worldspawn"
{
patchDef2
{
common/caulk
( 3 3 0 0 0 )
}
}
}"#;
        let doc = parse(text);
        let world = &doc.entities()[0];
        assert_eq!(world.geometry.len(), 1);
        assert!(world.geometry[0].contains("patchDef2"));
        assert!(world.geometry[0].contains("common/caulk"));
        assert!(world.geometry[0].trim_end().ends_with('}'));
    }

    #[test]
    fn test_comment_inside_geometry_does_not_break_depth() {
        let text = "{\n\"classname\" \"func_wall\"\n{\n// stray } brace\n( 0 0 0 )\n}\n}";
        let doc = parse(text);
        assert_eq!(doc.entities().len(), 1);
        assert_eq!(doc.entities()[0].geometry.len(), 1);
        assert!(doc.entities()[0].geometry[0].contains("stray"));
    }

    #[test]
    fn test_comment_slashes_inside_value_are_kept() {
        let doc = parse(r#"{ "classname" "info_notnull" "message" "http://example" }"#);
        assert_eq!(doc.entities()[0].field("message"), Some("http://example"));
    }

    #[test]
    fn test_comment_between_key_and_value() {
        let doc = parse("{ \"classname\" // note\n \"light\" }");
        assert_eq!(doc.entities()[0].classname(), Some("light"));
    }

    #[test]
    fn test_unterminated_value_keeps_partial_entity() {
        let doc = parse(r#"{ "classname" "light" "light" "30"#);
        assert_eq!(doc.entities().len(), 1);
        assert_eq!(doc.entities()[0].classname(), Some("light"));
        assert_eq!(doc.entities()[0].field("light"), None);
    }

    #[test]
    fn test_unterminated_geometry_block_is_kept() {
        let doc = parse("{ \"classname\" \"worldspawn\" { ( 0 0 0 ) ");
        assert_eq!(doc.entities().len(), 1);
        assert_eq!(doc.entities()[0].geometry.len(), 1);
        assert!(doc.entities()[0].geometry[0].contains("( 0 0 0 )"));
    }

    #[test]
    fn test_stray_closing_brace_is_ignored() {
        let doc = parse(r#"} { "classname" "light" } }"#);
        assert_eq!(doc.entities().len(), 1);
    }

    #[test]
    fn test_parse_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("start.map");
        std::fs::write(&path, SIMPLE_MAP).unwrap();

        let doc = parse_file(&path).unwrap();
        assert_eq!(doc.entities().len(), 2);
    }
}
