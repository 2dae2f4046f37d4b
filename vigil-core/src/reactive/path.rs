//! Path Expressions
//!
//! Scopes and bindings name the state they watch with simple paths such as
//! `user.name`, `rows[0].title` or `meta["content-type"]`. A path is parsed
//! once into [`Segment`]s and then resolved with tracked reads, so a watcher
//! over a path depends on every link of the chain.

use std::fmt;
use std::str::FromStr;

use crate::error::{ReactiveError, Result};

use super::runtime::Engine;
use super::value::Value;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key, from `.key` or `["key"]`.
    Key(String),
    /// Array index, from `[3]`.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{key}"),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    raw: String,
    segments: Vec<Segment>,
}

impl Path {
    /// Parse `expr`.
    ///
    /// ```rust
    /// use vigil_core::reactive::{Path, Segment};
    ///
    /// let path = Path::parse("rows[0]['title']").unwrap();
    /// assert_eq!(
    ///     path.segments(),
    ///     &[
    ///         Segment::Key("rows".into()),
    ///         Segment::Index(0),
    ///         Segment::Key("title".into()),
    ///     ]
    /// );
    /// ```
    pub fn parse(expr: &str) -> Result<Self> {
        let segments = Parser::new(expr).parse()?;
        Ok(Self {
            raw: expr.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The first key, which names a property of the root.
    pub fn root_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl FromStr for Path {
    type Err = ReactiveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

struct Parser<'a> {
    expr: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            expr,
            chars: expr.char_indices().peekable(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> ReactiveError {
        ReactiveError::InvalidPath {
            path: self.expr.to_string(),
            reason: reason.into(),
        }
    }

    fn parse(mut self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();

        match self.chars.peek() {
            None => return Err(self.error("empty path")),
            Some((_, '[')) => {}
            Some(_) => segments.push(Segment::Key(self.identifier()?)),
        }

        while let Some(&(pos, c)) = self.chars.peek() {
            match c {
                '.' => {
                    self.chars.next();
                    segments.push(Segment::Key(self.identifier()?));
                }
                '[' => {
                    self.chars.next();
                    segments.push(self.bracket()?);
                }
                other => {
                    return Err(self.error(format!("unexpected `{other}` at {pos}")));
                }
            }
        }

        Ok(segments)
    }

    fn identifier(&mut self) -> Result<String> {
        let mut ident = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(ident)
    }

    /// Contents of `[...]`, the opening bracket already consumed.
    fn bracket(&mut self) -> Result<Segment> {
        let segment = match self.chars.peek() {
            Some(&(_, quote @ ('\'' | '"'))) => {
                self.chars.next();
                let mut key = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => key.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                }
                Segment::Key(key)
            }
            Some(&(_, c)) if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&(_, c)) = self.chars.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    digits.push(c);
                    self.chars.next();
                }
                let index = digits
                    .parse()
                    .map_err(|_| self.error(format!("index `{digits}` is out of range")))?;
                Segment::Index(index)
            }
            _ => return Err(self.error("expected an index or a quoted key")),
        };

        match self.chars.next() {
            Some((_, ']')) => Ok(segment),
            _ => Err(self.error("expected `]`")),
        }
    }
}

/// Follow `segments` from `start` with tracked reads. Missing links read
/// as `Null`.
pub(crate) fn resolve(engine: &Engine, start: Value, segments: &[Segment]) -> Value {
    let mut current = start;
    for segment in segments {
        current = step(engine, &current, segment);
        if current.is_null() {
            break;
        }
    }
    current
}

fn step(engine: &Engine, value: &Value, segment: &Segment) -> Value {
    match (value, segment) {
        (Value::Object(object), _) => {
            let key = segment.to_string();
            match engine.observer_of(value).and_then(|observer| observer.as_object()) {
                Some(observed) => observed.get(&key),
                None => object.get(&key).unwrap_or_default(),
            }
        }
        (Value::Array(array), Segment::Index(index)) => {
            match engine.observer_of(value).and_then(|observer| observer.as_array()) {
                Some(observed) => observed.get(*index),
                None => array.get(*index).unwrap_or_default(),
            }
        }
        (Value::Array(_), Segment::Key(key)) if is_index_key(key) => match key.parse() {
            Ok(index) => step(engine, value, &Segment::Index(index)),
            Err(_) => Value::Null,
        },
        (Value::Array(array), Segment::Key(key)) if key == "length" => {
            let len = match engine.observer_of(value).and_then(|observer| observer.as_array()) {
                Some(observed) => observed.len(),
                None => array.len(),
            };
            Value::from(len as f64)
        }
        _ => Value::Null,
    }
}

/// `rows.0` addresses an element just like `rows[0]`.
fn is_index_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{MutableSequence, PlainArray, PlainObject, Watcher, WatcherOptions};

    fn keys(path: &Path) -> Vec<String> {
        path.segments().iter().map(Segment::to_string).collect()
    }

    #[test]
    fn parses_dots_and_brackets() {
        let path: Path = "a.b_1.$c[12][\"d-e\"]['f g']".parse().unwrap();
        assert_eq!(keys(&path), vec!["a", "b_1", "$c", "12", "d-e", "f g"]);
        assert_eq!(path.segments()[3], Segment::Index(12));
        assert_eq!(path.root_key(), Some("a"));
        assert_eq!(path.to_string(), "a.b_1.$c[12][\"d-e\"]['f g']");
    }

    #[test]
    fn leading_bracket_has_no_root_key() {
        let path = Path::parse("[0].x").unwrap();
        assert_eq!(path.root_key(), None);
        assert_eq!(path.segments().len(), 2);
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", ".a", "a.", "a..b", "a[", "a[x]", "a['x", "a[0", "a b", "a-b"] {
            let err = Path::parse(bad).unwrap_err();
            assert!(
                matches!(err, ReactiveError::InvalidPath { ref path, .. } if path == bad),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn resolves_nested_values() {
        let engine = Engine::new();
        let root = Value::from(
            PlainObject::new().with(
                "rows",
                PlainArray::from_iter([PlainObject::new().with("title", "first")]),
            ),
        );
        engine.observe(&root);

        let read = |expr: &str| engine.read_path(&root, &Path::parse(expr).unwrap());
        assert_eq!(read("rows[0].title"), Value::from("first"));
        assert_eq!(read("rows.length"), Value::from(1));
        assert_eq!(read("rows.0.title"), Value::from("first"));
        assert_eq!(read("rows.1"), Value::Null);
        assert_eq!(read("rows[3].title"), Value::Null);
        assert_eq!(read("missing.deeper"), Value::Null);
    }

    #[test]
    fn path_watcher_tracks_every_link() {
        let engine = Engine::new();
        let rows = PlainArray::from_iter([PlainObject::new().with("title", "a")]);
        let root = Value::from(PlainObject::new().with("rows", rows.clone()));
        engine.observe(&root);

        let path = Path::parse("rows[0].title").unwrap();
        let e = engine.clone();
        let r = root.clone();
        let watcher = Watcher::new(
            &engine,
            move || e.read_path(&r, &path),
            WatcherOptions::default(),
        );
        assert_eq!(watcher.value(), Value::from("a"));

        let observed_rows = engine
            .observer_of(&Value::from(rows))
            .and_then(|observer| observer.as_array())
            .unwrap();
        observed_rows.unshift(Value::from(PlainObject::new().with("title", "b")));
        assert_eq!(watcher.value(), Value::from("b"));
    }
}
