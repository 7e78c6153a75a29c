//! Address paths into a flat store.
//!
//! A path is a sequence of segments: field names and zero-based indices.
//! Rendered form joins segments with `.` (`rules.0.conditions.2.value`);
//! the size of a collection lives at the sibling `<path>.#` key.
//!
//! Paths are values. Every operation returns a new path and leaves the
//! receiver untouched. Malformed segments are programming errors and panic.
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

/// Suffix segment holding a collection's element count.
pub const COUNT_SEGMENT: &str = "#";

static INDEX_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(0|[1-9][0-9]*)$").unwrap());

// ------------------------------- Segments --------------------------------- //

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Whether `name` can be a field segment: non-empty, no `.`, not the count
/// marker and not something that would read back as an index.
pub fn is_field_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && name != COUNT_SEGMENT && !INDEX_SEGMENT.is_match(name)
}

fn check_field_name(name: &str) {
    assert!(is_field_segment(name), "`{name}` is not a valid address segment");
}

// --------------------------------- Path ----------------------------------- //

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressPath {
    segments: Vec<Segment>,
}

impl AddressPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Path to a named child.
    pub fn append(&self, name: &str) -> Self {
        check_field_name(name);
        let mut segments = self.segments.clone();
        segments.push(Segment::Field(name.to_string()));
        Self { segments }
    }

    /// Path to the `i`-th element of the collection at `self`.
    pub fn index(&self, i: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(i));
        Self { segments }
    }

    /// Same parent, different final field name. Used to move a polymorphic
    /// field onto a variant-named or legacy address.
    pub fn with_last_replaced(&self, name: &str) -> Self {
        check_field_name(name);
        assert!(!self.is_root(), "cannot replace the last segment of the root path");
        let mut segments = self.segments.clone();
        let last = segments.len() - 1;
        segments[last] = Segment::Field(name.to_string());
        Self { segments }
    }

    /// Split off the final segment. `None` at the root.
    pub fn parent(&self) -> Option<(AddressPath, Segment)> {
        let mut segments = self.segments.clone();
        let last = segments.pop()?;
        Some((Self { segments }, last))
    }

    /// Rendered key of the element count stored for a collection at `self`.
    pub fn count_key(&self) -> String {
        if self.is_root() {
            COUNT_SEGMENT.to_string()
        } else {
            format!("{self}.{COUNT_SEGMENT}")
        }
    }
}

impl fmt::Display for AddressPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed address `{0}`")]
pub struct PathParseError(pub String);

impl FromStr for AddressPath {
    type Err = PathParseError;

    /// Parses a rendered path. All-digit segments become indices; count keys
    /// (`.#`) are not paths and are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for raw in s.split('.') {
            if raw.is_empty() || raw == COUNT_SEGMENT {
                return Err(PathParseError(s.to_string()));
            }
            if INDEX_SEGMENT.is_match(raw) {
                let i = raw.parse::<usize>().map_err(|_| PathParseError(s.to_string()))?;
                segments.push(Segment::Index(i));
            } else {
                segments.push(Segment::Field(raw.to_string()));
            }
        }
        Ok(Self { segments })
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_dotted_with_indices() {
        let p = AddressPath::root().append("rules").index(0).append("conditions").index(2).append("value");
        assert_eq!(p.to_string(), "rules.0.conditions.2.value");
        assert_eq!(p.append("x").count_key(), "rules.0.conditions.2.value.x.#");
        assert_eq!(AddressPath::root().count_key(), "#");
    }

    #[test]
    fn mutators_leave_receiver_untouched() {
        let base = AddressPath::root().append("event");
        let moved = base.with_last_replaced("tap_event");
        assert_eq!(base.to_string(), "event");
        assert_eq!(moved.to_string(), "tap_event");

        let (parent, last) = base.index(3).parent().unwrap();
        assert_eq!(parent, base);
        assert_eq!(last, Segment::Index(3));
        assert!(AddressPath::root().parent().is_none());
    }

    #[test]
    fn parse_roundtrips_and_rejects_count_keys() {
        let p: AddressPath = "rules.10.name".parse().unwrap();
        assert_eq!(p.segments()[1], Segment::Index(10));
        assert_eq!(p.to_string(), "rules.10.name");
        assert!("rules.#".parse::<AddressPath>().is_err());
        assert!("a..b".parse::<AddressPath>().is_err());
        // leading zeros are names, not indices
        let q: AddressPath = "a.01".parse().unwrap();
        assert_eq!(q.segments()[1], Segment::Field("01".into()));
    }

    #[test]
    fn field_segment_rules() {
        assert!(is_field_segment("rules") && is_field_segment("01"));
        for bad in ["", "a.b", "#", "0", "12"] {
            assert!(!is_field_segment(bad), "{bad:?}");
        }
    }

    #[test]
    #[should_panic]
    fn dotted_segment_is_a_programming_error() {
        let _ = AddressPath::root().append("a.b");
    }

    #[test]
    #[should_panic]
    fn replacing_root_is_a_programming_error() {
        let _ = AddressPath::root().with_last_replaced("x");
    }
}
