//! Dotted property paths.
//!
//! Binding and command declarations address their source through a path such
//! as `MediaItem.Title` or `Items[2].Name`. A path is resolved against a root
//! [`Value`] one segment at a time; observable steps (properties of model
//! objects) are reported so a binding can re-resolve when one of them changes.

use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::property::PropertyCell;
use crate::value::Value;

/// One step of a [`PropertyPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named property, resource key or element attribute.
    Property(String),
    /// A list index.
    Index(usize),
}

/// A parsed property path. The empty path addresses the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

/// Where a resolved path ends.
#[derive(Debug, Clone)]
pub enum PathTarget {
    /// An observable, writable property cell.
    Cell(PropertyCell),
    /// A plain value with nothing to observe.
    Value(Value),
}

impl PathTarget {
    /// Current value at the end of the path.
    pub fn value(&self) -> Value {
        match self {
            Self::Cell(cell) => cell.get(),
            Self::Value(v) => v.clone(),
        }
    }

    /// The cell, if the path ends at one.
    pub fn cell(&self) -> Option<&PropertyCell> {
        match self {
            Self::Cell(cell) => Some(cell),
            Self::Value(_) => None,
        }
    }
}

/// The outcome of walking a path.
#[derive(Debug)]
pub struct Resolved {
    /// Cells passed through before the leaf, in path order.
    ///
    /// Present even when the walk failed partway, so the caller can wait for
    /// the missing step to appear.
    pub intermediates: Vec<PropertyCell>,
    /// The leaf, or the reason the walk stopped.
    pub leaf: CoreResult<PathTarget>,
}

impl PropertyPath {
    /// Parse a dotted path. Accepts `A.B`, `A[3].B` and numeric segments (`Items.0`).
    pub fn parse(text: &str) -> CoreResult<Self> {
        let text = text.trim();
        let mut segments = Vec::new();
        if text.is_empty() || text == "." {
            return Ok(Self { segments });
        }
        let invalid = || CoreError::PathUnresolved {
            path: text.to_string(),
        };
        for part in text.split('.') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid());
            }
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !name.is_empty() {
                match name.parse::<usize>() {
                    Ok(index) => segments.push(PathSegment::Index(index)),
                    Err(_) => segments.push(PathSegment::Property(name.to_string())),
                }
            }
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(invalid)?;
                let index = rest[1..close].trim().parse::<usize>().map_err(|_| invalid())?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(invalid());
                }
            }
        }
        Ok(Self { segments })
    }

    /// Build a single-property path.
    pub fn property(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Property(name.into())],
        }
    }

    /// The parsed segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Whether this path addresses the root itself.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// This path with a leading property step `name`.
    pub fn prefixed(&self, name: impl Into<String>) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(PathSegment::Property(name.into()));
        segments.extend(self.segments.iter().cloned());
        Self { segments }
    }

    /// Walk the path starting at `root`.
    pub fn resolve(&self, root: &Value) -> Resolved {
        let mut intermediates = Vec::new();
        let Some((last, init)) = self.segments.split_last() else {
            return Resolved {
                intermediates,
                leaf: Ok(PathTarget::Value(root.clone())),
            };
        };

        let mut current = root.clone();
        for segment in init {
            match self.step(&current, segment) {
                Ok(PathTarget::Cell(cell)) => {
                    current = cell.get();
                    intermediates.push(cell);
                }
                Ok(PathTarget::Value(v)) => current = v,
                Err(e) => {
                    return Resolved {
                        intermediates,
                        leaf: Err(e),
                    };
                }
            }
        }
        let leaf = self.step(&current, last);
        Resolved {
            intermediates,
            leaf,
        }
    }

    /// Resolve and read the leaf value.
    pub fn value(&self, root: &Value) -> CoreResult<Value> {
        self.resolve(root).leaf.map(|leaf| leaf.value())
    }

    fn step(&self, current: &Value, segment: &PathSegment) -> CoreResult<PathTarget> {
        let unresolved = || CoreError::PathUnresolved {
            path: self.to_string(),
        };
        match (current, segment) {
            (Value::Object(obj), PathSegment::Property(name)) => {
                obj.property(name).map(PathTarget::Cell).ok_or_else(unresolved)
            }
            (Value::Dictionary(dict), PathSegment::Property(key)) => dict
                .read()
                .get(key)
                .map(PathTarget::Value)
                .ok_or_else(unresolved),
            (Value::Element(element), PathSegment::Property(name)) => element
                .read()
                .property(name)
                .cloned()
                .map(PathTarget::Value)
                .ok_or_else(unresolved),
            (Value::List(items), PathSegment::Index(index)) => items
                .get(*index)
                .cloned()
                .map(PathTarget::Value)
                .ok_or_else(unresolved),
            _ => Err(unresolved()),
        }
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Property(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindable::ObservableObject;

    #[test]
    fn test_parse() {
        let path = PropertyPath::parse("MediaItem.Title").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Property("MediaItem".into()),
                PathSegment::Property("Title".into())
            ]
        );

        let indexed = PropertyPath::parse("Items[2].Name").unwrap();
        assert_eq!(indexed.segments()[1], PathSegment::Index(2));
        assert_eq!(indexed.to_string(), "Items[2].Name");

        assert!(PropertyPath::parse("").unwrap().is_empty());
        assert!(PropertyPath::parse("A..B").is_err());
        assert!(PropertyPath::parse("A[x]").is_err());
    }

    #[test]
    fn test_resolve_through_objects() {
        let inner = ObservableObject::new("Item").with_property("Title", "Episode 1");
        let outer = ObservableObject::new("Model").with_property("Current", inner.into_ref());
        let root = Value::Object(outer.into_ref());

        let resolved = PropertyPath::parse("Current.Title").unwrap().resolve(&root);
        assert_eq!(resolved.intermediates.len(), 1);
        let leaf = resolved.leaf.unwrap();
        assert!(leaf.cell().is_some());
        assert_eq!(leaf.value(), Value::from("Episode 1"));
    }

    #[test]
    fn test_resolve_failure_keeps_intermediates() {
        let outer = ObservableObject::new("Model").with_property("Current", Value::Null);
        let root = Value::Object(outer.into_ref());

        let resolved = PropertyPath::parse("Current.Title").unwrap().resolve(&root);
        assert_eq!(resolved.intermediates.len(), 1);
        assert!(matches!(resolved.leaf, Err(CoreError::PathUnresolved { .. })));
    }

    #[test]
    fn test_resolve_list_index() {
        let root = Value::List(vec![Value::from("a"), Value::from("b")]);
        let path = PropertyPath::parse("[1]").unwrap();
        assert_eq!(path.value(&root), Ok(Value::from("b")));
    }
}
