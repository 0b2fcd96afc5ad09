//! The dynamically typed value carried by properties, resources and bindings.
//!
//! Skin authoring is loosely typed: a resource may hold a string, a number,
//! a brush sub-graph or a whole template. [`Value`] models this as a tagged
//! union and offers explicit cast-or-fail accessors, so a wrong kind shows up
//! as a [`CoreError::TypeMismatch`] instead of a silent default.
//!
//! Equality is structural for plain data and reference identity for objects,
//! elements, dictionaries and templates.

use std::fmt;
use std::sync::Arc;

use crate::bindable::ObjectRef;
use crate::command::CommandDecl;
use crate::element::{Element, Shared, Template};
use crate::error::{CoreError, CoreResult};
use crate::resources::ResourceDictionary;

/// An opaque reference to a localized string.
///
/// The core never resolves these itself; display text is produced by a
/// host-supplied [`Localizer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalizedString {
    /// The string table section.
    pub section: String,
    /// The entry name within the section.
    pub name: String,
}

impl LocalizedString {
    /// Create a new localized string handle.
    pub fn new(section: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
        }
    }

    /// Parse the `[Section.Name]` notation used in skin files.
    pub fn parse(text: &str) -> Option<Self> {
        let inner = text.strip_prefix('[')?.strip_suffix(']')?;
        let (section, name) = inner.split_once('.')?;
        if section.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(section, name))
    }
}

/// Host-side resolution of localized strings.
pub trait Localizer {
    /// Resolve a section/name pair to display text.
    fn to_display_string(&self, section: &str, name: &str) -> Option<String>;
}

/// The kind of a [`Value`], used as the type tag of a property cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueKind {
    /// Accepts any value.
    #[default]
    Any,
    /// The null value.
    Null,
    /// A boolean.
    Bool,
    /// A signed integer.
    Int,
    /// A floating point number.
    Float,
    /// A string.
    Str,
    /// A localized string handle.
    Localized,
    /// An opaque host handle (texture, sound, ...).
    Handle,
    /// An external model object.
    Object,
    /// A skin element sub-graph.
    Element,
    /// A resource dictionary.
    Dictionary,
    /// A template.
    Template,
    /// A command declaration.
    Command,
    /// A list of values.
    List,
}

impl ValueKind {
    /// A short human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Localized => "localized string",
            Self::Handle => "handle",
            Self::Object => "object",
            Self::Element => "element",
            Self::Dictionary => "resource dictionary",
            Self::Template => "template",
            Self::Command => "command",
            Self::List => "list",
        }
    }

    /// Whether a value of kind `other` may be stored under this tag.
    ///
    /// `Null` is accepted everywhere and integers widen to floats.
    pub fn accepts(self, other: ValueKind) -> bool {
        self == Self::Any
            || other == Self::Null
            || self == other
            || (self == Self::Float && other == Self::Int)
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A plain string.
    Str(String),
    /// A localized string handle.
    Localized(LocalizedString),
    /// An opaque host handle.
    Handle(u64),
    /// An external model object, shared by reference.
    Object(ObjectRef),
    /// A skin element sub-graph, deep-copied on template use.
    Element(Shared<Element>),
    /// A resource dictionary, deep-copied on template use.
    Dictionary(Shared<ResourceDictionary>),
    /// An immutable template, shared between uses.
    Template(Arc<Template>),
    /// A command declaration.
    Command(Box<CommandDecl>),
    /// A list of values.
    List(Vec<Value>),
}

impl Value {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Localized(_) => ValueKind::Localized,
            Self::Handle(_) => ValueKind::Handle,
            Self::Object(_) => ValueKind::Object,
            Self::Element(_) => ValueKind::Element,
            Self::Dictionary(_) => ValueKind::Dictionary,
            Self::Template(_) => ValueKind::Template,
            Self::Command(_) => ValueKind::Command,
            Self::List(_) => ValueKind::List,
        }
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn mismatch(&self, expected: ValueKind) -> CoreError {
        CoreError::TypeMismatch {
            expected: expected.name(),
            got: self.kind().name(),
        }
    }

    /// Cast to a boolean.
    pub fn as_bool(&self) -> CoreResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(other.mismatch(ValueKind::Bool)),
        }
    }

    /// Cast to an integer.
    pub fn as_i64(&self) -> CoreResult<i64> {
        match self {
            Self::Int(i) => Ok(*i),
            other => Err(other.mismatch(ValueKind::Int)),
        }
    }

    /// Cast to a float; integers widen.
    pub fn as_f64(&self) -> CoreResult<f64> {
        match self {
            Self::Float(f) => Ok(*f),
            Self::Int(i) => Ok(*i as f64),
            other => Err(other.mismatch(ValueKind::Float)),
        }
    }

    /// Borrow a plain string.
    pub fn as_str(&self) -> CoreResult<&str> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::Str)),
        }
    }

    /// Borrow a localized string handle.
    pub fn as_localized(&self) -> CoreResult<&LocalizedString> {
        match self {
            Self::Localized(l) => Ok(l),
            other => Err(other.mismatch(ValueKind::Localized)),
        }
    }

    /// Read an opaque handle.
    pub fn as_handle(&self) -> CoreResult<u64> {
        match self {
            Self::Handle(h) => Ok(*h),
            other => Err(other.mismatch(ValueKind::Handle)),
        }
    }

    /// Borrow the model object reference.
    pub fn as_object(&self) -> CoreResult<&ObjectRef> {
        match self {
            Self::Object(o) => Ok(o),
            other => Err(other.mismatch(ValueKind::Object)),
        }
    }

    /// Borrow the element sub-graph.
    pub fn as_element(&self) -> CoreResult<&Shared<Element>> {
        match self {
            Self::Element(e) => Ok(e),
            other => Err(other.mismatch(ValueKind::Element)),
        }
    }

    /// Borrow the resource dictionary.
    pub fn as_dictionary(&self) -> CoreResult<&Shared<ResourceDictionary>> {
        match self {
            Self::Dictionary(d) => Ok(d),
            other => Err(other.mismatch(ValueKind::Dictionary)),
        }
    }

    /// Borrow the template.
    pub fn as_template(&self) -> CoreResult<&Arc<Template>> {
        match self {
            Self::Template(t) => Ok(t),
            other => Err(other.mismatch(ValueKind::Template)),
        }
    }

    /// Borrow the command declaration.
    pub fn as_command(&self) -> CoreResult<&CommandDecl> {
        match self {
            Self::Command(c) => Ok(&**c),
            other => Err(other.mismatch(ValueKind::Command)),
        }
    }

    /// Borrow the list items.
    pub fn as_list(&self) -> CoreResult<&[Value]> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(other.mismatch(ValueKind::List)),
        }
    }

    /// Produce display text, delegating localized handles to the host.
    ///
    /// Unresolvable localized strings fall back to their `[Section.Name]` form.
    pub fn display_text(&self, localizer: &dyn Localizer) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Localized(l) => localizer
                .to_display_string(&l.section, &l.name)
                .unwrap_or_else(|| format!("[{}.{}]", l.section, l.name)),
            other => format!("<{}>", other.kind().name()),
        }
    }
}

fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Localized(a), Self::Localized(b)) => a == b,
            (Self::Handle(a), Self::Handle(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => same_object(a, b),
            (Self::Element(a), Self::Element(b)) => Arc::ptr_eq(a, b),
            (Self::Dictionary(a), Self::Dictionary(b)) => Arc::ptr_eq(a, b),
            (Self::Template(a), Self::Template(b)) => Arc::ptr_eq(a, b),
            (Self::Command(a), Self::Command(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Localized(l) => write!(f, "Localized([{}.{}])", l.section, l.name),
            Self::Handle(h) => write!(f, "Handle({h:#x})"),
            Self::Object(o) => write!(f, "Object({})", o.type_key()),
            Self::Element(e) => write!(f, "Element({:p})", Arc::as_ptr(e)),
            Self::Dictionary(d) => write!(f, "Dictionary({:p})", Arc::as_ptr(d)),
            Self::Template(t) => write!(f, "Template({:?})", t.key),
            Self::Command(c) => write!(f, "Command({c:?})"),
            Self::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<LocalizedString> for Value {
    fn from(v: LocalizedString) -> Self {
        Self::Localized(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl From<Shared<Element>> for Value {
    fn from(v: Shared<Element>) -> Self {
        Self::Element(v)
    }
}

impl From<Shared<ResourceDictionary>> for Value {
    fn from(v: Shared<ResourceDictionary>) -> Self {
        Self::Dictionary(v)
    }
}

impl From<Arc<Template>> for Value {
    fn from(v: Arc<Template>) -> Self {
        Self::Template(v)
    }
}

impl From<CommandDecl> for Value {
    fn from(v: CommandDecl) -> Self {
        Self::Command(Box::new(v))
    }
}

static_assertions::assert_impl_all!(Value: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindable::ObservableObject;
    use crate::element::{shared, ElementKind};

    struct Table;

    impl Localizer for Table {
        fn to_display_string(&self, section: &str, name: &str) -> Option<String> {
            (section == "Media" && name == "Play").then(|| "Play".to_string())
        }
    }

    #[test]
    fn test_cast_or_fail() {
        assert_eq!(Value::from(3).as_i64(), Ok(3));
        assert_eq!(Value::from(3).as_f64(), Ok(3.0));
        assert_eq!(
            Value::from("x").as_bool(),
            Err(CoreError::TypeMismatch {
                expected: "bool",
                got: "string"
            })
        );
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = ObservableObject::new("Item").into_ref();
        let b = ObservableObject::new("Item").into_ref();
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));

        let e1 = shared(Element::new(ElementKind::Label));
        let e2 = shared(Element::new(ElementKind::Label));
        assert_eq!(Value::Element(e1.clone()), Value::Element(e1.clone()));
        assert_ne!(Value::Element(e1), Value::Element(e2));
    }

    #[test]
    fn test_kind_accepts() {
        assert!(ValueKind::Any.accepts(ValueKind::Str));
        assert!(ValueKind::Float.accepts(ValueKind::Int));
        assert!(ValueKind::Str.accepts(ValueKind::Null));
        assert!(!ValueKind::Int.accepts(ValueKind::Float));
    }

    #[test]
    fn test_localized_display() {
        let handle = LocalizedString::parse("[Media.Play]").unwrap();
        assert_eq!(Value::from(handle).display_text(&Table), "Play");

        let missing = LocalizedString::new("Media", "Stop");
        assert_eq!(Value::from(missing).display_text(&Table), "[Media.Stop]");
        assert!(LocalizedString::parse("Media.Play").is_none());
    }
}
