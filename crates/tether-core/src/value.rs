//! Dynamic values flowing through routers and closers.
//!
//! Destinations, close data, origins and results are all [`Value`]s. Plain
//! data (`List`, `Map` and the primitives) has value semantics and cannot be
//! bound; [`Object`] is the only identity-bearing variant.
//!
//! String conversion follows a loose scripting convention so that paths read
//! naturally in error messages:
//!
//! ```rust,ignore
//! let path = Path::from(vec![Value::from("x"), Value::from(Symbol::new("test"))]);
//! assert_eq!(path.to_string(), "x/Symbol(test)");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, ErrorKind, Result};
use crate::exposed::{self, Exposure};
use crate::object::Object;

// =============================================================================
// Value
// =============================================================================

/// A dynamically typed value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absence of a value. The default close data.
    #[default]
    Undefined,
    /// An explicit null. Binding `Null` allocates a fresh carrier object.
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Symbol(Symbol),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// An identity-bearing object handle; the only bindable variant.
    Object(Object),
    /// An error carried as data (e.g. thrown by a handler).
    Error(Box<Error>),
}

impl Value {
    /// Returns `true` for every variant except [`Value::Object`].
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the value's type, as reported in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Error(_) => "error",
        }
    }

    /// Serializes the value for transports.
    ///
    /// `Undefined` becomes `null`. Objects serialize through their exposed
    /// value; unexposed objects and symbols cannot be serialized.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Symbol(symbol) => {
                return Err(ErrorKind::Codec(format!("cannot serialize {symbol}")).into());
            }
            Value::List(list) => serde_json::Value::Array(
                list.iter().map(Value::to_json).collect::<Result<_>>()?,
            ),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(object) => object_to_json(object)?,
            Value::Error(error) => error.to_exposed_json(),
        })
    }
}

/// Integral numbers are written as JSON integers; NaN and infinities as null.
fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn object_to_json(object: &Object) -> Result<serde_json::Value> {
    match exposed::exposure(object) {
        Some(Exposure::Itself) => {
            let fields = object
                .fields()
                .map(|fields| fields.snapshot())
                .unwrap_or_default();
            Value::Map(fields).to_json()
        }
        Some(exposure) => exposure.project(object).to_json(),
        None => Err(ErrorKind::Codec(format!("object {} is not exposed", object.id())).into()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::String(s) => f.write_str(s),
            Value::Symbol(symbol) => write!(f, "{symbol}"),
            Value::List(list) => {
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(_) => f.write_str("[object Object]"),
            Value::Object(object) => write!(f, "[object {}]", object.display_name()),
            Value::Error(error) => write!(f, "{error}"),
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else {
        write!(f, "{n}")
    }
}

// =============================================================================
// Conversions
// =============================================================================

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Symbol> for Value {
    fn from(symbol: Symbol) -> Self {
        Value::Symbol(symbol)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<&Object> for Value {
    fn from(object: &Object) -> Self {
        Value::Object(object.clone())
    }
}

impl From<Error> for Value {
    fn from(error: Error) -> Self {
        Value::Error(Box::new(error))
    }
}

impl From<Path> for Value {
    fn from(path: Path) -> Self {
        Value::List(path.to_vec())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(list: Vec<T>) -> Self {
        Value::List(list.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map(Into::into).unwrap_or_default()
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(list) => {
                Value::List(list.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

// =============================================================================
// Symbol
// =============================================================================

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// A unique token. Two symbols are equal only if one is a clone of the other,
/// regardless of their descriptions.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolInner>);

struct SymbolInner {
    id: u64,
    description: String,
}

impl Symbol {
    pub fn new(description: impl Into<String>) -> Self {
        Self(Arc::new(SymbolInner {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: description.into(),
        }))
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0.description)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// =============================================================================
// Path
// =============================================================================

/// Ordered sequence of destinations traversed so far.
///
/// Paths are persistent: [`Path::push`] returns a new path and leaves the
/// receiver untouched, so builders can share prefixes freely.
#[derive(Clone, Debug, PartialEq)]
pub struct Path(Arc<[Value]>);

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this path with `destination` appended.
    pub fn push(&self, destination: impl Into<Value>) -> Self {
        self.iter()
            .cloned()
            .chain(std::iter::once(destination.into()))
            .collect()
    }

    /// Returns a copy of this path with all `destinations` appended in order.
    pub fn extend<I>(&self, destinations: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.iter()
            .cloned()
            .chain(destinations.into_iter().map(Into::into))
            .collect()
    }

    /// Serializes the path for transports.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Array(
            self.iter().map(Value::to_json).collect::<Result<_>>()?,
        ))
    }
}

impl Default for Path {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl Deref for Path {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, destination) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{destination}")?;
        }
        Ok(())
    }
}

impl From<Vec<Value>> for Path {
    fn from(destinations: Vec<Value>) -> Self {
        Self(Arc::from(destinations))
    }
}

impl FromIterator<Value> for Path {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<Value> for Path {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::List(list) => Ok(Self::from(list)),
            _ => Err(ErrorKind::InvalidPath.into()),
        }
    }
}
