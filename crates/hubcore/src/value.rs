//! # Values
//!
//! The loosely-typed argument and result model shared by the dispatcher and
//! whatever transport sits in front of it.
//!
//! ## Invariants
//! - **Shape Checking**: Arguments are validated against the declared `Type` of a
//!   method before its body runs. Bodies only ever see validated `Args`.
//! - **Recursion Safety**: Shape checks are bounded by `MAX_DEPTH`.
//! - **Forward Compatibility**: Records may carry fields a method does not declare;
//!   they are ignored, never rejected.

use std::collections::BTreeMap;
use std::fmt;

/// The maximum nesting depth accepted by `Type::check`.
const MAX_DEPTH: usize = 64;

/// Failures converting between `Value` and concrete Rust types.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The value was not of the expected shape.
    TypeMismatch { expected: String, found: &'static str },
    /// A record was missing a required field.
    MissingField(String),
    /// A number did not fit the target integer type.
    OutOfRange(String),
    /// Fewer arguments were supplied than the body asked for.
    MissingArgument(usize),
    /// The nested depth of the value exceeded the safety limit.
    RecursionLimitExceeded,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => write!(f, "expected {}, found {}", expected, found),
            Self::MissingField(name) => write!(f, "missing field '{}'", name),
            Self::OutOfRange(msg) => write!(f, "value out of range: {}", msg),
            Self::MissingArgument(index) => write!(f, "missing argument at position {}", index),
            Self::RecursionLimitExceeded => write!(f, "value nested deeper than {} levels", MAX_DEPTH),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A decoded argument or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a record from `(field, value)` pairs.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the value's shape, used in mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{:?}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The expected shape of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Accepts any value, including null.
    Any,
    Bool,
    Int,
    /// Accepts integers as well as floats.
    Float,
    String,
    List(Box<Type>),
    /// Accepts null or the inner shape.
    Option(Box<Type>),
    /// Declared fields must be present with matching shapes. Extra fields are ignored.
    Record(Vec<(String, Type)>),
}

impl Type {
    pub fn list(inner: Type) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn option(inner: Type) -> Self {
        Self::Option(Box::new(inner))
    }

    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Type)>) -> Self {
        Self::Record(fields.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }

    /// Recursively validates that `value` has this shape.
    pub fn check(&self, value: &Value) -> Result<()> {
        self.check_impl(value, 0)
    }

    fn check_impl(&self, value: &Value, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimitExceeded);
        }

        match (self, value) {
            (Type::Any, _) => Ok(()),
            (Type::Bool, Value::Bool(_)) => Ok(()),
            (Type::Int, Value::Int(_)) => Ok(()),
            (Type::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (Type::String, Value::String(_)) => Ok(()),
            (Type::Option(_), Value::Null) => Ok(()),
            (Type::Option(inner), v) => inner.check_impl(v, depth + 1),
            (Type::List(inner), Value::List(items)) => {
                items.iter().try_for_each(|item| inner.check_impl(item, depth + 1))
            }
            (Type::Record(fields), Value::Record(entries)) => {
                for (name, ty) in fields {
                    let entry = entries.get(name).ok_or_else(|| Error::MissingField(name.clone()))?;
                    ty.check_impl(entry, depth + 1)?;
                }
                Ok(())
            }
            (ty, v) => Err(Error::TypeMismatch { expected: ty.to_string(), found: v.kind() }),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::List(inner) => write!(f, "list<{}>", inner),
            Self::Option(inner) => write!(f, "option<{}>", inner),
            Self::Record(fields) => {
                write!(f, "record{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ============================================================================
//  CONVERSIONS
// ============================================================================

/// Conversion from a decoded `Value` into a concrete type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// Conversion of a concrete type into a `Value` for sending.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

fn mismatch(expected: &str, found: &Value) -> Error {
    Error::TypeMismatch { expected: expected.to_string(), found: found.kind() }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> { Ok(value) }
}

impl IntoValue for Value {
    fn into_value(self) -> Value { self }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch("null", &other)),
        }
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value { Value::Null }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value { Value::Bool(self) }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(v),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value { Value::Int(self) }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let v = i64::from_value(value)?;
        i32::try_from(v).map_err(|_| Error::OutOfRange(format!("{} does not fit in i32", v)))
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value { Value::Int(self.into()) }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self> {
        let v = i64::from_value(value)?;
        u32::try_from(v).map_err(|_| Error::OutOfRange(format!("{} does not fit in u32", v)))
    }
}

impl IntoValue for u32 {
    fn into_value(self) -> Value { Value::Int(self.into()) }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value { Value::Float(self) }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value { Value::String(self) }
}

impl IntoValue for &str {
    fn into_value(self) -> Value { Value::String(self.to_string()) }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoValue::into_value)
    }
}

/// Removes a required field from a record being unpacked.
pub fn take_field<T: FromValue>(fields: &mut BTreeMap<String, Value>, name: &str) -> Result<T> {
    let value = fields.remove(name).ok_or_else(|| Error::MissingField(name.to_string()))?;
    T::from_value(value)
}

/// Unwraps a record value into its field map.
pub fn into_record(value: Value) -> Result<BTreeMap<String, Value>> {
    match value {
        Value::Record(fields) => Ok(fields),
        other => Err(mismatch("record", &other)),
    }
}

/// The validated argument list passed to a method body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the argument at `index` into `T`.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.0.get(index).cloned().ok_or(Error::MissingArgument(index))?;
        T::from_value(value)
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_type() -> Type {
        Type::record([("FirstName", Type::String), ("LastName", Type::String)])
    }

    #[test]
    fn test_check_scalars() {
        assert!(Type::Int.check(&Value::Int(3)).is_ok());
        assert!(Type::Float.check(&Value::Int(3)).is_ok());
        assert!(Type::String.check(&Value::String("x".into())).is_ok());
        assert!(Type::Any.check(&Value::Null).is_ok());

        let err = Type::Int.check(&Value::String("3".into())).unwrap_err();
        assert_eq!(err, Error::TypeMismatch { expected: "int".into(), found: "string" });
    }

    #[test]
    fn test_check_record_ignores_extra_fields() {
        let value = Value::record([
            ("FirstName", Value::String("A".into())),
            ("LastName", Value::String("B".into())),
            ("Nickname", Value::String("C".into())),
        ]);
        assert!(name_type().check(&value).is_ok());
    }

    #[test]
    fn test_check_record_missing_field() {
        let value = Value::record([("FirstName", Value::String("A".into()))]);
        assert_eq!(name_type().check(&value).unwrap_err(), Error::MissingField("LastName".into()));
    }

    #[test]
    fn test_check_nested_list_and_option() {
        let ty = Type::list(Type::option(Type::Int));
        assert!(ty.check(&Value::List(vec![Value::Int(1), Value::Null])).is_ok());
        assert!(ty.check(&Value::List(vec![Value::Bool(true)])).is_err());
    }

    #[test]
    fn test_check_recursion_limit() {
        let mut ty = Type::Int;
        let mut value = Value::Int(0);
        for _ in 0..(MAX_DEPTH + 2) {
            ty = Type::list(ty);
            value = Value::List(vec![value]);
        }
        assert_eq!(ty.check(&value).unwrap_err(), Error::RecursionLimitExceeded);
    }

    #[test]
    fn test_args_conversion() {
        let args = Args::new(vec![Value::Int(5), Value::String("p1".into())]);
        assert_eq!(args.get::<i32>(0).unwrap(), 5);
        assert_eq!(args.get::<String>(1).unwrap(), "p1");
        assert_eq!(args.get::<i32>(2).unwrap_err(), Error::MissingArgument(2));
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = i32::from_value(Value::Int(i64::MAX)).unwrap_err();
        assert!(matches!(err, Error::OutOfRange(_)));
        assert!(u32::from_value(Value::Int(-1)).is_err());
    }

    #[test]
    fn test_display_rendering() {
        let value = Value::record([
            ("a", Value::List(vec![Value::Int(1), Value::Null])),
            ("b", Value::String("x".into())),
        ]);
        assert_eq!(value.to_string(), r#"{a: [1, null], b: "x"}"#);
    }
}
