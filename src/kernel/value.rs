//! Opaque values carried by effects, cache keys and state slots.
//!
//! Equality is shallow: primitives compare by value, [Value::Shared] compares by
//! identity of the allocation. Nothing ever recurses into a composite, so a value
//! that is rebuilt on every run never matches a cached one even when its contents
//! are identical.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Composite value, compared by identity.
    Shared(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wraps an arbitrary value as an identity-compared composite.
    pub fn shared<T: Any + Send + Sync>(value: T) -> Self {
        Value::Shared(Arc::new(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Shared(any) => any.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    /// Short kind name, used in logs and contract-violation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Shared(_) => "shared",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Compare data pointers only; vtable pointers are not stable across codegen units.
            (Value::Shared(a), Value::Shared(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Shared(any) => write!(f, "Shared({:p})", Arc::as_ptr(any) as *const u8),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

/// Shallow list comparison used for cache keys: same length and each element equal.
pub fn args_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_by_value() {
        assert_eq!(Value::from("roy"), Value::from(String::from("roy")));
        assert_eq!(Value::from(4), Value::Int(4));
        assert_ne!(Value::from(4), Value::from(4.0));
        assert_ne!(Value::Unit, Value::Bool(false));
    }

    #[test]
    fn accessors_only_match_their_own_kind() {
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(1).as_bool(), None);
        assert_eq!(Value::from(2.5).as_float(), Some(2.5));
        assert_eq!(Value::from(2).as_float(), None);
        assert!(Value::from(()).is_unit());
        assert!(!Value::from("").is_unit());
        assert_eq!(Value::from(()).kind(), "unit");
    }

    #[test]
    fn composites_compare_by_identity() {
        let a = Value::shared(vec![1, 2, 3]);
        let b = Value::shared(vec![1, 2, 3]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn args_equal_is_element_wise() {
        let shared = Value::shared("config");
        assert!(args_equal(&[], &[]));
        assert!(args_equal(
            &[Value::from(1), shared.clone()],
            &[Value::from(1), shared.clone()]
        ));
        assert!(!args_equal(&[Value::from(1)], &[Value::from(1), Value::Unit]));
        assert!(!args_equal(&[shared], &[Value::shared("config")]));
    }
}
