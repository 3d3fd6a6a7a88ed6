//! Host-side values exchanged with the guest through handles.

use crate::closure::Closure;
use crate::heap::SentinelValues;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A value owned by the host and referenced by the guest through a handle.
#[derive(Clone, Default)]
pub enum HostValue {
    /// The absent value.
    #[default]
    Undefined,
    /// The explicit null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number.
    Number(f64),
    /// A text string.
    String(String),
    /// A byte buffer.
    Bytes(Vec<u8>),
    /// An ordered list of values.
    Array(Vec<HostValue>),
    /// A host failure captured for the guest.
    Error(HostError),
    /// A callable guest closure.
    Closure(Closure),
    /// Any other host object, opaque to the bridge.
    Object(HostObject),
}

impl HostValue {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Error(_) => "error",
            Self::Closure(_) => "function",
            Self::Object(_) => "object",
        }
    }

    /// Either undefined or null.
    pub fn is_like_none(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Matches `typeof v === 'object' && v !== null`.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::Bytes(_) | Self::Array(_) | Self::Error(_) | Self::Object(_)
        )
    }

    /// The boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The closure, if this is a function.
    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            Self::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// Downcast an opaque object.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Object(obj) => obj.downcast_ref(),
            _ => None,
        }
    }
}

impl SentinelValues for HostValue {
    fn undefined() -> Self {
        Self::Undefined
    }

    fn null() -> Self {
        Self::Null
    }

    fn boolean(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::debug::debug_string(self))
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<HostError> for HostValue {
    fn from(value: HostError) -> Self {
        Self::Error(value)
    }
}

impl From<Closure> for HostValue {
    fn from(value: Closure) -> Self {
        Self::Closure(value)
    }
}

impl From<HostObject> for HostValue {
    fn from(value: HostObject) -> Self {
        Self::Object(value)
    }
}

/// An error raised by a host call, stored for the guest to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    /// Error class name, e.g. `TypeError`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl HostError {
    /// A plain `Error`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// An error with an explicit class name.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for HostError {}

impl From<crate::error::BridgeError> for HostError {
    fn from(err: crate::error::BridgeError) -> Self {
        Self::named("BridgeError", err.to_string())
    }
}

/// Opaque host object shared by reference.
///
/// Cloning shares the same object, the way a handle clone does on the host.
#[derive(Clone)]
pub struct HostObject {
    type_name: &'static str,
    inner: Rc<dyn Any>,
}

impl HostObject {
    /// Wrap any host value.
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            type_name: short_type_name::<T>(),
            inner: Rc::new(value),
        }
    }

    /// Unqualified name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Downcast to the wrapped type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Whether two handles point at the same host object.
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AudioNode {
        gain: f32,
    }

    #[test]
    fn kinds_and_accessors() {
        assert_eq!(HostValue::from(true).as_bool(), Some(true));
        assert_eq!(HostValue::from(2.5).as_number(), Some(2.5));
        assert_eq!(HostValue::from("hi").as_str(), Some("hi"));
        assert_eq!(HostValue::Null.kind(), "null");
        assert!(HostValue::Undefined.is_like_none());
        assert!(!HostValue::Null.is_object());
        assert!(HostValue::Bytes(vec![1]).is_object());
    }

    #[test]
    fn opaque_objects_downcast_and_share() {
        let value = HostValue::Object(HostObject::new(AudioNode { gain: 0.5 }));
        assert_eq!(value.downcast_ref::<AudioNode>().map(|n| n.gain), Some(0.5));
        assert!(value.downcast_ref::<String>().is_none());

        let HostValue::Object(obj) = &value else {
            panic!("expected object");
        };
        assert_eq!(obj.type_name(), "AudioNode");
        let copy = obj.clone();
        assert!(copy.ptr_eq(obj));

        let converted: HostValue = copy.into();
        assert!(converted.is_object());
        assert_eq!(converted.kind(), "object");
    }

    #[test]
    fn host_error_display() {
        let err = HostError::named("TypeError", "not a function");
        assert_eq!(err.to_string(), "TypeError: not a function");
    }
}
