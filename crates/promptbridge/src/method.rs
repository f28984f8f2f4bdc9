use std::fmt;

use crate::error::NameResolvingError;

/// A method reachable from the scripted side, addressed by namespace and name.
///
/// The empty namespace is the default namespace; its methods are called by
/// their bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    pub namespace: String,
    pub name: String,
}

impl Method {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// Turns a raw dotted identifier into a [`Method`].
pub trait ResolveMethod: Send + Sync {
    fn resolve(&self, raw: &str) -> Result<Method, NameResolvingError>;
}

/// Splits on the last `.`. Only one level of namespacing is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodResolver;

impl ResolveMethod for MethodResolver {
    fn resolve(&self, raw: &str) -> Result<Method, NameResolvingError> {
        let invalid = || NameResolvingError::InvalidFormat(raw.to_string());

        let Some(dot) = raw.rfind('.') else {
            if raw.is_empty() {
                return Err(invalid());
            }
            return Ok(Method::new("", raw));
        };

        let (namespace, name) = (&raw[..dot], &raw[dot + 1..]);
        if namespace.is_empty() || name.is_empty() || namespace.contains('.') {
            return Err(invalid());
        }
        Ok(Method::new(namespace, name))
    }
}

/// Splits into dot-separated segments and accepts one or two non-empty ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentMethodResolver;

impl ResolveMethod for SegmentMethodResolver {
    fn resolve(&self, raw: &str) -> Result<Method, NameResolvingError> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(NameResolvingError::InvalidFormat(raw.to_string()));
        }
        match segments.as_slice() {
            [name] => Ok(Method::new("", *name)),
            [namespace, name] => Ok(Method::new(*namespace, *name)),
            _ => Err(NameResolvingError::InvalidFormat(raw.to_string())),
        }
    }
}

/// Which calling convention a method-existence query asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Synchronous,
    Asynchronous,
    Either,
}

impl MethodKind {
    /// `"syn"` and `"asyn"` select a convention; anything else means either.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "syn" => MethodKind::Synchronous,
            "asyn" => MethodKind::Asynchronous,
            _ => MethodKind::Either,
        }
    }

    pub fn is_synchronous(self) -> Option<bool> {
        match self {
            MethodKind::Synchronous => Some(true),
            MethodKind::Asynchronous => Some(false),
            MethodKind::Either => None,
        }
    }
}

/// A method-existence query issued by the scripted side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodQuery {
    pub raw_name: String,
    pub kind: MethodKind,
}

impl MethodQuery {
    pub fn new(raw_name: impl Into<String>, raw_kind: &str) -> Self {
        Self {
            raw_name: raw_name.into(),
            kind: MethodKind::from_raw(raw_kind),
        }
    }
}
