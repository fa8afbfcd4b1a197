//! Descriptors for the members an application object exposes over OSC.

use serde::{Deserialize, Serialize};

use crate::ValueType;

/// What a dispatch node targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    Property,
    Method,
}

/// A named, typed attribute.
///
/// `notify` means the object emits a change event for this attribute whenever its
/// value changes, so subscribers can bind to it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub ty: ValueType,
    pub readable: bool,
    pub writable: bool,
    pub notify: bool,
}

impl AttributeInfo {
    /// A readable, writable attribute with change notification.
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
            notify: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn without_notify(mut self) -> Self {
        self.notify = false;
        self
    }
}

/// An invokable operation with a fixed number of positional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub name: String,
    pub arity: usize,
}

impl OperationInfo {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

/// A named event (signal) carrying `arity` payload values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    pub arity: usize,
}

impl EventInfo {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}
