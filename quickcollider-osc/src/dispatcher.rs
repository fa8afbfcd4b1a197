//! Inbound command dispatch: attribute writes and operation calls.

use std::fmt;

use log::debug;

use quickcollider_types::{MemberKind, Value, ValueError};

use crate::object::ObjectArena;
use crate::registry::{DispatchNode, DispatchTable};

/// Upper bound on positional arguments passed to an operation, kept for
/// compatibility with existing clients.
pub const DEFAULT_MAX_INVOKE_ARGS: usize = 10;

/// Why a `/set` or `/invoke` command had no effect.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    MissingArgument { path: String },
    Unresolved { path: String },
    WrongKind { path: String, expected: MemberKind },
    /// The node's object or member no longer exists.
    Stale { path: String },
    Coercion { path: String, source: ValueError },
    Rejected { path: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArgument { path } => write!(f, "cannot set {} without a value", path),
            Self::Unresolved { path } => write!(f, "no object for path {}", path),
            Self::WrongKind { path, expected } => match expected {
                MemberKind::Property => write!(f, "no property for path {}", path),
                MemberKind::Method => write!(f, "no method for path {}", path),
            },
            Self::Stale { path } => write!(f, "target of {} is gone", path),
            Self::Coercion { path, source } => {
                write!(f, "bad value for {}: {}", path, source)
            }
            Self::Rejected { path } => write!(f, "target refused {}", path),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Performs property writes and method calls against resolved dispatch nodes.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    max_invoke_args: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INVOKE_ARGS)
    }
}

impl Dispatcher {
    pub fn new(max_invoke_args: usize) -> Self {
        Self { max_invoke_args }
    }

    pub fn max_invoke_args(&self) -> usize {
        self.max_invoke_args
    }

    /// Write the first argument to the property node at `path`.
    pub fn set(
        &self,
        table: &DispatchTable,
        objects: &mut ObjectArena,
        path: &str,
        args: &[Value],
    ) -> Result<(), DispatchError> {
        let Some(value) = args.first() else {
            return Err(DispatchError::MissingArgument {
                path: path.to_string(),
            });
        };
        let node = lookup(table, path, MemberKind::Property)?;

        let attribute = objects
            .get(node.object)
            .and_then(|o| o.attribute(&node.member))
            .ok_or_else(|| DispatchError::Stale {
                path: path.to_string(),
            })?;
        let value = value
            .coerce(attribute.ty)
            .map_err(|source| DispatchError::Coercion {
                path: path.to_string(),
                source,
            })?;

        if !objects.write(node.object, &node.member, value) {
            return Err(DispatchError::Rejected {
                path: path.to_string(),
            });
        }
        debug!(target: "osc::dispatch", "set {}", path);
        Ok(())
    }

    /// Invoke the method node at `path` with positional arguments.
    pub fn invoke(
        &self,
        table: &DispatchTable,
        objects: &mut ObjectArena,
        path: &str,
        args: &[Value],
    ) -> Result<(), DispatchError> {
        let node = lookup(table, path, MemberKind::Method)?;

        let operation = objects
            .get(node.object)
            .and_then(|o| o.operation(&node.member))
            .ok_or_else(|| DispatchError::Stale {
                path: path.to_string(),
            })?;
        if args.len() > operation.arity.min(self.max_invoke_args) {
            debug!(
                target: "osc::dispatch",
                "{}: ignoring {} surplus argument(s)",
                path,
                args.len() - operation.arity.min(self.max_invoke_args)
            );
        }
        let call_args = fit_arguments(args, operation.arity, self.max_invoke_args);

        if !objects.invoke(node.object, &node.member, &call_args) {
            return Err(DispatchError::Rejected {
                path: path.to_string(),
            });
        }
        debug!(target: "osc::dispatch", "invoked {}", path);
        Ok(())
    }
}

fn lookup<'a>(
    table: &'a DispatchTable,
    path: &str,
    expected: MemberKind,
) -> Result<&'a DispatchNode, DispatchError> {
    let node = table.resolve(path).ok_or_else(|| DispatchError::Unresolved {
        path: path.to_string(),
    })?;
    if node.kind != expected {
        return Err(DispatchError::WrongKind {
            path: path.to_string(),
            expected,
        });
    }
    Ok(node)
}

/// Shape `args` into exactly `arity` positional parameters.
///
/// At most `cap` supplied arguments are used; parameters without a supplied
/// argument are `None`.
pub fn fit_arguments(args: &[Value], arity: usize, cap: usize) -> Vec<Option<Value>> {
    let mut fitted: Vec<Option<Value>> = args
        .iter()
        .take(arity.min(cap))
        .cloned()
        .map(Some)
        .collect();
    fitted.resize(arity, None);
    fitted
}
