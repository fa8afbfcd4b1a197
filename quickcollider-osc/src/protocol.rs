//! Inbound OSC methods understood by the server.
//!
//! | Path                    | Arguments                 |
//! |-------------------------|---------------------------|
//! | `/set/<node path>`      | `value`                   |
//! | `/invoke/<node path>`   | `a0 .. a9`                |
//! | `/subscribe`            | `path name [name ...]`    |
//! | `/unsubscribe`          | `path name [name ...]`    |
//! | `/unsubscribeAll`       | `path`                    |
//!
//! The node path keeps its leading slash: `/set/osc1/freq` targets `/osc1/freq`.

use std::fmt;

use quickcollider_types::Value;

pub const SET_PREFIX: &str = "/set/";
pub const INVOKE_PREFIX: &str = "/invoke/";
pub const SUBSCRIBE: &str = "/subscribe";
pub const UNSUBSCRIBE: &str = "/unsubscribe";
pub const UNSUBSCRIBE_ALL: &str = "/unsubscribeAll";

/// A parsed inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { path: String, args: Vec<Value> },
    Invoke { path: String, args: Vec<Value> },
    Subscribe { path: String, names: Vec<String> },
    Unsubscribe { path: String, names: Vec<String> },
    UnsubscribeAll { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    UnknownMethod(String),
    MissingArguments {
        method: &'static str,
        needed: usize,
        got: usize,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMethod(path) => write!(f, "unknown OSC method: {}", path),
            Self::MissingArguments {
                method,
                needed,
                got,
            } => write!(
                f,
                "'{}' needs at least {} argument(s), got {}",
                method, needed, got
            ),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl Command {
    /// Classify an inbound message by its path.
    pub fn parse(path: &str, args: Vec<Value>) -> Result<Command, ProtocolError> {
        if let Some(rest) = path.strip_prefix(SET_PREFIX) {
            return Ok(Command::Set {
                path: format!("/{}", rest),
                args,
            });
        }
        if let Some(rest) = path.strip_prefix(INVOKE_PREFIX) {
            return Ok(Command::Invoke {
                path: format!("/{}", rest),
                args,
            });
        }
        match path {
            SUBSCRIBE => {
                let (path, names) = path_and_names(SUBSCRIBE, args)?;
                Ok(Command::Subscribe { path, names })
            }
            UNSUBSCRIBE => {
                let (path, names) = path_and_names(UNSUBSCRIBE, args)?;
                Ok(Command::Unsubscribe { path, names })
            }
            UNSUBSCRIBE_ALL => {
                let path = args.first().ok_or(ProtocolError::MissingArguments {
                    method: UNSUBSCRIBE_ALL,
                    needed: 1,
                    got: 0,
                })?;
                Ok(Command::UnsubscribeAll {
                    path: path.to_text(),
                })
            }
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}

fn path_and_names(
    method: &'static str,
    args: Vec<Value>,
) -> Result<(String, Vec<String>), ProtocolError> {
    if args.len() < 2 {
        return Err(ProtocolError::MissingArguments {
            method,
            needed: 2,
            got: args.len(),
        });
    }
    let mut texts = args.iter().map(Value::to_text);
    let path = texts.next().unwrap_or_default();
    Ok((path, texts.collect()))
}
