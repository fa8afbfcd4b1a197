//! Scene description: the set of application objects the binary exposes over OSC.
//!
//! ```toml
//! [[object]]
//! path = "/osc1"
//!
//! [[object.attribute]]
//! name = "freq"
//! type = "int"
//! default = 440
//!
//! [[object.operation]]
//! name = "reset"
//! action = "reset"
//!
//! [[object.operation]]
//! name = "trigger"
//! arity = 2
//! action = "emit"
//! event = "triggered"
//!
//! [[object.event]]
//! name = "triggered"
//! arity = 2
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use quickcollider_osc::{
    AttributeInfo, Emitter, EventInfo, OperationInfo, OscObject, Value, ValueType,
};

#[derive(Debug)]
pub enum SceneError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    /// A structurally valid file describing an impossible object.
    Invalid { object: String, reason: String },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read scene {}: {}", path.display(), source),
            Self::Parse { path, source } => {
                write!(f, "malformed scene {}: {}", path.display(), source)
            }
            Self::Invalid { object, reason } => write!(f, "object {}: {}", object, reason),
        }
    }
}

impl std::error::Error for SceneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid { .. } => None,
        }
    }
}

#[derive(Deserialize)]
struct SceneFile {
    #[serde(default, rename = "object")]
    objects: Vec<ObjectDef>,
}

#[derive(Deserialize)]
struct ObjectDef {
    path: String,
    #[serde(default, rename = "attribute")]
    attributes: Vec<AttributeDef>,
    #[serde(default, rename = "operation")]
    operations: Vec<OperationDef>,
    #[serde(default, rename = "event")]
    events: Vec<EventDef>,
}

#[derive(Deserialize)]
struct AttributeDef {
    name: String,
    #[serde(rename = "type")]
    ty: ValueType,
    default: Option<toml::Value>,
    #[serde(default = "yes")]
    writable: bool,
    #[serde(default = "yes")]
    notify: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ActionKind {
    Reset,
    Emit,
    Assign,
}

#[derive(Deserialize)]
struct OperationDef {
    name: String,
    #[serde(default)]
    arity: Option<usize>,
    action: ActionKind,
    event: Option<String>,
    attribute: Option<String>,
}

#[derive(Deserialize)]
struct EventDef {
    name: String,
    arity: Option<usize>,
    /// Parameter types; when given, absent parameters get that type's zero value.
    #[serde(default)]
    types: Vec<ValueType>,
}

fn yes() -> bool {
    true
}

/// What an operation does when invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Restore every attribute to its default.
    Reset,
    /// Fire the named event. Each parameter keeps its position; an absent one
    /// becomes the zero value of its declared type (int when untyped).
    Emit {
        event: String,
        params: Vec<Option<ValueType>>,
    },
    /// Write the first argument to the named attribute.
    Assign(String),
}

#[derive(Debug, Clone)]
struct Slot {
    info: AttributeInfo,
    default: Value,
    value: Value,
}

#[derive(Debug, Clone)]
struct Operation {
    info: OperationInfo,
    action: Action,
}

/// A scene entry: an object built from its description, and the path it is
/// announced at.
pub struct SceneEntry {
    pub path: String,
    pub object: SceneObject,
}

/// Generic application object whose members come from the scene file.
#[derive(Debug, Clone)]
pub struct SceneObject {
    attributes: Vec<Slot>,
    operations: Vec<Operation>,
    events: Vec<EventInfo>,
}

impl SceneObject {
    fn slot(&self, name: &str) -> Option<&Slot> {
        self.attributes.iter().find(|s| s.info.name == name)
    }

    fn store(&mut self, name: &str, value: Value, emitter: &mut Emitter) -> bool {
        let Some(slot) = self.attributes.iter_mut().find(|s| s.info.name == name) else {
            return false;
        };
        let Ok(value) = value.coerce(slot.info.ty) else {
            return false;
        };
        if slot.value != value {
            slot.value = value;
            if slot.info.notify {
                emitter.changed(name);
            }
        }
        true
    }
}

impl OscObject for SceneObject {
    fn attributes(&self) -> Vec<AttributeInfo> {
        self.attributes.iter().map(|s| s.info.clone()).collect()
    }

    fn operations(&self) -> Vec<OperationInfo> {
        self.operations.iter().map(|o| o.info.clone()).collect()
    }

    fn events(&self) -> Vec<EventInfo> {
        self.events.clone()
    }

    fn read(&self, name: &str) -> Option<Value> {
        self.slot(name).map(|s| s.value.clone())
    }

    fn write(&mut self, name: &str, value: Value, emitter: &mut Emitter) -> bool {
        if !self.slot(name).is_some_and(|s| s.info.writable) {
            return false;
        }
        self.store(name, value, emitter)
    }

    fn invoke(&mut self, name: &str, args: &[Option<Value>], emitter: &mut Emitter) -> bool {
        let Some(action) = self
            .operations
            .iter()
            .find(|o| o.info.name == name)
            .map(|o| o.action.clone())
        else {
            return false;
        };
        match action {
            Action::Reset => {
                let defaults: Vec<(String, Value)> = self
                    .attributes
                    .iter()
                    .map(|s| (s.info.name.clone(), s.default.clone()))
                    .collect();
                for (attribute, default) in defaults {
                    self.store(&attribute, default, emitter);
                }
                true
            }
            Action::Emit { event, params } => {
                let mut payload = Vec::with_capacity(params.len());
                for (i, ty) in params.iter().enumerate() {
                    let value = match (args.get(i).cloned().flatten(), ty) {
                        (Some(v), Some(ty)) => match v.coerce(*ty) {
                            Ok(v) => v,
                            Err(_) => return false,
                        },
                        (Some(v), None) => v,
                        (None, Some(ty)) => zero(*ty),
                        (None, None) => Value::Int(0),
                    };
                    payload.push(value);
                }
                emitter.signal(&event, payload);
                true
            }
            Action::Assign(attribute) => match args.first().cloned().flatten() {
                Some(value) => self.store(&attribute, value, emitter),
                None => false,
            },
        }
    }
}

/// Read and validate a scene file.
pub fn load(path: &Path) -> Result<Vec<SceneEntry>, SceneError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: SceneFile = toml::from_str(&contents).map_err(|source| SceneError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let entries = file
        .objects
        .into_iter()
        .map(build_object)
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!(target: "scene", "loaded {} object(s) from {}", entries.len(), path.display());
    Ok(entries)
}

fn build_object(def: ObjectDef) -> Result<SceneEntry, SceneError> {
    let invalid = |reason: String| SceneError::Invalid {
        object: def.path.clone(),
        reason,
    };
    if def.path.is_empty() {
        return Err(invalid("path is empty".into()));
    }

    let mut names = HashSet::new();
    let mut attributes = Vec::new();
    for attr in &def.attributes {
        if !names.insert(attr.name.as_str()) {
            return Err(invalid(format!("duplicate member '{}'", attr.name)));
        }
        let default = match &attr.default {
            Some(raw) => from_toml(raw)
                .and_then(|v| v.coerce(attr.ty).ok())
                .ok_or_else(|| invalid(format!("bad default for '{}': {}", attr.name, raw)))?,
            None => zero(attr.ty),
        };
        let mut info = AttributeInfo::new(attr.name.clone(), attr.ty);
        info.writable = attr.writable;
        info.notify = attr.notify;
        attributes.push(Slot {
            info,
            value: default.clone(),
            default,
        });
    }

    let mut events = Vec::new();
    let mut event_params: Vec<Vec<Option<ValueType>>> = Vec::new();
    for event in &def.events {
        let arity = match (event.arity, event.types.len()) {
            (Some(arity), 0) => arity,
            (None, typed) => typed,
            (Some(arity), typed) if arity == typed => arity,
            (Some(arity), typed) => {
                return Err(invalid(format!(
                    "event '{}' has arity {} but {} type(s)",
                    event.name, arity, typed
                )))
            }
        };
        let params = if event.types.is_empty() {
            vec![None; arity]
        } else {
            event.types.iter().copied().map(Some).collect()
        };
        events.push(EventInfo::new(event.name.clone(), arity));
        event_params.push(params);
    }

    let mut operations = Vec::new();
    for op in &def.operations {
        if !names.insert(op.name.as_str()) {
            return Err(invalid(format!("duplicate member '{}'", op.name)));
        }
        let (action, arity) = match op.action {
            ActionKind::Reset => (Action::Reset, op.arity.unwrap_or(0)),
            ActionKind::Emit => {
                let event = op
                    .event
                    .as_ref()
                    .ok_or_else(|| invalid(format!("'{}' emits no event", op.name)))?;
                let index = events
                    .iter()
                    .position(|e| &e.name == event)
                    .ok_or_else(|| invalid(format!("'{}' emits undeclared event '{}'", op.name, event)))?;
                let params = event_params[index].clone();
                let arity = op.arity.unwrap_or(params.len());
                (
                    Action::Emit {
                        event: event.clone(),
                        params,
                    },
                    arity,
                )
            }
            ActionKind::Assign => {
                let attribute = op
                    .attribute
                    .as_ref()
                    .ok_or_else(|| invalid(format!("'{}' assigns no attribute", op.name)))?;
                if !def.attributes.iter().any(|a| &a.name == attribute) {
                    return Err(invalid(format!(
                        "'{}' assigns undeclared attribute '{}'",
                        op.name, attribute
                    )));
                }
                let arity = op.arity.unwrap_or(1);
                if arity == 0 {
                    return Err(invalid(format!("'{}' needs at least one parameter", op.name)));
                }
                (Action::Assign(attribute.clone()), arity)
            }
        };
        operations.push(Operation {
            info: OperationInfo::new(op.name.clone(), arity),
            action,
        });
    }

    Ok(SceneEntry {
        path: def.path.clone(),
        object: SceneObject {
            attributes,
            operations,
            events,
        },
    })
}

fn from_toml(raw: &toml::Value) -> Option<Value> {
    match raw {
        toml::Value::Integer(i) => i32::try_from(*i).ok().map(Value::Int),
        toml::Value::Float(f) => Some(Value::Double(*f)),
        toml::Value::String(s) => Some(Value::String(s.clone())),
        _ => None,
    }
}

fn zero(ty: ValueType) -> Value {
    match ty {
        ValueType::Int => Value::Int(0),
        ValueType::Float => Value::Float(0.0),
        ValueType::Double => Value::Double(0.0),
        ValueType::String => Value::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use quickcollider_osc::Emitted;

    const DEMO: &str = r#"
[[object]]
path = "/osc1"

[[object.attribute]]
name = "freq"
type = "int"
default = 440

[[object.attribute]]
name = "gain"
type = "float"
default = 0.5

[[object.attribute]]
name = "name"
type = "string"
default = "lead"
notify = false

[[object.attribute]]
name = "voices"
type = "int"
default = 4
writable = false

[[object.operation]]
name = "reset"
action = "reset"

[[object.operation]]
name = "tune"
action = "assign"
attribute = "freq"

[[object.operation]]
name = "trigger"
action = "emit"
event = "triggered"

[[object.event]]
name = "triggered"
arity = 2
"#;

    fn write_scene(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn demo() -> SceneObject {
        let file = write_scene(DEMO);
        let mut entries = load(file.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/osc1");
        entries.remove(0).object
    }

    #[test]
    fn loads_members_and_defaults() {
        let obj = demo();
        assert_eq!(obj.read("freq"), Some(Value::Int(440)));
        assert_eq!(obj.read("gain"), Some(Value::Float(0.5)));
        assert_eq!(obj.read("name"), Some(Value::from("lead")));

        let voices = obj.attribute("voices").unwrap();
        assert!(!voices.writable);
        assert!(!obj.attribute("name").unwrap().notify);

        assert_eq!(obj.operation("tune").unwrap().arity, 1);
        // emit arity defaults to the event's arity
        assert_eq!(obj.operation("trigger").unwrap().arity, 2);
        assert_eq!(obj.event("triggered").unwrap().arity, 2);
    }

    #[test]
    fn write_emits_change_only_when_notifying() {
        let mut obj = demo();
        let mut emitter = Emitter::new();
        assert!(obj.write("freq", Value::Int(880), &mut emitter));
        assert!(obj.write("freq", Value::Int(880), &mut emitter));
        assert!(obj.write("name", Value::from("pad"), &mut emitter));
        assert!(!obj.write("voices", Value::Int(8), &mut emitter));
        assert!(!obj.write("missing", Value::Int(1), &mut emitter));
        assert_eq!(emitter.into_events(), vec![Emitted::Changed("freq".into())]);
        assert_eq!(obj.read("voices"), Some(Value::Int(4)));
    }

    #[test]
    fn actions() {
        let mut obj = demo();
        let mut emitter = Emitter::new();

        assert!(obj.invoke("tune", &[Some(Value::from("220"))], &mut emitter));
        assert_eq!(obj.read("freq"), Some(Value::Int(220)));
        assert!(!obj.invoke("tune", &[None], &mut emitter));

        assert!(obj.invoke("reset", &[], &mut emitter));
        assert_eq!(obj.read("freq"), Some(Value::Int(440)));

        assert!(obj.invoke("trigger", &[Some(Value::Int(1)), None], &mut emitter));
        assert!(!obj.invoke("nothing", &[], &mut emitter));

        assert_eq!(
            emitter.into_events(),
            vec![
                Emitted::Changed("freq".into()),
                Emitted::Changed("freq".into()),
                Emitted::Signal {
                    name: "triggered".into(),
                    args: vec![Value::Int(1), Value::Int(0)]
                },
            ]
        );
    }

    #[test]
    fn emit_keeps_parameter_positions() {
        let file = write_scene(
            r#"
[[object]]
path = "/seq"
[[object.operation]]
name = "hit"
action = "emit"
event = "hit"
[[object.operation]]
name = "label"
action = "emit"
event = "named"
[[object.event]]
name = "hit"
arity = 2
[[object.event]]
name = "named"
types = ["string", "float"]
"#,
        );
        let mut obj = load(file.path()).unwrap().remove(0).object;
        let mut emitter = Emitter::new();

        // missing velocity must not shift the note into its slot
        assert!(obj.invoke("hit", &[None, Some(Value::Int(60))], &mut emitter));
        assert!(obj.invoke("label", &[None, Some(Value::Int(2))], &mut emitter));
        assert!(!obj.invoke("label", &[Some(Value::from("x")), Some(Value::from("loud"))], &mut emitter));

        assert_eq!(obj.event("named").unwrap().arity, 2);
        assert_eq!(
            emitter.into_events(),
            vec![
                Emitted::Signal {
                    name: "hit".into(),
                    args: vec![Value::Int(0), Value::Int(60)]
                },
                Emitted::Signal {
                    name: "named".into(),
                    args: vec![Value::from(""), Value::Float(2.0)]
                },
            ]
        );
    }

    #[test]
    fn rejects_event_arity_type_mismatch() {
        let file = write_scene(
            r#"
[[object]]
path = "/a"
[[object.event]]
name = "e"
arity = 3
types = ["int"]
"#,
        );
        assert!(matches!(load(file.path()), Err(SceneError::Invalid { .. })));
    }

    #[test]
    fn rejects_undeclared_event() {
        let file = write_scene(
            r#"
[[object]]
path = "/a"
[[object.operation]]
name = "go"
action = "emit"
event = "nope"
"#,
        );
        match load(file.path()) {
            Err(SceneError::Invalid { object, .. }) => assert_eq!(object, "/a"),
            other => panic!("expected Invalid, got {:?}", other.map(|e| e.len())),
        }
    }

    #[test]
    fn rejects_bad_default_and_duplicates() {
        let bad_default = write_scene(
            r#"
[[object]]
path = "/a"
[[object.attribute]]
name = "freq"
type = "int"
default = "loud"
"#,
        );
        assert!(matches!(load(bad_default.path()), Err(SceneError::Invalid { .. })));

        let duplicate = write_scene(
            r#"
[[object]]
path = "/a"
[[object.attribute]]
name = "x"
type = "int"
[[object.operation]]
name = "x"
action = "reset"
"#,
        );
        assert!(matches!(load(duplicate.path()), Err(SceneError::Invalid { .. })));
    }

    #[test]
    fn parse_and_io_errors() {
        let garbage = write_scene("[[object]\npath =");
        assert!(matches!(load(garbage.path()), Err(SceneError::Parse { .. })));
        assert!(matches!(
            load(Path::new("/definitely/not/here.toml")),
            Err(SceneError::Io { .. })
        ));
    }
}
