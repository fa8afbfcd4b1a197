//! Application objects and the arena that owns them.
//!
//! An application object exposes its members through [`OscObject`] instead of
//! runtime reflection: it lists its attributes, operations and events, and it
//! reads, writes and invokes them by name. Changes are announced by pushing
//! events into the [`Emitter`] handed to every mutating call.
//!
//! Objects live in an [`ObjectArena`] and are addressed by generational
//! [`ObjectId`] handles, so a handle kept after its object was removed is
//! detected instead of dereferenced.

use quickcollider_types::{AttributeInfo, EventInfo, ObjectId, OperationInfo, Value};

/// Capability interface every OSC-reachable application object implements.
pub trait OscObject {
    /// Attributes this object exposes.
    fn attributes(&self) -> Vec<AttributeInfo>;

    /// Operations this object exposes.
    fn operations(&self) -> Vec<OperationInfo> {
        Vec::new()
    }

    /// Named events this object may emit.
    fn events(&self) -> Vec<EventInfo> {
        Vec::new()
    }

    /// Current value of a readable attribute.
    fn read(&self, name: &str) -> Option<Value>;

    /// Write an attribute. The value already has the attribute's declared type.
    /// Returns `false` if the object refused the write.
    fn write(&mut self, name: &str, value: Value, emitter: &mut Emitter) -> bool;

    /// Invoke an operation. `args` has exactly the operation's arity; `None`
    /// marks a parameter the caller did not supply.
    fn invoke(&mut self, name: &str, args: &[Option<Value>], emitter: &mut Emitter) -> bool {
        let _ = (name, args, emitter);
        false
    }

    fn attribute(&self, name: &str) -> Option<AttributeInfo> {
        self.attributes().into_iter().find(|a| a.name == name)
    }

    fn operation(&self, name: &str) -> Option<OperationInfo> {
        self.operations().into_iter().find(|o| o.name == name)
    }

    fn event(&self, name: &str) -> Option<EventInfo> {
        self.events().into_iter().find(|e| e.name == name)
    }
}

/// An event pushed by an object while it was being mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Emitted {
    /// The named attribute changed value.
    Changed(String),
    /// A named event fired with a payload.
    Signal { name: String, args: Vec<Value> },
}

/// Collects the events an object emits during one call.
#[derive(Debug, Default)]
pub struct Emitter {
    events: Vec<Emitted>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changed(&mut self, attribute: &str) {
        self.events.push(Emitted::Changed(attribute.to_string()));
    }

    pub fn signal(&mut self, name: &str, args: Vec<Value>) {
        self.events.push(Emitted::Signal {
            name: name.to_string(),
            args,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Emitted> {
        self.events
    }
}

/// What happened to an object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEventKind {
    Changed(String),
    Signal { name: String, args: Vec<Value> },
    /// The object was removed from the arena; its handle is now stale.
    Destroyed,
}

/// An event tagged with the object it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEvent {
    pub source: ObjectId,
    pub kind: ObjectEventKind,
}

struct Slot {
    generation: u32,
    object: Option<Box<dyn OscObject>>,
}

/// Generational arena owning the application objects.
///
/// Every mutation made through the arena queues the events the object emitted;
/// the server drains them with [`ObjectArena::take_events`].
#[derive(Default)]
pub struct ObjectArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    events: Vec<ObjectEvent>,
    len: usize,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Box<dyn OscObject>) -> ObjectId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return ObjectId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectId::new(index, 0)
    }

    /// Remove an object, invalidating every handle to it.
    ///
    /// Queues a [`ObjectEventKind::Destroyed`] event so listeners that were not
    /// detached beforehand are torn down on the next drain.
    pub fn remove(&mut self, id: ObjectId) -> Option<Box<dyn OscObject>> {
        let slot = self.slot_mut(id)?;
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        self.events.push(ObjectEvent {
            source: id,
            kind: ObjectEventKind::Destroyed,
        });
        Some(object)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ObjectId) -> Option<&dyn OscObject> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.object.as_deref()
    }

    pub fn read(&self, id: ObjectId, name: &str) -> Option<Value> {
        self.get(id)?.read(name)
    }

    /// Write an attribute, queueing whatever the object emits.
    /// Returns `false` for a stale handle or a refused write.
    pub fn write(&mut self, id: ObjectId, name: &str, value: Value) -> bool {
        self.update(id, |object, emitter| object.write(name, value, emitter))
            .unwrap_or(false)
    }

    pub fn invoke(&mut self, id: ObjectId, name: &str, args: &[Option<Value>]) -> bool {
        self.update(id, |object, emitter| object.invoke(name, args, emitter))
            .unwrap_or(false)
    }

    /// Run `f` against a live object and queue the events it emits.
    pub fn update<R>(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut dyn OscObject, &mut Emitter) -> R,
    ) -> Option<R> {
        let slot = self.slot_mut(id)?;
        let object = slot.object.as_deref_mut()?;
        let mut emitter = Emitter::new();
        let result = f(object, &mut emitter);
        self.events
            .extend(emitter.into_events().into_iter().map(|e| ObjectEvent {
                source: id,
                kind: match e {
                    Emitted::Changed(name) => ObjectEventKind::Changed(name),
                    Emitted::Signal { name, args } => ObjectEventKind::Signal { name, args },
                },
            }));
        Some(result)
    }

    pub fn take_events(&mut self) -> Vec<ObjectEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object
                .as_ref()
                .map(|_| ObjectId::new(index as u32, slot.generation))
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot_mut(&mut self, id: ObjectId) -> Option<&mut Slot> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        Some(slot)
    }
}
