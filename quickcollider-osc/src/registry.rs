//! Path registry: maps OSC paths to members of registered objects.
//!
//! Registering an object at `path` creates one [`DispatchNode`] per writable
//! attribute and per operation, at `path + "/" + member`. Lookup is an exact
//! string match; no OSC pattern matching is performed.

use std::collections::HashMap;

use log::{debug, warn};

use quickcollider_types::{MemberKind, ObjectId};

use crate::object::ObjectArena;

/// An object announced for OSC dispatch at a base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub object: ObjectId,
    pub path: String,
}

/// One addressable member of a registered object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchNode {
    pub path: String,
    pub kind: MemberKind,
    pub object: ObjectId,
    pub member: String,
}

/// Registered interfaces and the nodes derived from them.
#[derive(Debug, Default)]
pub struct DispatchTable {
    interfaces: Vec<Interface>,
    nodes: HashMap<String, DispatchNode>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object` at `path` and build its dispatch nodes.
    ///
    /// Returns the new interface, or `None` if the path is empty, the object is
    /// already registered, or the handle does not refer to a live object.
    pub fn register(
        &mut self,
        objects: &ObjectArena,
        object: ObjectId,
        path: &str,
    ) -> Option<Interface> {
        if path.is_empty() {
            warn!(target: "osc::registry", "interface path is empty");
            return None;
        }
        if let Some(existing) = self.interface_for(object) {
            warn!(
                target: "osc::registry",
                "object {} already registered at {}, ignoring {}",
                object, existing.path, path
            );
            return None;
        }
        if !objects.contains(object) {
            warn!(target: "osc::registry", "cannot register {}: no live object {}", path, object);
            return None;
        }

        let interface = Interface {
            object,
            path: path.to_string(),
        };
        if let Some(current) = self.interface_at(path) {
            warn!(
                target: "osc::registry",
                "path {} already served by {}, {} waits until it is removed",
                path, current.object, object
            );
        } else {
            self.insert_nodes(objects, &interface);
        }
        self.interfaces.push(interface.clone());
        debug!(target: "osc::registry", "added interface {} -> {}", path, object);
        Some(interface)
    }

    /// Remove `object`'s interface and all its nodes.
    ///
    /// Unregistering an object that is not registered is a no-op. If the removed
    /// interface was answering for its path, the next interface waiting at that
    /// path takes over and gets its nodes built.
    pub fn unregister(&mut self, objects: &ObjectArena, object: ObjectId) -> Option<Interface> {
        let was_answering = self.is_answering(object);
        let pos = self.interfaces.iter().position(|i| i.object == object)?;
        let interface = self.interfaces.remove(pos);
        self.nodes.retain(|_, node| node.object != object);
        debug!(target: "osc::registry", "removed interface {} -> {}", interface.path, object);

        if was_answering {
            if let Some(next) = self.interface_at(&interface.path).cloned() {
                debug!(target: "osc::registry", "{} now served by {}", next.path, next.object);
                self.insert_nodes(objects, &next);
            }
        }
        Some(interface)
    }

    /// Whether `object` is the interface dispatch currently resolves to at its path.
    pub fn is_answering(&self, object: ObjectId) -> bool {
        self.interface_for(object)
            .and_then(|i| self.interface_at(&i.path))
            .is_some_and(|i| i.object == object)
    }

    pub fn resolve(&self, path: &str) -> Option<&DispatchNode> {
        self.nodes.get(path)
    }

    /// The interface currently answering for `path` (the earliest registered one).
    pub fn interface_at(&self, path: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.path == path)
    }

    pub fn interface_for(&self, object: ObjectId) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.object == object)
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn insert_nodes(&mut self, objects: &ObjectArena, interface: &Interface) {
        let Some(target) = objects.get(interface.object) else {
            return;
        };
        let properties = target
            .attributes()
            .into_iter()
            .filter(|a| a.writable)
            .map(|a| (a.name, MemberKind::Property));
        let methods = target
            .operations()
            .into_iter()
            .map(|o| (o.name, MemberKind::Method));

        for (member, kind) in properties.chain(methods) {
            let path = format!("{}/{}", interface.path, member);
            if let Some(existing) = self.nodes.get(&path) {
                if existing.object != interface.object {
                    warn!(target: "osc::registry", "path {} already exists", path);
                }
                continue;
            }
            debug!(target: "osc::registry", "registered {:?} node {}", kind, path);
            self.nodes.insert(
                path.clone(),
                DispatchNode {
                    path,
                    kind,
                    object: interface.object,
                    member,
                },
            );
        }
    }
}
