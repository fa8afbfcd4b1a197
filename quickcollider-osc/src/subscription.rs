//! Per-peer subscriptions and the notifiers that forward object changes.
//!
//! A [`Client`] holds the subscriptions of one remote [`Address`]. Each
//! subscription is a [`Notifier`] for `basePath/name`. A notifier is Bound when
//! it is attached to a live object's attribute change or named event, and
//! Unbound (pending) otherwise; pending notifiers bind as soon as an interface
//! is registered at their base path.

use std::collections::HashMap;

use log::{debug, warn};

use quickcollider_types::{Address, ObjectId, Value};

use crate::object::{ObjectArena, ObjectEvent, ObjectEventKind};
use crate::registry::Interface;

/// What a bound notifier listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// An attribute's change notification; the payload is the freshly read value.
    Attribute { object: ObjectId, name: String },
    /// A named event; the payload is the event's arguments.
    Signal { object: ObjectId, name: String },
}

impl Binding {
    pub fn object(&self) -> ObjectId {
        match self {
            Binding::Attribute { object, .. } | Binding::Signal { object, .. } => *object,
        }
    }
}

/// Forwards one member's changes to one subscriber.
#[derive(Debug)]
pub struct Notifier {
    base_path: String,
    name: String,
    full_path: String,
    binding: Option<Binding>,
}

impl Notifier {
    fn new(base_path: &str, name: &str) -> Self {
        Self {
            base_path: base_path.to_string(),
            name: name.to_string(),
            full_path: format!("{}/{}", base_path, name),
            binding: None,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Attach to `object`, preferring a notifying attribute over a same-named event.
    fn bind(&mut self, objects: &ObjectArena, object: ObjectId) -> bool {
        if self.binding.is_some() {
            warn!(target: "osc::subscription", "{} is already connected", self.full_path);
            return false;
        }
        let Some(target) = objects.get(object) else {
            warn!(
                target: "osc::subscription",
                "failed to connect {}: object {} no longer exists",
                self.full_path, object
            );
            return false;
        };
        let binding = match target.attribute(&self.name) {
            Some(attr) if attr.readable && attr.notify => Some(Binding::Attribute {
                object,
                name: self.name.clone(),
            }),
            _ => target.event(&self.name).map(|_| Binding::Signal {
                object,
                name: self.name.clone(),
            }),
        };
        match binding {
            Some(binding) => {
                debug!(target: "osc::subscription", "connected {}", self.full_path);
                self.binding = Some(binding);
                true
            }
            None => {
                warn!(
                    target: "osc::subscription",
                    "failed to connect {}: no notifying attribute or event '{}'",
                    self.full_path, self.name
                );
                false
            }
        }
    }

    fn detach(&mut self) {
        if self.binding.take().is_some() {
            debug!(target: "osc::subscription", "detached {}", self.full_path);
        }
    }

    /// The outbound payload for `event`, if it is the one this notifier listens to.
    fn payload(&self, objects: &ObjectArena, event: &ObjectEvent) -> Option<Vec<Value>> {
        match (self.binding.as_ref()?, &event.kind) {
            (Binding::Attribute { object, name }, ObjectEventKind::Changed(changed))
                if *object == event.source && name == changed =>
            {
                objects.read(*object, name).map(|v| vec![v])
            }
            (Binding::Signal { object, name }, ObjectEventKind::Signal { name: fired, args })
                if *object == event.source && name == fired =>
            {
                Some(args.clone())
            }
            _ => None,
        }
    }
}

/// An OSC message to send to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Address,
    pub path: String,
    pub args: Vec<Value>,
}

/// Subscription state for one remote address.
#[derive(Debug)]
pub struct Client {
    address: Address,
    notifiers: HashMap<String, Notifier>,
}

impl Client {
    fn new(address: Address) -> Self {
        Self {
            address,
            notifiers: HashMap::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn subscription_count(&self) -> usize {
        self.notifiers.len()
    }

    pub fn notifier(&self, full_path: &str) -> Option<&Notifier> {
        self.notifiers.get(full_path)
    }

    pub fn notifiers(&self) -> impl Iterator<Item = &Notifier> {
        self.notifiers.values()
    }

    fn subscribe(
        &mut self,
        objects: &ObjectArena,
        path: &str,
        names: &[String],
        target: Option<ObjectId>,
    ) {
        for name in names {
            let full_path = format!("{}/{}", path, name);
            if self.notifiers.contains_key(&full_path) {
                debug!(target: "osc::subscription", "{} already subscribed to {}", self.address, full_path);
                continue;
            }
            let mut notifier = Notifier::new(path, name);
            let bound = target.is_some_and(|object| notifier.bind(objects, object));
            debug!(
                target: "osc::subscription",
                "{} subscribed to {} ({})",
                self.address,
                full_path,
                if bound { "connected" } else { "pending" }
            );
            self.notifiers.insert(full_path, notifier);
        }
    }

    fn unsubscribe(&mut self, path: &str, names: &[String]) {
        for name in names {
            let full_path = format!("{}/{}", path, name);
            if self.notifiers.remove(&full_path).is_some() {
                debug!(target: "osc::subscription", "{} unsubscribed from {}", self.address, full_path);
            } else {
                warn!(target: "osc::subscription", "{}: no subscription to remove for {}", self.address, full_path);
            }
        }
    }

    fn unsubscribe_all(&mut self, path: &str) {
        let before = self.notifiers.len();
        self.notifiers.retain(|_, n| n.base_path != path);
        let removed = before - self.notifiers.len();
        if removed == 0 {
            warn!(target: "osc::subscription", "{}: no subscriptions under {}", self.address, path);
        } else {
            debug!(target: "osc::subscription", "{} unsubscribed from {} path(s) under {}", self.address, removed, path);
        }
    }

    fn interface_added(&mut self, objects: &ObjectArena, interface: &Interface) {
        for notifier in self.notifiers.values_mut() {
            if notifier.base_path == interface.path && !notifier.is_bound() {
                notifier.bind(objects, interface.object);
            }
        }
    }

    fn detach_object(&mut self, object: ObjectId) {
        for notifier in self.notifiers.values_mut() {
            if notifier.binding.as_ref().map(Binding::object) == Some(object) {
                notifier.detach();
            }
        }
    }

    fn collect(&self, objects: &ObjectArena, event: &ObjectEvent, out: &mut Vec<Outbound>) {
        for notifier in self.notifiers.values() {
            if let Some(args) = notifier.payload(objects, event) {
                out.push(Outbound {
                    target: self.address.clone(),
                    path: notifier.full_path.clone(),
                    args,
                });
            }
        }
    }
}

/// All clients, keyed by remote address.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    clients: HashMap<Address, Client>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self, address: &Address) -> Option<&Client> {
        self.clients.get(address)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Subscribe `address` to `path/name` for each name, creating its client if
    /// needed. `target` is the object currently registered at `path`, if any.
    pub fn subscribe(
        &mut self,
        objects: &ObjectArena,
        address: &Address,
        path: &str,
        names: &[String],
        target: Option<ObjectId>,
    ) {
        let client = self.clients.entry(address.clone()).or_insert_with(|| {
            debug!(target: "osc::subscription", "new client {}", address);
            Client::new(address.clone())
        });
        client.subscribe(objects, path, names, target);
        self.remove_if_empty(address);
    }

    pub fn unsubscribe(&mut self, address: &Address, path: &str, names: &[String]) {
        let Some(client) = self.clients.get_mut(address) else {
            warn!(target: "osc::subscription", "'/unsubscribe' - no client registered: {}", address);
            return;
        };
        client.unsubscribe(path, names);
        self.remove_if_empty(address);
    }

    pub fn unsubscribe_all(&mut self, address: &Address, path: &str) {
        let Some(client) = self.clients.get_mut(address) else {
            warn!(target: "osc::subscription", "'/unsubscribeAll' - no client registered: {}", address);
            return;
        };
        client.unsubscribe_all(path);
        self.remove_if_empty(address);
    }

    /// Bind every pending notifier whose base path matches the new interface.
    pub fn interface_added(&mut self, objects: &ObjectArena, interface: &Interface) {
        for client in self.clients.values_mut() {
            client.interface_added(objects, interface);
        }
    }

    /// Detach every notifier bound to `object`. The notifiers stay subscribed.
    pub fn detach_object(&mut self, object: ObjectId) {
        for client in self.clients.values_mut() {
            client.detach_object(object);
        }
    }

    /// Turn an object event into the messages its subscribers should receive.
    ///
    /// A `Destroyed` event, or a change from an object that is no longer live,
    /// detaches the affected notifiers instead.
    pub fn route(&mut self, objects: &ObjectArena, event: &ObjectEvent) -> Vec<Outbound> {
        let mut out = Vec::new();
        if event.kind == ObjectEventKind::Destroyed || !objects.contains(event.source) {
            self.detach_object(event.source);
            return out;
        }
        for client in self.clients.values() {
            client.collect(objects, event, &mut out);
        }
        out
    }

    fn remove_if_empty(&mut self, address: &Address) {
        if self
            .clients
            .get(address)
            .is_some_and(|c| c.subscription_count() == 0)
        {
            self.clients.remove(address);
            debug!(target: "osc::subscription", "removed client {}", address);
        }
    }
}
