//! OSC server façade.
//!
//! Owns the UDP socket, the listener thread, the dispatch table and the
//! subscription manager. All state changes happen in [`OscServer::process`]
//! (and the interface methods), which the application calls from its single
//! processing context.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info, warn};

use quickcollider_types::{Address, ObjectId, Value};

use crate::dispatcher::{Dispatcher, DEFAULT_MAX_INVOKE_ARGS};
use crate::object::{ObjectArena, ObjectEventKind, OscObject};
use crate::protocol::Command;
use crate::registry::{DispatchNode, DispatchTable, Interface};
use crate::subscription::{Client, Outbound, SubscriptionManager};
use crate::transport::{self, InboundMessage, Listener};

/// Tunables for an [`OscServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long the listener blocks in one receive before checking for `stop()`.
    pub recv_timeout: Duration,
    pub max_invoke_args: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(50),
            max_invoke_args: DEFAULT_MAX_INVOKE_ARGS,
        }
    }
}

/// Server errors that reach the caller.
#[derive(Debug)]
pub enum OscError {
    /// The listening socket could not be bound. Fatal for the application.
    Bind { addr: String, source: io::Error },
    Io(io::Error),
}

impl fmt::Display for OscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "cannot bind OSC port {}: {}", addr, source),
            Self::Io(e) => write!(f, "OSC I/O error: {}", e),
        }
    }
}

impl std::error::Error for OscError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for OscError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub struct OscServer {
    socket: UdpSocket,
    listener: Listener,
    inbound_rx: Receiver<InboundMessage>,
    table: DispatchTable,
    dispatcher: Dispatcher,
    subscriptions: SubscriptionManager,
}

impl OscServer {
    /// Bind the server socket. The listener is not started until [`OscServer::start`].
    pub fn bind<A: ToSocketAddrs + fmt::Display>(addr: A, config: ServerConfig) -> Result<Self, OscError> {
        let socket = UdpSocket::bind(&addr).map_err(|source| OscError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let listener = Listener::new(socket.try_clone()?, inbound_tx, config.recv_timeout);

        info!(target: "osc::server", "OSC server bound to {}", socket.local_addr()?);

        Ok(Self {
            socket,
            listener,
            inbound_rx,
            table: DispatchTable::new(),
            dispatcher: Dispatcher::new(config.max_invoke_args),
            subscriptions: SubscriptionManager::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn port(&self) -> Option<u16> {
        self.local_addr().ok().map(|a| a.port())
    }

    /// Start receiving. Calling it while running does nothing.
    pub fn start(&mut self) {
        match self.listener.start() {
            Ok(()) => info!(target: "osc::server", "OSC server started"),
            Err(e) => warn!(target: "osc::server", "failed to start: {}", e),
        }
    }

    /// Stop receiving. Messages already queued are still handled by `process`.
    pub fn stop(&mut self) {
        if !self.listener.is_running() {
            return;
        }
        match self.listener.stop() {
            Ok(()) => info!(target: "osc::server", "OSC server stopped"),
            Err(e) => warn!(target: "osc::server", "failed to stop: {}", e),
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_running()
    }

    /// Announce `object` for dispatch at `path`.
    ///
    /// Pending subscriptions for `path` bind to it immediately. If another object
    /// already serves `path`, this one waits and takes over when that one is removed.
    pub fn add_interface(&mut self, objects: &ObjectArena, object: ObjectId, path: &str) -> bool {
        let Some(interface) = self.table.register(objects, object, path) else {
            return false;
        };
        info!(target: "osc::server", "added object {}", interface.path);
        if self.table.is_answering(object) {
            self.subscriptions.interface_added(objects, &interface);
        }
        true
    }

    /// Withdraw `object`. Safe to call for objects that are not registered.
    pub fn remove_interface(&mut self, objects: &ObjectArena, object: ObjectId) {
        self.subscriptions.detach_object(object);
        let was_answering = self.table.is_answering(object);
        let Some(interface) = self.table.unregister(objects, object) else {
            return;
        };
        info!(target: "osc::server", "removed object {}", interface.path);
        if !was_answering {
            return;
        }
        // a waiting object takes over the path
        if let Some(next) = self.table.interface_at(&interface.path).cloned() {
            self.subscriptions.interface_added(objects, &next);
        }
    }

    /// Tear down everything that refers to `object`, then drop it from the arena.
    pub fn destroy_object(
        &mut self,
        objects: &mut ObjectArena,
        object: ObjectId,
    ) -> Option<Box<dyn OscObject>> {
        self.remove_interface(objects, object);
        objects.remove(object)
    }

    /// Handle every queued inbound message, forwarding the notifications each
    /// one triggers. Returns the number of messages handled.
    pub fn process(&mut self, objects: &mut ObjectArena) -> usize {
        let mut handled = 0;
        self.flush_events(objects);
        loop {
            match self.inbound_rx.try_recv() {
                Ok(message) => {
                    self.handle_message(objects, message);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Route one inbound message.
    pub fn handle_message(&mut self, objects: &mut ObjectArena, message: InboundMessage) {
        let InboundMessage { path, args, source } = message;
        match Command::parse(&path, args) {
            Ok(command) => self.execute(objects, command, &source),
            Err(e) => warn!(target: "osc::server", "{} (from {})", e, source),
        }
        self.flush_events(objects);
    }

    fn execute(&mut self, objects: &mut ObjectArena, command: Command, source: &Address) {
        match command {
            Command::Set { path, args } => {
                if let Err(e) = self.dispatcher.set(&self.table, objects, &path, &args) {
                    warn!(target: "osc::dispatch", "{}", e);
                }
            }
            Command::Invoke { path, args } => {
                if let Err(e) = self.dispatcher.invoke(&self.table, objects, &path, &args) {
                    warn!(target: "osc::dispatch", "{}", e);
                }
            }
            Command::Subscribe { path, names } => {
                let target = self.table.interface_at(&path).map(|i| i.object);
                self.subscriptions
                    .subscribe(objects, source, &path, &names, target);
            }
            Command::Unsubscribe { path, names } => {
                self.subscriptions.unsubscribe(source, &path, &names);
            }
            Command::UnsubscribeAll { path } => {
                self.subscriptions.unsubscribe_all(source, &path);
            }
        }
    }

    /// Forward queued object events to subscribers. Returns the number of
    /// messages sent.
    ///
    /// Call this after changing objects outside of `process`.
    pub fn flush_events(&mut self, objects: &mut ObjectArena) -> usize {
        let mut sent = 0;
        while objects.has_pending_events() {
            for event in objects.take_events() {
                if event.kind == ObjectEventKind::Destroyed {
                    self.remove_interface(objects, event.source);
                    continue;
                }
                for outbound in self.subscriptions.route(objects, &event) {
                    if self.deliver(&outbound) {
                        sent += 1;
                    }
                }
            }
        }
        sent
    }

    /// Send an OSC message from the server socket.
    pub fn send(&self, target: &Address, path: &str, args: &[Value]) -> io::Result<()> {
        transport::send_message(&self.socket, target, path, args)
    }

    fn deliver(&self, outbound: &Outbound) -> bool {
        match self.send(&outbound.target, &outbound.path, &outbound.args) {
            Ok(()) => {
                debug!(target: "osc::server", "sent {} to {}", outbound.path, outbound.target);
                true
            }
            Err(e) => {
                warn!(target: "osc::server", "failed to send {} to {}: {}", outbound.path, outbound.target, e);
                false
            }
        }
    }

    pub fn interfaces(&self) -> &[Interface] {
        self.table.interfaces()
    }

    pub fn resolve(&self, path: &str) -> Option<&DispatchNode> {
        self.table.resolve(path)
    }

    pub fn client(&self, address: &Address) -> Option<&Client> {
        self.subscriptions.client(address)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.subscriptions.clients()
    }

    pub fn client_count(&self) -> usize {
        self.subscriptions.client_count()
    }

    pub fn subscription_count(&self, address: &Address) -> usize {
        self.client(address).map_or(0, Client::subscription_count)
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.stop();
    }
}
