//! Processing loop: owns the object arena and the one OSC server of the process.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};

use quickcollider_osc::{Address, ObjectArena, ObjectId, OscError, OscServer};

use crate::config::Config;
use crate::scene::SceneEntry;

/// Set while a `Runtime` exists.
static CONSTRUCTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub enum RuntimeError {
    AlreadyConstructed,
    Osc(OscError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConstructed => f.write_str("OSC runtime already constructed"),
            Self::Osc(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AlreadyConstructed => None,
            Self::Osc(e) => Some(e),
        }
    }
}

impl From<OscError> for RuntimeError {
    fn from(e: OscError) -> Self {
        Self::Osc(e)
    }
}

pub struct Runtime {
    server: OscServer,
    objects: ObjectArena,
    poll_interval: Duration,
}

impl Runtime {
    /// Bind the OSC server on `port` and start listening.
    pub fn new(port: u16, config: &Config) -> Result<Self, RuntimeError> {
        if CONSTRUCTED.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyConstructed);
        }
        let addr = Address::new(config.host(), port).to_string();
        let mut server = match OscServer::bind(addr, config.server_config()) {
            Ok(server) => server,
            Err(e) => {
                CONSTRUCTED.store(false, Ordering::Release);
                return Err(e.into());
            }
        };
        server.start();
        Ok(Self {
            server,
            objects: ObjectArena::new(),
            poll_interval: config.poll_interval(),
        })
    }

    /// Add every scene object to the arena and announce it at its path.
    pub fn load_scene(&mut self, scene: Vec<SceneEntry>) -> Vec<ObjectId> {
        let mut ids = Vec::with_capacity(scene.len());
        for entry in scene {
            let id = self.objects.insert(Box::new(entry.object));
            if self.server.add_interface(&self.objects, id, &entry.path) {
                ids.push(id);
            } else {
                warn!(target: "runtime", "dropping object at {}", entry.path);
                self.objects.remove(id);
            }
        }
        self.server.flush_events(&mut self.objects);
        info!(target: "runtime", "{} object(s) registered", ids.len());
        ids
    }

    /// One processing pass. Returns the number of inbound messages handled.
    pub fn tick(&mut self) -> usize {
        self.server.process(&mut self.objects)
    }

    /// Process messages until the process is killed.
    pub fn run(&mut self) {
        if let Ok(addr) = self.server.local_addr() {
            info!(target: "runtime", "listening for OSC on {}", addr);
        }
        loop {
            self.tick();
            std::thread::sleep(self.poll_interval);
        }
    }

    pub fn server(&self) -> &OscServer {
        &self.server
    }

    pub fn objects(&self) -> &ObjectArena {
        &self.objects
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.server.stop();
        CONSTRUCTED.store(false, Ordering::Release);
    }
}
