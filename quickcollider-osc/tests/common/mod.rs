#![allow(dead_code)]
//! Test harness utilities for quickcollider-osc integration tests.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use quickcollider_osc::transport::{decode_datagram, encode_message};
use quickcollider_osc::{
    Address, AttributeInfo, Emitter, EventInfo, ObjectArena, OperationInfo, OscObject, OscServer,
    ServerConfig, Value, ValueType,
};

/// Oscillator with a notifying `freq`, a silent `shape`, and a `trigger` operation
/// that emits `triggered(velocity, note)`.
#[derive(Debug)]
pub struct Oscillator {
    pub freq: i32,
    pub gain: f32,
    pub shape: String,
}

impl Oscillator {
    pub fn boxed() -> Box<dyn OscObject> {
        Box::new(Oscillator {
            freq: 440,
            gain: 1.0,
            shape: "sine".into(),
        })
    }
}

impl OscObject for Oscillator {
    fn attributes(&self) -> Vec<AttributeInfo> {
        vec![
            AttributeInfo::new("freq", ValueType::Int),
            AttributeInfo::new("gain", ValueType::Float),
            AttributeInfo::new("shape", ValueType::String).without_notify(),
        ]
    }

    fn operations(&self) -> Vec<OperationInfo> {
        vec![OperationInfo::new("reset", 0), OperationInfo::new("trigger", 2)]
    }

    fn events(&self) -> Vec<EventInfo> {
        vec![EventInfo::new("triggered", 2)]
    }

    fn read(&self, name: &str) -> Option<Value> {
        match name {
            "freq" => Some(Value::Int(self.freq)),
            "gain" => Some(Value::Float(self.gain)),
            "shape" => Some(Value::String(self.shape.clone())),
            _ => None,
        }
    }

    fn write(&mut self, name: &str, value: Value, emitter: &mut Emitter) -> bool {
        match (name, value) {
            ("freq", Value::Int(v)) => {
                if self.freq != v {
                    self.freq = v;
                    emitter.changed("freq");
                }
                true
            }
            ("gain", Value::Float(v)) => {
                if self.gain != v {
                    self.gain = v;
                    emitter.changed("gain");
                }
                true
            }
            ("shape", Value::String(s)) => {
                self.shape = s;
                true
            }
            _ => false,
        }
    }

    fn invoke(&mut self, name: &str, args: &[Option<Value>], emitter: &mut Emitter) -> bool {
        match name {
            "reset" => {
                if self.freq != 440 {
                    self.freq = 440;
                    emitter.changed("freq");
                }
                true
            }
            "trigger" => {
                let payload = args
                    .iter()
                    .map(|a| a.clone().unwrap_or(Value::Int(0)))
                    .collect();
                emitter.signal("triggered", payload);
                true
            }
            _ => false,
        }
    }
}

/// Bind a started server on an ephemeral loopback port.
pub fn start_server() -> OscServer {
    let mut server = OscServer::bind("127.0.0.1:0", ServerConfig::default()).unwrap();
    server.start();
    server
}

/// A plain UDP peer talking to the server.
pub struct Peer {
    socket: UdpSocket,
    server: SocketAddr,
}

impl Peer {
    pub fn connect(server: &OscServer) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        Self {
            socket,
            server: server.local_addr().unwrap(),
        }
    }

    pub fn address(&self) -> Address {
        Address::from(self.socket.local_addr().unwrap())
    }

    pub fn send(&self, path: &str, args: &[Value]) {
        let bytes = encode_message(path, args).unwrap();
        self.socket.send_to(&bytes, self.server).unwrap();
    }

    pub fn send_raw(&self, bytes: &[u8]) {
        self.socket.send_to(bytes, self.server).unwrap();
    }

    /// Receive one message, or `None` on timeout.
    pub fn recv(&self, timeout: Duration) -> Option<(String, Vec<Value>)> {
        self.socket.set_read_timeout(Some(timeout)).unwrap();
        let mut buf = vec![0u8; 65_536];
        let (n, from) = self.socket.recv_from(&mut buf).ok()?;
        let mut messages = decode_datagram(&buf[..n], &Address::from(from)).unwrap();
        assert_eq!(messages.len(), 1, "server sends single messages");
        let msg = messages.remove(0);
        Some((msg.path, msg.args))
    }

    /// Assert nothing arrives within `timeout`.
    pub fn expect_silence(&self, timeout: Duration) {
        if let Some((path, args)) = self.recv(timeout) {
            panic!("Expected no message, got {} {:?}", path, args);
        }
    }
}

/// Drive `process` until `done` holds, or panic after `timeout`.
pub fn drive_until<F>(server: &mut OscServer, objects: &mut ObjectArena, timeout: Duration, mut done: F)
where
    F: FnMut(&OscServer, &ObjectArena) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        server.process(objects);
        if done(server, objects) {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("Timed out driving server");
}

/// Drive `process` until at least `count` messages were handled.
pub fn drive_messages(server: &mut OscServer, objects: &mut ObjectArena, count: usize, timeout: Duration) {
    let start = Instant::now();
    let mut handled = 0;
    while start.elapsed() < timeout {
        handled += server.process(objects);
        if handled >= count {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("Timed out waiting for {} messages (handled {})", count, handled);
}
