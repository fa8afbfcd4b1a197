//! UDP transport: datagram decoding on a listener thread, and message encoding.
//!
//! The listener never touches server state. Each decoded message is posted as
//! one [`InboundMessage`] to a channel drained by the processing context.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, error, warn};
use rosc::{OscMessage, OscPacket, OscType};

use quickcollider_types::{Address, Value};

/// Largest UDP payload we accept.
const RECV_BUFFER_SIZE: usize = 65_536;

/// A decoded message together with the peer that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub path: String,
    pub args: Vec<Value>,
    pub source: Address,
}

/// Decode one datagram into messages, flattening bundles in order.
pub fn decode_datagram(bytes: &[u8], source: &Address) -> Result<Vec<InboundMessage>, rosc::OscError> {
    let (_, packet) = rosc::decoder::decode_udp(bytes)?;
    let mut messages = Vec::new();
    collect_messages(packet, source, &mut messages);
    Ok(messages)
}

fn collect_messages(packet: OscPacket, source: &Address, out: &mut Vec<InboundMessage>) {
    match packet {
        OscPacket::Message(msg) => {
            let args = msg
                .args
                .into_iter()
                .filter_map(|arg| arg_to_value(&msg.addr, arg))
                .collect();
            out.push(InboundMessage {
                path: msg.addr,
                args,
                source: source.clone(),
            });
        }
        OscPacket::Bundle(bundle) => {
            for p in bundle.content {
                collect_messages(p, source, out);
            }
        }
    }
}

/// Convert a wire argument. Only int32, float32 and string are understood;
/// anything else is dropped with a warning.
fn arg_to_value(path: &str, arg: OscType) -> Option<Value> {
    match arg {
        OscType::Int(v) => Some(Value::Int(v)),
        OscType::Float(v) => Some(Value::Float(v)),
        OscType::String(s) => Some(Value::String(s)),
        other => {
            warn!(
                target: "osc::transport",
                "{}: argument {:?} not converted",
                path, other
            );
            None
        }
    }
}

fn value_to_arg(value: &Value) -> OscType {
    match value {
        Value::Int(v) => OscType::Int(*v),
        Value::Float(v) => OscType::Float(*v),
        Value::Double(v) => OscType::Double(*v),
        Value::String(s) => OscType::String(s.clone()),
    }
}

/// Encode a single OSC message.
pub fn encode_message(path: &str, args: &[Value]) -> io::Result<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: path.to_string(),
        args: args.iter().map(value_to_arg).collect(),
    });
    rosc::encoder::encode(&packet)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Send an OSC message from `socket` to `target`.
pub fn send_message(
    socket: &UdpSocket,
    target: &Address,
    path: &str,
    args: &[Value],
) -> io::Result<()> {
    let buf = encode_message(path, args)?;
    socket.send_to(&buf, (target.host(), target.port()))?;
    Ok(())
}

/// Background receive loop over a UDP socket.
///
/// The thread polls with a short read timeout so `stop()` can end it promptly.
pub struct Listener {
    socket: UdpSocket,
    tx: Sender<InboundMessage>,
    recv_timeout: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn new(socket: UdpSocket, tx: Sender<InboundMessage>, recv_timeout: Duration) -> Self {
        Self {
            socket,
            tx,
            recv_timeout,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Whether the receive thread is alive. False after it exited on a socket error.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the receive thread. Does nothing if it is already running; a thread
    /// that exited on its own is reaped and replaced.
    pub fn start(&mut self) -> io::Result<()> {
        if self.is_running() {
            debug!(target: "osc::transport", "listener already running");
            return Ok(());
        }
        if let Some(finished) = self.handle.take() {
            warn!(target: "osc::transport", "listener had exited, restarting");
            let _ = finished.join();
        }
        let socket = self.socket.try_clone()?;
        socket.set_read_timeout(Some(self.recv_timeout))?;
        let tx = self.tx.clone();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        match thread::Builder::new()
            .name("osc-listener".into())
            .spawn(move || listen_loop(socket, tx, running))
        {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Stop the receive thread and wait for it. Does nothing if it is not running.
    pub fn stop(&mut self) -> io::Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);
        handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "listener thread panicked"))
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn listen_loop(socket: UdpSocket, tx: Sender<InboundMessage>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let source = Address::from(from);
                match decode_datagram(&buf[..n], &source) {
                    Ok(messages) => {
                        for message in messages {
                            if tx.send(message).is_err() {
                                debug!(target: "osc::transport", "inbound queue closed");
                                running.store(false, Ordering::Release);
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(target: "osc::transport", "undecodable packet from {}: {:?}", source, e);
                    }
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                continue
            }
            Err(e) => {
                error!(target: "osc::transport", "receive failed, listener exiting: {}", e);
                break;
            }
        }
    }
    running.store(false, Ordering::Release);
    debug!(target: "osc::transport", "listener thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};

    fn source() -> Address {
        Address::new("127.0.0.1", 9000)
    }

    fn encode(packet: &OscPacket) -> Vec<u8> {
        rosc::encoder::encode(packet).unwrap()
    }

    #[test]
    fn decodes_supported_types() {
        let bytes = encode(&OscPacket::Message(OscMessage {
            addr: "/set/osc1/freq".into(),
            args: vec![
                OscType::Int(880),
                OscType::Float(0.5),
                OscType::String("hi".into()),
            ],
        }));
        let msgs = decode_datagram(&bytes, &source()).unwrap();
        assert_eq!(
            msgs,
            vec![InboundMessage {
                path: "/set/osc1/freq".into(),
                args: vec![Value::Int(880), Value::Float(0.5), Value::from("hi")],
                source: source(),
            }]
        );
    }

    #[test]
    fn unsupported_argument_is_dropped_not_fatal() {
        let bytes = encode(&OscPacket::Message(OscMessage {
            addr: "/invoke/osc1/reset".into(),
            args: vec![
                OscType::Int(1),
                OscType::Blob(vec![1, 2, 3]),
                OscType::Double(2.0),
                OscType::String("after".into()),
            ],
        }));
        let msgs = decode_datagram(&bytes, &source()).unwrap();
        assert_eq!(msgs[0].args, vec![Value::Int(1), Value::from("after")]);
    }

    #[test]
    fn bundles_are_flattened_in_order() {
        let message = |addr: &str| {
            OscPacket::Message(OscMessage {
                addr: addr.into(),
                args: vec![],
            })
        };
        let inner = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![message("/b"), message("/c")],
        });
        let outer = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![message("/a"), inner, message("/d")],
        });
        let paths: Vec<String> = decode_datagram(&encode(&outer), &source())
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(paths, vec!["/a", "/b", "/c", "/d"]);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_datagram(b"not osc", &source()).is_err());
    }

    #[test]
    fn encodes_doubles() {
        let bytes = encode_message(
            "/osc1/freq",
            &[Value::Double(1.5), Value::Int(2), Value::Float(0.25), Value::from("x")],
        )
        .unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&bytes).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/osc1/freq");
                assert_eq!(
                    msg.args,
                    vec![
                        OscType::Double(1.5),
                        OscType::Int(2),
                        OscType::Float(0.25),
                        OscType::String("x".into())
                    ]
                );
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn listener_posts_messages_and_stops() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut listener = Listener::new(socket, tx, Duration::from_millis(20));
        listener.start().unwrap();
        listener.start().unwrap();
        assert!(listener.is_running());

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let bytes = encode_message("/ping", &[Value::Int(1)]).unwrap();
        peer.send_to(&bytes, addr).unwrap();

        let msg = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg.path, "/ping");
        assert_eq!(msg.source, Address::from(peer.local_addr().unwrap()));

        listener.stop().unwrap();
        listener.stop().unwrap();
        assert!(!listener.is_running());
    }

    #[test]
    fn exited_listener_reports_stopped_and_restarts() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut listener = Listener::new(socket, tx, Duration::from_millis(20));
        listener.start().unwrap();

        // With the receiving side gone the thread exits on the next message
        drop(rx);
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let bytes = encode_message("/ping", &[]).unwrap();
        peer.send_to(&bytes, addr).unwrap();

        let start = std::time::Instant::now();
        while listener.is_running() {
            assert!(start.elapsed() < Duration::from_secs(2), "listener never exited");
            thread::sleep(Duration::from_millis(10));
        }

        listener.start().unwrap();
        assert!(listener.is_running());
        listener.stop().unwrap();
        assert!(!listener.is_running());
    }
}
