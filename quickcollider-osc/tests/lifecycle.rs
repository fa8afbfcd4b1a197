mod common;

use std::time::Duration;

use common::{drive_messages, start_server, Oscillator, Peer};
use quickcollider_osc::{ObjectArena, Value};

const TIMEOUT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

#[test]
fn test_destroyed_object_leaves_no_live_notifier() {
    let mut server = start_server();
    let mut objects = ObjectArena::new();
    let osc = objects.insert(Oscillator::boxed());
    server.add_interface(&objects, osc, "/osc1");

    let alice = Peer::connect(&server);
    alice.send("/subscribe", &[Value::from("/osc1"), Value::from("freq")]);
    drive_messages(&mut server, &mut objects, 1, TIMEOUT);

    assert!(server.destroy_object(&mut objects, osc).is_some());
    assert!(!objects.contains(osc));
    assert!(server.resolve("/osc1/freq").is_none());

    let client = server.client(&alice.address()).unwrap();
    let notifier = client.notifier("/osc1/freq").unwrap();
    assert!(!notifier.is_bound());

    // Stale writes are refused
    assert!(!objects.write(osc, "freq", Value::Int(1)));
    alice.send("/set/osc1/freq", &[Value::Int(1)]);
    drive_messages(&mut server, &mut objects, 1, TIMEOUT);
    alice.expect_silence(QUIET);
}

#[test]
fn test_replacement_object_rebinds_existing_subscription() {
    let mut server = start_server();
    let mut objects = ObjectArena::new();
    let first = objects.insert(Oscillator::boxed());
    server.add_interface(&objects, first, "/osc1");

    let alice = Peer::connect(&server);
    alice.send("/subscribe", &[Value::from("/osc1"), Value::from("freq")]);
    drive_messages(&mut server, &mut objects, 1, TIMEOUT);

    // Removed straight from the arena; the server cleans up on the next flush
    objects.remove(first);
    server.flush_events(&mut objects);
    assert!(server.interfaces().is_empty());

    let second = objects.insert(Oscillator::boxed());
    assert_ne!(first, second);
    server.add_interface(&objects, second, "/osc1");

    objects.write(second, "freq", Value::Int(600));
    assert_eq!(server.flush_events(&mut objects), 1);
    assert_eq!(
        alice.recv(TIMEOUT),
        Some(("/osc1/freq".to_string(), vec![Value::Int(600)]))
    );
}

#[test]
fn test_remove_interface_keeps_object_alive() {
    let mut server = start_server();
    let mut objects = ObjectArena::new();
    let osc = objects.insert(Oscillator::boxed());
    server.add_interface(&objects, osc, "/osc1");
    server.remove_interface(&objects, osc);
    server.remove_interface(&objects, osc);

    assert!(objects.contains(osc));
    assert!(server.interfaces().is_empty());

    let peer = Peer::connect(&server);
    peer.send("/set/osc1/freq", &[Value::Int(999)]);
    drive_messages(&mut server, &mut objects, 1, TIMEOUT);
    assert_eq!(objects.read(osc, "freq"), Some(Value::Int(440)));
}

#[test]
fn test_stopped_server_keeps_queued_messages() {
    let mut server = start_server();
    let mut objects = ObjectArena::new();
    let osc = objects.insert(Oscillator::boxed());
    server.add_interface(&objects, osc, "/osc1");

    let peer = Peer::connect(&server);
    peer.send("/set/osc1/freq", &[Value::Int(700)]);
    // let the listener queue it before stopping
    std::thread::sleep(Duration::from_millis(200));
    server.stop();
    assert!(!server.is_running());

    assert_eq!(server.process(&mut objects), 1);
    assert_eq!(objects.read(osc, "freq"), Some(Value::Int(700)));

    // Nothing is received while stopped
    peer.send("/set/osc1/freq", &[Value::Int(800)]);
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(server.process(&mut objects), 0);

    // Restarting picks up the datagram that waited in the socket buffer
    server.start();
    drive_messages(&mut server, &mut objects, 1, TIMEOUT);
    assert_eq!(objects.read(osc, "freq"), Some(Value::Int(800)));
}
