//! CloudLink against the recording hub: lifecycle, publish and the
//! receive/settle loop.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use levelwatch::cloud::hub::HubError;
use levelwatch::cloud::link::{CloudLink, ConnectionState, PublishOutcome, ReceiveExit};
use levelwatch::cloud::payload::{DeviceDescriptor, TelemetryRecord};
use levelwatch::config::DeviceProfile;
use levelwatch::error::{CommandError, ConnectFault, Error};
use levelwatch::shutdown::Shutdown;

use crate::mock_hw::{MockHub, wait_for};

fn link(hub: &MockHub) -> CloudLink<MockHub> {
    CloudLink::new(hub.clone(), "hub.example.net", "c2VjcmV0")
}

#[test]
fn publish_while_disconnected_does_no_io() {
    let hub = MockHub::new();
    let l = link(&hub);
    let d = DeviceDescriptor::new("LW-1", &DeviceProfile::default());

    assert_eq!(l.publish_descriptor(&d), Ok(PublishOutcome::NotConnected));
    assert_eq!(
        l.publish_telemetry(&TelemetryRecord::new("LW-1", 800.0, 1)),
        Ok(PublishOutcome::NotConnected)
    );
    assert_eq!(hub.connect_count(), 0);
    assert_eq!(hub.sent_count(), 0);
}

#[test]
fn connection_descriptor_carries_identity_and_credentials() {
    let hub = MockHub::new();
    let l = link(&hub);
    l.connect("LW-ABCDEF").unwrap();

    let log = hub.inner.log.lock().unwrap();
    let d = &log.connects[0];
    assert_eq!(
        d.connection_string(),
        "HostName=hub.example.net;DeviceId=LW-ABCDEF;SharedAccessKey=c2VjcmV0"
    );
}

#[test]
fn telemetry_wire_record() {
    let hub = MockHub::new();
    let l = link(&hub);
    l.connect("LW-1").unwrap();
    l.publish_telemetry(&TelemetryRecord::new("LW-1", 1010.0, 5)).unwrap();

    let sent = hub.sent_json();
    assert_eq!(sent, vec![serde_json::json!({"DeviceId": "LW-1", "Weight": 1010.0})]);
}

#[test]
fn failed_connect_then_retry() {
    let hub = MockHub::new();
    hub.fail_connects(1);
    let l = link(&hub);

    assert_eq!(l.connect("LW-1"), Err(Error::Connect(ConnectFault::Unreachable)));
    assert_eq!(l.state(), ConnectionState::Faulted);
    assert_eq!(
        l.publish_telemetry(&TelemetryRecord::new("LW-1", 1.0, 0)),
        Ok(PublishOutcome::NotConnected)
    );

    l.connect("LW-1").unwrap();
    assert_eq!(l.state(), ConnectionState::Connected);
    assert_eq!(hub.connect_count(), 2);
}

#[test]
fn only_one_connect_in_flight() {
    let hub = MockHub::new();
    hub.hold_connect();
    let l = Arc::new(link(&hub));

    let l2 = l.clone();
    let first = thread::spawn(move || l2.connect("LW-1"));
    assert!(wait_for(Duration::from_secs(2), || l.state() == ConnectionState::Connecting));

    assert_eq!(l.connect("LW-1"), Err(Error::Connect(ConnectFault::AttemptInFlight)));

    hub.release_connect();
    assert_eq!(first.join().unwrap(), Ok(()));
    assert_eq!(l.state(), ConnectionState::Connected);
    assert_eq!(hub.connect_count(), 1);
}

#[test]
fn disconnect_during_handshake_cancels() {
    let hub = MockHub::new();
    hub.hold_connect();
    let l = Arc::new(link(&hub));

    let l2 = l.clone();
    let first = thread::spawn(move || l2.connect("LW-1"));
    assert!(wait_for(Duration::from_secs(2), || l.state() == ConnectionState::Connecting));
    l.disconnect();
    hub.release_connect();

    assert_eq!(first.join().unwrap(), Err(Error::Connect(ConnectFault::Cancelled)));
    assert_eq!(l.state(), ConnectionState::Disconnected);
    assert_eq!(hub.closes(), 1);
}

#[test]
fn malformed_command_does_not_end_the_loop() {
    let hub = MockHub::new();
    let l = link(&hub);
    l.connect("LW-1").unwrap();

    let bad = hub.push(b"\x00\x01 not json");
    let wrong_shape = hub.push(br#"{"Name":["LevelCommand"]}"#);
    let good = hub.push(br#"{"Name":"LevelCommand","Parameters":{"Level":"Critical"}}"#);
    hub.push_failure(HubError::Transport);

    let shutdown = Shutdown::new();
    let mut levels = Vec::new();
    let exit = l.receive_loop(&shutdown, |cmd| {
        levels.push(cmd.parameter("Level").map(str::to_string));
        Ok(())
    });

    assert!(matches!(exit, ReceiveExit::Dropped(_)));
    assert_eq!(levels, vec![Some("Critical".to_string())]);
    assert_eq!(hub.rejected(), vec![bad, wrong_shape]);
    assert_eq!(hub.acked(), vec![good]);
    assert_eq!(l.state(), ConnectionState::Faulted);
    let stats = l.stats();
    assert_eq!((stats.acknowledged, stats.rejected), (1, 2));
}

#[test]
fn every_delivery_is_settled_exactly_once() {
    let hub = MockHub::new();
    let l = link(&hub);
    l.connect("LW-1").unwrap();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            if i % 2 == 0 {
                hub.push(br#"{"Name":"LevelCommand"}"#)
            } else {
                hub.push(br#"{"Name":"Noop"}"#)
            }
        })
        .collect();
    hub.push_failure(HubError::Closed);

    let shutdown = Shutdown::new();
    l.receive_loop(&shutdown, |cmd| {
        if cmd.name == "LevelCommand" && cmd.parameter("Level").is_none() {
            Err(CommandError::MissingParameter("Level").into())
        } else {
            Ok(())
        }
    });

    let mut settled = hub.acked();
    settled.extend(hub.rejected());
    settled.sort_by_key(|h| h.0);
    assert_eq!(settled, handles);
    assert_eq!(hub.rejected().len(), 3);
}

#[test]
fn shutdown_interrupts_a_blocked_receive() {
    let hub = MockHub::new();
    let l = Arc::new(link(&hub));
    l.connect("LW-1").unwrap();
    let shutdown = Arc::new(Shutdown::new());

    let (l2, s2) = (l.clone(), shutdown.clone());
    let t = thread::spawn(move || l2.receive_loop(&s2, |_| Ok(())));
    thread::sleep(Duration::from_millis(30));

    shutdown.trigger();
    l.disconnect();
    assert_eq!(t.join().unwrap(), ReceiveExit::Shutdown);
    assert_eq!(hub.closes(), 1);
}
