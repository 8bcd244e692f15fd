//! Integration tests for command correlation, inbound dispatch and the
//! failure paths of the RPC engine.

use std::cell::{Cell, RefCell};
use std::pin::pin;
use std::rc::Rc;

use futures_lite::future::{block_on, poll_once};
use serde_json::{Value, json};
use simlink::{ClientConfig, ClientError, ListenOptions, TransportError};

use crate::mock_transport::{engine, engine_with, unreachable_transport};

fn error_log(engine: &simlink::RpcEngine<crate::mock_transport::MockTransport>) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    engine.set_on_error(move |e| sink.borrow_mut().push(e.message.clone()));
    log
}

// ── Correlation ───────────────────────────────────────────────

#[test]
fn out_of_order_responses_settle_their_own_commands() {
    let (engine, remote) = engine();
    let a = engine.send_command("a", json!({}));
    let b = engine.send_command("b", json!({}));
    let c = engine.send_command("c", json!({}));

    let ids: Vec<String> = remote.commands().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, ["0", "1", "2"]);

    remote.respond("2", json!("C"));
    remote.respond("0", json!("A"));
    remote.respond("1", json!("B"));

    assert_eq!(block_on(a), Ok(json!("A")));
    assert_eq!(block_on(b), Ok(json!("B")));
    assert_eq!(block_on(c), Ok(json!("C")));
    assert_eq!(engine.pending_commands(), 0);
}

#[test]
fn command_stays_pending_until_its_response() {
    let (engine, remote) = engine();
    let mut status = pin!(engine.sim_status());
    assert!(block_on(poll_once(status.as_mut())).is_none());

    remote.respond("0", json!({"running": false}));
    assert_eq!(block_on(status), Ok(json!({"running": false})));
}

#[test]
fn command_wire_shape() {
    let (engine, remote) = engine();
    let _pending = engine.control_set("pot1", "position", 0.5);
    let sent = remote.last_command();
    assert_eq!(sent.id, "0");
    assert_eq!(sent.command, "control:set");
    assert_eq!(sent.params, json!({"part": "pot1", "control": "position", "value": 0.5}));
}

#[test]
fn remote_error_rejects_only_its_command() {
    let (engine, remote) = engine();
    let failing = engine.pin_read("led1", "A");
    let other = engine.sim_status();

    remote.respond_error("0", json!({"code": -32601, "message": "Unknown part"}));
    let err = block_on(failing).unwrap_err();
    assert_eq!(
        err,
        ClientError::Remote {
            code: -32601,
            message: "Unknown part".into()
        }
    );
    assert_eq!(err.to_string(), "Error -32601: Unknown part");
    assert_eq!(engine.pending_commands(), 1);

    remote.respond("1", Value::Null);
    assert_eq!(block_on(other), Ok(Value::Null));
}

#[test]
fn unknown_response_id_is_dropped() {
    let (engine, remote) = engine();
    let _pending = engine.sim_status();
    remote.respond("99", json!("stray"));
    remote.respond("not-a-number", json!("stray"));
    assert_eq!(engine.pending_commands(), 1);
}

#[test]
fn refused_send_settles_at_once() {
    let (engine, remote) = engine();
    remote.fail_sends(TransportError::QueueFull);
    let cmd = engine.sim_pause();
    assert_eq!(block_on(cmd), Err(ClientError::Transport(TransportError::QueueFull)));
    assert_eq!(engine.pending_commands(), 0);
}

// ── Uncorrelated errors ───────────────────────────────────────

#[test]
fn api_error_rejects_the_oldest_pending_command() {
    let (engine, remote) = engine();
    let log = error_log(&engine);
    let first = engine.send_command("first", Value::Null);
    let mut second = pin!(engine.send_command("second", Value::Null));

    remote.error("firmware crashed");

    assert_eq!(block_on(first), Err(ClientError::Api("firmware crashed".into())));
    assert!(block_on(poll_once(second.as_mut())).is_none());
    assert_eq!(engine.pending_commands(), 1);
    assert_eq!(*log.borrow(), ["firmware crashed"]);

    remote.respond("1", json!(1));
    assert_eq!(block_on(second), Ok(json!(1)));
}

#[test]
fn api_error_with_nothing_pending_only_reports() {
    let (engine, remote) = engine();
    let log = error_log(&engine);
    remote.error("spurious");
    assert_eq!(*log.borrow(), ["spurious"]);
}

// ── Hello ─────────────────────────────────────────────────────

#[test]
fn hello_records_version_and_notifies() {
    let (engine, remote) = engine();
    let seen = Rc::new(Cell::new(0));
    let s = Rc::clone(&seen);
    engine.set_on_connected(move |v| s.set(v));

    assert_eq!(engine.remote_version(), None);
    remote.hello(1);
    assert_eq!(engine.remote_version(), Some(1));
    assert_eq!(seen.get(), 1);
}

#[test]
fn hello_version_mismatch_is_not_fatal() {
    let (engine, remote) = engine();
    let seen = Rc::new(Cell::new(0));
    let s = Rc::clone(&seen);
    engine.set_on_connected(move |v| s.set(v));

    remote.hello(7);
    assert_eq!(engine.remote_version(), Some(7));
    assert_eq!(seen.get(), 7);

    let cmd = engine.sim_status();
    remote.respond("0", json!("ok"));
    assert_eq!(block_on(cmd), Ok(json!("ok")));
}

// ── Events ────────────────────────────────────────────────────

#[test]
fn listeners_receive_events_in_delivery_order() {
    let (engine, remote) = engine();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let sub = engine.listen(
        "serial-monitor:data",
        move |e| s.borrow_mut().push((e.payload.clone(), e.nanos)),
        ListenOptions::default(),
    );

    remote.event("serial-monitor:data", json!({"bytes": [72]}), 10);
    remote.event("chip:log", json!({}), 15);
    remote.event("serial-monitor:data", json!({"bytes": [105]}), 20);
    assert_eq!(
        *seen.borrow(),
        [(json!({"bytes": [72]}), 10), (json!({"bytes": [105]}), 20)]
    );
    assert_eq!(engine.last_nanos(), 20);

    assert!(sub.unsubscribe());
    remote.event("serial-monitor:data", json!({"bytes": [33]}), 30);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn once_listener_fires_a_single_time() {
    let (engine, remote) = engine();
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    let _sub = engine.listen("tick", move |_| c.set(c.get() + 1), ListenOptions::ONCE);

    remote.event("tick", Value::Null, 1);
    remote.event("tick", Value::Null, 2);
    assert_eq!(count.get(), 1);
}

#[test]
fn listener_may_issue_commands() {
    let (engine, remote) = engine();
    let engine = Rc::new(engine);
    let weak = Rc::downgrade(&engine);
    let _sub = engine.listen(
        "button:press",
        move |_| {
            if let Some(engine) = weak.upgrade() {
                let _pending = engine.sim_pause();
            }
        },
        ListenOptions::default(),
    );

    remote.event("button:press", Value::Null, 5);
    assert_eq!(remote.command_names(), ["sim:pause"]);
    assert_eq!(engine.pending_commands(), 1);
}

// ── Connect ───────────────────────────────────────────────────

#[test]
fn connect_failure_is_reported_and_cached() {
    let (transport, _remote) = unreachable_transport(TransportError::Unavailable("no frame".into()));
    let engine = simlink::RpcEngine::with_defaults(transport);
    let expected = Err(ClientError::Transport(TransportError::Unavailable("no frame".into())));
    assert_eq!(block_on(engine.connected()), expected);
    assert_eq!(block_on(engine.connected()), expected);
}

// ── Close and loss ────────────────────────────────────────────

#[test]
fn close_is_idempotent() {
    let (engine, remote) = engine();
    let log = error_log(&engine);
    engine.close();
    engine.close();
    assert_eq!(remote.close_calls(), 1);
    assert!(engine.is_closed());
    assert!(log.borrow().is_empty());

    assert_eq!(block_on(engine.sim_status()), Err(ClientError::Closed));
    assert!(remote.commands().is_empty());
}

#[test]
fn drop_closes_the_transport() {
    let (engine, remote) = engine();
    drop(engine);
    assert_eq!(remote.close_calls(), 1);
}

#[test]
fn close_after_explicit_close_is_suppressed() {
    let (engine, remote) = engine();
    let log = error_log(&engine);
    engine.close();
    remote.drop_connection(1000, "bye");
    assert!(log.borrow().is_empty());
}

#[test]
fn unexpected_close_is_reported_once_and_leaves_commands_pending() {
    let config = ClientConfig {
        server: Some("wss://sim.example".into()),
        ..ClientConfig::default()
    };
    let (engine, remote) = engine_with(config);
    let log = error_log(&engine);
    let mut pending = pin!(engine.sim_status());

    remote.drop_connection(1006, "network down");
    remote.drop_connection(1006, "network down");

    assert_eq!(
        *log.borrow(),
        ["Connection to wss://sim.example closed unexpectedly: code 1006 (network down)"]
    );
    assert!(block_on(poll_once(pending.as_mut())).is_none());
    assert!(engine.is_closed());
    assert_eq!(block_on(engine.sim_pause()), Err(ClientError::Closed));
}

#[test]
fn unexpected_close_rejects_pending_when_configured() {
    let config = ClientConfig {
        reject_pending_on_close: true,
        ..ClientConfig::default()
    };
    let (engine, remote) = engine_with(config);
    let a = engine.sim_status();
    let b = engine.sim_pause();

    remote.drop_connection(4000, "");

    let lost = Err(ClientError::TransportLost(
        "Connection to transport closed unexpectedly: code 4000".into(),
    ));
    assert_eq!(block_on(a), lost);
    assert_eq!(block_on(b), lost);
    assert_eq!(engine.pending_commands(), 0);
}

#[test]
fn transport_error_is_reported() {
    let (engine, remote) = engine();
    let log = error_log(&engine);
    remote.transport_error(&TransportError::Io("reset by peer".into()));
    assert_eq!(log.borrow().len(), 1);
    assert!(log.borrow()[0].contains("reset by peer"));
    assert!(!engine.is_closed());
}
