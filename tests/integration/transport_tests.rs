//! Integration tests for the concrete transports driving a real engine.

use std::cell::RefCell;
use std::io::{Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;
use std::time::Duration;

use futures_lite::future::block_on;
use serde_json::{Value, json};
use simlink::adapters::port_transport::{RemotePort, port_channel};
use simlink::adapters::stream_transport::{ReadOutcome, StreamTransport, TcpLink};
use simlink::rpc::codec::{decode_message, encode_frame, encode_message};
use simlink::rpc::message::{ChannelMessage, EventMessage, HelloMessage, PAUSE_EVENT, ResponseMessage};
use simlink::{ClientConfig, ClientError, PauseCondition, RpcEngine};

fn error_log<T: simlink::Transport>(engine: &RpcEngine<T>) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    engine.set_on_error(move |e| sink.borrow_mut().push(e.message.clone()));
    log
}

// ── Message port ──────────────────────────────────────────────

#[test]
fn port_round_trip_with_pump() {
    let (transport, remote) = port_channel();
    let driver = transport.driver();
    let engine = RpcEngine::with_defaults(transport);
    block_on(engine.connected()).unwrap();

    let status = engine.sim_status();
    let Some(ChannelMessage::Command(command)) = remote.try_recv() else {
        panic!("command not forwarded");
    };
    assert_eq!(command.command, "sim:status");

    remote
        .post(ResponseMessage {
            id: command.id,
            error: false,
            result: json!({"running": true}),
        })
        .unwrap();
    assert_eq!(driver.pump(), 1);
    assert_eq!(block_on(status), Ok(json!({"running": true})));
}

#[test]
fn port_close_from_remote_is_reported() {
    let config = ClientConfig {
        server: Some("sim-frame".into()),
        ..ClientConfig::default()
    };
    let (transport, remote) = port_channel();
    let driver = transport.driver();
    let engine = RpcEngine::new(transport, config);
    let log = error_log(&engine);

    remote.close(1001, "frame unloaded");
    driver.pump();
    assert_eq!(
        *log.borrow(),
        ["Connection to sim-frame closed unexpectedly: code 1001 (frame unloaded)"]
    );
    assert_eq!(block_on(engine.sim_status()), Err(ClientError::Closed));
}

#[test]
fn port_close_from_client_is_silent() {
    let (transport, remote) = port_channel();
    let driver = transport.driver();
    let engine = RpcEngine::with_defaults(transport);
    let log = error_log(&engine);

    engine.close();
    driver.pump();
    assert!(log.borrow().is_empty());
    assert!(remote.try_recv().is_none());
}

#[test]
fn port_failure_is_reported_through_on_error() {
    let (transport, remote) = port_channel();
    let driver = transport.driver();
    let engine = RpcEngine::with_defaults(transport);
    let log = error_log(&engine);

    remote.fail("frame crashed").unwrap();
    driver.pump();
    assert_eq!(log.borrow().len(), 1);
    assert!(log.borrow()[0].contains("frame crashed"));
}

/// Simulator that acknowledges everything and fires each pause point as
/// soon as the simulation is resumed.
async fn echo_simulator(port: RemotePort) {
    port.post(HelloMessage { protocol_version: 1 }).unwrap();
    let mut points: Vec<String> = Vec::new();
    loop {
        let ChannelMessage::Command(command) = port.recv().await else {
            continue;
        };
        if command.command == "pause-point:add" {
            points.push(command.params["id"].as_str().unwrap_or_default().to_owned());
        }
        let resumed = command.command == "sim:resume";
        port.post(ResponseMessage {
            id: command.id,
            error: false,
            result: Value::Null,
        })
        .unwrap();
        if resumed {
            for id in points.drain(..) {
                port.post(EventMessage {
                    event: PAUSE_EVENT.into(),
                    payload: json!({"pausePoint": id, "pausePointInfo": {"nanos": 1_000}}),
                    nanos: 1_000,
                })
                .unwrap();
            }
        }
    }
}

#[test]
fn executor_drives_delay_over_port() {
    let (transport, remote) = port_channel();
    let driver = transport.driver();
    let engine = RpcEngine::with_defaults(transport);

    let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();
    executor.spawn(driver.run()).detach();
    executor.spawn(echo_simulator(remote)).detach();

    let info = block_on(executor.run(async {
        engine.connected().await?;
        engine.delay(1_000).await
    }));
    assert_eq!(info, Ok(json!({"nanos": 1_000})));
    assert_eq!(engine.remote_version(), Some(1));
    assert!(!engine.running());
    assert_eq!(engine.last_nanos(), 1_000);
}

// ── Byte stream over TCP ──────────────────────────────────────

fn read_frame(peer: &mut TcpStream) -> ChannelMessage {
    let mut header = [0u8; 4];
    peer.read_exact(&mut header).unwrap();
    let mut payload = vec![0u8; u32::from_le_bytes(header) as usize];
    peer.read_exact(&mut payload).unwrap();
    decode_message(&payload).unwrap()
}

fn write_frame(peer: &mut TcpStream, message: &ChannelMessage) {
    let text = encode_message(message).unwrap();
    peer.write_all(&encode_frame(text.as_bytes(), 1024).unwrap()).unwrap();
}

fn poll_until<L: simlink::adapters::stream_transport::ByteLink>(
    reader: &simlink::adapters::stream_transport::StreamReader<L>,
    mut done: impl FnMut(ReadOutcome) -> bool,
) {
    for _ in 0..200 {
        if done(reader.poll()) {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("reader never reached the expected state");
}

#[test]
fn stream_transport_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ClientConfig::default();
    let link = TcpLink::connect(listener.local_addr().unwrap()).unwrap();
    let (mut peer, _) = listener.accept().unwrap();

    let transport = StreamTransport::new(link, &config);
    let reader = transport.reader();
    let engine = RpcEngine::new(transport, config);
    let log = error_log(&engine);
    block_on(engine.connected()).unwrap();

    let add = engine.add_pause_point(PauseCondition::TimeAbsolute { nanos: 77 }, false);
    let ChannelMessage::Command(command) = read_frame(&mut peer) else {
        panic!("expected a command");
    };
    assert_eq!(command.command, "pause-point:add");

    write_frame(
        &mut peer,
        &ChannelMessage::Response(ResponseMessage {
            id: command.id,
            error: false,
            result: Value::Null,
        }),
    );
    write_frame(
        &mut peer,
        &ChannelMessage::Event(EventMessage {
            event: PAUSE_EVENT.into(),
            payload: json!({"pausePoint": "pp0_time-absolute", "pausePointInfo": {"nanos": 77}}),
            nanos: 77,
        }),
    );
    poll_until(&reader, |_| engine.pause_point_count() == 0);

    let point = block_on(add).unwrap();
    assert_eq!(block_on(point.wait()), json!({"nanos": 77}));
    assert_eq!(engine.last_nanos(), 77);

    drop(peer);
    poll_until(&reader, |o| o == ReadOutcome::Finished);
    assert_eq!(
        *log.borrow(),
        ["Connection to transport closed unexpectedly: code 1006 (link closed)"]
    );
}
