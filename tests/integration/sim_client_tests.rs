//! Integration tests for the simulator command surface: file transfer,
//! serial I/O and peripheral accessors.

use futures_lite::future::block_on;
use serde_json::{Value, json};
use simlink::{ClientError, FileContent};

use crate::mock_transport::{MockRemote, engine};

/// Answer the most recent `file:download` with what the matching
/// `file:upload` carried, the way the simulator stores files.
fn serve_download(remote: &MockRemote) {
    let commands = remote.commands();
    let download = commands.last().expect("download sent");
    let name = &download.params["name"];
    let stored = commands
        .iter()
        .find(|c| c.command == "file:upload" && &c.params["name"] == name)
        .map(|c| c.params.clone())
        .unwrap_or(Value::Null);
    remote.respond(&download.id, stored);
}

#[test]
fn binary_upload_then_download_round_trips() {
    let (engine, remote) = engine();
    let bytes = vec![0u8, 1, 2, 253, 254, 255];

    let upload = engine.file_upload("blob.bin", bytes.clone());
    assert_eq!(
        remote.last_command().params,
        json!({"name": "blob.bin", "binary": "AAEC/f7/"})
    );
    remote.ack_all();
    assert!(block_on(upload).is_ok());

    let download = engine.file_download("blob.bin");
    serve_download(&remote);
    assert_eq!(block_on(download), Ok(FileContent::Binary(bytes)));
}

#[test]
fn padded_tails_round_trip() {
    for bytes in [vec![0xABu8], vec![0xAB, 0xCD], vec![1, 2, 3, 4]] {
        let (engine, remote) = engine();
        let upload = engine.file_upload("tail.bin", bytes.as_slice());
        remote.ack_all();
        block_on(upload).unwrap();

        let download = engine.file_download("tail.bin");
        serve_download(&remote);
        assert_eq!(block_on(download).unwrap().as_bytes(), bytes.as_slice());
    }
}

#[test]
fn text_upload_travels_verbatim() {
    let (engine, remote) = engine();
    let _upload = engine.file_upload("diagram.json", "{\"parts\":[]}");
    assert_eq!(
        remote.last_command().params,
        json!({"name": "diagram.json", "text": "{\"parts\":[]}"})
    );

    let download = engine.file_download("diagram.json");
    serve_download(&remote);
    assert_eq!(
        block_on(download),
        Ok(FileContent::Text("{\"parts\":[]}".into()))
    );
}

#[test]
fn download_without_content_is_a_validation_error() {
    let (engine, remote) = engine();
    let download = engine.file_download("missing.bin");
    remote.respond("0", json!({}));
    assert_eq!(
        block_on(download),
        Err(ClientError::Validation("Invalid file download response".into()))
    );
}

#[test]
fn download_error_is_the_remote_error() {
    let (engine, remote) = engine();
    let download = engine.file_download("missing.bin");
    remote.respond_error("0", json!({"code": 404, "message": "not found"}));
    assert!(matches!(
        block_on(download),
        Err(ClientError::Remote { code: 404, .. })
    ));
}

#[test]
fn serial_write_sends_byte_array() {
    let (engine, remote) = engine();
    let write = engine.serial_monitor_write(b"AT\r\n");
    let sent = remote.last_command();
    assert_eq!(sent.command, "serial-monitor:write");
    assert_eq!(sent.params, json!({"bytes": [65, 84, 13, 10]}));
    remote.ack_all();
    assert!(block_on(write).is_ok());
}

#[test]
fn accessor_parameter_shapes() {
    let (engine, remote) = engine();
    let _listen = engine.serial_monitor_listen();
    let _fb = engine.framebuffer_read("lcd1");
    let _pin = engine.pin_read("esp", "GPIO2");
    let _status = engine.sim_status();

    let commands = remote.commands();
    assert_eq!(commands[0].command, "serial-monitor:listen");
    assert_eq!(commands[0].params, Value::Null);
    assert_eq!(commands[1].params, json!({"id": "lcd1"}));
    assert_eq!(commands[2].params, json!({"part": "esp", "pin": "GPIO2"}));
    assert_eq!(commands[3].command, "sim:status");
}

#[test]
fn framebuffer_result_is_passed_through() {
    let (engine, remote) = engine();
    let read = engine.framebuffer_read("lcd1");
    let frame = json!({"width": 2, "height": 1, "data": "AAAA"});
    remote.respond("0", frame.clone());
    assert_eq!(block_on(read), Ok(frame));
}
