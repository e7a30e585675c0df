//! Tests for Protocol Codec
//!
//! These tests verify:
//! - Command and response framing
//! - The frame type byte must agree with the payload
//! - Malformed frames are rejected
//! - Stream-based I/O

use std::io::Cursor;

use shardkv::cluster::{ClientRequest, Consistency};
use shardkv::protocol::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, Command, CommandType, Response, Status,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use shardkv::Version;

// =============================================================================
// Command Framing Tests
// =============================================================================

#[test]
fn test_command_frame_layout() {
    let command = Command::put("user:1", "alice");
    let bytes = encode_command(&command).unwrap();

    assert_eq!(bytes[0], CommandType::Put as u8);
    let len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);

    assert_eq!(decode_command(&bytes).unwrap(), command);
}

#[test]
fn test_commands_with_consistency_and_versions() {
    let level = Consistency::new(3, 1, 3).unwrap();
    let commands = vec![
        Command::Get {
            key: b"k".to_vec(),
            consistency: Some(level),
        },
        Command::Scan {
            start: Some(b"a".to_vec()),
            end: None,
            after: Some(b"c".to_vec()),
            limit: Some(100),
        },
        Command::Forward(ClientRequest::delete("k").with_consistency(level)),
        Command::ReplicatePut {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            version: Version::new(42, "node-2"),
        },
        Command::ReplicateGet { key: b"k".to_vec() },
    ];

    for command in commands {
        let bytes = encode_command(&command).unwrap();
        assert_eq!(bytes[0], command.command_type() as u8);
        assert_eq!(decode_command(&bytes).unwrap(), command);
    }
}

#[test]
fn test_type_byte_must_match_payload() {
    let mut bytes = encode_command(&Command::Ping).unwrap();
    bytes[0] = CommandType::Get as u8;

    let err = decode_command(&bytes).unwrap_err();
    assert!(err.to_string().contains("does not match"), "unexpected error: {}", err);
}

#[test]
fn test_unknown_command_type() {
    let mut bytes = encode_command(&Command::Ping).unwrap();
    bytes[0] = 0x7F;
    assert!(decode_command(&bytes).is_err());
}

#[test]
fn test_incomplete_frames() {
    let bytes = encode_command(&Command::get("key")).unwrap();

    assert!(decode_command(&bytes[..3]).is_err());
    assert!(decode_command(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn test_oversized_length_rejected() {
    let mut bytes = vec![CommandType::Get as u8];
    bytes.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
    let err = decode_command(&bytes).unwrap_err();
    assert!(err.to_string().contains("too large"));
}

#[test]
fn test_malformed_payload() {
    let bytes = vec![CommandType::Put as u8, 0, 0, 0, 2, 0xFF, 0xFF];
    assert!(decode_command(&bytes).is_err());
}

// =============================================================================
// Response Framing Tests
// =============================================================================

#[test]
fn test_response_frames() {
    let responses = vec![
        Response::ok(Some(b"value".to_vec())),
        Response::ok(None),
        Response::not_found(),
        Response::pong(),
        Response::bad_request("nope"),
    ];
    for response in responses {
        let bytes = encode_response(&response).unwrap();
        assert_eq!(bytes[0], response.status as u8);
        assert_eq!(decode_response(&bytes).unwrap(), response);
    }
}

#[test]
fn test_unknown_status() {
    let bytes = vec![0x42, 0, 0, 0, 0];
    assert!(decode_response(&bytes).is_err());
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_stream_round_trip() {
    let mut buf = Vec::new();
    write_command(&mut buf, &Command::get("a")).unwrap();
    write_command(&mut buf, &Command::delete("b")).unwrap();

    let mut cursor = Cursor::new(buf);
    assert_eq!(read_command(&mut cursor).unwrap(), Command::get("a"));
    assert_eq!(read_command(&mut cursor).unwrap(), Command::delete("b"));
    assert!(read_command(&mut cursor).is_err());

    let mut buf = Vec::new();
    write_response(&mut buf, &Response::not_found()).unwrap();
    let response = read_response(&mut Cursor::new(buf)).unwrap();
    assert_eq!(response.status, Status::NotFound);
    assert!(response.payload.is_none());
}
