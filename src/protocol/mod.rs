//! Protocol Module
//!
//! Defines the wire protocol for client-server and node-to-node traffic.
//!
//! ## Protocol Format (Binary frames)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │  Payload (bincode Command)  │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: GET     - key, optional consistency
//! - 0x02: PUT     - key, value, optional consistency
//! - 0x03: DEL     - key, optional consistency
//! - 0x04: PING
//! - 0x05: SCAN    - node-local range scan
//! - 0x10: FORWARD - client request routed by another node
//! - 0x20..0x22: REPLICATE_PUT / REPLICATE_DELETE / REPLICATE_GET
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: ERROR
//! - 0x03: PARTIAL_FAILURE
//! - 0x04: TIMEOUT
//! - 0x05: UNAVAILABLE
//! - 0x06: BAD_REQUEST

mod codec;
mod command;
mod response;

pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{Command, CommandType};
pub use response::{Failure, Response, ScanPage, Status};
