//! Response definitions
//!
//! Represents responses to clients and peers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardError};
use crate::record::Record;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
    /// Quorum missed; payload is a [`Failure`]
    PartialFailure = 0x03,
    /// Deadline passed before quorum; payload is a [`Failure`]
    Timeout = 0x04,
    /// Not enough live owners; payload is a [`Failure`]
    Unavailable = 0x05,
    /// Malformed request or invalid consistency level
    BadRequest = 0x06,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let s = match byte {
            0x00 => Status::Ok,
            0x01 => Status::NotFound,
            0x02 => Status::Error,
            0x03 => Status::PartialFailure,
            0x04 => Status::Timeout,
            0x05 => Status::Unavailable,
            0x06 => Status::BadRequest,
            _ => return None,
        };
        Some(s)
    }
}

/// Payload of quorum failures, so a client can decide whether to retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    /// Acknowledgments achieved (live owners for UNAVAILABLE)
    pub acks: u32,
    pub required: u32,
}

/// One page of a SCAN
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPage {
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Last key of a full page; pass it back as `after` for the next page
    pub bookmark: Option<Vec<u8>>,
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value for GET, error message for ERROR)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self {
            status: Status::BadRequest,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    pub fn pong() -> Self {
        Self::ok(Some(b"PONG".to_vec()))
    }

    /// Acknowledgment of a replica write
    pub fn applied(changed: bool) -> Self {
        Self::ok(Some(vec![changed as u8]))
    }

    /// Answer to REPLICATE_GET
    pub fn record(record: Option<&Record>) -> Result<Self> {
        match record {
            Some(record) => Ok(Self::ok(Some(bincode::serialize(record)?))),
            None => Ok(Self::not_found()),
        }
    }

    pub fn scan_page(page: &ScanPage) -> Result<Self> {
        Ok(Self::ok(Some(bincode::serialize(page)?)))
    }

    /// Map an error onto the status clients can act on
    pub fn from_error(err: &ShardError) -> Self {
        let failure = |status, acks: usize, required: usize| {
            let body = Failure {
                message: err.to_string(),
                acks: acks as u32,
                required: required as u32,
            };
            match bincode::serialize(&body) {
                Ok(payload) => Self {
                    status,
                    payload: Some(payload),
                },
                Err(_) => Self::error(&err.to_string()),
            }
        };

        match err {
            ShardError::PartialFailure { acks, required } => {
                failure(Status::PartialFailure, *acks, *required)
            }
            ShardError::Timeout { acks, required } => failure(Status::Timeout, *acks, *required),
            ShardError::NodeUnavailable { live, required } => {
                failure(Status::Unavailable, *live, *required)
            }
            ShardError::InvalidConsistency(_) | ShardError::Protocol(_) => {
                Self::bad_request(&err.to_string())
            }
            _ => Self::error(&err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Payload as UTF-8 text (lossy), for messages
    pub fn message(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }

    /// Rebuild the error a failure response stands for
    pub fn into_error(self) -> ShardError {
        let failure = || -> Option<Failure> {
            self.payload
                .as_deref()
                .and_then(|p| bincode::deserialize(p).ok())
        };
        match self.status {
            Status::PartialFailure | Status::Timeout | Status::Unavailable => {
                let Some(f) = failure() else {
                    return ShardError::Protocol(format!(
                        "{:?} response without failure details",
                        self.status
                    ));
                };
                let (acks, required) = (f.acks as usize, f.required as usize);
                match self.status {
                    Status::PartialFailure => ShardError::PartialFailure { acks, required },
                    Status::Timeout => ShardError::Timeout { acks, required },
                    _ => ShardError::NodeUnavailable {
                        live: acks,
                        required,
                    },
                }
            }
            Status::BadRequest => ShardError::Protocol(self.message()),
            Status::Error => ShardError::Network(format!("remote error: {}", self.message())),
            Status::Ok | Status::NotFound => {
                ShardError::Protocol(format!("unexpected {:?} response", self.status))
            }
        }
    }

    /// Decode the acknowledgment of REPLICATE_PUT / REPLICATE_DELETE
    pub fn into_applied(self) -> Result<bool> {
        if !self.is_ok() {
            return Err(self.into_error());
        }
        match self.payload.as_deref() {
            Some([flag]) => Ok(*flag != 0),
            _ => Err(ShardError::Protocol("malformed replica acknowledgment".into())),
        }
    }

    /// Decode the answer to REPLICATE_GET
    pub fn into_record(self) -> Result<Option<Record>> {
        match self.status {
            Status::NotFound => Ok(None),
            Status::Ok => {
                let payload = self
                    .payload
                    .ok_or_else(|| ShardError::Protocol("record response without payload".into()))?;
                Ok(Some(bincode::deserialize(&payload)?))
            }
            _ => Err(self.into_error()),
        }
    }

    pub fn into_scan_page(self) -> Result<ScanPage> {
        if !self.is_ok() {
            return Err(self.into_error());
        }
        match self.payload {
            Some(payload) => Ok(bincode::deserialize(&payload)?),
            None => Ok(ScanPage::default()),
        }
    }

    pub fn into_pong(self) -> Result<()> {
        match (self.status, self.payload.as_deref()) {
            (Status::Ok, Some(b"PONG")) => Ok(()),
            (Status::Ok, _) => Err(ShardError::Protocol("unexpected answer to PING".into())),
            _ => Err(self.into_error()),
        }
    }
}
