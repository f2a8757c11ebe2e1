//! Control Messages
//!
//! Requests sent by unprivileged clients to the daemon and the replies they
//! get back. These are the JSON payloads carried inside transport frames.
//!
//! # Versioning
//!
//! Every request may carry a `"v"` field (default 1). Mood names travel as
//! plain strings in both directions, so a client built before a mood was
//! added still decodes status replies, and a daemon that does not know a
//! requested mood answers with [`ErrorCode::UnknownMood`] instead of
//! failing to parse the frame.

use serde::{Deserialize, Serialize};

use crate::mood::{Mood, UnknownMood};

/// Protocol version spoken by this build
pub const PROTOCOL_VERSION: u32 = 1;

/// Operation names this build serves
pub const KNOWN_OPS: [&str; 2] = ["set_mood", "get_status"];

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

/// Operation requested by a client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlOp {
    /// Switch to a mood and restart its animation
    SetMood {
        /// Mood name, matched case-insensitively
        mood: String,
    },
    /// Report current status without changing anything
    GetStatus,
}

/// One request frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Protocol version the client speaks
    #[serde(default = "default_version")]
    pub v: u32,

    /// What to do
    #[serde(flatten)]
    pub op: ControlOp,
}

impl ControlRequest {
    /// Request a mood change
    #[must_use]
    pub fn set_mood(mood: Mood) -> Self {
        Self::set_mood_named(mood.as_str())
    }

    /// Request a mood change by name, without checking it locally
    pub fn set_mood_named(name: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            op: ControlOp::SetMood { mood: name.into() },
        }
    }

    /// Request current status
    #[must_use]
    pub fn get_status() -> Self {
        Self {
            v: PROTOCOL_VERSION,
            op: ControlOp::GetStatus,
        }
    }

    /// Interpret a decoded JSON payload
    ///
    /// # Errors
    ///
    /// [`ErrorCode::UnsupportedOp`] for an object whose `op` names an
    /// operation this build does not know, [`ErrorCode::MalformedRequest`]
    /// for anything else that does not fit the request shape.
    pub fn from_value(value: serde_json::Value) -> Result<Self, WireError> {
        let op = value
            .get("op")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        serde_json::from_value(value).map_err(|e| match op {
            Some(op) if !KNOWN_OPS.contains(&op.as_str()) => WireError::new(
                ErrorCode::UnsupportedOp,
                format!("Unsupported operation '{op}'"),
            ),
            _ => WireError::new(ErrorCode::MalformedRequest, e.to_string()),
        })
    }
}

/// Stable machine-readable error identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Mood name not in the daemon's table
    UnknownMood,
    /// Frame or JSON could not be decoded
    MalformedRequest,
    /// Recognized JSON with an operation this daemon does not serve
    UnsupportedOp,
    /// Daemon is tearing down
    ShuttingDown,
}

impl ErrorCode {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownMood => "unknown_mood",
            Self::MalformedRequest => "malformed_request",
            Self::UnsupportedOp => "unsupported_op",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body of a rejected request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Stable code
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl WireError {
    /// Build an error body
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<UnknownMood> for WireError {
    fn from(err: UnknownMood) -> Self {
        Self::new(ErrorCode::UnknownMood, err.to_string())
    }
}

/// Daemon status carried in every reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Current mood name
    pub mood: String,
    /// True only when the transfer channel is held exclusively
    pub exclusive: bool,
    /// `exclusive`, `shared` or `detached`
    pub driver_mode: String,
    /// Pinned transfer channel when exclusive
    pub dma_channel: Option<u8>,
    /// Number of accepted mood changes
    pub generation: u64,
    /// Generation of the most recently rendered frame
    pub rendered_generation: u64,
    /// Frames accepted by the output driver
    pub frames_rendered: u64,
    /// Failed frame transfers
    pub transfer_failures: u64,
    /// Daemon is tearing down
    pub shutting_down: bool,
}

impl Status {
    /// Parse the mood name
    ///
    /// # Errors
    ///
    /// [`UnknownMood`] when the daemon reports a mood this build lacks.
    pub fn mood(&self) -> Result<Mood, UnknownMood> {
        self.mood.parse()
    }

    /// True once a frame for the current generation has been rendered
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.rendered_generation >= self.generation
    }
}

/// One reply frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the request was applied
    pub ok: bool,

    /// Present when `ok` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,

    /// Status after handling the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl ControlResponse {
    /// Successful reply
    #[must_use]
    pub fn ok(status: Status) -> Self {
        Self {
            ok: true,
            error: None,
            status: Some(status),
        }
    }

    /// Rejection, optionally with the unchanged status
    #[must_use]
    pub fn error(error: WireError, status: Option<Status>) -> Self {
        Self {
            ok: false,
            error: Some(error),
            status,
        }
    }
}
