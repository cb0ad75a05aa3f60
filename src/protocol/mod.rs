//! Pusher wire protocol codec.
//!
//! Pure functions that decode and encode frames and classify the handshake and
//! close codes into the [`Action`] the connection manager should take. Nothing here
//! holds state or performs I/O.
//!
//! # Example
//!
//! ```
//! use pusher_client_sdk::protocol::{HandshakeAction, process_handshake};
//!
//! let raw = r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"123.456\",\"activity_timeout\":120}"}"#;
//! let action = process_handshake(raw).unwrap();
//! assert!(matches!(action, HandshakeAction::Connected { .. }));
//! ```

pub mod error;
pub mod types;

use std::time::Duration;

use serde_json::Value;

pub use error::{HandshakeError, MessageParseError, PusherError};
pub use types::{Action, CloseEvent, Envelope, HandshakeAction};

use crate::Result;

/// Protocol revision announced in the connection URL.
pub const PROTOCOL_VERSION: u8 = 7;

pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
pub const ERROR: &str = "pusher:error";
pub const PING: &str = "pusher:ping";
pub const PONG: &str = "pusher:pong";

const PREFIX: &str = "pusher:";

/// Whether `event` names the protocol event `expected`, with or without the `pusher:` prefix.
#[must_use]
pub fn is_event(event: &str, expected: &str) -> bool {
    event == expected || expected.strip_prefix(PREFIX) == Some(event)
}

/// Decode one inbound frame.
///
/// A string `data` field that itself holds JSON is replaced by the parsed value;
/// if it does not parse the string is kept as is.
pub fn decode_message(raw: &str) -> Result<Envelope> {
    let mut envelope: Envelope =
        serde_json::from_str(raw).map_err(|source| MessageParseError {
            raw: raw.to_owned(),
            source,
        })?;

    if let Value::String(inner) = &envelope.data
        && let Ok(parsed) = serde_json::from_str::<Value>(inner)
    {
        envelope.data = parsed;
    }

    Ok(envelope)
}

/// Encode an envelope as a single frame.
pub fn encode_message(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Classify the first message received on a freshly opened transport.
///
/// # Errors
///
/// Fails with [`MessageParseError`] when the frame is not an envelope and with
/// [`HandshakeError`] when it is neither an acceptable `connection_established`
/// nor an `error`.
pub fn process_handshake(raw: &str) -> Result<HandshakeAction> {
    let message = decode_message(raw)?;

    if is_event(&message.event, CONNECTION_ESTABLISHED) {
        let seconds = message
            .data
            .get("activity_timeout")
            .and_then(Value::as_f64)
            .filter(|seconds| *seconds > 0.0)
            .ok_or(HandshakeError::MissingActivityTimeout)?;
        let activity_timeout = Duration::try_from_secs_f64(seconds)
            .map_err(|_e| HandshakeError::MissingActivityTimeout)?;
        let socket_id = message
            .data
            .get("socket_id")
            .and_then(Value::as_str)
            .ok_or(HandshakeError::MissingSocketId)?;

        return Ok(HandshakeAction::Connected {
            socket_id: socket_id.to_owned(),
            activity_timeout,
        });
    }

    if is_event(&message.event, ERROR) {
        let close = CloseEvent::from_data(&message.data);
        return Ok(HandshakeAction::from_close(
            close_code_to_action(&close),
            close_event_to_error(&close),
        ));
    }

    Err(HandshakeError::InvalidHandshake {
        event: message.event,
    }
    .into())
}

/// Map a close code to the reconnection policy.
///
/// - `4000`: the server only accepts encrypted transports
/// - `4200..4300`: server-initiated close, safe to retry immediately
/// - anything else: back off
#[must_use]
pub fn close_code_to_action(close: &CloseEvent) -> Action {
    match close.code {
        4000 => Action::SslOnly,
        4200..4300 => Action::Retry,
        _ => Action::Backoff,
    }
}

/// Normal (`1000`) and going-away (`1001`) closes are not errors.
#[must_use]
pub fn close_event_to_error(close: &CloseEvent) -> Option<PusherError> {
    match close.code {
        1000 | 1001 => None,
        code => Some(PusherError::new(Some(code), close.reason.clone())),
    }
}
