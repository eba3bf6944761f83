//! Byte codec for hosts that move messages rather than typed values.
//!
//! Messages are JSON objects tagged by `kind`. A kind this build does not
//! know decodes to the `Unknown` variant instead of failing, so peers built
//! from different protocol revisions keep talking.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tandem_shared::{Command, Event};

use crate::error::WireError;

/// Result type for the wire codec.
pub type WireResult<T> = Result<T, WireError>;

fn encode<T: Serialize>(message: &T) -> WireResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(WireError::Encode)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> WireResult<T> {
    serde_json::from_slice(bytes).map_err(WireError::Decode)
}

/// Encodes a command.
///
/// # Errors
///
/// [`WireError::Encode`] if a float payload is not representable.
pub fn encode_command(command: &Command) -> WireResult<Vec<u8>> {
    encode(command)
}

/// Decodes a command.
///
/// # Errors
///
/// [`WireError::Decode`] if the bytes are not a tagged record with the
/// fields its kind requires.
pub fn decode_command(bytes: &[u8]) -> WireResult<Command> {
    decode(bytes)
}

/// Encodes an event.
///
/// # Errors
///
/// [`WireError::Encode`] if a float payload is not representable.
pub fn encode_event(event: &Event) -> WireResult<Vec<u8>> {
    encode(event)
}

/// Decodes an event.
///
/// # Errors
///
/// [`WireError::Decode`] on malformed input.
pub fn decode_event(bytes: &[u8]) -> WireResult<Event> {
    decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_shared::{EntityId, RaycastHit, RequestId, Vec3};

    #[test]
    fn test_raycast_reply_wire_shape() {
        let event = Event::RaycastResponse {
            request_id: RequestId(7),
            hits: vec![RaycastHit {
                id: EntityId::new("crate"),
                point: Vec3::new(0.0, 1.0, 0.0),
                normal: Vec3::Y,
            }],
        };
        let bytes = encode_event(&event).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["kind"], "RAYCAST_RESPONSE");
        assert_eq!(value["request_id"], 7);
        assert_eq!(value["hits"][0]["id"], "crate");

        assert_eq!(decode_event(&bytes).unwrap(), event);
    }

    #[test]
    fn test_future_kind_decodes_to_unknown() {
        let command = decode_command(br#"{"kind":"SET_ANGULAR_FACTOR","id":"a"}"#).unwrap();
        assert_eq!(command, Command::Unknown);
    }

    #[test]
    fn test_malformed_bytes_are_an_error() {
        assert!(matches!(decode_command(b"not json"), Err(WireError::Decode(_))));
        // Known kind, missing field
        assert!(matches!(
            decode_command(br#"{"kind":"REMOVE_RIGID_BODY"}"#),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn test_remove_command_bytes() {
        let command = Command::RemoveRigidBody { id: EntityId::new("b") };
        let bytes = encode_command(&command).unwrap();
        assert_eq!(bytes, br#"{"kind":"REMOVE_RIGID_BODY","id":"b"}"#);
    }
}
