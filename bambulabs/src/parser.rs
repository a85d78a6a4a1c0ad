//! The message parser.

use crate::message::Message;

/// Parse the raw payload of a report into a [Message].
///
/// Payloads that are valid JSON but not modelled by [Message] come back as
/// [Message::Json]; anything else as [Message::Unknown].
pub fn parse_message(payload: &[u8]) -> Message {
    let Ok(payload) = std::str::from_utf8(payload) else {
        return Message::Unknown(None);
    };

    match serde_json::from_str::<Message>(payload)
        .map_err(|err| format_serde_error::SerdeError::new(payload.to_string(), err))
    {
        Ok(message) => message,
        Err(err) => match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(message) => {
                tracing::trace!("Unmodelled message: {}", err);
                Message::Json(message)
            }
            Err(_) => {
                tracing::error!("Error parsing message: {}", err);
                Message::Unknown(Some(payload.to_string()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::message::{GcodeState, Print};

    #[test]
    fn test_parse_push_status() {
        let message = parse_message(br#"{"print":{"command":"push_status","gcode_state":"RUNNING","layer_num":3,"sequence_id":"9"}}"#);

        let Message::Print(Print::PushStatus(status)) = message else {
            panic!("expected a push status, got {:?}", message);
        };
        assert_eq!(status.gcode_state, Some(GcodeState::Running));
        assert_eq!(status.layer_num, Some(3));
    }

    #[test]
    fn test_parse_unmodelled_json() {
        let message = parse_message(br#"{"info":{"command":"get_version","sequence_id":"1"}}"#);

        assert!(matches!(message, Message::Json(_)));
        assert_eq!(message.sequence_id(), None);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(
            parse_message(b"not json at all"),
            Message::Unknown(Some("not json at all".to_string()))
        );
        assert_eq!(parse_message(&[0xff, 0xfe, 0x00]), Message::Unknown(None));
    }

    #[test]
    fn test_parse_captured_reports() {
        let testdata = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata");

        let mut seen = 0;
        for entry in walkdir::WalkDir::new(&testdata) {
            let entry = entry.unwrap();
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let payload = std::fs::read(entry.path()).unwrap();
            let message = parse_message(&payload);
            assert!(
                matches!(message, Message::Print(_)),
                "{} did not parse as a print message: {:?}",
                entry.path().display(),
                message
            );
            seen += 1;
        }

        assert!(seen > 0, "no fixtures found in {}", testdata.display());
    }
}
