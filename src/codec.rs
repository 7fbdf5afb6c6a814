// MIT License

//! Frame extraction from the accumulating read buffer.
//!
//! The session appends raw socket bytes to one buffer and asks this module
//! for the next frame: either a handshake literal or an event line. Both
//! scans consume through the end of what they matched and leave every
//! trailing byte in place for the next scan; neither consumes anything when
//! the buffer does not yet hold a complete match.

use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::warn;

use crate::event::BridgeEvent;

/// `~MODE,INTEGRATION,ACTION,VALUE\r\n`
static EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"~([A-Z]+),([0-9.]+),([0-9.]+),([0-9.]+)\r\n").expect("event pattern is valid")
});

/// Outcome of one event scan over the buffer.
#[derive(Debug, PartialEq)]
pub enum Scan {
    /// A complete event line was matched and consumed.
    Event(BridgeEvent),
    /// A line matched the pattern but a numeric field did not parse; the
    /// line was consumed and dropped. Not fatal.
    Dropped,
    /// No complete match yet; nothing consumed, caller should read more.
    NeedMore,
}

/// Scan for a literal byte sequence (a handshake prompt).
///
/// On match, consumes everything up to and including the literal and returns
/// true. Returns false without consuming when the literal is not present yet.
pub fn take_literal(buffer: &mut Vec<u8>, literal: &[u8]) -> bool {
    match buffer
        .windows(literal.len())
        .position(|window| window == literal)
    {
        Some(at) => {
            buffer.drain(..at + literal.len());
            true
        }
        None => false,
    }
}

/// Scan for the next event line.
///
/// On match, consumes through the end of the matched line (bytes before the
/// match, e.g. echoed prompts or command responses, are discarded with it)
/// and parses the four captured fields. A field that matched the character
/// class but fails numeric parsing drops the event rather than the stream;
/// the bridge occasionally emits lines we have no use for and the stream
/// must survive them.
pub fn take_event(buffer: &mut Vec<u8>) -> Scan {
    let Some(captures) = EVENT_RE.captures(buffer) else {
        return Scan::NeedMore;
    };

    let end = captures.get(0).expect("whole match").end();
    let event = parse_event(&captures);
    buffer.drain(..end);

    match event {
        Some(event) => Scan::Event(event),
        None => Scan::Dropped,
    }
}

fn parse_event(captures: &regex::bytes::Captures<'_>) -> Option<BridgeEvent> {
    // The capture groups are ASCII by construction
    let field = |i: usize| String::from_utf8_lossy(&captures[i]).into_owned();

    let mode = field(1);
    let integration_id = field(2).parse::<u32>();
    let action = field(3).parse::<u32>();
    let value = field(4).parse::<f64>();

    match (integration_id, action, value) {
        (Ok(integration_id), Ok(action), Ok(value)) => Some(BridgeEvent {
            mode,
            integration_id,
            action,
            value,
        }),
        _ => {
            warn!(
                "Dropping malformed event line: {:?}",
                String::from_utf8_lossy(&captures[0])
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_literal_consumes_through_match() {
        let mut buffer = b"some banner\r\nlogin: trailing".to_vec();
        assert!(take_literal(&mut buffer, b"login: "));
        assert_eq!(buffer, b"trailing");
    }

    #[test]
    fn test_take_literal_incomplete_consumes_nothing() {
        let mut buffer = b"logi".to_vec();
        assert!(!take_literal(&mut buffer, b"login: "));
        assert_eq!(buffer, b"logi");
    }

    #[test]
    fn test_take_event_extracts_fields() {
        let mut buffer = b"~OUTPUT,5,1,100.0\r\n".to_vec();
        let scan = take_event(&mut buffer);
        assert_eq!(
            scan,
            Scan::Event(BridgeEvent {
                mode: "OUTPUT".to_string(),
                integration_id: 5,
                action: 1,
                value: 100.0,
            })
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_take_event_leaves_trailing_bytes() {
        let mut buffer = b"~DEVICE,2,3,3\r\n~DEVICE,2,4,3\r\n".to_vec();

        let first = take_event(&mut buffer);
        assert_eq!(
            first,
            Scan::Event(BridgeEvent {
                mode: "DEVICE".to_string(),
                integration_id: 2,
                action: 3,
                value: 3.0,
            })
        );
        assert_eq!(buffer, b"~DEVICE,2,4,3\r\n");

        let second = take_event(&mut buffer);
        assert_eq!(
            second,
            Scan::Event(BridgeEvent {
                mode: "DEVICE".to_string(),
                integration_id: 2,
                action: 4,
                value: 3.0,
            })
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_take_event_incomplete_consumes_nothing() {
        let mut buffer = b"~OUTPUT,5,1,10".to_vec();
        assert_eq!(take_event(&mut buffer), Scan::NeedMore);
        assert_eq!(buffer, b"~OUTPUT,5,1,10");
    }

    #[test]
    fn test_take_event_skips_noise_before_match() {
        let mut buffer = b"GNET> ~OUTPUT,5,1,50.5\r\n".to_vec();
        let scan = take_event(&mut buffer);
        match scan {
            Scan::Event(event) => {
                assert_eq!(event.integration_id, 5);
                assert_eq!(event.value, 50.5);
            }
            other => panic!("expected event, got {:?}", other),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_take_event_drops_malformed_numeric() {
        // "5.5" matches [0-9.]+ but is not a valid integration id
        let mut buffer = b"~OUTPUT,5.5,1,100.0\r\n~OUTPUT,6,1,25.0\r\n".to_vec();
        assert_eq!(take_event(&mut buffer), Scan::Dropped);

        // The stream continues with the next line intact
        match take_event(&mut buffer) {
            Scan::Event(event) => assert_eq!(event.integration_id, 6),
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_take_event_drops_unparseable_value() {
        let mut buffer = b"~OUTPUT,5,1,1.2.3\r\n".to_vec();
        assert_eq!(take_event(&mut buffer), Scan::Dropped);
        assert!(buffer.is_empty());
    }
}
