//! Transport-level occurrences and their classification.

use murmur_types::{Headers, PeerUuid, Result};

use crate::event::{Event, Message};
use crate::kind::EventType;
use crate::synth::Fields;

/// An occurrence as a transport hands it over: a type tag plus whatever
/// fields came with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawOccurrence {
    pub kind: String,
    pub peer_uuid: PeerUuid,
    pub peer_name: String,
    pub peer_addr: Option<String>,
    pub headers: Headers,
    pub group: Option<String>,
    pub frames: Vec<Vec<u8>>,
}

impl RawOccurrence {
    /// Creates an occurrence with only the common fields set.
    pub fn new(kind: impl Into<String>, peer_uuid: PeerUuid, peer_name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            peer_uuid,
            peer_name: peer_name.into(),
            peer_addr: None,
            headers: Headers::new(),
            group: None,
            frames: Vec::new(),
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_frames(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.frames = frames;
        self
    }
}

/// Turns a raw occurrence into a typed [`Event`].
///
/// # Errors
///
/// [`murmur_types::MurmurError::UnknownEventType`] for an unrecognised
/// tag, [`murmur_types::MurmurError::MissingRequiredField`] when the
/// occurrence lacks a field its kind requires.
pub fn classify(raw: RawOccurrence) -> Result<Event> {
    let event_type: EventType = raw.kind.parse()?;
    let fields = Fields {
        peer_name: Some(raw.peer_name).filter(|name| !name.is_empty()),
        peer_addr: raw.peer_addr,
        headers: raw.headers,
        group: raw.group,
        msg: Message::new(raw.frames),
    };
    Event::build(event_type, raw.peer_uuid, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use murmur_types::MurmurError;

    #[test]
    fn classify_shout() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let uuid = PeerUuid::random();
        let raw = RawOccurrence::new("SHOUT", uuid, "bob")
            .with_group("ops")
            .with_frames(vec![b"hello".to_vec()]);
        let event = classify(raw)?;
        assert_eq!(event.event_type(), EventType::Shout);
        assert_eq!(event.peer_uuid(), uuid);
        assert_eq!(event.peer_name(), "bob");
        assert_eq!(event.message_text().as_deref(), Some("hello"));
        Ok(())
    }

    #[test]
    fn classify_enter_keeps_headers() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut headers = Headers::new();
        headers.insert("Content-type".into(), "application/json".into());
        let raw = RawOccurrence::new("ENTER", PeerUuid::random(), "carol")
            .with_addr("tcp://10.0.0.1:49200")
            .with_headers(headers);
        let event = classify(raw)?;
        assert!(matches!(event.kind(), EventKind::Enter { peer_addr } if peer_addr == "tcp://10.0.0.1:49200"));
        assert_eq!(event.header("Content-type"), Some("application/json"));
        Ok(())
    }

    #[test]
    fn classify_unknown_tag() {
        let raw = RawOccurrence::new("PING", PeerUuid::random(), "x");
        assert!(matches!(classify(raw), Err(MurmurError::UnknownEventType { .. })));
    }

    #[test]
    fn classify_missing_group() {
        let raw = RawOccurrence::new("JOIN", PeerUuid::random(), "x");
        assert!(matches!(
            classify(raw),
            Err(MurmurError::MissingRequiredField { field }) if field == "group"
        ));
    }

    #[test]
    fn empty_name_gets_default() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let uuid = PeerUuid::random();
        let event = classify(RawOccurrence::new("EXIT", uuid, ""))?;
        assert_eq!(event.peer_name(), format!("S-{}", uuid.short(6)));
        Ok(())
    }
}
