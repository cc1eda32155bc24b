//! Building events from loose fields.
//!
//! Required fields per kind:
//!
//! | Kind | Required |
//! |---|---|
//! | ENTER | `peer_addr` |
//! | JOIN, LEAVE, LEADER | `group` |
//! | WHISPER | `msg` |
//! | SHOUT | `group`, `msg` |
//! | EVASIVE, SILENT, EXIT, STOP | none |
//!
//! Missing fields are reported in the fixed order `peer_addr`, `group`,
//! `msg`, so the error always names the first one absent in that order.

use murmur_types::{Headers, MurmurError, PeerUuid, Result};

use crate::event::{Event, EventKind, Message};
use crate::kind::EventType;

/// Prefix of names given to synthesized peers without one.
pub const SYNTHETIC_NAME_PREFIX: &str = "S-";

/// Optional fields used to build an event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields {
    pub peer_name: Option<String>,
    pub peer_addr: Option<String>,
    pub headers: Headers,
    pub group: Option<String>,
    pub msg: Option<Message>,
}

impl Fields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_name(mut self, name: impl Into<String>) -> Self {
        self.peer_name = Some(name.into());
        self
    }

    pub fn peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Adds one header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets a single-frame payload.
    pub fn msg(mut self, msg: impl Into<Message>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    /// Sets a multi-frame payload. An empty list leaves the payload unset.
    pub fn frames(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.msg = Message::new(frames);
        self
    }
}

impl Event {
    /// Builds an event of `event_type` from `fields`.
    ///
    /// # Errors
    ///
    /// [`MurmurError::MissingRequiredField`] naming the first absent
    /// required field.
    pub fn build(event_type: EventType, peer_uuid: PeerUuid, fields: Fields) -> Result<Event> {
        let Fields {
            peer_name,
            peer_addr,
            headers,
            group,
            msg,
        } = fields;

        let kind = match event_type {
            EventType::Enter => EventKind::Enter {
                peer_addr: required(peer_addr, "peer_addr")?,
            },
            EventType::Evasive => EventKind::Evasive,
            EventType::Silent => EventKind::Silent,
            EventType::Exit => EventKind::Exit,
            EventType::Join => EventKind::Join {
                group: required(group, "group")?,
            },
            EventType::Leave => EventKind::Leave {
                group: required(group, "group")?,
            },
            EventType::Leader => EventKind::Leader {
                group: required(group, "group")?,
            },
            EventType::Whisper => EventKind::Whisper { msg: required(msg, "msg")? },
            EventType::Shout => {
                let group = required(group, "group")?;
                EventKind::Shout {
                    group,
                    msg: required(msg, "msg")?,
                }
            }
            EventType::Stop => EventKind::Stop,
        };

        let peer_name = peer_name
            .unwrap_or_else(|| format!("{SYNTHETIC_NAME_PREFIX}{}", peer_uuid.short(6)));
        Ok(Event::new(peer_uuid, peer_name, kind).with_headers(headers))
    }
}

/// Builds an event from a type tag and fields.
///
/// The tag is matched ignoring case.
///
/// # Errors
///
/// [`MurmurError::UnknownEventType`] for an unknown tag, otherwise as
/// [`Event::build`].
pub fn synthesize(type_name: &str, peer_uuid: PeerUuid, fields: Fields) -> Result<Event> {
    let event_type: EventType = type_name.parse()?;
    Event::build(event_type, peer_uuid, fields)
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| MurmurError::MissingRequiredField {
        field: field.to_string(),
    })
}
