//! Attribute criteria for selecting events.
//!
//! A [`Criteria`] matches an event when every [`Criterion`] in it does.
//! A criterion on an attribute the event does not have (a group on an
//! ENTER, say) simply fails; it is never an error.

use murmur_types::PeerUuid;

use crate::event::Event;
use crate::kind::EventType;

/// One expected attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Criterion {
    PeerUuid(PeerUuid),
    PeerName(String),
    PeerAddr(String),
    Group(String),
    /// Compared against the first payload frame.
    Message(Vec<u8>),
    Header {
        name: String,
        value: String,
    },
    Type(EventType),
    /// An attribute no event has. Never matches.
    Unknown {
        name: String,
    },
}

impl Criterion {
    /// Builds a criterion from a textual attribute name and value.
    ///
    /// Recognised names are `peer_uuid`, `peer_name`, `peer_addr`,
    /// `group`, `message` (or `msg`), `type`, and `header:<Name>`.
    /// Anything else, including a `peer_uuid` or `type` value that does
    /// not parse, yields [`Criterion::Unknown`].
    pub fn from_pair(name: &str, value: &str) -> Self {
        let unknown = || Self::Unknown {
            name: name.to_string(),
        };
        match name {
            "peer_uuid" => value.parse().map(Self::PeerUuid).unwrap_or_else(|_| unknown()),
            "peer_name" => Self::PeerName(value.to_string()),
            "peer_addr" => Self::PeerAddr(value.to_string()),
            "group" => Self::Group(value.to_string()),
            "message" | "msg" => Self::Message(value.as_bytes().to_vec()),
            "type" => EventType::from_name(value).map(Self::Type).unwrap_or_else(unknown),
            _ => match name.strip_prefix("header:") {
                Some(header) => Self::Header {
                    name: header.to_string(),
                    value: value.to_string(),
                },
                None => unknown(),
            },
        }
    }

    /// Tests this criterion against `event`.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::PeerUuid(uuid) => event.peer_uuid() == *uuid,
            Self::PeerName(name) => event.peer_name() == name.as_str(),
            Self::PeerAddr(addr) => event.peer_addr() == Some(addr.as_str()),
            Self::Group(group) => event.group() == Some(group.as_str()),
            Self::Message(bytes) => event.message() == Some(bytes.as_slice()),
            Self::Header { name, value } => event.header(name) == Some(value.as_str()),
            Self::Type(event_type) => event.event_type() == *event_type,
            Self::Unknown { .. } => false,
        }
    }
}

/// A conjunction of criteria. The empty set matches every event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Criteria(Vec<Criterion>);

impl Criteria {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a criterion.
    pub fn with(mut self, criterion: Criterion) -> Self {
        self.0.push(criterion);
        self
    }

    pub fn peer_uuid(self, uuid: PeerUuid) -> Self {
        self.with(Criterion::PeerUuid(uuid))
    }

    pub fn peer_name(self, name: impl Into<String>) -> Self {
        self.with(Criterion::PeerName(name.into()))
    }

    pub fn peer_addr(self, addr: impl Into<String>) -> Self {
        self.with(Criterion::PeerAddr(addr.into()))
    }

    pub fn group(self, group: impl Into<String>) -> Self {
        self.with(Criterion::Group(group.into()))
    }

    pub fn message(self, message: impl AsRef<[u8]>) -> Self {
        self.with(Criterion::Message(message.as_ref().to_vec()))
    }

    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(Criterion::Header {
            name: name.into(),
            value: value.into(),
        })
    }

    /// Returns the individual criteria.
    pub fn criteria(&self) -> &[Criterion] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when every criterion matches `event`.
    pub fn matches(&self, event: &Event) -> bool {
        self.0.iter().all(|c| c.matches(event))
    }
}

impl FromIterator<Criterion> for Criteria {
    fn from_iter<I: IntoIterator<Item = Criterion>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Event {
    /// Returns `true` when `criteria` all hold for this event.
    pub fn matches(&self, criteria: &Criteria) -> bool {
        criteria.matches(self)
    }
}
