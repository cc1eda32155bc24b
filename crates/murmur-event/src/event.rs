//! The [`Event`] value type.

use std::borrow::Cow;
use std::fmt;

use murmur_types::{Headers, PeerUuid};

use crate::kind::EventType;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message payload: one or more byte frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message(Vec<Vec<u8>>);

impl Message {
    /// Creates a message from frames. Returns `None` when `frames` is empty.
    pub fn new(frames: Vec<Vec<u8>>) -> Option<Self> {
        if frames.is_empty() {
            None
        } else {
            Some(Self(frames))
        }
    }

    /// Returns the first frame.
    pub fn first(&self) -> &[u8] {
        self.0.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns all frames in order.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// Returns the number of frames (always at least one).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no frame carries any bytes.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }

    /// Returns `true` when there is more than one frame.
    pub fn is_multipart(&self) -> bool {
        self.0.len() > 1
    }

    /// Consumes the message, returning its frames.
    pub fn into_frames(self) -> Vec<Vec<u8>> {
        self.0
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(vec![text.as_bytes().to_vec()])
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(vec![text.into_bytes()])
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Self(vec![bytes.to_vec()])
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(vec![bytes])
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Kind-specific part of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Peer entered the network at `peer_addr`.
    Enter {
        /// Endpoint the peer can be reached at.
        peer_addr: String,
    },
    /// Peer is slow to respond.
    Evasive,
    /// Peer stopped responding.
    Silent,
    /// Peer left the network.
    Exit,
    /// Peer joined `group`.
    Join {
        /// Group name.
        group: String,
    },
    /// Peer left `group`.
    Leave {
        /// Group name.
        group: String,
    },
    /// Direct message.
    Whisper {
        /// Payload.
        msg: Message,
    },
    /// Message to `group`.
    Shout {
        /// Group name.
        group: String,
        /// Payload.
        msg: Message,
    },
    /// Peer became leader of `group`.
    Leader {
        /// Group name.
        group: String,
    },
    /// Local node is stopping.
    Stop,
}

impl EventKind {
    /// Returns the type tag of this kind.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Enter { .. } => EventType::Enter,
            Self::Evasive => EventType::Evasive,
            Self::Silent => EventType::Silent,
            Self::Exit => EventType::Exit,
            Self::Join { .. } => EventType::Join,
            Self::Leave { .. } => EventType::Leave,
            Self::Whisper { .. } => EventType::Whisper,
            Self::Shout { .. } => EventType::Shout,
            Self::Leader { .. } => EventType::Leader,
            Self::Stop => EventType::Stop,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An immutable peer-network occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    peer_uuid: PeerUuid,
    peer_name: String,
    headers: Headers,
    kind: EventKind,
}

impl Event {
    /// Creates an event with no headers.
    pub fn new(peer_uuid: PeerUuid, peer_name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            peer_uuid,
            peer_name: peer_name.into(),
            headers: Headers::new(),
            kind,
        }
    }

    /// Replaces the event's headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the type tag.
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Returns the kind-specific payload.
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn peer_uuid(&self) -> PeerUuid {
        self.peer_uuid
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns one header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Peer endpoint; only ENTER events carry one.
    pub fn peer_addr(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Enter { peer_addr } => Some(peer_addr),
            _ => None,
        }
    }

    /// Group name of JOIN, LEAVE, LEADER and SHOUT events.
    pub fn group(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Join { group }
            | EventKind::Leave { group }
            | EventKind::Leader { group }
            | EventKind::Shout { group, .. } => Some(group),
            _ => None,
        }
    }

    /// The payload of WHISPER and SHOUT events.
    pub fn msg(&self) -> Option<&Message> {
        match &self.kind {
            EventKind::Whisper { msg } | EventKind::Shout { msg, .. } => Some(msg),
            _ => None,
        }
    }

    /// First frame of the payload.
    pub fn message(&self) -> Option<&[u8]> {
        self.msg().map(Message::first)
    }

    /// First frame of the payload as (lossy) UTF-8 text.
    pub fn message_text(&self) -> Option<Cow<'_, str>> {
        self.message().map(String::from_utf8_lossy)
    }

    /// All payload frames. Empty for events without a payload.
    pub fn multipart_message(&self) -> &[Vec<u8>] {
        self.msg().map(Message::frames).unwrap_or_default()
    }

    /// Returns `true` when the payload has more than one frame.
    pub fn is_multipart(&self) -> bool {
        self.msg().is_some_and(Message::is_multipart)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = self.peer_uuid;
        let name = &self.peer_name;
        match &self.kind {
            EventKind::Enter { peer_addr } => write!(
                f,
                "{uuid} ({name} at {peer_addr}) has entered the network: {:?}",
                self.headers
            ),
            EventKind::Evasive => write!(f, "{uuid} ({name}) is being evasive and will be pinged manually"),
            EventKind::Silent => write!(f, "{uuid} ({name}) isn't responding to pings"),
            EventKind::Exit => write!(f, "{uuid} ({name}) has left the network"),
            EventKind::Join { group } => write!(f, "{uuid} ({name}) joined «{group}»"),
            EventKind::Leave { group } => write!(f, "{uuid} ({name}) left «{group}»"),
            EventKind::Leader { group } => {
                write!(f, "{uuid} ({name}) has been elected leader of «{group}»")
            }
            EventKind::Whisper { msg } => write!(
                f,
                "whisper from {uuid} ({name}): {:?}",
                String::from_utf8_lossy(msg.first())
            ),
            EventKind::Shout { group, msg } => write!(
                f,
                "shout from {uuid} ({name}) on «{group}»: {:?}",
                String::from_utf8_lossy(msg.first())
            ),
            EventKind::Stop => write!(f, "{uuid} ({name}) node is stopping"),
        }
    }
}
