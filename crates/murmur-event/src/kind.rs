//! Event type tags.

use std::fmt;
use std::str::FromStr;

use murmur_types::MurmurError;

/// Tag of each event kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventType {
    /// A peer entered the network.
    Enter,
    /// A peer is slow to respond and is being pinged.
    Evasive,
    /// A peer stopped responding to pings.
    Silent,
    /// A peer left the network.
    Exit,
    /// A peer joined a group.
    Join,
    /// A peer left a group.
    Leave,
    /// A direct message from a peer.
    Whisper,
    /// A group message from a peer.
    Shout,
    /// A peer was elected leader of a group.
    Leader,
    /// The local node is stopping.
    Stop,
}

impl EventType {
    /// Every event type, in wire-tag order.
    pub const ALL: [EventType; 10] = [
        Self::Enter,
        Self::Evasive,
        Self::Silent,
        Self::Exit,
        Self::Join,
        Self::Leave,
        Self::Whisper,
        Self::Shout,
        Self::Leader,
        Self::Stop,
    ];

    /// Looks up a type by tag, ignoring case.
    ///
    /// Returns `None` for unknown names; see [`FromStr`] for the failing
    /// variant.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Returns the upper-case tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enter => "ENTER",
            Self::Evasive => "EVASIVE",
            Self::Silent => "SILENT",
            Self::Exit => "EXIT",
            Self::Join => "JOIN",
            Self::Leave => "LEAVE",
            Self::Whisper => "WHISPER",
            Self::Shout => "SHOUT",
            Self::Leader => "LEADER",
            Self::Stop => "STOP",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventType {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| MurmurError::UnknownEventType { name: s.to_string() })
    }
}
