//! Fabricated events for tests.
//!
//! [`EventFactory`] produces events that look like they came from one
//! peer on a private network, so code that consumes events can be
//! exercised without running nodes.

use murmur_types::{Headers, PeerUuid, Result};
use rand::Rng;

use crate::event::Event;
use crate::kind::EventType;
use crate::synth::{Fields, SYNTHETIC_NAME_PREFIX};

/// Group used when none is given.
pub const DEFAULT_GROUP: &str = "default";

/// Message used when none is given.
pub const DEFAULT_MSG: &str = "A message.";

/// Network the fabricated peers pretend to live on.
pub const DEFAULT_NETWORK: &str = "10.18.4.0";

/// Returns a random host address inside [`DEFAULT_NETWORK`].
pub fn random_network_address() -> String {
    let last = rand::thread_rng().gen_range(1..=254u8);
    let prefix = DEFAULT_NETWORK.trim_end_matches('0');
    format!("{prefix}{last}")
}

/// Returns a random port from the ephemeral range.
pub fn random_ephemeral_port() -> u16 {
    rand::thread_rng().gen_range(49152..65535)
}

/// Returns a random `tcp://host:port` endpoint.
pub fn random_addr() -> String {
    format!("tcp://{}:{}", random_network_address(), random_ephemeral_port())
}

/// Builds events that all appear to come from the same peer.
#[derive(Clone, Debug)]
pub struct EventFactory {
    pub peer_uuid: PeerUuid,
    pub peer_name: String,
    pub peer_addr: String,
    pub headers: Headers,
    pub group: String,
    pub msg: String,
}

impl EventFactory {
    /// Creates a factory for a random peer.
    pub fn new() -> Self {
        Self::for_peer(PeerUuid::random())
    }

    /// Creates a factory for the given peer.
    pub fn for_peer(peer_uuid: PeerUuid) -> Self {
        Self {
            peer_uuid,
            peer_name: format!("{SYNTHETIC_NAME_PREFIX}{}", peer_uuid.short(6)),
            peer_addr: random_addr(),
            headers: Headers::new(),
            group: DEFAULT_GROUP.to_string(),
            msg: DEFAULT_MSG.to_string(),
        }
    }

    /// Sets the default group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets one header sent with ENTER events.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn base(&self) -> Fields {
        Fields::new().peer_name(self.peer_name.clone())
    }

    fn build(&self, event_type: EventType, fields: Fields) -> Result<Event> {
        Event::build(event_type, self.peer_uuid, fields)
    }

    pub fn enter(&self) -> Result<Event> {
        self.build(
            EventType::Enter,
            self.base()
                .peer_addr(self.peer_addr.clone())
                .headers(self.headers.clone()),
        )
    }

    pub fn join(&self) -> Result<Event> {
        self.join_group(&self.group)
    }

    pub fn join_group(&self, group: &str) -> Result<Event> {
        self.build(EventType::Join, self.base().group(group))
    }

    pub fn leave(&self) -> Result<Event> {
        self.build(EventType::Leave, self.base().group(self.group.clone()))
    }

    pub fn leader(&self) -> Result<Event> {
        self.build(EventType::Leader, self.base().group(self.group.clone()))
    }

    /// SHOUT of the default message to the default group.
    pub fn shout(&self) -> Result<Event> {
        self.shout_frames(&self.group, vec![self.msg.clone().into_bytes()])
    }

    /// SHOUT of `frames` to `group`. Empty `frames` falls back to the
    /// default message.
    pub fn shout_frames(&self, group: &str, frames: Vec<Vec<u8>>) -> Result<Event> {
        let frames = self.or_default_msg(frames);
        self.build(EventType::Shout, self.base().group(group).frames(frames))
    }

    /// WHISPER of the default message.
    pub fn whisper(&self) -> Result<Event> {
        self.whisper_frames(Vec::new())
    }

    pub fn whisper_frames(&self, frames: Vec<Vec<u8>>) -> Result<Event> {
        let frames = self.or_default_msg(frames);
        self.build(EventType::Whisper, self.base().frames(frames))
    }

    pub fn evasive(&self) -> Result<Event> {
        self.build(EventType::Evasive, self.base())
    }

    pub fn silent(&self) -> Result<Event> {
        self.build(EventType::Silent, self.base())
    }

    pub fn exit(&self) -> Result<Event> {
        self.build(EventType::Exit, self.base())
    }

    pub fn stop(&self) -> Result<Event> {
        self.build(EventType::Stop, self.base())
    }

    fn or_default_msg(&self, frames: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        if frames.is_empty() {
            vec![self.msg.clone().into_bytes()]
        } else {
            frames
        }
    }
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_addresses_stay_in_range() {
        for _ in 0..50 {
            let host = random_network_address();
            assert!(host.starts_with("10.18.4."));
            let last: u8 = host.rsplit('.').next().and_then(|s| s.parse().ok()).unwrap_or(0);
            assert!((1..=254).contains(&last));

            let port = random_ephemeral_port();
            assert!((49152..65535).contains(&port));
        }
        assert!(random_addr().starts_with("tcp://10.18.4."));
    }

    #[test]
    fn defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let factory = EventFactory::new();
        assert_eq!(factory.peer_name, format!("S-{}", factory.peer_uuid.short(6)));

        let join = factory.join()?;
        assert_eq!(join.group(), Some(DEFAULT_GROUP));
        assert_eq!(join.peer_uuid(), factory.peer_uuid);

        let shout = factory.shout()?;
        assert_eq!(shout.message_text().as_deref(), Some(DEFAULT_MSG));
        Ok(())
    }

    #[test]
    fn every_kind_builds() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let factory = EventFactory::new().with_group("ops").with_header("X-Role", "relay");
        let events = [
            factory.enter()?,
            factory.evasive()?,
            factory.silent()?,
            factory.exit()?,
            factory.join()?,
            factory.leave()?,
            factory.whisper()?,
            factory.shout()?,
            factory.leader()?,
            factory.stop()?,
        ];
        let types: Vec<EventType> = events.iter().map(Event::event_type).collect();
        assert_eq!(types, EventType::ALL.to_vec());
        assert_eq!(events[0].header("X-Role"), Some("relay"));
        assert_eq!(events[0].peer_addr(), Some(factory.peer_addr.as_str()));
        Ok(())
    }

    #[test]
    fn multipart_shout() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let factory = EventFactory::new();
        let event = factory.shout_frames("ops", vec![b"a".to_vec(), b"b".to_vec()])?;
        assert!(event.is_multipart());
        assert_eq!(event.group(), Some("ops"));
        Ok(())
    }
}
