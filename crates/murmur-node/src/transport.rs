//! The seam between a [`Node`](crate::Node) and whatever moves its
//! occurrences between peers.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use murmur_auth::{Authenticator, Credential};
use murmur_types::{Headers, PeerUuid, Result};

use crate::inbox::Inbox;

/// How long a node tolerates a quiet peer.
///
/// Measured from the last time the peer was heard from. After `evasive`
/// the node observes EVASIVE, after `silent` SILENT, and after `expired`
/// the peer is dropped with LEAVE for each of its groups and EXIT.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PeerTimeouts {
    pub evasive: Duration,
    pub silent: Duration,
    pub expired: Duration,
    /// How often peers are checked.
    pub interval: Duration,
}

impl Default for PeerTimeouts {
    fn default() -> Self {
        Self {
            evasive: Duration::from_millis(5_000),
            silent: Duration::from_millis(5_000),
            expired: Duration::from_millis(30_000),
            interval: Duration::from_millis(1_000),
        }
    }
}

/// What a node tells the transport about itself when it attaches.
#[derive(Clone, Debug)]
pub struct PeerRecord {
    pub uuid: PeerUuid,
    pub name: String,
    /// Endpoint announced in ENTER occurrences.
    pub endpoint: String,
    /// Address remote authenticators check against their allow/deny lists.
    pub host: String,
    pub headers: Headers,
    /// Credential remote authenticators evaluate.
    pub credential: Credential,
    /// Applied when this node judges its peers.
    pub timeouts: PeerTimeouts,
}

/// Delivers occurrences between attached nodes.
///
/// Every occurrence destined for a node is pushed onto the [`Inbox`] it
/// attached with.
pub trait Transport: Send + Sync {
    /// Makes `record` visible to the other attached nodes. `groups` are
    /// joined as part of the announcement. When `authenticator` is set,
    /// it decides which peers this node hears from.
    fn attach(
        &self,
        record: PeerRecord,
        inbox: Arc<Inbox>,
        authenticator: Option<Arc<Authenticator>>,
        groups: BTreeSet<String>,
    ) -> Result<()>;

    /// Removes a node. Peers that admitted it observe LEAVE for each of
    /// its groups, then EXIT. The node's own inbox is left alone.
    fn detach(&self, uuid: PeerUuid);

    fn join(&self, uuid: PeerUuid, group: &str) -> Result<()>;

    fn leave(&self, uuid: PeerUuid, group: &str) -> Result<()>;

    /// Opts `uuid` into leader election for `group`.
    fn contest(&self, uuid: PeerUuid, group: &str) -> Result<()>;

    fn whisper(&self, from: PeerUuid, to: PeerUuid, frames: Vec<Vec<u8>>) -> Result<()>;

    fn shout(&self, from: PeerUuid, group: &str, frames: Vec<Vec<u8>>) -> Result<()>;

    /// Peers `uuid` has admitted.
    fn peers(&self, uuid: PeerUuid) -> Vec<PeerUuid>;

    /// Admitted peers that are members of `group`.
    fn peers_by_group(&self, uuid: PeerUuid, group: &str) -> Vec<PeerUuid>;

    /// Groups `uuid` belongs to.
    fn own_groups(&self, uuid: PeerUuid) -> BTreeSet<String>;

    /// Groups the admitted peers of `uuid` belong to.
    fn peer_groups(&self, uuid: PeerUuid) -> BTreeSet<String>;

    fn peer_address(&self, uuid: PeerUuid, peer: PeerUuid) -> Option<String>;

    fn peer_header_value(&self, uuid: PeerUuid, peer: PeerUuid, name: &str) -> Option<String>;

    /// Marks `uuid` as alive without sending anything.
    fn heartbeat(&self, _uuid: PeerUuid) {}
}
