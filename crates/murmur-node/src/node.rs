//! Node lifecycle and control surface.
//!
//! # State machine
//!
//! ```text
//! Created ──start()──▶ Running ──stop()──▶ Stopped
//!    └──────────────stop()───────────────────▲
//! ```
//!
//! Group membership and security settings may be configured while
//! `Created`; they are announced to the transport on `start()`. Starting
//! twice, or after `stop()`, is rejected with
//! [`MurmurError::NetworkError`]. `stop()` is idempotent: the first call
//! queues a STOP event and closes the inbox, so a receiver sees STOP
//! followed by [`MurmurError::HangUp`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use murmur_auth::{Authenticator, Credential};
use murmur_cert::Certificate;
use murmur_event::{classify, Event, EventType, Message, RawOccurrence};
use murmur_types::headers::{header_value, HeaderKey};
use murmur_types::{Headers, MurmurError, PeerUuid, Result};
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::inbox::Inbox;
use crate::transport::{PeerRecord, PeerTimeouts, Transport};

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Configured, not yet visible to peers.
    Created,
    /// Attached to the transport.
    Running,
    /// Detached; the inbox is closed.
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Mutable part of a node, guarded by one lock.
struct Settings {
    state: NodeState,
    headers: Headers,
    credential: Credential,
    authenticator: Option<Arc<Authenticator>>,
    certificate: Option<Certificate>,
    groups: BTreeSet<String>,
    contested: BTreeSet<String>,
}

/// A group-messaging peer.
///
/// Nodes are `Send + Sync`; share one between tasks with an `Arc`.
pub struct Node {
    uuid: PeerUuid,
    name: String,
    endpoint: String,
    host: String,
    verbose: bool,
    timeouts: PeerTimeouts,
    transport: Arc<dyn Transport>,
    inbox: Arc<Inbox>,
    settings: Mutex<Settings>,
}

impl Node {
    /// Creates a node on `transport`.
    ///
    /// # Errors
    ///
    /// [`MurmurError::ConfigError`] if `config` does not validate.
    pub fn new(transport: Arc<dyn Transport>, config: &NodeConfig) -> Result<Self> {
        config.validate()?;

        let uuid = PeerUuid::random();
        let name = config.name.clone().unwrap_or_else(|| uuid.short(6));
        let endpoint = match (&config.advertised_endpoint, config.port) {
            (Some(advertised), _) => advertised.clone(),
            (None, 0) => format!("inproc://{uuid}"),
            (None, port) => format!("tcp://{}:{port}", config.host),
        };
        debug!(node = %uuid, %name, %endpoint, "node created");

        Ok(Self {
            uuid,
            name,
            endpoint,
            host: config.host.clone(),
            verbose: config.verbose,
            timeouts: config.timeouts(),
            transport,
            inbox: Arc::new(Inbox::new()),
            settings: Mutex::new(Settings {
                state: NodeState::Created,
                headers: config.headers.clone(),
                credential: Credential::Null,
                authenticator: None,
                certificate: None,
                groups: BTreeSet::new(),
                contested: BTreeSet::new(),
            }),
        })
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn uuid(&self) -> PeerUuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint announced to peers.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Timeouts this node applies to quiet peers.
    pub fn timeouts(&self) -> PeerTimeouts {
        self.timeouts
    }

    pub fn state(&self) -> NodeState {
        self.settings().state
    }

    pub(crate) fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    // -----------------------------------------------------------------------
    // Headers and security
    // -----------------------------------------------------------------------

    /// Sets one header announced on start.
    ///
    /// Symbolic keys are rewritten to header form; the value is coerced
    /// to 7-bit text.
    pub fn set_header(&self, key: impl Into<HeaderKey>, value: impl fmt::Display) -> Result<()> {
        let mut settings = self.configurable()?;
        settings.headers.insert(key.into().to_wire(), header_value(value));
        Ok(())
    }

    /// Sets several headers at once.
    pub fn set_headers<I, K, V>(&self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<HeaderKey>,
        V: fmt::Display,
    {
        let mut settings = self.configurable()?;
        for (key, value) in headers {
            settings.headers.insert(key.into().to_wire(), header_value(value));
        }
        Ok(())
    }

    /// Returns the headers this node announces.
    pub fn headers(&self) -> Headers {
        self.settings().headers.clone()
    }

    /// Uses `cert` as this node's CURVE identity.
    ///
    /// # Errors
    ///
    /// [`MurmurError::NoSecretKey`] if `cert` holds only a public key.
    pub fn set_certificate(&self, cert: Certificate) -> Result<()> {
        if !cert.has_secret_key() {
            return Err(MurmurError::NoSecretKey);
        }
        let mut settings = self.configurable()?;
        settings.credential = Credential::Curve {
            public_key: *cert.public_key(),
        };
        settings.certificate = Some(cert);
        Ok(())
    }

    /// Returns the certificate set with [`Node::set_certificate`].
    pub fn certificate(&self) -> Option<Certificate> {
        self.settings().certificate.clone()
    }

    /// Presents a PLAIN username and password to peers.
    pub fn set_plain_credentials(&self, username: impl Into<String>, password: impl Into<String>) -> Result<()> {
        self.configurable()?.credential = Credential::Plain {
            username: username.into(),
            password: password.into(),
        };
        Ok(())
    }

    /// Presents an externally established identity to peers.
    pub fn set_external_principal(&self, principal: impl Into<String>, asserted: bool) -> Result<()> {
        self.configurable()?.credential = Credential::External {
            principal: principal.into(),
            asserted,
        };
        Ok(())
    }

    /// Gates which peers this node hears from.
    pub fn set_authenticator(&self, authenticator: Arc<Authenticator>) -> Result<()> {
        self.configurable()?.authenticator = Some(authenticator);
        Ok(())
    }

    /// Locks settings that may only change before start.
    fn configurable(&self) -> Result<MutexGuard<'_, Settings>> {
        let settings = self.settings();
        if settings.state != NodeState::Created {
            return Err(MurmurError::NetworkError {
                reason: format!("node {} is {}, settings are fixed", self.uuid, settings.state),
            });
        }
        Ok(settings)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Attaches the node to its transport.
    ///
    /// A failed start leaves the node detached and still `Created`.
    ///
    /// # Errors
    ///
    /// [`MurmurError::NetworkError`] if the node is not `Created` or the
    /// transport refuses it.
    pub fn start(&self) -> Result<()> {
        let mut settings = self.settings();
        if settings.state != NodeState::Created {
            return Err(MurmurError::NetworkError {
                reason: format!("cannot start node {}: it is {}", self.uuid, settings.state),
            });
        }

        let record = PeerRecord {
            uuid: self.uuid,
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            host: self.host.clone(),
            headers: settings.headers.clone(),
            credential: settings.credential.clone(),
            timeouts: self.timeouts,
        };
        self.transport.attach(
            record,
            Arc::clone(&self.inbox),
            settings.authenticator.clone(),
            settings.groups.clone(),
        )?;
        for group in &settings.contested {
            if let Err(e) = self.transport.contest(self.uuid, group) {
                warn!(node = %self.uuid, group = %group, error = %e, "contest failed, detaching");
                self.transport.detach(self.uuid);
                return Err(e);
            }
        }

        settings.state = NodeState::Running;
        info!(
            node = %self.uuid,
            name = %self.name,
            endpoint = %self.endpoint,
            groups = settings.groups.len(),
            "node started"
        );
        Ok(())
    }

    /// Stops the node. Later calls do nothing.
    pub fn stop(&self) {
        let was_running = {
            let mut settings = self.settings();
            let previous = settings.state;
            if previous == NodeState::Stopped {
                return;
            }
            settings.state = NodeState::Stopped;
            previous == NodeState::Running
        };

        if was_running {
            self.transport.detach(self.uuid);
        }
        self.inbox
            .push(RawOccurrence::new(EventType::Stop.name(), self.uuid, self.name.clone()));
        self.inbox.close();
        info!(node = %self.uuid, name = %self.name, "node stopped");
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn join(&self, group: &str) -> Result<()> {
        let mut settings = self.not_stopped()?;
        if settings.state == NodeState::Running {
            self.transport.join(self.uuid, group)?;
        }
        settings.groups.insert(group.to_string());
        Ok(())
    }

    pub fn leave(&self, group: &str) -> Result<()> {
        let mut settings = self.not_stopped()?;
        if settings.state == NodeState::Running {
            self.transport.leave(self.uuid, group)?;
        }
        settings.groups.remove(group);
        Ok(())
    }

    /// Takes part in leader election for `group`.
    pub fn contest(&self, group: &str) -> Result<()> {
        let mut settings = self.not_stopped()?;
        if settings.state == NodeState::Running {
            self.transport.contest(self.uuid, group)?;
        }
        settings.contested.insert(group.to_string());
        Ok(())
    }

    /// Groups this node belongs to.
    pub fn own_groups(&self) -> BTreeSet<String> {
        self.settings().groups.clone()
    }

    fn not_stopped(&self) -> Result<MutexGuard<'_, Settings>> {
        let settings = self.settings();
        if settings.state == NodeState::Stopped {
            return Err(MurmurError::NetworkError {
                reason: format!("node {} is stopped", self.uuid),
            });
        }
        Ok(settings)
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Sends `msg` to one peer.
    pub fn whisper(&self, peer: PeerUuid, msg: impl Into<Message>) -> Result<()> {
        self.whisper_frames(peer, msg.into().into_frames())
    }

    /// Sends a multi-frame message to one peer.
    ///
    /// # Errors
    ///
    /// [`MurmurError::MissingRequiredField`] for empty `frames`,
    /// [`MurmurError::NetworkError`] unless the node is running.
    pub fn whisper_frames(&self, peer: PeerUuid, frames: Vec<Vec<u8>>) -> Result<()> {
        self.ensure_sendable(&frames)?;
        self.transport.whisper(self.uuid, peer, frames)
    }

    /// Sends `msg` to every member of `group`.
    pub fn shout(&self, group: &str, msg: impl Into<Message>) -> Result<()> {
        self.shout_frames(group, msg.into().into_frames())
    }

    /// Sends a multi-frame message to every member of `group`.
    pub fn shout_frames(&self, group: &str, frames: Vec<Vec<u8>>) -> Result<()> {
        self.ensure_sendable(&frames)?;
        self.transport.shout(self.uuid, group, frames)
    }

    fn ensure_sendable(&self, frames: &[Vec<u8>]) -> Result<()> {
        if frames.is_empty() {
            return Err(MurmurError::MissingRequiredField { field: "msg".into() });
        }
        let state = self.state();
        if state != NodeState::Running {
            return Err(MurmurError::NetworkError {
                reason: format!("node {} is {}, cannot send", self.uuid, state),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Peer queries
    // -----------------------------------------------------------------------

    /// Peers this node hears from.
    pub fn peers(&self) -> Vec<PeerUuid> {
        self.transport.peers(self.uuid)
    }

    pub fn peers_by_group(&self, group: &str) -> Vec<PeerUuid> {
        self.transport.peers_by_group(self.uuid, group)
    }

    /// Groups any known peer belongs to.
    pub fn peer_groups(&self) -> BTreeSet<String> {
        self.transport.peer_groups(self.uuid)
    }

    pub fn peer_address(&self, peer: PeerUuid) -> Option<String> {
        self.transport.peer_address(self.uuid, peer)
    }

    pub fn peer_header_value(&self, peer: PeerUuid, name: &str) -> Option<String> {
        self.transport.peer_header_value(self.uuid, peer, name)
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// `true` when [`Node::try_recv`] would not return `Ok(None)`.
    pub fn is_ready(&self) -> bool {
        self.inbox.is_ready()
    }

    /// Returns the next event without waiting.
    ///
    /// Receiving counts as a sign of life towards peers.
    ///
    /// # Errors
    ///
    /// [`MurmurError::HangUp`] once the node is stopped and drained.
    pub fn try_recv(&self) -> Result<Option<Event>> {
        self.transport.heartbeat(self.uuid);
        match self.inbox.try_pop() {
            Some(raw) => {
                let event = classify(raw)?;
                if self.verbose {
                    info!(node = %self.uuid, "{event}");
                } else {
                    trace!(node = %self.uuid, kind = %event.event_type(), peer = %event.peer_uuid(), "event");
                }
                Ok(Some(event))
            }
            None if self.inbox.is_closed() => Err(MurmurError::HangUp),
            None => Ok(None),
        }
    }

    /// Waits for the next event.
    ///
    /// # Errors
    ///
    /// [`MurmurError::HangUp`] once the node is stopped and drained.
    pub async fn recv(&self) -> Result<Event> {
        loop {
            if let Some(event) = self.try_recv()? {
                return Ok(event);
            }
            self.inbox.readable().await;
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let state = self.settings().state;
        if state == NodeState::Running {
            self.transport.detach(self.uuid);
        }
        self.inbox.close();
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.name, self.uuid, self.endpoint)
    }
}
