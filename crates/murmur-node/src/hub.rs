//! In-process [`Transport`].
//!
//! A [`MemoryHub`] links every node attached to it. When a node attaches,
//! each side's authenticator decides once whether it hears from the
//! other; from then on occurrences only flow along admitted links.
//!
//! Leader election is deterministic: among the members of a group that
//! called `contest`, the lowest UUID leads.
//!
//! # Liveness
//!
//! A member is heard from whenever it sends, changes groups, or receives.
//! [`MemoryHub::sweep`] judges every link by the observing member's
//! [`PeerTimeouts`]: a quiet peer is reported EVASIVE, then SILENT, and
//! finally dropped from that observer's view with LEAVE and EXIT. A
//! dropped link is not restored. [`MemoryHub::spawn_sweeper`] runs the
//! sweep in the background.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use murmur_auth::{Authenticator, Decision};
use murmur_event::{EventType, RawOccurrence};
use murmur_types::{MurmurError, PeerUuid, Result};
use tracing::{debug, trace, warn};

use crate::inbox::Inbox;
use crate::transport::{PeerRecord, PeerTimeouts, Transport};

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

struct Member {
    record: PeerRecord,
    inbox: Arc<Inbox>,
    authenticator: Option<Arc<Authenticator>>,
    groups: BTreeSet<String>,
    contested: BTreeSet<String>,
    /// Peers this member hears from.
    admitted: BTreeSet<PeerUuid>,
    last_heard: Instant,
    /// Quiet peers and what has been reported about them.
    quiet: BTreeMap<PeerUuid, Quiet>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Quiet {
    Evasive,
    Silent,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Verdict {
    Evasive,
    Silent,
    Expired,
}

impl Member {
    fn hears(&self, peer: PeerUuid) -> bool {
        self.admitted.contains(&peer)
    }

    /// Runs this member's authenticator against `remote`.
    fn admits(&self, remote: &PeerRecord) -> bool {
        let Some(auth) = &self.authenticator else {
            return true;
        };
        match auth.decide(&remote.host, &remote.credential) {
            Ok(Decision::Admit) => true,
            Ok(Decision::Reject(reason)) => {
                warn!(
                    node = %self.record.uuid,
                    peer = %remote.uuid,
                    host = %remote.host,
                    %reason,
                    "peer rejected"
                );
                false
            }
            Err(e) => {
                warn!(
                    node = %self.record.uuid,
                    peer = %remote.uuid,
                    error = %e,
                    "admission check failed, peer rejected"
                );
                false
            }
        }
    }
}

fn occurrence(kind: EventType, from: &PeerRecord) -> RawOccurrence {
    RawOccurrence::new(kind.name(), from.uuid, from.name.clone())
}

fn deliver(to: &Member, raw: RawOccurrence) {
    trace!(node = %to.record.uuid, peer = %raw.peer_uuid, kind = %raw.kind, "deliver");
    if !to.inbox.push(raw) {
        trace!(node = %to.record.uuid, "inbox closed, occurrence dropped");
    }
}

// ---------------------------------------------------------------------------
// MemoryHub
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HubState {
    members: BTreeMap<PeerUuid, Member>,
    leaders: BTreeMap<String, PeerUuid>,
}

impl HubState {
    fn member(&self, uuid: PeerUuid) -> Result<&Member> {
        self.members.get(&uuid).ok_or_else(|| not_attached(uuid))
    }

    fn member_mut(&mut self, uuid: PeerUuid) -> Result<&mut Member> {
        self.members.get_mut(&uuid).ok_or_else(|| not_attached(uuid))
    }

    /// Pushes an occurrence from `from` to every other member that hears
    /// it and passes `filter`.
    fn broadcast(&self, from: PeerUuid, raw: &RawOccurrence, filter: impl Fn(&Member) -> bool) {
        for member in self.members.values() {
            if member.record.uuid != from && member.hears(from) && filter(member) {
                deliver(member, raw.clone());
            }
        }
    }

    /// Records that `uuid` was heard from.
    fn touch(&mut self, uuid: PeerUuid) {
        let now = Instant::now();
        for member in self.members.values_mut() {
            if member.record.uuid == uuid {
                member.last_heard = now;
            } else {
                member.quiet.remove(&uuid);
            }
        }
    }

    /// Judges every admitted link against the observer's timeouts.
    fn verdicts(&self, now: Instant) -> Vec<(PeerUuid, PeerUuid, Verdict)> {
        let mut verdicts = Vec::new();
        for observer in self.members.values() {
            let limits = observer.record.timeouts;
            for peer in &observer.admitted {
                let Some(remote) = self.members.get(peer) else {
                    continue;
                };
                let quiet_for = now.saturating_duration_since(remote.last_heard);
                let reported = observer.quiet.get(peer).copied();
                let link = (observer.record.uuid, *peer);
                if quiet_for >= limits.expired {
                    verdicts.push((link.0, link.1, Verdict::Expired));
                    continue;
                }
                if quiet_for >= limits.evasive && reported.is_none() {
                    verdicts.push((link.0, link.1, Verdict::Evasive));
                }
                if quiet_for >= limits.silent && reported != Some(Quiet::Silent) {
                    verdicts.push((link.0, link.1, Verdict::Silent));
                }
            }
        }
        verdicts
    }

    /// Recomputes the leader of `group` and announces a change.
    fn elect(&mut self, group: &str) {
        let winner = self
            .members
            .values()
            .filter(|m| m.groups.contains(group) && m.contested.contains(group))
            .map(|m| m.record.uuid)
            .min();

        let Some(winner) = winner else {
            self.leaders.remove(group);
            return;
        };
        if self.leaders.get(group) == Some(&winner) {
            return;
        }
        self.leaders.insert(group.to_string(), winner);

        let Some(leader) = self.members.get(&winner) else {
            return;
        };
        debug!(group, leader = %winner, "leader elected");
        let raw = occurrence(EventType::Leader, &leader.record).with_group(group);
        deliver(leader, raw.clone());
        self.broadcast(winner, &raw, |m| m.groups.contains(group));
    }
}

fn not_attached(uuid: PeerUuid) -> MurmurError {
    MurmurError::NetworkError {
        reason: format!("node {uuid} is not attached"),
    }
}

/// Links nodes living in the same process.
#[derive(Default)]
pub struct MemoryHub {
    state: Mutex<HubState>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for sharing one hub between nodes.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of attached nodes.
    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().members.is_empty()
    }

    /// Current leader of `group`, if any.
    pub fn leader(&self, group: &str) -> Option<PeerUuid> {
        self.lock().leaders.get(group).copied()
    }

    /// Tells the peers of `peer` that it is slow to respond.
    pub fn report_evasive(&self, peer: PeerUuid) -> Result<()> {
        self.report(peer, EventType::Evasive)
    }

    /// Tells the peers of `peer` that it stopped responding.
    pub fn report_silent(&self, peer: PeerUuid) -> Result<()> {
        self.report(peer, EventType::Silent)
    }

    fn report(&self, peer: PeerUuid, kind: EventType) -> Result<()> {
        let state = self.lock();
        let raw = occurrence(kind, &state.member(peer)?.record);
        state.broadcast(peer, &raw, |_| true);
        Ok(())
    }

    /// Reports quiet peers and drops expired links. Returns the number of
    /// links dropped.
    pub fn sweep(&self) -> usize {
        let mut state = self.lock();
        let verdicts = state.verdicts(Instant::now());

        let mut expired = 0;
        for (observer, peer, verdict) in verdicts {
            let Some(remote) = state.members.get(&peer) else {
                continue;
            };
            let record = remote.record.clone();
            let groups = remote.groups.clone();
            let Some(member) = state.members.get_mut(&observer) else {
                continue;
            };
            match verdict {
                Verdict::Evasive => {
                    member.quiet.insert(peer, Quiet::Evasive);
                    deliver(member, occurrence(EventType::Evasive, &record));
                }
                Verdict::Silent => {
                    member.quiet.insert(peer, Quiet::Silent);
                    deliver(member, occurrence(EventType::Silent, &record));
                }
                Verdict::Expired => {
                    member.admitted.remove(&peer);
                    member.quiet.remove(&peer);
                    for group in groups {
                        deliver(member, occurrence(EventType::Leave, &record).with_group(group));
                    }
                    deliver(member, occurrence(EventType::Exit, &record));
                    debug!(node = %observer, %peer, "peer expired");
                    expired += 1;
                }
            }
        }
        expired
    }

    /// Sweeps in the background until the hub is dropped, pausing for the
    /// shortest interval any attached node asks for.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let period = match hub.upgrade() {
                    Some(hub) => {
                        hub.sweep();
                        hub.sweep_period()
                    }
                    None => return,
                };
                tokio::time::sleep(period).await;
            }
        })
    }

    fn sweep_period(&self) -> Duration {
        self.lock()
            .members
            .values()
            .map(|m| m.record.timeouts.interval)
            .min()
            .unwrap_or_else(|| PeerTimeouts::default().interval)
    }
}

impl fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryHub")
            .field("members", &state.members.len())
            .field("leaders", &state.leaders)
            .finish()
    }
}

impl Transport for MemoryHub {
    fn attach(
        &self,
        record: PeerRecord,
        inbox: Arc<Inbox>,
        authenticator: Option<Arc<Authenticator>>,
        groups: BTreeSet<String>,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.members.contains_key(&record.uuid) {
            return Err(MurmurError::NetworkError {
                reason: format!("node {} is already attached", record.uuid),
            });
        }

        let mut newcomer = Member {
            record,
            inbox,
            authenticator,
            groups,
            contested: BTreeSet::new(),
            admitted: BTreeSet::new(),
            last_heard: Instant::now(),
            quiet: BTreeMap::new(),
        };

        let state = &mut *state;
        for existing in state.members.values_mut() {
            if existing.admits(&newcomer.record) {
                existing.admitted.insert(newcomer.record.uuid);
                announce(&newcomer, existing, &state.leaders);
            }
            if newcomer.admits(&existing.record) {
                newcomer.admitted.insert(existing.record.uuid);
                announce(existing, &newcomer, &state.leaders);
            }
        }

        debug!(
            node = %newcomer.record.uuid,
            endpoint = %newcomer.record.endpoint,
            peers = newcomer.admitted.len(),
            "attached"
        );
        state.members.insert(newcomer.record.uuid, newcomer);
        Ok(())
    }

    fn detach(&self, uuid: PeerUuid) {
        let mut state = self.lock();
        let Some(gone) = state.members.remove(&uuid) else {
            return;
        };

        for member in state.members.values_mut() {
            if !member.admitted.remove(&uuid) {
                continue;
            }
            for group in &gone.groups {
                deliver(member, occurrence(EventType::Leave, &gone.record).with_group(group.clone()));
            }
            deliver(member, occurrence(EventType::Exit, &gone.record));
        }

        let led: Vec<String> = state
            .leaders
            .iter()
            .filter(|(_, leader)| **leader == uuid)
            .map(|(group, _)| group.clone())
            .collect();
        for group in led {
            state.leaders.remove(&group);
            state.elect(&group);
        }
        debug!(node = %uuid, "detached");
    }

    fn join(&self, uuid: PeerUuid, group: &str) -> Result<()> {
        let mut state = self.lock();
        let member = state.member_mut(uuid)?;
        let joined = member.groups.insert(group.to_string());
        state.touch(uuid);
        if !joined {
            return Ok(());
        }
        let member = state.member(uuid)?;
        let contested = member.contested.contains(group);
        let raw = occurrence(EventType::Join, &member.record).with_group(group);
        state.broadcast(uuid, &raw, |_| true);

        let current = state.leaders.get(group).and_then(|l| state.members.get(l));
        if let (Some(leader), Ok(member)) = (current, state.member(uuid)) {
            if leader.record.uuid != uuid && member.hears(leader.record.uuid) {
                deliver(member, occurrence(EventType::Leader, &leader.record).with_group(group));
            }
        }
        if contested {
            state.elect(group);
        }
        Ok(())
    }

    fn leave(&self, uuid: PeerUuid, group: &str) -> Result<()> {
        let mut state = self.lock();
        let member = state.member_mut(uuid)?;
        let left = member.groups.remove(group);
        state.touch(uuid);
        if !left {
            return Ok(());
        }
        let member = state.member(uuid)?;
        let raw = occurrence(EventType::Leave, &member.record).with_group(group);
        state.broadcast(uuid, &raw, |_| true);
        if state.leaders.get(group) == Some(&uuid) {
            state.leaders.remove(group);
            state.elect(group);
        }
        Ok(())
    }

    fn contest(&self, uuid: PeerUuid, group: &str) -> Result<()> {
        let mut state = self.lock();
        let member = state.member_mut(uuid)?;
        member.contested.insert(group.to_string());
        let in_group = member.groups.contains(group);
        state.touch(uuid);
        if in_group {
            state.elect(group);
        }
        Ok(())
    }

    fn whisper(&self, from: PeerUuid, to: PeerUuid, frames: Vec<Vec<u8>>) -> Result<()> {
        let mut state = self.lock();
        state.member(from)?;
        state.touch(from);
        let sender = state.member(from)?;
        match state.members.get(&to) {
            Some(target) if target.hears(from) => {
                deliver(target, occurrence(EventType::Whisper, &sender.record).with_frames(frames));
            }
            _ => debug!(from = %from, to = %to, "whisper dropped, no admitted link"),
        }
        Ok(())
    }

    fn shout(&self, from: PeerUuid, group: &str, frames: Vec<Vec<u8>>) -> Result<()> {
        let mut state = self.lock();
        state.member(from)?;
        state.touch(from);
        let raw = occurrence(EventType::Shout, &state.member(from)?.record)
            .with_group(group)
            .with_frames(frames);
        state.broadcast(from, &raw, |m| m.groups.contains(group));
        Ok(())
    }

    fn peers(&self, uuid: PeerUuid) -> Vec<PeerUuid> {
        let state = self.lock();
        state
            .members
            .get(&uuid)
            .map(|m| m.admitted.iter().copied().collect())
            .unwrap_or_default()
    }

    fn peers_by_group(&self, uuid: PeerUuid, group: &str) -> Vec<PeerUuid> {
        let state = self.lock();
        let Some(member) = state.members.get(&uuid) else {
            return Vec::new();
        };
        member
            .admitted
            .iter()
            .filter(|p| state.members.get(*p).is_some_and(|m| m.groups.contains(group)))
            .copied()
            .collect()
    }

    fn own_groups(&self, uuid: PeerUuid) -> BTreeSet<String> {
        self.lock()
            .members
            .get(&uuid)
            .map(|m| m.groups.clone())
            .unwrap_or_default()
    }

    fn peer_groups(&self, uuid: PeerUuid) -> BTreeSet<String> {
        let state = self.lock();
        let Some(member) = state.members.get(&uuid) else {
            return BTreeSet::new();
        };
        member
            .admitted
            .iter()
            .filter_map(|p| state.members.get(p))
            .flat_map(|m| m.groups.iter().cloned())
            .collect()
    }

    fn peer_address(&self, uuid: PeerUuid, peer: PeerUuid) -> Option<String> {
        let state = self.lock();
        let member = state.members.get(&uuid)?;
        if !member.hears(peer) {
            return None;
        }
        state.members.get(&peer).map(|p| p.record.endpoint.clone())
    }

    fn peer_header_value(&self, uuid: PeerUuid, peer: PeerUuid, name: &str) -> Option<String> {
        let state = self.lock();
        let member = state.members.get(&uuid)?;
        if !member.hears(peer) {
            return None;
        }
        state.members.get(&peer)?.record.headers.get(name).cloned()
    }

    fn heartbeat(&self, uuid: PeerUuid) {
        self.lock().touch(uuid);
    }
}

/// Sends `to` the ENTER, JOINs and LEADERs describing `from`.
fn announce(from: &Member, to: &Member, leaders: &BTreeMap<String, PeerUuid>) {
    let enter = occurrence(EventType::Enter, &from.record)
        .with_addr(from.record.endpoint.clone())
        .with_headers(from.record.headers.clone());
    deliver(to, enter);
    for group in &from.groups {
        deliver(to, occurrence(EventType::Join, &from.record).with_group(group.clone()));
    }
    for group in from.groups.iter().filter(|g| leaders.get(*g) == Some(&from.record.uuid)) {
        deliver(to, occurrence(EventType::Leader, &from.record).with_group(group.clone()));
    }
}
