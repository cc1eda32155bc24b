//! Group-messaging nodes for murmur.
//!
//! A [`Node`] joins groups, whispers to peers, shouts to groups, and
//! receives typed [`Event`](murmur_event::Event)s. Nodes talk through a
//! [`Transport`]; [`MemoryHub`] links nodes in the same process.
//!
//! # Modules
//!
//! - [`config`]: [`NodeConfig`]
//! - [`node`]: lifecycle, groups, messaging, receiving
//! - [`poller`]: readiness over several nodes, [`wait`]
//! - [`transport`]: the [`Transport`] seam
//! - [`hub`]: in-process [`MemoryHub`]
//! - [`inbox`]: the per-node occurrence queue
//!
//! Waiting for a particular event is [`Node::wait_for`]; all received
//! events as a stream is [`Node::events`].

pub mod config;
pub mod hub;
pub mod inbox;
pub mod node;
pub mod poller;
pub mod transport;
mod waiting;

pub use config::NodeConfig;
pub use hub::MemoryHub;
pub use inbox::Inbox;
pub use node::{Node, NodeState};
pub use poller::{wait, Poller};
pub use transport::{PeerRecord, Transport};
